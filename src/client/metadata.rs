// Copyright (c) 2025 ADBC Drivers Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Catalog listings over the GetSchemas / GetTables RPCs.
//!
//! Both calls produce a regular operation whose fixed result shape is read
//! through the same wait / metadata / fetch cycle as a query.

use super::context::Context;
use super::operation::Operation;
use super::rpc::{check_status, TGetSchemasReq, TGetTablesReq};
use super::session::{close_after_failure, Session};
use crate::error::{Error, Result};
use crate::result::{TableSchema, Value};

const TABLE_SCHEM: &str = "TABLE_SCHEM";
const TABLE_NAME: &str = "TABLE_NAME";
const TABLE_TYPE: &str = "TABLE_TYPE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaInfo {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
    /// `TABLE` or `VIEW`.
    pub table_type: String,
}

impl Session {
    /// Schemas whose name matches the SQL LIKE `pattern`.
    pub async fn list_schemas(&self, ctx: &Context, pattern: &str) -> Result<Vec<SchemaInfo>> {
        let req = TGetSchemasReq {
            session_handle: self.handle().clone(),
            catalog_name: None,
            schema_name: Some(pattern.to_string()),
        };
        let resp = ctx.coalesce(self.client().service().get_schemas(&req).await)?;
        check_status(&resp)?;
        let op = self.metadata_operation(resp.operation_handle)?;

        let rows = read_rows(self, ctx, &op, &[TABLE_SCHEM]).await?;
        Ok(rows
            .into_iter()
            .map(|mut row| SchemaInfo {
                name: row.swap_remove(0),
            })
            .collect())
    }

    /// Tables and views matching the SQL LIKE patterns.
    pub async fn list_tables(
        &self,
        ctx: &Context,
        schema_pattern: &str,
        table_pattern: &str,
    ) -> Result<Vec<TableInfo>> {
        let req = TGetTablesReq {
            session_handle: self.handle().clone(),
            catalog_name: None,
            schema_name: Some(schema_pattern.to_string()),
            table_name: Some(table_pattern.to_string()),
            table_types: None,
        };
        let resp = ctx.coalesce(self.client().service().get_tables(&req).await)?;
        check_status(&resp)?;
        let op = self.metadata_operation(resp.operation_handle)?;

        let rows = read_rows(self, ctx, &op, &[TABLE_SCHEM, TABLE_NAME, TABLE_TYPE]).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let mut row = row.into_iter();
                TableInfo {
                    schema: row.next().unwrap_or_default(),
                    name: row.next().unwrap_or_default(),
                    table_type: row.next().unwrap_or_default(),
                }
            })
            .collect())
    }

    fn metadata_operation(
        &self,
        handle: Option<super::rpc::TOperationHandle>,
    ) -> Result<Operation> {
        let handle = handle
            .ok_or_else(|| Error::Protocol("metadata response without operation handle".into()))?;
        Ok(Operation::new(self.client().clone(), handle))
    }
}

/// Drains `op`, projecting the named string columns of every row, and
/// closes the operation.
async fn read_rows(
    session: &Session,
    ctx: &Context,
    op: &Operation,
    columns: &[&str],
) -> Result<Vec<Vec<String>>> {
    let rows = async {
        let mut rs = session.prepare_results(ctx, op).await?;
        let positions = column_positions(rs.schema(), columns)?;
        let mut row = vec![Value::Null; rs.schema().len()];
        let mut out = Vec::new();
        while rs.next(&mut row).await? {
            out.push(
                positions
                    .iter()
                    .map(|&i| row[i].as_str().unwrap_or_default().to_string())
                    .collect(),
            );
        }
        Ok::<_, Error>(out)
    }
    .await;

    match rows {
        Ok(rows) => {
            op.close().await?;
            Ok(rows)
        }
        Err(err) => {
            close_after_failure(op).await;
            Err(err)
        }
    }
}

fn column_positions(schema: &TableSchema, names: &[&str]) -> Result<Vec<usize>> {
    names
        .iter()
        .map(|name| {
            schema
                .columns
                .iter()
                .position(|c| c.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| Error::Protocol(format!("metadata result without column {name}")))
        })
        .collect()
}
