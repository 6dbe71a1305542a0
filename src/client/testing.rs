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

//! Scripted [`HiveService`] for unit tests.

use super::rpc::*;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Replays queued responses per RPC and records every call.
///
/// When a queue is empty the RPC answers with a successful default: a
/// session or operation handle, a FINISHED state, an empty final batch.
#[derive(Default)]
pub(crate) struct MockService {
    open: Mutex<VecDeque<Result<TOpenSessionResp>>>,
    execute: Mutex<VecDeque<Result<TExecuteStatementResp>>>,
    status: Mutex<VecDeque<Result<TGetOperationStatusResp>>>,
    metadata: Mutex<VecDeque<Result<TGetResultSetMetadataResp>>>,
    fetch: Mutex<VecDeque<Result<TFetchResultsResp>>>,
    close: Mutex<VecDeque<Result<TCloseImpalaOperationResp>>>,
    schemas: Mutex<VecDeque<Result<TGetSchemasResp>>>,
    tables: Mutex<VecDeque<Result<TGetTablesResp>>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    open_requests: Mutex<Vec<TOpenSessionReq>>,
    execute_requests: Mutex<Vec<TExecuteStatementReq>>,
    table_requests: Mutex<Vec<TGetTablesReq>>,
}

impl MockService {
    pub fn push_open(&self, resp: Result<TOpenSessionResp>) {
        self.open.lock().unwrap().push_back(resp);
    }

    pub fn push_execute(&self, resp: Result<TExecuteStatementResp>) {
        self.execute.lock().unwrap().push_back(resp);
    }

    pub fn push_status(&self, resp: Result<TGetOperationStatusResp>) {
        self.status.lock().unwrap().push_back(resp);
    }

    pub fn push_metadata(&self, resp: Result<TGetResultSetMetadataResp>) {
        self.metadata.lock().unwrap().push_back(resp);
    }

    pub fn push_fetch(&self, resp: Result<TFetchResultsResp>) {
        self.fetch.lock().unwrap().push_back(resp);
    }

    pub fn push_close(&self, resp: Result<TCloseImpalaOperationResp>) {
        self.close.lock().unwrap().push_back(resp);
    }

    pub fn push_schemas(&self, resp: Result<TGetSchemasResp>) {
        self.schemas.lock().unwrap().push_back(resp);
    }

    pub fn push_tables(&self, resp: Result<TGetTablesResp>) {
        self.tables.lock().unwrap().push_back(resp);
    }

    /// Number of times the named RPC was issued.
    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    pub fn last_open_request(&self) -> Option<TOpenSessionReq> {
        self.open_requests.lock().unwrap().last().cloned()
    }

    pub fn last_execute_request(&self) -> Option<TExecuteStatementReq> {
        self.execute_requests.lock().unwrap().last().cloned()
    }

    pub fn last_tables_request(&self) -> Option<TGetTablesReq> {
        self.table_requests.lock().unwrap().last().cloned()
    }

    fn record(&self, method: &'static str) {
        *self.calls.lock().unwrap().entry(method).or_default() += 1;
    }
}

fn next<T>(queue: &Mutex<VecDeque<Result<T>>>, default: impl FnOnce() -> T) -> Result<T> {
    queue.lock().unwrap().pop_front().unwrap_or_else(|| Ok(default()))
}

fn result_handle() -> TOperationHandle {
    TOperationHandle {
        operation_id: THandleIdentifier {
            guid: vec![1; 16],
            secret: vec![],
        },
        has_result_set: true,
        ..Default::default()
    }
}

#[async_trait]
impl HiveService for MockService {
    async fn open_session(&self, req: &TOpenSessionReq) -> Result<TOpenSessionResp> {
        self.record("open_session");
        self.open_requests.lock().unwrap().push(req.clone());
        next(&self.open, || TOpenSessionResp {
            session_handle: Some(TSessionHandle {
                session_id: THandleIdentifier {
                    guid: vec![2; 16],
                    secret: vec![],
                },
            }),
            ..Default::default()
        })
    }

    async fn close_session(&self, _req: &TCloseSessionReq) -> Result<TCloseSessionResp> {
        self.record("close_session");
        Ok(TCloseSessionResp::default())
    }

    async fn execute_statement(
        &self,
        req: &TExecuteStatementReq,
    ) -> Result<TExecuteStatementResp> {
        self.record("execute_statement");
        self.execute_requests.lock().unwrap().push(req.clone());
        next(&self.execute, || TExecuteStatementResp {
            status: TStatus::default(),
            operation_handle: Some(result_handle()),
        })
    }

    async fn get_operation_status(
        &self,
        _req: &TGetOperationStatusReq,
    ) -> Result<TGetOperationStatusResp> {
        self.record("get_operation_status");
        next(&self.status, || TGetOperationStatusResp {
            operation_state: Some(TOperationState::Finished),
            ..Default::default()
        })
    }

    async fn get_result_set_metadata(
        &self,
        _req: &TGetResultSetMetadataReq,
    ) -> Result<TGetResultSetMetadataResp> {
        self.record("get_result_set_metadata");
        next(&self.metadata, || TGetResultSetMetadataResp {
            status: TStatus::default(),
            schema: Some(TTableSchema::default()),
        })
    }

    async fn fetch_results(&self, _req: &TFetchResultsReq) -> Result<TFetchResultsResp> {
        self.record("fetch_results");
        next(&self.fetch, TFetchResultsResp::default)
    }

    async fn cancel_operation(&self, _req: &TCancelOperationReq) -> Result<TCancelOperationResp> {
        self.record("cancel_operation");
        Ok(TCancelOperationResp::default())
    }

    async fn close_impala_operation(
        &self,
        _req: &TCloseImpalaOperationReq,
    ) -> Result<TCloseImpalaOperationResp> {
        self.record("close_impala_operation");
        next(&self.close, TCloseImpalaOperationResp::default)
    }

    async fn get_schemas(&self, _req: &TGetSchemasReq) -> Result<TGetSchemasResp> {
        self.record("get_schemas");
        next(&self.schemas, || TGetSchemasResp {
            status: TStatus::default(),
            operation_handle: Some(result_handle()),
        })
    }

    async fn get_tables(&self, req: &TGetTablesReq) -> Result<TGetTablesResp> {
        self.record("get_tables");
        self.table_requests.lock().unwrap().push(req.clone());
        next(&self.tables, || TGetTablesResp {
            status: TStatus::default(),
            operation_handle: Some(result_handle()),
        })
    }
}

/// Result schema with one column per name and the given wire type.
pub(crate) fn schema_of(columns: &[(&str, TTypeId)]) -> TTableSchema {
    TTableSchema {
        columns: columns
            .iter()
            .enumerate()
            .map(|(i, (name, type_id))| TColumnDesc {
                column_name: name.to_string(),
                type_desc: TTypeDesc {
                    types: vec![TTypeEntry::Primitive(TPrimitiveTypeEntry {
                        type_id: *type_id,
                        type_qualifiers: None,
                    })],
                },
                position: i as i32 + 1,
                comment: None,
            })
            .collect(),
    }
}

/// Result schema of INT columns.
pub(crate) fn int_schema(names: &[&str]) -> TTableSchema {
    let columns: Vec<(&str, TTypeId)> = names.iter().map(|n| (*n, TTypeId::Int)).collect();
    schema_of(&columns)
}

/// A final batch of string columns, one vector per column.
pub(crate) fn string_batch(columns: Vec<Vec<&str>>) -> TFetchResultsResp {
    TFetchResultsResp {
        status: TStatus::default(),
        has_more_rows: false,
        results: Some(TRowSet {
            start_row_offset: 0,
            columns: columns
                .into_iter()
                .map(|values| {
                    TColumn::String(TTypedColumn::new(
                        values.into_iter().map(str::to_string).collect(),
                        vec![],
                    ))
                })
                .collect(),
        }),
    }
}
