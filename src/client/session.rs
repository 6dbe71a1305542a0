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

//! Server-side session scoping submitted statements.

use super::context::Context;
use super::operation::Operation;
use super::rpc::{check_status, TCloseSessionReq, TExecuteStatementReq, TSessionHandle};
use super::{guid, Client};
use crate::error::{Error, Result};
use crate::result::{ResultSet, TableSchema, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An open HS2 session.
///
/// Operations created here are only valid while the session is open. A
/// session is driven by one caller at a time.
#[derive(Debug)]
pub struct Session {
    client: Arc<Client>,
    handle: TSessionHandle,
}

impl Session {
    pub(crate) fn new(client: Arc<Client>, handle: TSessionHandle) -> Self {
        Self { client, handle }
    }

    pub fn handle(&self) -> &TSessionHandle {
        &self.handle
    }

    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    pub fn guid(&self) -> String {
        guid(&self.handle.session_id.guid)
    }

    /// Submits `statement` for asynchronous execution.
    pub async fn execute(&self, ctx: &Context, statement: &str) -> Result<Operation> {
        let req = TExecuteStatementReq {
            session_handle: self.handle.clone(),
            statement: statement.to_string(),
            conf_overlay: HashMap::new(),
            run_async: true,
        };
        let resp = ctx.coalesce(self.client.service().execute_statement(&req).await)?;
        check_status(&resp)?;
        let handle = resp
            .operation_handle
            .ok_or_else(|| Error::Protocol("execute response without operation handle".into()))?;

        let op = Operation::new(self.client.clone(), handle);
        debug!(session = %self.guid(), operation = %op.guid(), "execute statement");
        Ok(op)
    }

    /// Runs a statement to completion and returns the affected row count.
    pub async fn exec(&self, ctx: &Context, statement: &str) -> Result<i64> {
        let op = self.execute(ctx, statement).await?;
        if let Err(err) = op.wait_to_finish(ctx).await {
            close_after_failure(&op).await;
            return Err(err);
        }
        op.close().await
    }

    /// Runs a query and returns its schema together with a row cursor.
    ///
    /// The caller owns the returned operation and closes it once the
    /// cursor is drained.
    pub async fn query(&self, ctx: &Context, statement: &str) -> Result<(Operation, ResultSet)> {
        let op = self.execute(ctx, statement).await?;
        match self.prepare_results(ctx, &op).await {
            Ok(rs) => Ok((op, rs)),
            Err(err) => {
                close_after_failure(&op).await;
                Err(err)
            }
        }
    }

    pub(crate) async fn prepare_results(&self, ctx: &Context, op: &Operation) -> Result<ResultSet> {
        op.wait_to_finish(ctx).await?;
        let schema = op.get_result_set_metadata(ctx).await?;
        Ok(op.fetch_results(ctx.clone(), Arc::new(schema)))
    }

    /// Runs `statement` only far enough to learn its result schema.
    pub async fn result_schema(&self, ctx: &Context, statement: &str) -> Result<TableSchema> {
        let op = self.execute(ctx, statement).await?;
        let schema = async {
            op.wait_to_finish(ctx).await?;
            op.get_result_set_metadata(ctx).await
        }
        .await;
        match schema {
            Ok(schema) => {
                op.close().await?;
                Ok(schema)
            }
            Err(err) => {
                close_after_failure(&op).await;
                Err(err)
            }
        }
    }

    /// Round trip through the server with a trivial query.
    pub async fn ping(&self, ctx: &Context) -> Result<()> {
        let (op, mut rs) = self.query(ctx, "SELECT 1").await?;
        let mut row = vec![Value::Null; rs.schema().len()];
        let drained = async {
            while rs.next(&mut row).await? {}
            Ok::<_, Error>(())
        }
        .await;
        let closed = op.close().await;
        drained?;
        closed.map(|_| ())
    }

    /// Closes the session on the server.
    pub async fn close(&self, ctx: &Context) -> Result<()> {
        let req = TCloseSessionReq {
            session_handle: self.handle.clone(),
        };
        let resp = ctx.coalesce(self.client.service().close_session(&req).await)?;
        check_status(&resp)?;
        info!(session = %self.guid(), "close session");
        Ok(())
    }
}

/// Best-effort close of an operation whose execution already failed.
///
/// The original failure is what the caller sees; a close failure is logged.
pub(crate) async fn close_after_failure(op: &Operation) {
    if let Err(err) = op.close().await {
        warn!(operation = %op.guid(), error = %err, "failed to close operation");
    }
}
