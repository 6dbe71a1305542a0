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

//! Lifecycle of one submitted statement.
//!
//! An [`Operation`] is polled until the server reports FINISHED, then its
//! metadata and rows are fetched. All calls on one operation are strictly
//! sequential, and each loop checks its [`Context`] after every RPC.

use super::context::Context;
use super::rpc::{
    check_status, TCancelOperationReq, TCloseImpalaOperationReq, TCloseImpalaOperationResp,
    TFetchResultsReq, TFetchResultsResp, TGetOperationStatusReq, TGetResultSetMetadataReq,
    TOperationHandle, TOperationState, TStatusCode,
};
use super::{guid, Client};
use crate::error::{Error, Result};
use crate::result::{BatchSource, ResultSet, TableSchema};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Handle of a statement submitted to the server.
#[derive(Clone)]
pub struct Operation {
    client: Arc<Client>,
    handle: TOperationHandle,
}

impl Operation {
    pub(crate) fn new(client: Arc<Client>, handle: TOperationHandle) -> Self {
        Self { client, handle }
    }

    pub fn handle(&self) -> &TOperationHandle {
        &self.handle
    }

    /// Operation id in `hi:lo` form.
    pub fn guid(&self) -> String {
        guid(&self.handle.operation_id.guid)
    }

    pub fn has_result_set(&self) -> bool {
        self.handle.has_result_set
    }

    /// Row count reported with the handle for DML statements.
    pub fn rows_affected(&self) -> f64 {
        self.handle.modified_row_count.unwrap_or_default()
    }

    /// Fetches the result schema.
    pub async fn get_result_set_metadata(&self, ctx: &Context) -> Result<TableSchema> {
        debug!(operation = %self.guid(), "fetch metadata");
        let req = TGetResultSetMetadataReq {
            operation_handle: self.handle.clone(),
        };
        let resp = ctx.coalesce(self.client.service().get_result_set_metadata(&req).await)?;
        check_status(&resp)?;

        let schema = match &resp.schema {
            Some(schema) => TableSchema::from_rpc(schema)?,
            None => TableSchema::default(),
        };
        for col in &schema.columns {
            debug!(
                operation = %self.guid(),
                column = %col.name,
                type_name = %col.database_type_name,
                "fetch schema"
            );
        }
        Ok(schema)
    }

    /// Polls the operation once.
    ///
    /// Fails on transport errors, on a non-success embedded status, on
    /// terminal failure states, and when `ctx` is done by the time the
    /// response arrives; otherwise returns the reported state.
    pub async fn check_state_and_status(&self, ctx: &Context) -> Result<TOperationState> {
        let req = TGetOperationStatusReq {
            operation_handle: self.handle.clone(),
        };
        let resp = self.client.service().get_operation_status(&req).await?;
        check_status(&resp)?;

        let state = resp.operation_state.unwrap_or_default();
        if state.is_failure() {
            return Err(Error::OperationFailed {
                state,
                message: resp
                    .error_message
                    .or(resp.status.error_message)
                    .unwrap_or_default(),
                sql_state: resp.sql_state.or(resp.status.sql_state),
            });
        }
        debug!(operation = %self.guid(), %state, "reached success or non-terminal state");
        ctx.coalesce(Ok(state))
    }

    /// Polls until the operation is FINISHED, fails, or `ctx` is done.
    ///
    /// The first poll happens immediately; later polls back off from the
    /// configured initial interval, doubling up to the ceiling.
    pub async fn wait_to_finish(&self, ctx: &Context) -> Result<()> {
        let backoff = self.client.options().backoff;
        let mut duration = backoff.initial;
        let mut state = self.check_state_and_status(ctx).await?;
        while state != TOperationState::Finished {
            ctx.sleep(duration).await;
            if let Some(err) = ctx.err() {
                return Err(err);
            }
            state = self.check_state_and_status(ctx).await?;
            duration = backoff.next(duration);
        }
        Ok(())
    }

    /// Returns a cursor over the results; no RPC is made until it is read.
    pub fn fetch_results(&self, ctx: Context, schema: Arc<TableSchema>) -> ResultSet {
        let fetcher = Fetcher {
            op: self.clone(),
            ctx,
        };
        ResultSet::new(schema, Box::new(fetcher))
    }

    /// Requests cancellation of the running statement.
    ///
    /// Like [`Operation::close`] this is a cleanup call and takes no
    /// context: it must still go out after the caller's context is done.
    pub async fn cancel(&self) -> Result<()> {
        let req = TCancelOperationReq {
            operation_handle: self.handle.clone(),
        };
        let resp = self.client.service().cancel_operation(&req).await?;
        check_status(&resp)?;
        debug!(operation = %self.guid(), "cancel operation");
        Ok(())
    }

    /// Closes the operation and returns the number of rows the DML changed.
    pub async fn close(&self) -> Result<i64> {
        let req = TCloseImpalaOperationReq {
            operation_handle: self.handle.clone(),
        };
        let resp = self.client.service().close_impala_operation(&req).await?;
        check_status(&resp)?;

        let rows = rows_affected(&resp);
        debug!(operation = %self.guid(), rows, "close operation");
        Ok(rows)
    }

    /// One fetch, retried with backoff while the server is still executing.
    async fn fetch(&self, ctx: &Context) -> Result<TFetchResultsResp> {
        let backoff = self.client.options().backoff;
        let req = TFetchResultsReq {
            operation_handle: self.handle.clone(),
            max_rows: self.client.options().max_rows,
        };
        debug!(operation = %self.guid(), max_rows = req.max_rows, "fetch results");

        let mut duration = Duration::ZERO;
        let mut fetch_status = TStatusCode::StillExecuting;
        let mut resp = TFetchResultsResp::default();
        while fetch_status == TStatusCode::StillExecuting && ctx.err().is_none() {
            if duration.is_zero() {
                duration = backoff.initial;
            } else {
                ctx.sleep(duration).await;
                if ctx.err().is_some() {
                    break;
                }
                duration = backoff.next(duration);
            }
            resp = self.client.service().fetch_results(&req).await?;
            check_status(&resp)?;
            fetch_status = resp.status.status_code;
        }

        debug!(
            operation = %self.guid(),
            rows = crate::result::batch_length(resp.results.as_ref()),
            has_more = resp.has_more_rows,
            "results"
        );
        ctx.coalesce(Ok(resp))
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("guid", &self.guid())
            .field("has_result_set", &self.has_result_set())
            .finish()
    }
}

/// Binds an operation and its context as the batch source of a cursor.
struct Fetcher {
    op: Operation,
    ctx: Context,
}

#[async_trait]
impl BatchSource for Fetcher {
    async fn fetch(&mut self) -> Result<TFetchResultsResp> {
        self.op.fetch(&self.ctx).await
    }
}

/// Sums rows modified and rows deleted over all partitions.
fn rows_affected(resp: &TCloseImpalaOperationResp) -> i64 {
    let Some(dml) = &resp.dml_result else {
        return 0;
    };
    let modified: i64 = dml.rows_modified.values().sum();
    let deleted: i64 = dml
        .rows_deleted
        .as_ref()
        .map(|rows| rows.values().sum())
        .unwrap_or(0);
    modified + deleted
}
