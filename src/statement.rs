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

//! Statement implementation for the Impala ADBC driver.

use crate::client::{close_after_failure, Context, Session};
use crate::error::{ImpalaErrorHelper, Result as ImpalaResult};
use crate::reader::ResultReader;
use adbc_core::error::Result;
use adbc_core::options::{OptionStatement, OptionValue};
use adbc_core::Optionable;
use arrow_array::RecordBatchReader;
use arrow_schema::Schema;
use driverbase::error::ErrorHelper;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const OPTION_TIMEOUT_MS: &str = "impala.statement.timeout_ms";
pub const OPTION_BATCH_SIZE: &str = "impala.statement.batch_size";

/// A SQL statement executed on the connection's session.
///
/// Execution blocks on the connection runtime. [`Statement::cancel_token`]
/// hands out a token other threads can use to abort a running call.
#[derive(Debug)]
pub struct Statement {
    runtime: Arc<Runtime>,
    session: Arc<Session>,
    query: Option<String>,
    timeout: Option<Duration>,
    batch_size: usize,
    cancel: CancellationToken,
}

impl Statement {
    pub(crate) fn new(runtime: Arc<Runtime>, session: Arc<Session>, batch_size: usize) -> Self {
        Self {
            runtime,
            session,
            query: None,
            timeout: None,
            batch_size,
            cancel: CancellationToken::new(),
        }
    }

    /// Returns the current SQL query.
    pub fn sql_query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn sql(&self) -> Result<String> {
        self.query.clone().ok_or_else(|| {
            ImpalaErrorHelper::invalid_state()
                .message("no SQL query set")
                .to_adbc()
        })
    }

    /// Must be called inside the runtime so the deadline uses its clock.
    fn context(&self) -> Context {
        let ctx = Context::with_token(self.cancel.child_token());
        match self.timeout {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx,
        }
    }

    fn positive_int(key: &OptionStatement, value: &OptionValue) -> Result<u64> {
        let parsed = match value {
            OptionValue::Int(v) => u64::try_from(*v).ok(),
            OptionValue::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| ImpalaErrorHelper::set_invalid_option(key, value).to_adbc())
    }
}

impl Optionable for Statement {
    type Option = OptionStatement;

    fn set_option(&mut self, key: Self::Option, value: OptionValue) -> Result<()> {
        match key {
            OptionStatement::Other(ref s) if s == OPTION_TIMEOUT_MS => {
                let ms = Self::positive_int(&key, &value)?;
                self.timeout = (ms > 0).then(|| Duration::from_millis(ms));
                Ok(())
            }
            OptionStatement::Other(ref s) if s == OPTION_BATCH_SIZE => {
                let size = Self::positive_int(&key, &value)?;
                if size == 0 {
                    return Err(ImpalaErrorHelper::set_invalid_option(&key, &value).to_adbc());
                }
                self.batch_size = size as usize;
                Ok(())
            }
            _ => Err(ImpalaErrorHelper::set_unknown_option(&key).to_adbc()),
        }
    }

    fn get_option_string(&self, key: Self::Option) -> Result<String> {
        Err(ImpalaErrorHelper::get_unknown_option(&key).to_adbc())
    }

    fn get_option_bytes(&self, key: Self::Option) -> Result<Vec<u8>> {
        Err(ImpalaErrorHelper::get_unknown_option(&key).to_adbc())
    }

    fn get_option_int(&self, key: Self::Option) -> Result<i64> {
        match key {
            OptionStatement::Other(ref s) if s == OPTION_TIMEOUT_MS => {
                Ok(self.timeout.map_or(0, |t| t.as_millis() as i64))
            }
            OptionStatement::Other(ref s) if s == OPTION_BATCH_SIZE => Ok(self.batch_size as i64),
            _ => Err(ImpalaErrorHelper::get_unknown_option(&key).to_adbc()),
        }
    }

    fn get_option_double(&self, key: Self::Option) -> Result<f64> {
        Err(ImpalaErrorHelper::get_unknown_option(&key).to_adbc())
    }
}

impl adbc_core::Statement for Statement {
    fn set_sql_query(&mut self, query: impl AsRef<str>) -> Result<()> {
        self.query = Some(query.as_ref().to_string());
        Ok(())
    }

    fn set_substrait_plan(&mut self, _plan: impl AsRef<[u8]>) -> Result<()> {
        Err(ImpalaErrorHelper::not_implemented()
            .message("Substrait plans")
            .to_adbc())
    }

    fn prepare(&mut self) -> Result<()> {
        Err(ImpalaErrorHelper::not_implemented()
            .message("prepare")
            .to_adbc())
    }

    fn get_parameter_schema(&self) -> Result<Schema> {
        Err(ImpalaErrorHelper::not_implemented()
            .message("get_parameter_schema")
            .to_adbc())
    }

    fn bind(&mut self, _batch: arrow_array::RecordBatch) -> Result<()> {
        Err(ImpalaErrorHelper::not_implemented()
            .message("bind parameters")
            .to_adbc())
    }

    fn bind_stream(&mut self, _stream: Box<dyn RecordBatchReader + Send>) -> Result<()> {
        Err(ImpalaErrorHelper::not_implemented()
            .message("bind_stream")
            .to_adbc())
    }

    fn execute(&mut self) -> Result<impl RecordBatchReader + Send> {
        let sql = self.sql()?;
        let session = self.session.clone();
        let results = self.runtime.block_on(async {
            let ctx = self.context();
            let op = session.execute(&ctx, &sql).await?;
            if !op.has_result_set() {
                if let Err(err) = op.wait_to_finish(&ctx).await {
                    close_after_failure(&op).await;
                    return Err(err);
                }
                op.close().await?;
                return ImpalaResult::Ok(None);
            }
            match session.prepare_results(&ctx, &op).await {
                Ok(rows) => Ok(Some((op, rows))),
                Err(err) => {
                    close_after_failure(&op).await;
                    Err(err)
                }
            }
        })?;

        debug!(has_result_set = results.is_some(), "statement executed");
        Ok(match results {
            Some((op, rows)) => ResultReader::new(self.runtime.clone(), op, rows, self.batch_size),
            None => ResultReader::empty(self.runtime.clone()),
        })
    }

    fn execute_update(&mut self) -> Result<Option<i64>> {
        let sql = self.sql()?;
        let rows = self.runtime.block_on(async {
            let ctx = self.context();
            self.session.exec(&ctx, &sql).await
        })?;
        Ok(Some(rows))
    }

    /// Wraps the query in a zero-row select so nothing is modified or
    /// fetched.
    fn execute_schema(&mut self) -> Result<Schema> {
        let sql = self.sql()?;
        let probe = format!("SELECT * FROM ({sql}) impala_adbc_schema LIMIT 0");
        let schema = self.runtime.block_on(async {
            let ctx = self.context();
            self.session.result_schema(&ctx, &probe).await
        })?;
        Ok(schema.to_arrow())
    }

    fn execute_partitions(&mut self) -> Result<adbc_core::PartitionedResult> {
        Err(ImpalaErrorHelper::not_implemented()
            .message("execute_partitions")
            .to_adbc())
    }

    fn cancel(&mut self) -> Result<()> {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::rpc::{
        TCloseImpalaOperationResp, TDmlResult, TExecuteStatementResp, TGetOperationStatusResp,
        TGetResultSetMetadataResp, TOperationHandle, TOperationState, TSessionHandle, TStatus,
        TTypeId,
    };
    use crate::client::testing::{schema_of, string_batch, MockService};
    use crate::client::{Client, ClientOptions};
    use crate::error::Error;
    use adbc_core::error::Status;
    use adbc_core::Statement as _;
    use arrow_array::{Array, StringArray};
    use std::collections::HashMap;

    fn statement(service: Arc<MockService>) -> Statement {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let client = Arc::new(Client::new(service, ClientOptions::default()));
        Statement::new(
            Arc::new(runtime),
            Arc::new(Session::new(client, TSessionHandle::default())),
            1024,
        )
    }

    #[test]
    fn test_statement_set_query() {
        let mut stmt = statement(Arc::new(MockService::default()));
        stmt.set_sql_query("SELECT 1").unwrap();
        assert_eq!(stmt.sql_query(), Some("SELECT 1"));
    }

    #[test]
    fn test_execute_without_query() {
        let mut stmt = statement(Arc::new(MockService::default()));
        let err = stmt.execute_update().unwrap_err();
        assert_eq!(err.status, Status::InvalidState);
    }

    #[test]
    fn test_statement_execute() {
        let service = Arc::new(MockService::default());
        service.push_metadata(Ok(TGetResultSetMetadataResp {
            status: TStatus::default(),
            schema: Some(schema_of(&[("name", TTypeId::String)])),
        }));
        service.push_fetch(Ok(string_batch(vec![vec!["fry", "leela"]])));
        let mut stmt = statement(service.clone());
        stmt.set_sql_query("SELECT name FROM crew").unwrap();

        let reader = stmt.execute().unwrap();
        assert_eq!(reader.schema().field(0).name(), "name");
        let batches: Vec<_> = reader.collect::<std::result::Result<_, _>>().unwrap();
        assert_eq!(batches.len(), 1);
        let names = batches[0]
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(names.value(1), "leela");
        assert_eq!(service.calls("close_impala_operation"), 1);
    }

    #[test]
    fn test_execute_without_result_set() {
        let service = Arc::new(MockService::default());
        service.push_execute(Ok(TExecuteStatementResp {
            status: TStatus::default(),
            operation_handle: Some(TOperationHandle::default()),
        }));
        let mut stmt = statement(service.clone());
        stmt.set_sql_query("CREATE TABLE t (x INT)").unwrap();

        let mut reader = stmt.execute().unwrap();
        assert!(reader.schema().fields().is_empty());
        assert!(reader.next().is_none());
        assert_eq!(service.calls("get_result_set_metadata"), 0);
        assert_eq!(service.calls("close_impala_operation"), 1);
    }

    #[test]
    fn test_execute_update() {
        let service = Arc::new(MockService::default());
        service.push_close(Ok(TCloseImpalaOperationResp {
            status: TStatus::default(),
            dml_result: Some(TDmlResult {
                rows_modified: HashMap::from([(String::new(), 3)]),
                ..Default::default()
            }),
        }));
        let mut stmt = statement(service);
        stmt.set_sql_query("INSERT INTO t VALUES (1), (2), (3)").unwrap();
        assert_eq!(stmt.execute_update().unwrap(), Some(3));
    }

    #[test]
    fn test_execute_failure_reports_server_message() {
        let service = Arc::new(MockService::default());
        service.push_status(Ok(TGetOperationStatusResp {
            operation_state: Some(TOperationState::Error),
            error_message: Some("AnalysisException: Could not resolve table".into()),
            sql_state: Some("42000".into()),
            ..Default::default()
        }));
        let mut stmt = statement(service.clone());
        stmt.set_sql_query("SELECT * FROM missing").unwrap();

        let err = stmt.execute().map(|_| ()).unwrap_err();
        assert!(err.message.contains("Could not resolve table"));
        assert_eq!(service.calls("close_impala_operation"), 1);
    }

    #[test]
    fn test_execute_schema() {
        let service = Arc::new(MockService::default());
        service.push_metadata(Ok(TGetResultSetMetadataResp {
            status: TStatus::default(),
            schema: Some(schema_of(&[("n", TTypeId::BigInt)])),
        }));
        let mut stmt = statement(service.clone());
        stmt.set_sql_query("SELECT count(*) n FROM t").unwrap();

        let schema = stmt.execute_schema().unwrap();
        assert_eq!(schema.field(0).name(), "n");
        assert_eq!(
            service.last_execute_request().unwrap().statement,
            "SELECT * FROM (SELECT count(*) n FROM t) impala_adbc_schema LIMIT 0"
        );
        assert_eq!(service.calls("fetch_results"), 0);
    }

    #[test]
    fn test_statement_options() {
        let mut stmt = statement(Arc::new(MockService::default()));
        stmt.set_option(
            OptionStatement::Other(OPTION_TIMEOUT_MS.into()),
            OptionValue::Int(1500),
        )
        .unwrap();
        stmt.set_option(
            OptionStatement::Other(OPTION_BATCH_SIZE.into()),
            OptionValue::String("10".into()),
        )
        .unwrap();
        assert_eq!(
            stmt.get_option_int(OptionStatement::Other(OPTION_TIMEOUT_MS.into()))
                .unwrap(),
            1500
        );
        assert_eq!(
            stmt.get_option_int(OptionStatement::Other(OPTION_BATCH_SIZE.into()))
                .unwrap(),
            10
        );
        assert!(stmt
            .set_option(
                OptionStatement::Other(OPTION_BATCH_SIZE.into()),
                OptionValue::Int(0),
            )
            .is_err());
        assert!(stmt
            .set_option(OptionStatement::IngestMode, OptionValue::String("x".into()))
            .is_err());
    }

    #[test]
    fn test_cancel_aborts_running_statement() {
        let service = Arc::new(MockService::default());
        for _ in 0..1000 {
            service.push_status(Ok(TGetOperationStatusResp {
                operation_state: Some(TOperationState::Running),
                ..Default::default()
            }));
        }
        let mut stmt = statement(service.clone());
        stmt.set_sql_query("SELECT sleep(100000)").unwrap();
        let token = stmt.cancel_token();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            token.cancel();
        });

        let err = stmt.execute_update().unwrap_err();
        canceller.join().unwrap();
        assert_eq!(err.status, Error::Cancelled.status());
        assert_eq!(service.calls("close_impala_operation"), 1);
    }
}
