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

//! Connection implementation for the Impala ADBC driver.

use crate::client::{Context, SchemaInfo, Session, TableInfo};
use crate::error::ImpalaErrorHelper;
use crate::statement::Statement;
use adbc_core::error::Result;
use adbc_core::options::{InfoCode, ObjectDepth, OptionConnection, OptionValue};
use adbc_core::Optionable;
use arrow_array::{ArrayRef, RecordBatch, RecordBatchIterator, RecordBatchReader, StringArray};
use arrow_schema::{ArrowError, DataType, Field, Schema};
use driverbase::error::ErrorHelper;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Table types Impala reports through GetTables.
const TABLE_TYPES: [&str; 2] = ["TABLE", "VIEW"];

/// Type alias for our empty reader used in stub implementations.
type EmptyReader =
    RecordBatchIterator<std::vec::IntoIter<std::result::Result<RecordBatch, ArrowError>>>;

/// An open session on an Impala coordinator.
///
/// Statements created from a connection share its session and runtime.
/// Dropping the connection closes the session.
#[derive(Debug)]
pub struct Connection {
    runtime: Arc<Runtime>,
    session: Arc<Session>,
    batch_size: usize,
    cancel: CancellationToken,
}

impl Connection {
    pub(crate) fn new(runtime: Arc<Runtime>, session: Session, batch_size: usize) -> Self {
        Self {
            runtime,
            session: Arc::new(session),
            batch_size,
            cancel: CancellationToken::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Token that aborts metadata calls in flight on this connection.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn context(&self) -> Context {
        Context::with_token(self.cancel.child_token())
    }

    /// Checks that the session still answers queries.
    pub fn ping(&self) -> Result<()> {
        let ctx = self.context();
        Ok(self.runtime.block_on(self.session.ping(&ctx))?)
    }

    /// Schemas whose name matches the SQL LIKE `pattern`.
    pub fn list_schemas(&self, pattern: &str) -> Result<Vec<SchemaInfo>> {
        let ctx = self.context();
        Ok(self
            .runtime
            .block_on(self.session.list_schemas(&ctx, pattern))?)
    }

    /// Tables matching both SQL LIKE patterns.
    pub fn list_tables(&self, schema_pattern: &str, table_pattern: &str) -> Result<Vec<TableInfo>> {
        let ctx = self.context();
        Ok(self.runtime.block_on(
            self.session
                .list_tables(&ctx, schema_pattern, table_pattern),
        )?)
    }
}

fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

impl Optionable for Connection {
    type Option = OptionConnection;

    fn set_option(&mut self, key: Self::Option, value: OptionValue) -> Result<()> {
        match key {
            // Impala has no multi-statement transactions.
            OptionConnection::AutoCommit => match value {
                OptionValue::String(ref s) if s.eq_ignore_ascii_case("true") => Ok(()),
                _ => Err(ImpalaErrorHelper::not_implemented()
                    .message("disabling autocommit")
                    .to_adbc()),
            },
            _ => Err(ImpalaErrorHelper::set_unknown_option(&key).to_adbc()),
        }
    }

    fn get_option_string(&self, key: Self::Option) -> Result<String> {
        match key {
            OptionConnection::AutoCommit => Ok("true".to_string()),
            _ => Err(ImpalaErrorHelper::get_unknown_option(&key).to_adbc()),
        }
    }

    fn get_option_bytes(&self, key: Self::Option) -> Result<Vec<u8>> {
        Err(ImpalaErrorHelper::get_unknown_option(&key).to_adbc())
    }

    fn get_option_int(&self, key: Self::Option) -> Result<i64> {
        Err(ImpalaErrorHelper::get_unknown_option(&key).to_adbc())
    }

    fn get_option_double(&self, key: Self::Option) -> Result<f64> {
        Err(ImpalaErrorHelper::get_unknown_option(&key).to_adbc())
    }
}

impl adbc_core::Connection for Connection {
    type StatementType = Statement;

    fn new_statement(&mut self) -> Result<Self::StatementType> {
        Ok(Statement::new(
            self.runtime.clone(),
            self.session.clone(),
            self.batch_size,
        ))
    }

    fn cancel(&mut self) -> Result<()> {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        Ok(())
    }

    fn get_info(&self, codes: Option<HashSet<InfoCode>>) -> Result<impl RecordBatchReader + Send> {
        use driverbase::InfoBuilder;

        let mut builder = InfoBuilder::new();

        let return_all = codes.is_none();
        let codes = codes.unwrap_or_default();

        if return_all || codes.contains(&InfoCode::DriverName) {
            builder.add_string(InfoCode::DriverName as u32, "Impala ADBC Driver");
        }
        if return_all || codes.contains(&InfoCode::DriverVersion) {
            builder.add_string(InfoCode::DriverVersion as u32, env!("CARGO_PKG_VERSION"));
        }
        if return_all || codes.contains(&InfoCode::VendorName) {
            builder.add_string(InfoCode::VendorName as u32, "Apache Impala");
        }

        Ok(builder.build())
    }

    fn get_objects(
        &self,
        _depth: ObjectDepth,
        _catalog: Option<&str>,
        _db_schema: Option<&str>,
        _table_name: Option<&str>,
        _table_type: Option<Vec<&str>>,
        _column_name: Option<&str>,
    ) -> Result<impl RecordBatchReader + Send> {
        Err::<EmptyReader, _>(
            ImpalaErrorHelper::not_implemented()
                .message("get_objects, use list_schemas and list_tables")
                .to_adbc(),
        )
    }

    fn get_table_schema(
        &self,
        _catalog: Option<&str>,
        db_schema: Option<&str>,
        table_name: &str,
    ) -> Result<Schema> {
        let qualified = match db_schema {
            Some(schema) => format!(
                "{}.{}",
                quote_identifier(schema),
                quote_identifier(table_name)
            ),
            None => quote_identifier(table_name),
        };
        let sql = format!("SELECT * FROM {qualified} LIMIT 0");
        let ctx = self.context();
        let schema = self
            .runtime
            .block_on(self.session.result_schema(&ctx, &sql))?;
        Ok(schema.to_arrow())
    }

    fn get_table_types(&self) -> Result<impl RecordBatchReader + Send> {
        let schema = Arc::new(Schema::new(vec![Field::new(
            "table_type",
            DataType::Utf8,
            false,
        )]));
        let types: ArrayRef = Arc::new(StringArray::from(TABLE_TYPES.to_vec()));
        let batch = RecordBatch::try_new(schema.clone(), vec![types]).map_err(|e| {
            ImpalaErrorHelper::invalid_state()
                .message(e.to_string())
                .to_adbc()
        })?;
        Ok(RecordBatchIterator::new(vec![Ok(batch)], schema))
    }

    fn read_partition(
        &self,
        _partition: impl AsRef<[u8]>,
    ) -> Result<impl RecordBatchReader + Send> {
        Err::<EmptyReader, _>(
            ImpalaErrorHelper::not_implemented()
                .message("read_partition")
                .to_adbc(),
        )
    }

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        Err(ImpalaErrorHelper::not_implemented()
            .message("rollback - Impala is auto-commit only")
            .to_adbc())
    }

    fn get_statistic_names(&self) -> Result<impl RecordBatchReader + Send> {
        Err::<EmptyReader, _>(
            ImpalaErrorHelper::not_implemented()
                .message("get_statistic_names")
                .to_adbc(),
        )
    }

    fn get_statistics(
        &self,
        _catalog: Option<&str>,
        _db_schema: Option<&str>,
        _table_name: Option<&str>,
        _approximate: bool,
    ) -> Result<impl RecordBatchReader + Send> {
        Err::<EmptyReader, _>(
            ImpalaErrorHelper::not_implemented()
                .message("get_statistics")
                .to_adbc(),
        )
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(err) = self
            .runtime
            .block_on(self.session.close(&Context::background()))
        {
            warn!(session = %self.session.guid(), error = %err, "failed to close session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::rpc::{
        TGetResultSetMetadataResp, TSessionHandle, TStatus, TTypeId,
    };
    use crate::client::testing::{schema_of, MockService};
    use crate::client::{Client, ClientOptions};
    use adbc_core::error::Status;
    use adbc_core::Connection as _;

    fn connection(service: Arc<MockService>) -> Connection {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let client = Arc::new(Client::new(service, ClientOptions::default()));
        Connection::new(
            Arc::new(runtime),
            Session::new(client, TSessionHandle::default()),
            1024,
        )
    }

    #[test]
    fn test_connection_new_statement() {
        let mut conn = connection(Arc::new(MockService::default()));
        assert!(conn.new_statement().is_ok());
    }

    #[test]
    fn test_connection_get_info() {
        let conn = connection(Arc::new(MockService::default()));
        let batches: Vec<_> = conn
            .get_info(Some(HashSet::from([InfoCode::VendorName])))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 1);
    }

    #[test]
    fn test_connection_commit_and_rollback() {
        let mut conn = connection(Arc::new(MockService::default()));
        assert!(conn.commit().is_ok());
        assert_eq!(conn.rollback().unwrap_err().status, Status::NotImplemented);
    }

    #[test]
    fn test_autocommit_only() {
        let mut conn = connection(Arc::new(MockService::default()));
        conn.set_option(OptionConnection::AutoCommit, OptionValue::String("true".into()))
            .unwrap();
        assert!(conn
            .set_option(OptionConnection::AutoCommit, OptionValue::String("false".into()))
            .is_err());
    }

    #[test]
    fn test_get_table_types() {
        let conn = connection(Arc::new(MockService::default()));
        let batch = conn.get_table_types().unwrap().next().unwrap().unwrap();
        let types = batch
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(types.value(0), "TABLE");
        assert_eq!(types.value(1), "VIEW");
    }

    #[test]
    fn test_get_table_schema() {
        let service = Arc::new(MockService::default());
        service.push_metadata(Ok(TGetResultSetMetadataResp {
            status: TStatus::default(),
            schema: Some(schema_of(&[
                ("id", TTypeId::BigInt),
                ("name", TTypeId::String),
            ])),
        }));
        let conn = connection(service.clone());

        let schema = conn
            .get_table_schema(None, Some("default"), "people")
            .unwrap();
        assert_eq!(schema.fields().len(), 2);
        assert_eq!(schema.field(0).name(), "id");
        assert_eq!(schema.field(0).data_type(), &DataType::Int64);
        assert_eq!(
            service.last_execute_request().unwrap().statement,
            "SELECT * FROM `default`.`people` LIMIT 0"
        );
        assert_eq!(service.calls("fetch_results"), 0);
    }

    #[test]
    fn test_drop_closes_session() {
        let service = Arc::new(MockService::default());
        drop(connection(service.clone()));
        assert_eq!(service.calls("close_session"), 1);
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("a`b"), "`a``b`");
    }
}
