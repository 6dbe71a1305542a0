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

//! End-to-end flow through the public API against an in-process server.
//!
//! The server speaks real SASL PLAIN and framing over TCP. HS2 calls are
//! answered by an in-memory service since the RPC codec is supplied by
//! the caller through a connector.

use adbc_core::error::Status;
use adbc_core::options::{OptionDatabase, OptionValue};
use adbc_core::Connection as _;
use adbc_core::Database as _;
use adbc_core::Driver as _;
use adbc_core::Optionable;
use adbc_core::Statement as _;
use arrow_array::{Array, Int32Array, RecordBatchReader, StringArray};
use async_trait::async_trait;
use impala_adbc::client::rpc::*;
use impala_adbc::client::{Connector, HiveService};
use impala_adbc::transport::{BoxedStream, SaslTransport};
use impala_adbc::{Driver, Result};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const CREW_QUERY: &str = "SELECT id, name FROM crew";

fn read_sasl(stream: &mut impl Read) -> (u8, Vec<u8>) {
    let mut header = [0u8; 5];
    stream.read_exact(&mut header).unwrap();
    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).unwrap();
    (header[0], payload)
}

/// Accepts one client, checks its PLAIN credentials, echoes a single frame
/// and waits for the client to hang up.
fn spawn_server(password: &'static str) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = std::thread::spawn(move || {
        let (mut socket, _) = listener.accept().unwrap();
        assert_eq!(read_sasl(&mut socket), (1, b"PLAIN".to_vec()));
        let (status, creds) = read_sasl(&mut socket);
        assert_eq!(status, 2);
        if creds != format!("fry\0fry\0{password}").into_bytes() {
            // Impala drops the connection on a bad login.
            return;
        }
        socket.write_all(&[5, 0, 0, 0, 0]).unwrap();

        let mut len = [0u8; 4];
        socket.read_exact(&mut len).unwrap();
        let mut frame = vec![0u8; u32::from_be_bytes(len) as usize];
        socket.read_exact(&mut frame).unwrap();
        socket.write_all(&len).unwrap();
        socket.write_all(&frame).unwrap();

        let mut rest = Vec::new();
        let _ = socket.read_to_end(&mut rest);
    });
    (port, handle)
}

fn string_column(values: &[&str], nulls: Vec<u8>) -> TColumn {
    TColumn::String(TTypedColumn::new(
        values.iter().map(|v| v.to_string()).collect(),
        nulls,
    ))
}

fn schema(columns: &[(&str, TTypeId)]) -> TTableSchema {
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

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kind {
    Crew,
    Update,
    Missing,
    Schemas,
    Tables,
}

/// HS2 service backed by a fixed catalog: one `crew` table in `planet`.
#[derive(Default)]
struct CatalogService {
    transport: Mutex<Option<SaslTransport<BoxedStream>>>,
    operations: Mutex<HashMap<Vec<u8>, Kind>>,
    next_id: AtomicUsize,
    closed_operations: AtomicUsize,
    closed_sessions: AtomicUsize,
}

impl CatalogService {
    fn handle(&self, kind: Kind) -> TOperationHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as u8;
        let guid = vec![id; 16];
        self.operations.lock().unwrap().insert(guid.clone(), kind);
        TOperationHandle {
            operation_id: THandleIdentifier {
                guid,
                secret: vec![0; 16],
            },
            has_result_set: kind != Kind::Update,
            ..Default::default()
        }
    }

    fn kind(&self, handle: &TOperationHandle) -> Kind {
        self.operations.lock().unwrap()[&handle.operation_id.guid]
    }
}

#[async_trait]
impl HiveService for CatalogService {
    async fn open_session(&self, req: &TOpenSessionReq) -> Result<TOpenSessionResp> {
        assert_eq!(req.configuration["MEM_LIMIT"], "1g");
        Ok(TOpenSessionResp {
            session_handle: Some(TSessionHandle {
                session_id: THandleIdentifier {
                    guid: vec![7; 16],
                    secret: vec![0; 16],
                },
            }),
            ..Default::default()
        })
    }

    async fn close_session(&self, _req: &TCloseSessionReq) -> Result<TCloseSessionResp> {
        self.closed_sessions.fetch_add(1, Ordering::SeqCst);
        let transport = self.transport.lock().unwrap().take();
        if let Some(mut transport) = transport {
            let _ = transport.close().await;
        }
        Ok(TCloseSessionResp::default())
    }

    async fn execute_statement(
        &self,
        req: &TExecuteStatementReq,
    ) -> Result<TExecuteStatementResp> {
        let kind = if req.statement == CREW_QUERY {
            Kind::Crew
        } else if req.statement.starts_with("INSERT") {
            Kind::Update
        } else {
            Kind::Missing
        };
        Ok(TExecuteStatementResp {
            status: TStatus::default(),
            operation_handle: Some(self.handle(kind)),
        })
    }

    async fn get_operation_status(
        &self,
        req: &TGetOperationStatusReq,
    ) -> Result<TGetOperationStatusResp> {
        if self.kind(&req.operation_handle) == Kind::Missing {
            return Ok(TGetOperationStatusResp {
                operation_state: Some(TOperationState::Error),
                error_message: Some("AnalysisException: Could not resolve table reference".into()),
                sql_state: Some("HY000".into()),
                ..Default::default()
            });
        }
        Ok(TGetOperationStatusResp {
            operation_state: Some(TOperationState::Finished),
            ..Default::default()
        })
    }

    async fn get_result_set_metadata(
        &self,
        req: &TGetResultSetMetadataReq,
    ) -> Result<TGetResultSetMetadataResp> {
        let columns: &[(&str, TTypeId)] = match self.kind(&req.operation_handle) {
            Kind::Crew => &[("id", TTypeId::Int), ("name", TTypeId::String)],
            Kind::Schemas => &[
                ("TABLE_SCHEM", TTypeId::String),
                ("TABLE_CATALOG", TTypeId::String),
            ],
            Kind::Tables => &[
                ("TABLE_CAT", TTypeId::String),
                ("TABLE_SCHEM", TTypeId::String),
                ("TABLE_NAME", TTypeId::String),
                ("TABLE_TYPE", TTypeId::String),
                ("REMARKS", TTypeId::String),
            ],
            Kind::Update | Kind::Missing => &[],
        };
        Ok(TGetResultSetMetadataResp {
            status: TStatus::default(),
            schema: Some(schema(columns)),
        })
    }

    async fn fetch_results(&self, req: &TFetchResultsReq) -> Result<TFetchResultsResp> {
        let columns = match self.kind(&req.operation_handle) {
            Kind::Crew => vec![
                TColumn::I32(TTypedColumn::new(vec![1, 2, 3], vec![])),
                // third name is null
                string_column(&["fry", "leela", ""], vec![0b100]),
            ],
            Kind::Schemas => vec![
                string_column(&["default", "planet"], vec![]),
                string_column(&["", ""], vec![]),
            ],
            Kind::Tables => vec![
                string_column(&[""], vec![]),
                string_column(&["planet"], vec![]),
                string_column(&["crew"], vec![]),
                string_column(&["TABLE"], vec![]),
                string_column(&[""], vec![]),
            ],
            Kind::Update | Kind::Missing => vec![],
        };
        Ok(TFetchResultsResp {
            status: TStatus::default(),
            has_more_rows: false,
            results: Some(TRowSet {
                start_row_offset: 0,
                columns,
            }),
        })
    }

    async fn cancel_operation(&self, _req: &TCancelOperationReq) -> Result<TCancelOperationResp> {
        Ok(TCancelOperationResp::default())
    }

    async fn close_impala_operation(
        &self,
        req: &TCloseImpalaOperationReq,
    ) -> Result<TCloseImpalaOperationResp> {
        self.closed_operations.fetch_add(1, Ordering::SeqCst);
        let dml_result = (self.kind(&req.operation_handle) == Kind::Update).then(|| TDmlResult {
            rows_modified: HashMap::from([("part=1".to_string(), 3), ("part=2".to_string(), 1)]),
            ..Default::default()
        });
        Ok(TCloseImpalaOperationResp {
            status: TStatus::default(),
            dml_result,
        })
    }

    async fn get_schemas(&self, _req: &TGetSchemasReq) -> Result<TGetSchemasResp> {
        Ok(TGetSchemasResp {
            status: TStatus::default(),
            operation_handle: Some(self.handle(Kind::Schemas)),
        })
    }

    async fn get_tables(&self, _req: &TGetTablesReq) -> Result<TGetTablesResp> {
        Ok(TGetTablesResp {
            status: TStatus::default(),
            operation_handle: Some(self.handle(Kind::Tables)),
        })
    }
}

/// Checks that the authenticated transport carries frames, then parks it
/// inside the service.
#[derive(Debug, Default)]
struct EchoConnector {
    service: Mutex<Option<Arc<CatalogService>>>,
}

impl EchoConnector {
    fn service(&self) -> Arc<CatalogService> {
        self.service.lock().unwrap().clone().unwrap()
    }
}

impl std::fmt::Debug for CatalogService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogService").finish_non_exhaustive()
    }
}

#[async_trait]
impl Connector for EchoConnector {
    async fn connect(
        &self,
        mut transport: SaslTransport<BoxedStream>,
    ) -> Result<Arc<dyn HiveService>> {
        assert!(transport.is_open());
        transport.write_all(b"hello").await?;
        transport.flush().await?;
        let mut echo = [0u8; 5];
        transport.read_exact(&mut echo).await?;
        assert_eq!(&echo, b"hello");

        let service = Arc::new(CatalogService::default());
        *service.transport.lock().unwrap() = Some(transport);
        *self.service.lock().unwrap() = Some(service.clone());
        Ok(service)
    }
}

fn database(port: u16, password: &str, connector: Arc<EchoConnector>) -> impala_adbc::Database {
    let mut driver = Driver::new().with_connector(connector);
    driver
        .new_database_with_opts([
            (
                OptionDatabase::Uri,
                OptionValue::String(format!("127.0.0.1:{port}")),
            ),
            (OptionDatabase::Username, OptionValue::String("fry".into())),
            (OptionDatabase::Password, OptionValue::String(password.into())),
            (
                OptionDatabase::Other("impala.batch_size".into()),
                OptionValue::Int(2),
            ),
            (
                OptionDatabase::Other("impala.mem_limit".into()),
                OptionValue::String("1g".into()),
            ),
        ])
        .expect("Failed to create database")
}

#[test]
fn test_driver_database_connection_flow() {
    let (port, server) = spawn_server("pizza");
    let connector = Arc::new(EchoConnector::default());
    let database = database(port, "pizza", connector.clone());
    assert_eq!(
        database.get_option_string(OptionDatabase::Uri).unwrap(),
        format!("127.0.0.1:{port}")
    );

    let mut connection = database.new_connection().expect("Failed to connect");
    let service = connector.service();

    {
        let info = connection.get_info(None);
        assert!(info.is_ok());
    }

    // Query streamed in batches of the configured size.
    let mut statement = connection.new_statement().unwrap();
    statement.set_sql_query(CREW_QUERY).unwrap();
    let reader = statement.execute().unwrap();
    let schema = reader.schema();
    assert_eq!(schema.field(0).name(), "id");
    assert_eq!(schema.field(1).name(), "name");
    let batches: Vec<_> = reader.collect::<std::result::Result<_, _>>().unwrap();
    assert_eq!(
        batches.iter().map(|b| b.num_rows()).collect::<Vec<_>>(),
        vec![2, 1]
    );
    let ids = batches[0]
        .column(0)
        .as_any()
        .downcast_ref::<Int32Array>()
        .unwrap();
    assert_eq!(ids.values(), &[1, 2]);
    let names = batches[1]
        .column(1)
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert!(names.is_null(0));

    // DML reports the summed row count.
    statement
        .set_sql_query("INSERT INTO crew VALUES (4, 'bender')")
        .unwrap();
    assert_eq!(statement.execute_update().unwrap(), Some(4));

    // Failures carry the server message and still close the operation.
    statement.set_sql_query("SELECT * FROM nowhere").unwrap();
    let err = statement.execute().map(|_| ()).unwrap_err();
    assert!(err.message.contains("Could not resolve table reference"));

    // Metadata.
    let schemas = connection.list_schemas("%").unwrap();
    assert_eq!(
        schemas.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
        vec!["default", "planet"]
    );
    let tables = connection.list_tables("planet", "%").unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].name, "crew");
    assert_eq!(tables[0].table_type, "TABLE");

    drop(statement);
    drop(connection);
    assert_eq!(
        service.closed_operations.load(Ordering::SeqCst),
        service.next_id.load(Ordering::SeqCst)
    );
    assert_eq!(service.closed_sessions.load(Ordering::SeqCst), 1);
    server.join().unwrap();
}

#[test]
fn test_wrong_password_is_unauthenticated() {
    let (port, server) = spawn_server("pizza");
    let connector = Arc::new(EchoConnector::default());
    let database = database(port, "anchovies", connector);

    let err = database.new_connection().unwrap_err();
    assert_eq!(err.status, Status::Unauthenticated);
    assert!(err.message.contains("fry"));
    server.join().unwrap();
}

#[test]
fn test_connection_refused() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let database = database(port, "pizza", Arc::new(EchoConnector::default()));
    assert!(database.new_connection().is_err());
}
