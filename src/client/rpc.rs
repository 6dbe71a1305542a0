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

//! HiveServer2 / Impala RPC interface.
//!
//! The message types mirror the HS2 service definitions that the RPC codec
//! serializes. The codec itself lives outside this crate: it is plugged in
//! through [`Connector`], which receives the authenticated transport and
//! returns a [`HiveService`].

use crate::error::{Result, StatusError};
use crate::transport::{BoxedStream, SaslTransport};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Embedded status code of every HS2 response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TStatusCode {
    #[default]
    Success,
    SuccessWithInfo,
    StillExecuting,
    Error,
    InvalidHandle,
}

impl TStatusCode {
    /// Codes that let the caller use the rest of the response.
    pub fn is_success(self) -> bool {
        matches!(
            self,
            TStatusCode::Success | TStatusCode::SuccessWithInfo | TStatusCode::StillExecuting
        )
    }
}

impl fmt::Display for TStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TStatusCode::Success => "SUCCESS_STATUS",
            TStatusCode::SuccessWithInfo => "SUCCESS_WITH_INFO_STATUS",
            TStatusCode::StillExecuting => "STILL_EXECUTING_STATUS",
            TStatusCode::Error => "ERROR_STATUS",
            TStatusCode::InvalidHandle => "INVALID_HANDLE_STATUS",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TStatus {
    pub status_code: TStatusCode,
    pub info_messages: Vec<String>,
    pub sql_state: Option<String>,
    pub error_code: Option<i32>,
    pub error_message: Option<String>,
}

impl TStatus {
    pub fn with_code(status_code: TStatusCode) -> Self {
        Self {
            status_code,
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status_code: TStatusCode::Error,
            error_message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Server-side execution state of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TOperationState {
    #[default]
    Initialized,
    Running,
    Finished,
    Canceled,
    Closed,
    Error,
    Unknown,
    Pending,
    TimedOut,
}

impl TOperationState {
    /// States after which polling cannot lead to FINISHED.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            TOperationState::Error
                | TOperationState::Canceled
                | TOperationState::TimedOut
                | TOperationState::Closed
        )
    }
}

impl fmt::Display for TOperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TOperationState::Initialized => "INITIALIZED_STATE",
            TOperationState::Running => "RUNNING_STATE",
            TOperationState::Finished => "FINISHED_STATE",
            TOperationState::Canceled => "CANCELED_STATE",
            TOperationState::Closed => "CLOSED_STATE",
            TOperationState::Error => "ERROR_STATE",
            TOperationState::Unknown => "UKNOWN_STATE",
            TOperationState::Pending => "PENDING_STATE",
            TOperationState::TimedOut => "TIMEDOUT_STATE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TProtocolVersion {
    V1,
    V6,
    #[default]
    V7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TOperationType {
    #[default]
    ExecuteStatement,
    GetTypeInfo,
    GetCatalogs,
    GetSchemas,
    GetTables,
    GetTableTypes,
    GetColumns,
    GetFunctions,
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct THandleIdentifier {
    pub guid: Vec<u8>,
    pub secret: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TSessionHandle {
    pub session_id: THandleIdentifier,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TOperationHandle {
    pub operation_id: THandleIdentifier,
    pub operation_type: TOperationType,
    pub has_result_set: bool,
    pub modified_row_count: Option<f64>,
}

/// Primitive column types as reported in result set metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TTypeId {
    Boolean,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    #[default]
    String,
    Timestamp,
    Binary,
    Array,
    Map,
    Struct,
    Union,
    UserDefined,
    Decimal,
    Null,
    Date,
    Varchar,
    Char,
    IntervalYearMonth,
    IntervalDayTime,
}

impl TTypeId {
    /// The wire enum name, e.g. `INT_TYPE`.
    pub fn as_str(self) -> &'static str {
        match self {
            TTypeId::Boolean => "BOOLEAN_TYPE",
            TTypeId::TinyInt => "TINYINT_TYPE",
            TTypeId::SmallInt => "SMALLINT_TYPE",
            TTypeId::Int => "INT_TYPE",
            TTypeId::BigInt => "BIGINT_TYPE",
            TTypeId::Float => "FLOAT_TYPE",
            TTypeId::Double => "DOUBLE_TYPE",
            TTypeId::String => "STRING_TYPE",
            TTypeId::Timestamp => "TIMESTAMP_TYPE",
            TTypeId::Binary => "BINARY_TYPE",
            TTypeId::Array => "ARRAY_TYPE",
            TTypeId::Map => "MAP_TYPE",
            TTypeId::Struct => "STRUCT_TYPE",
            TTypeId::Union => "UNION_TYPE",
            TTypeId::UserDefined => "USER_DEFINED_TYPE",
            TTypeId::Decimal => "DECIMAL_TYPE",
            TTypeId::Null => "NULL_TYPE",
            TTypeId::Date => "DATE_TYPE",
            TTypeId::Varchar => "VARCHAR_TYPE",
            TTypeId::Char => "CHAR_TYPE",
            TTypeId::IntervalYearMonth => "INTERVAL_YEAR_MONTH_TYPE",
            TTypeId::IntervalDayTime => "INTERVAL_DAY_TIME_TYPE",
        }
    }
}

impl fmt::Display for TTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TTypeQualifierValue {
    I32Value(i32),
    StringValue(String),
}

impl TTypeQualifierValue {
    pub fn i32_value(&self) -> Option<i32> {
        match self {
            TTypeQualifierValue::I32Value(v) => Some(*v),
            TTypeQualifierValue::StringValue(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TPrimitiveTypeEntry {
    pub type_id: TTypeId,
    pub type_qualifiers: Option<HashMap<String, TTypeQualifierValue>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TTypeEntry {
    Primitive(TPrimitiveTypeEntry),
    /// Complex entries (array, map, struct, union, user defined) are kept
    /// only by their type name.
    Complex(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TTypeDesc {
    pub types: Vec<TTypeEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TColumnDesc {
    pub column_name: String,
    pub type_desc: TTypeDesc,
    pub position: i32,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TTableSchema {
    pub columns: Vec<TColumnDesc>,
}

/// One typed vector of a column batch.
///
/// `nulls` is a bitmap with one bit per row, eight rows per byte, least
/// significant bit first. A set bit marks the row as null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TTypedColumn<T> {
    pub values: Vec<T>,
    pub nulls: Vec<u8>,
}

impl<T> TTypedColumn<T> {
    pub fn new(values: Vec<T>, nulls: Vec<u8>) -> Self {
        Self { values, nulls }
    }
}

/// A column of a fetched batch. Exactly one typed vector is populated.
#[derive(Debug, Clone, PartialEq)]
pub enum TColumn {
    Bool(TTypedColumn<bool>),
    Byte(TTypedColumn<i8>),
    I16(TTypedColumn<i16>),
    I32(TTypedColumn<i32>),
    I64(TTypedColumn<i64>),
    Double(TTypedColumn<f64>),
    String(TTypedColumn<String>),
    Binary(TTypedColumn<Vec<u8>>),
}

impl TColumn {
    /// Number of values in the populated vector.
    pub fn len(&self) -> usize {
        match self {
            TColumn::Bool(c) => c.values.len(),
            TColumn::Byte(c) => c.values.len(),
            TColumn::I16(c) => c.values.len(),
            TColumn::I32(c) => c.values.len(),
            TColumn::I64(c) => c.values.len(),
            TColumn::Double(c) => c.values.len(),
            TColumn::String(c) => c.values.len(),
            TColumn::Binary(c) => c.values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name of the populated vector, used in decode errors.
    pub fn kind(&self) -> &'static str {
        match self {
            TColumn::Bool(_) => "boolVal",
            TColumn::Byte(_) => "byteVal",
            TColumn::I16(_) => "i16Val",
            TColumn::I32(_) => "i32Val",
            TColumn::I64(_) => "i64Val",
            TColumn::Double(_) => "doubleVal",
            TColumn::String(_) => "stringVal",
            TColumn::Binary(_) => "binaryVal",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TRowSet {
    pub start_row_offset: i64,
    pub columns: Vec<TColumn>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TDmlResult {
    /// Rows modified per partition or file.
    pub rows_modified: HashMap<String, i64>,
    /// Rows deleted per partition or file, reported for Kudu tables.
    pub rows_deleted: Option<HashMap<String, i64>>,
    pub num_row_errors: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TOpenSessionReq {
    pub client_protocol: TProtocolVersion,
    pub username: Option<String>,
    pub password: Option<String>,
    pub configuration: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TOpenSessionResp {
    pub status: TStatus,
    pub server_protocol_version: TProtocolVersion,
    pub session_handle: Option<TSessionHandle>,
    pub configuration: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TCloseSessionReq {
    pub session_handle: TSessionHandle,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TCloseSessionResp {
    pub status: TStatus,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TExecuteStatementReq {
    pub session_handle: TSessionHandle,
    pub statement: String,
    pub conf_overlay: HashMap<String, String>,
    pub run_async: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TExecuteStatementResp {
    pub status: TStatus,
    pub operation_handle: Option<TOperationHandle>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TGetOperationStatusReq {
    pub operation_handle: TOperationHandle,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TGetOperationStatusResp {
    pub status: TStatus,
    pub operation_state: Option<TOperationState>,
    pub sql_state: Option<String>,
    pub error_code: Option<i32>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TGetResultSetMetadataReq {
    pub operation_handle: TOperationHandle,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TGetResultSetMetadataResp {
    pub status: TStatus,
    pub schema: Option<TTableSchema>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TFetchResultsReq {
    pub operation_handle: TOperationHandle,
    pub max_rows: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TFetchResultsResp {
    pub status: TStatus,
    pub has_more_rows: bool,
    pub results: Option<TRowSet>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TCancelOperationReq {
    pub operation_handle: TOperationHandle,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TCancelOperationResp {
    pub status: TStatus,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TCloseImpalaOperationReq {
    pub operation_handle: TOperationHandle,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TCloseImpalaOperationResp {
    pub status: TStatus,
    pub dml_result: Option<TDmlResult>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TGetSchemasReq {
    pub session_handle: TSessionHandle,
    pub catalog_name: Option<String>,
    pub schema_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TGetSchemasResp {
    pub status: TStatus,
    pub operation_handle: Option<TOperationHandle>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TGetTablesReq {
    pub session_handle: TSessionHandle,
    pub catalog_name: Option<String>,
    pub schema_name: Option<String>,
    pub table_name: Option<String>,
    pub table_types: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TGetTablesResp {
    pub status: TStatus,
    pub operation_handle: Option<TOperationHandle>,
}

/// Responses carrying an embedded [`TStatus`].
pub trait HasStatus {
    fn status(&self) -> &TStatus;
}

macro_rules! impl_has_status {
    ($($resp:ty),* $(,)?) => {
        $(
            impl HasStatus for $resp {
                fn status(&self) -> &TStatus {
                    &self.status
                }
            }
        )*
    };
}

impl_has_status!(
    TOpenSessionResp,
    TCloseSessionResp,
    TExecuteStatementResp,
    TGetOperationStatusResp,
    TGetResultSetMetadataResp,
    TFetchResultsResp,
    TCancelOperationResp,
    TCloseImpalaOperationResp,
    TGetSchemasResp,
    TGetTablesResp,
);

/// Fails unless the embedded status allows the response to be used.
///
/// A transport round trip that succeeded may still carry an error status;
/// that is reported here, verbatim, with the server diagnostics.
pub fn check_status(resp: &impl HasStatus) -> Result<()> {
    let status = resp.status();
    if status.status_code.is_success() {
        return Ok(());
    }
    Err(StatusError {
        code: status.status_code,
        message: status.error_message.clone(),
        sql_state: status.sql_state.clone(),
        error_code: status.error_code,
        info_messages: status.info_messages.clone(),
    }
    .into())
}

/// The HS2 service surface used by the driver.
///
/// Implementations perform a single round trip per call and report
/// transport failures as errors; embedded statuses are checked by callers.
/// Calls on one implementation are issued strictly sequentially.
#[async_trait]
pub trait HiveService: Send + Sync {
    async fn open_session(&self, req: &TOpenSessionReq) -> Result<TOpenSessionResp>;

    async fn close_session(&self, req: &TCloseSessionReq) -> Result<TCloseSessionResp>;

    async fn execute_statement(&self, req: &TExecuteStatementReq)
        -> Result<TExecuteStatementResp>;

    async fn get_operation_status(
        &self,
        req: &TGetOperationStatusReq,
    ) -> Result<TGetOperationStatusResp>;

    async fn get_result_set_metadata(
        &self,
        req: &TGetResultSetMetadataReq,
    ) -> Result<TGetResultSetMetadataResp>;

    async fn fetch_results(&self, req: &TFetchResultsReq) -> Result<TFetchResultsResp>;

    async fn cancel_operation(&self, req: &TCancelOperationReq) -> Result<TCancelOperationResp>;

    async fn close_impala_operation(
        &self,
        req: &TCloseImpalaOperationReq,
    ) -> Result<TCloseImpalaOperationResp>;

    async fn get_schemas(&self, req: &TGetSchemasReq) -> Result<TGetSchemasResp>;

    async fn get_tables(&self, req: &TGetTablesReq) -> Result<TGetTablesResp>;
}

/// Binds an RPC codec to an authenticated transport.
///
/// The transport handed over has completed SASL negotiation; every flush
/// on it emits one length-prefixed frame.
#[async_trait]
pub trait Connector: Send + Sync + fmt::Debug {
    async fn connect(&self, transport: SaslTransport<BoxedStream>)
        -> Result<Arc<dyn HiveService>>;
}
