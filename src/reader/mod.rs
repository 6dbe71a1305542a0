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

//! Arrow record batch reader over a query result.
//!
//! The reader drains a [`ResultSet`] row by row into typed Arrow builders
//! and closes the server-side operation once the rows run out, on the
//! first error, or when it is dropped.

use crate::client::session::close_after_failure;
use crate::client::Operation;
use crate::error::{Error, Result};
use crate::result::{ResultSet, ScanType, TableSchema, Value};
use arrow_array::builder::{
    BooleanBuilder, Float64Builder, Int16Builder, Int32Builder, Int64Builder, Int8Builder,
    StringBuilder, TimestampMicrosecondBuilder,
};
use arrow_array::{ArrayRef, RecordBatch, RecordBatchOptions, RecordBatchReader};
use arrow_schema::{ArrowError, Schema, SchemaRef};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{debug, warn};

enum State {
    Streaming { op: Operation, rows: ResultSet },
    /// All rows were handed out; the operation still needs closing.
    Exhausted { op: Operation },
    Done,
}

/// [`RecordBatchReader`] producing batches of at most `batch_size` rows.
pub struct ResultReader {
    runtime: Arc<Runtime>,
    schema: SchemaRef,
    table: Arc<TableSchema>,
    batch_size: usize,
    state: State,
}

impl ResultReader {
    pub fn new(runtime: Arc<Runtime>, op: Operation, rows: ResultSet, batch_size: usize) -> Self {
        let table = rows.schema().clone();
        Self {
            runtime,
            schema: Arc::new(table.to_arrow()),
            table,
            batch_size: batch_size.max(1),
            state: State::Streaming { op, rows },
        }
    }

    /// A reader over a statement that produced no result set.
    pub fn empty(runtime: Arc<Runtime>) -> Self {
        Self {
            runtime,
            schema: Arc::new(Schema::empty()),
            table: Arc::new(TableSchema::default()),
            batch_size: 1,
            state: State::Done,
        }
    }

    fn close(&mut self, op: Operation) -> Option<std::result::Result<RecordBatch, ArrowError>> {
        match self.runtime.block_on(op.close()) {
            Ok(_) => None,
            Err(err) => Some(Err(to_arrow_error(err))),
        }
    }
}

impl Iterator for ResultReader {
    type Item = std::result::Result<RecordBatch, ArrowError>;

    fn next(&mut self) -> Option<Self::Item> {
        match std::mem::replace(&mut self.state, State::Done) {
            State::Done => None,
            State::Exhausted { op } => self.close(op),
            State::Streaming { op, mut rows } => {
                let read = self.runtime.block_on(read_batch(
                    &mut rows,
                    &self.table,
                    &self.schema,
                    self.batch_size,
                ));
                match read {
                    Ok((Some(batch), exhausted)) => {
                        self.state = if exhausted {
                            State::Exhausted { op }
                        } else {
                            State::Streaming { op, rows }
                        };
                        Some(Ok(batch))
                    }
                    Ok((None, _)) => self.close(op),
                    Err(err) => {
                        self.runtime.block_on(close_after_failure(&op));
                        Some(Err(to_arrow_error(err)))
                    }
                }
            }
        }
    }
}

impl RecordBatchReader for ResultReader {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }
}

impl Drop for ResultReader {
    fn drop(&mut self) {
        let op = match std::mem::replace(&mut self.state, State::Done) {
            State::Streaming { op, .. } | State::Exhausted { op } => op,
            State::Done => return,
        };
        if let Err(err) = self.runtime.block_on(op.close()) {
            warn!(operation = %op.guid(), error = %err, "failed to close operation");
        }
    }
}

fn to_arrow_error(err: Error) -> ArrowError {
    ArrowError::ExternalError(Box::new(err))
}

/// Reads up to `batch_size` rows. The flag is set when the cursor ended.
async fn read_batch(
    rows: &mut ResultSet,
    table: &TableSchema,
    schema: &SchemaRef,
    batch_size: usize,
) -> Result<(Option<RecordBatch>, bool)> {
    let mut builders: Vec<ColumnBuilder> = table
        .columns
        .iter()
        .map(|c| ColumnBuilder::new(c.scan_type, batch_size))
        .collect();
    let mut row = vec![Value::Null; table.len()];
    let mut count = 0;
    let mut exhausted = false;

    while count < batch_size {
        if !rows.next(&mut row).await? {
            exhausted = true;
            break;
        }
        for (builder, value) in builders.iter_mut().zip(row.iter_mut()) {
            builder.append(std::mem::take(value))?;
        }
        count += 1;
    }
    if count == 0 {
        return Ok((None, exhausted));
    }

    let columns: Vec<ArrayRef> = builders.iter_mut().map(ColumnBuilder::finish).collect();
    let options = RecordBatchOptions::new().with_row_count(Some(count));
    let batch = RecordBatch::try_new_with_options(schema.clone(), columns, &options)
        .map_err(|e| Error::Protocol(format!("cannot assemble record batch: {e}")))?;
    debug!(rows = count, exhausted, "record batch");
    Ok((Some(batch), exhausted))
}

enum ColumnBuilder {
    Bool(BooleanBuilder),
    Int8(Int8Builder),
    Int16(Int16Builder),
    Int32(Int32Builder),
    Int64(Int64Builder),
    Float64(Float64Builder),
    String(StringBuilder),
    Timestamp(TimestampMicrosecondBuilder),
}

impl ColumnBuilder {
    fn new(scan_type: ScanType, capacity: usize) -> Self {
        match scan_type {
            ScanType::Bool => ColumnBuilder::Bool(BooleanBuilder::with_capacity(capacity)),
            ScanType::Int8 => ColumnBuilder::Int8(Int8Builder::with_capacity(capacity)),
            ScanType::Int16 => ColumnBuilder::Int16(Int16Builder::with_capacity(capacity)),
            ScanType::Int32 => ColumnBuilder::Int32(Int32Builder::with_capacity(capacity)),
            ScanType::Int64 => ColumnBuilder::Int64(Int64Builder::with_capacity(capacity)),
            ScanType::Float64 => ColumnBuilder::Float64(Float64Builder::with_capacity(capacity)),
            ScanType::String => ColumnBuilder::String(StringBuilder::with_capacity(capacity, 0)),
            ScanType::Timestamp => {
                ColumnBuilder::Timestamp(TimestampMicrosecondBuilder::with_capacity(capacity))
            }
        }
    }

    fn append(&mut self, value: Value) -> Result<()> {
        match (self, value) {
            (ColumnBuilder::Bool(b), Value::Null) => b.append_null(),
            (ColumnBuilder::Int8(b), Value::Null) => b.append_null(),
            (ColumnBuilder::Int16(b), Value::Null) => b.append_null(),
            (ColumnBuilder::Int32(b), Value::Null) => b.append_null(),
            (ColumnBuilder::Int64(b), Value::Null) => b.append_null(),
            (ColumnBuilder::Float64(b), Value::Null) => b.append_null(),
            (ColumnBuilder::String(b), Value::Null) => b.append_null(),
            (ColumnBuilder::Timestamp(b), Value::Null) => b.append_null(),
            (ColumnBuilder::Bool(b), Value::Bool(v)) => b.append_value(v),
            (ColumnBuilder::Int8(b), Value::TinyInt(v)) => b.append_value(v),
            (ColumnBuilder::Int16(b), Value::SmallInt(v)) => b.append_value(v),
            (ColumnBuilder::Int32(b), Value::Int(v)) => b.append_value(v),
            (ColumnBuilder::Int64(b), Value::BigInt(v)) => b.append_value(v),
            (ColumnBuilder::Float64(b), Value::Double(v)) => b.append_value(v),
            (ColumnBuilder::String(b), Value::String(v)) => b.append_value(v),
            (ColumnBuilder::Timestamp(b), Value::Timestamp(v)) => {
                b.append_value(v.and_utc().timestamp_micros())
            }
            (_, value) => {
                return Err(Error::Protocol(format!(
                    "decoded value {value:?} does not match the column type"
                )))
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> ArrayRef {
        match self {
            ColumnBuilder::Bool(b) => Arc::new(b.finish()),
            ColumnBuilder::Int8(b) => Arc::new(b.finish()),
            ColumnBuilder::Int16(b) => Arc::new(b.finish()),
            ColumnBuilder::Int32(b) => Arc::new(b.finish()),
            ColumnBuilder::Int64(b) => Arc::new(b.finish()),
            ColumnBuilder::Float64(b) => Arc::new(b.finish()),
            ColumnBuilder::String(b) => Arc::new(b.finish()),
            ColumnBuilder::Timestamp(b) => Arc::new(b.finish()),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        use arrow_array::builder::ArrayBuilder;
        match self {
            ColumnBuilder::Bool(b) => b.len(),
            ColumnBuilder::Int8(b) => b.len(),
            ColumnBuilder::Int16(b) => b.len(),
            ColumnBuilder::Int32(b) => b.len(),
            ColumnBuilder::Int64(b) => b.len(),
            ColumnBuilder::Float64(b) => b.len(),
            ColumnBuilder::String(b) => b.len(),
            ColumnBuilder::Timestamp(b) => b.len(),
        }
    }
}
