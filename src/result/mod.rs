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

//! Result set handling for query results.
//!
//! A [`ResultSet`] is a forward-only cursor. It holds one column batch at a
//! time and pulls the next one from its [`BatchSource`] only when the rows
//! of the current batch are used up.

pub mod schema;

pub use schema::{ColDesc, ScanType, TableSchema};

use crate::client::rpc::{TColumn, TFetchResultsResp, TRowSet, TTypedColumn};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::sync::Arc;

/// Text format of TIMESTAMP values; the fraction has up to nine digits.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A decoded cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Double(f64),
    String(String),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Produces successive fetch responses for a cursor.
#[async_trait]
pub trait BatchSource: Send {
    async fn fetch(&mut self) -> Result<TFetchResultsResp>;
}

/// Forward-only row cursor over fetched column batches.
pub struct ResultSet {
    schema: Arc<TableSchema>,
    source: Box<dyn BatchSource>,
    batch: Option<TRowSet>,
    idx: usize,
    length: usize,
    more: bool,
}

impl ResultSet {
    /// Creates a cursor; nothing is fetched until [`ResultSet::next`].
    pub fn new(schema: Arc<TableSchema>, source: Box<dyn BatchSource>) -> Self {
        Self {
            schema,
            source,
            batch: None,
            idx: 0,
            length: 0,
            more: true,
        }
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    /// Decodes the next row into `dest`.
    ///
    /// Returns `Ok(false)` once the server reports no more rows. A response
    /// that has more rows pending but carries none is not the end: the
    /// cursor fetches again. On error, `dest` may hold a partial row.
    pub async fn next(&mut self, dest: &mut [Value]) -> Result<bool> {
        while self.idx >= self.length && self.more {
            let resp = self.source.fetch().await?;
            self.more = resp.has_more_rows;
            self.length = batch_length(resp.results.as_ref());
            self.batch = resp.results;
            self.idx = 0;
        }

        if self.idx >= self.length {
            return Ok(false);
        }

        let batch = self
            .batch
            .as_ref()
            .ok_or_else(|| Error::Protocol("fetched rows without a row set".into()))?;
        for (i, slot) in dest.iter_mut().enumerate() {
            let column = batch.columns.get(i).ok_or_else(|| {
                Error::Protocol(format!("batch has no column at position {i}"))
            })?;
            let desc = self.schema.columns.get(i).ok_or_else(|| {
                Error::Protocol(format!("schema has no column at position {i}"))
            })?;
            *slot = value(column, desc, self.idx)?;
        }
        self.idx += 1;
        Ok(true)
    }
}

impl std::fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("columns", &self.schema.len())
            .field("idx", &self.idx)
            .field("length", &self.length)
            .field("more", &self.more)
            .finish()
    }
}

/// Row count of a batch, taken from its first column.
pub fn batch_length(rows: Option<&TRowSet>) -> usize {
    rows.and_then(|r| r.columns.first())
        .map(TColumn::len)
        .unwrap_or(0)
}

/// Whether row `i` is marked null; rows beyond the bitmap are not null.
pub fn is_null(bitmap: &[u8], i: usize) -> bool {
    bitmap
        .get(i / 8)
        .is_some_and(|byte| byte & (1 << (i % 8)) != 0)
}

fn scalar<'a, T>(
    vector: Option<&'a TTypedColumn<T>>,
    column: &TColumn,
    desc: &ColDesc,
    i: usize,
) -> Result<Option<&'a T>> {
    let vector = vector.ok_or_else(|| {
        Error::Protocol(format!(
            "column {} of type {} arrived as {}",
            desc.name,
            desc.database_type_name,
            column.kind()
        ))
    })?;
    if is_null(&vector.nulls, i) {
        return Ok(None);
    }
    vector
        .values
        .get(i)
        .map(Some)
        .ok_or_else(|| Error::Protocol(format!("column {} has no row {i}", desc.name)))
}

/// Decodes row `i` of `column`, choosing the vector by the column type.
fn value(column: &TColumn, desc: &ColDesc, i: usize) -> Result<Value> {
    let decoded = match desc.database_type_name.as_str() {
        "TINYINT" => scalar(as_byte(column), column, desc, i)?.map(|v| Value::TinyInt(*v)),
        "SMALLINT" => scalar(as_i16(column), column, desc, i)?.map(|v| Value::SmallInt(*v)),
        "INT" => scalar(as_i32(column), column, desc, i)?.map(|v| Value::Int(*v)),
        "BIGINT" => scalar(as_i64(column), column, desc, i)?.map(|v| Value::BigInt(*v)),
        "BOOLEAN" => scalar(as_bool(column), column, desc, i)?.map(|v| Value::Bool(*v)),
        // FLOAT values are kept as 64-bit
        "FLOAT" | "DOUBLE" | "REAL" => {
            scalar(as_double(column), column, desc, i)?.map(|v| Value::Double(*v))
        }
        "TIMESTAMP" | "DATETIME" => match scalar(as_string(column), column, desc, i)? {
            Some(text) => Some(Value::Timestamp(parse_timestamp(text)?)),
            None => None,
        },
        // STRING, CHAR, VARCHAR and everything else; CHAR padding is kept
        _ => scalar(as_string(column), column, desc, i)?.map(|v| Value::String(v.clone())),
    };
    Ok(decoded.unwrap_or(Value::Null))
}

pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT).map_err(|source| Error::Timestamp {
        value: text.to_string(),
        source,
    })
}

fn as_bool(c: &TColumn) -> Option<&TTypedColumn<bool>> {
    match c {
        TColumn::Bool(v) => Some(v),
        _ => None,
    }
}

fn as_byte(c: &TColumn) -> Option<&TTypedColumn<i8>> {
    match c {
        TColumn::Byte(v) => Some(v),
        _ => None,
    }
}

fn as_i16(c: &TColumn) -> Option<&TTypedColumn<i16>> {
    match c {
        TColumn::I16(v) => Some(v),
        _ => None,
    }
}

fn as_i32(c: &TColumn) -> Option<&TTypedColumn<i32>> {
    match c {
        TColumn::I32(v) => Some(v),
        _ => None,
    }
}

fn as_i64(c: &TColumn) -> Option<&TTypedColumn<i64>> {
    match c {
        TColumn::I64(v) => Some(v),
        _ => None,
    }
}

fn as_double(c: &TColumn) -> Option<&TTypedColumn<f64>> {
    match c {
        TColumn::Double(v) => Some(v),
        _ => None,
    }
}

fn as_string(c: &TColumn) -> Option<&TTypedColumn<String>> {
    match c {
        TColumn::String(v) => Some(v),
        _ => None,
    }
}
