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

//! Result set metadata and type mapping.

use crate::client::rpc::{TColumnDesc, TTableSchema, TTypeEntry, TTypeId, TTypeQualifierValue};
use crate::error::{Error, Result};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::collections::HashMap;

/// Field metadata key holding the server type name of an Arrow field.
pub const TYPE_NAME_METADATA_KEY: &str = "impala.type_name";

const CHARACTER_MAXIMUM_LENGTH: &str = "characterMaximumLength";
const PRECISION: &str = "precision";
const SCALE: &str = "scale";

/// The value type a column decodes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float64,
    String,
    Timestamp,
}

impl ScanType {
    /// Scan type for a canonical type name such as `INT` or `VARCHAR`.
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "BOOLEAN" => ScanType::Bool,
            "TINYINT" => ScanType::Int8,
            "SMALLINT" => ScanType::Int16,
            "INT" => ScanType::Int32,
            "BIGINT" => ScanType::Int64,
            "FLOAT" | "DOUBLE" | "REAL" => ScanType::Float64,
            "TIMESTAMP" | "DATETIME" => ScanType::Timestamp,
            _ => ScanType::String,
        }
    }

    pub fn to_arrow(self) -> DataType {
        match self {
            ScanType::Bool => DataType::Boolean,
            ScanType::Int8 => DataType::Int8,
            ScanType::Int16 => DataType::Int16,
            ScanType::Int32 => DataType::Int32,
            ScanType::Int64 => DataType::Int64,
            ScanType::Float64 => DataType::Float64,
            ScanType::String => DataType::Utf8,
            ScanType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
        }
    }
}

/// Description of one result column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColDesc {
    pub name: String,
    /// Canonical server type name, e.g. `INT`, `DECIMAL`, `VARCHAR`.
    pub database_type_name: String,
    pub scan_type: ScanType,
    /// Maximum character length; `None` when not applicable.
    pub length: Option<i64>,
    /// Precision and scale; `None` when not applicable.
    pub precision_scale: Option<(i64, i64)>,
}

impl ColDesc {
    pub fn new(name: impl Into<String>, database_type_name: impl Into<String>) -> Self {
        let database_type_name = database_type_name.into();
        Self {
            name: name.into(),
            scan_type: ScanType::from_type_name(&database_type_name),
            database_type_name,
            length: None,
            precision_scale: None,
        }
    }

    pub fn precision(&self) -> Option<i64> {
        self.precision_scale.map(|(p, _)| p)
    }

    pub fn scale(&self) -> Option<i64> {
        self.precision_scale.map(|(_, s)| s)
    }

    fn from_rpc(desc: &TColumnDesc) -> Result<Self> {
        let entry = match desc.type_desc.types.first() {
            Some(TTypeEntry::Primitive(entry)) => entry,
            Some(TTypeEntry::Complex(name)) => {
                return Err(Error::Protocol(format!(
                    "column {} has unsupported complex type {name}",
                    desc.column_name
                )))
            }
            None => {
                return Err(Error::Protocol(format!(
                    "column {} has no type descriptor",
                    desc.column_name
                )))
            }
        };
        let empty = HashMap::new();
        let qualifiers = entry.type_qualifiers.as_ref().unwrap_or(&empty);

        let mut col = ColDesc::new(desc.column_name.clone(), canonical_type_name(entry.type_id));
        col.length = max_length(qualifiers);
        col.precision_scale = precision_scale(qualifiers);
        Ok(col)
    }

    pub fn to_field(&self) -> Field {
        let metadata = HashMap::from([(
            TYPE_NAME_METADATA_KEY.to_string(),
            self.database_type_name.clone(),
        )]);
        Field::new(&self.name, self.scan_type.to_arrow(), true).with_metadata(metadata)
    }
}

/// Result schema of an operation; column order matches every fetched batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSchema {
    pub columns: Vec<ColDesc>,
}

impl TableSchema {
    pub fn new(columns: Vec<ColDesc>) -> Self {
        Self { columns }
    }

    pub fn from_rpc(schema: &TTableSchema) -> Result<Self> {
        let columns = schema
            .columns
            .iter()
            .map(ColDesc::from_rpc)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns })
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn to_arrow(&self) -> Schema {
        Schema::new(self.columns.iter().map(ColDesc::to_field).collect::<Vec<_>>())
    }
}

/// Strips the `_TYPE` suffix from the wire type name.
pub fn canonical_type_name(type_id: TTypeId) -> &'static str {
    let name = type_id.as_str();
    name.strip_suffix("_TYPE").unwrap_or(name)
}

fn max_length(qualifiers: &HashMap<String, TTypeQualifierValue>) -> Option<i64> {
    qualifiers
        .get(CHARACTER_MAXIMUM_LENGTH)
        .map(|q| i64::from(q.i32_value().unwrap_or_default()))
}

fn precision_scale(qualifiers: &HashMap<String, TTypeQualifierValue>) -> Option<(i64, i64)> {
    let precision = qualifiers.get(PRECISION)?;
    let scale = qualifiers.get(SCALE)?;
    Some((
        i64::from(precision.i32_value().unwrap_or_default()),
        i64::from(scale.i32_value().unwrap_or_default()),
    ))
}
