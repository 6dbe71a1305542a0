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

//! Impala ADBC Driver for Rust
//!
//! This crate provides an ADBC (Arrow Database Connectivity) driver for
//! Apache Impala coordinators speaking the HiveServer2 protocol.
//!
//! ## Overview
//!
//! The driver implements the standard ADBC traits from `adbc_core`:
//! - [`Driver`] - Entry point for creating database connections
//! - [`Database`] - Holds connection configuration
//! - [`Connection`] - An open Impala session
//! - [`Statement`] - SQL statement execution
//!
//! Underneath sit an async HS2 client ([`client`]), the SASL and framing
//! transports ([`transport`]), the PLAIN and GSSAPI mechanisms ([`auth`])
//! and the row decoding layer ([`result`]). The generated HS2 codec is not
//! part of this crate; it is bound through [`client::Connector`].
//!
//! ## Example
//!
//! ```ignore
//! use adbc_core::{Connection as _, Database as _, Driver as _, Optionable, Statement as _};
//! use adbc_core::options::{OptionDatabase, OptionValue};
//! use impala_adbc::Driver;
//!
//! let mut driver = Driver::new().with_connector(my_connector);
//! let mut database = driver.new_database()?;
//! database.set_option(OptionDatabase::Uri, OptionValue::String("impalad:21050".into()))?;
//! database.set_option(OptionDatabase::Username, OptionValue::String("fry".into()))?;
//! database.set_option(OptionDatabase::Password, OptionValue::String("...".into()))?;
//!
//! let mut connection = database.new_connection()?;
//! let mut statement = connection.new_statement()?;
//! statement.set_sql_query("SELECT * FROM my_table")?;
//! let reader = statement.execute()?;
//! ```

pub mod auth;
pub mod client;
pub mod connection;
pub mod database;
pub mod driver;
pub mod error;
pub mod reader;
pub mod result;
pub mod statement;
pub mod transport;

pub use connection::Connection;
pub use database::Database;
pub use driver::Driver;
pub use error::{Error, ImpalaErrorHelper, Result};
pub use statement::Statement;
