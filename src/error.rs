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

//! Error types for the Impala ADBC driver.
//!
//! Protocol-level failures are reported through [`Error`], which keeps the
//! full cause chain available via [`std::error::Error::source`]. At the ADBC
//! boundary they are converted with [`Error::to_adbc`]; option handling uses
//! the driverbase error framework through [`ImpalaErrorHelper`].

use crate::client::rpc::{TOperationState, TStatusCode};
use adbc_core::error::Status;
use driverbase::error::ErrorHelper;
use std::fmt;

/// Error helper for Impala driver errors.
///
/// This type implements the driverbase `ErrorHelper` trait to provide
/// consistent error formatting with the driver name prefix.
#[derive(Clone)]
pub struct ImpalaErrorHelper;

impl ErrorHelper for ImpalaErrorHelper {
    const NAME: &'static str = "Impala";
}

/// Authentication failure detected during SASL negotiation.
///
/// The server rejects bad PLAIN credentials by dropping the connection, so
/// the end-of-stream that triggered this error is kept as its source.
#[derive(Debug, thiserror::Error)]
#[error("authentication failed for user {username}")]
pub struct AuthError {
    username: String,
    #[source]
    source: std::io::Error,
}

impl AuthError {
    pub fn new(username: impl Into<String>, source: std::io::Error) -> Self {
        Self {
            username: username.into(),
            source,
        }
    }

    /// The user whose credentials were rejected.
    pub fn username(&self) -> &str {
        &self.username
    }
}

/// A non-success status embedded in an otherwise successful RPC response.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusError {
    pub code: TStatusCode,
    pub message: Option<String>,
    pub sql_state: Option<String>,
    pub error_code: Option<i32>,
    pub info_messages: Vec<String>,
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(state) = &self.sql_state {
            write!(f, " (SQLSTATE {state})")?;
        }
        Ok(())
    }
}

impl std::error::Error for StatusError {}

/// The error type for Impala driver operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket or framing failure on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    /// SASL handshake did not complete; wraps the failure that stopped it.
    #[error("sasl: negotiation failed")]
    Negotiation(#[source] Box<Error>),

    #[error("sasl: bad negotiation status: {0}")]
    BadStatus(u8),

    #[error("sasl: unexpected server challenge")]
    UnexpectedServerChallenge,

    /// Failure reported by a SASL mechanism implementation.
    #[error("sasl: {0}")]
    Mechanism(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Status(#[from] StatusError),

    /// The operation reached a terminal failure state.
    #[error("operation reached {state} state: {message}")]
    OperationFailed {
        state: TOperationState,
        message: String,
        sql_state: Option<String>,
    },

    #[error("context canceled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("cannot parse timestamp {value:?}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    /// The server sent something the driver cannot interpret.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Returns the authentication error anywhere in the cause chain.
    pub fn auth_error(&self) -> Option<&AuthError> {
        match self {
            Error::Auth(err) => Some(err),
            Error::Negotiation(inner) => inner.auth_error(),
            _ => None,
        }
    }

    /// True for cancellation and deadline errors raised by a context.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled | Error::DeadlineExceeded)
    }

    /// The ADBC status code this error is reported with.
    pub fn status(&self) -> Status {
        match self {
            Error::Io(_) | Error::Tls(_) => Status::IO,
            Error::Negotiation(inner) => match inner.as_ref() {
                Error::Io(_) => Status::IO,
                _ => Status::Unauthenticated,
            },
            Error::BadStatus(_)
            | Error::UnexpectedServerChallenge
            | Error::Mechanism(_)
            | Error::Auth(_) => Status::Unauthenticated,
            Error::Status(_) | Error::OperationFailed { .. } => Status::Unknown,
            Error::Cancelled => Status::Cancelled,
            Error::DeadlineExceeded => Status::Timeout,
            Error::Timestamp { .. } | Error::Protocol(_) => Status::InvalidData,
            Error::Config(_) => Status::InvalidArguments,
        }
    }

    /// Converts this error into an ADBC error, keeping the cause chain in
    /// the message and the server SQLSTATE when one was reported.
    pub fn to_adbc(&self) -> adbc_core::error::Error {
        let mut message = format!("[{}] {}", ImpalaErrorHelper::NAME, self);
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            // wrappers that print their cause inline are not repeated
            let text = cause.to_string();
            if !message.ends_with(&text) {
                message.push_str(": ");
                message.push_str(&text);
            }
            source = cause.source();
        }
        let mut error = adbc_core::error::Error::with_message_and_status(message, self.status());
        if let Some(state) = self.sql_state() {
            for (slot, byte) in error.sqlstate.iter_mut().zip(state.bytes()) {
                *slot = byte as std::os::raw::c_char;
            }
        }
        error
    }

    fn sql_state(&self) -> Option<&str> {
        match self {
            Error::Status(status) => status.sql_state.as_deref(),
            Error::OperationFailed { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }
}

impl From<Error> for adbc_core::error::Error {
    fn from(err: Error) -> Self {
        err.to_adbc()
    }
}

/// A convenient alias for Results with Impala errors.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn test_error_display() {
        let error = ImpalaErrorHelper::invalid_argument().message("invalid host URL");
        let display = format!("{error}");
        assert!(display.contains("Impala"));
        assert!(display.contains("invalid host URL"));
    }

    #[test]
    fn test_auth_error_unwraps_to_eof() {
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "early eof");
        let err = Error::Negotiation(Box::new(AuthError::new("fry", eof).into()));

        let auth = err.auth_error().expect("auth error in chain");
        assert_eq!(auth.username(), "fry");
        assert_eq!(auth.to_string(), "authentication failed for user fry");

        let cause = auth
            .source()
            .and_then(|e| e.downcast_ref::<io::Error>())
            .expect("io cause");
        assert_eq!(cause.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(err.status(), Status::Unauthenticated);
    }

    #[test]
    fn test_status_error_to_adbc() {
        let err = Error::Status(StatusError {
            code: TStatusCode::Error,
            message: Some("AnalysisException: Could not resolve table".into()),
            sql_state: Some("HY000".into()),
            error_code: None,
            info_messages: vec![],
        });
        let adbc = err.to_adbc();
        assert_eq!(adbc.status, Status::Unknown);
        assert!(adbc.message.contains("Impala"));
        assert!(adbc.message.contains("AnalysisException"));
        assert_eq!(adbc.sqlstate[0] as u8, b'H');
    }

    #[test]
    fn test_cancellation_status() {
        assert!(Error::Cancelled.is_cancellation());
        assert_eq!(Error::Cancelled.status(), Status::Cancelled);
        assert_eq!(Error::DeadlineExceeded.status(), Status::Timeout);
        assert!(!Error::Protocol("x".into()).is_cancellation());
    }

    #[test]
    fn test_io_negotiation_reports_io() {
        let err = Error::Negotiation(Box::new(Error::Io(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "reset",
        ))));
        assert_eq!(err.status(), Status::IO);
        assert!(err.auth_error().is_none());
    }
}
