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

//! SASL mechanisms for the Impala ADBC driver.
//!
//! The driver supports a closed set of mechanisms: PLAIN, and GSSAPI
//! delegated to an external Kerberos implementation.

pub mod gssapi;
pub mod plain;

pub use gssapi::{GssapiContext, GssapiMechanism, TicketProvider};
pub use plain::PlainMechanism;

use crate::error::{Error, Result};
use std::fmt;
use std::io;

/// Username and password for PLAIN authentication.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// First message of a negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Start {
    /// Mechanism name sent with the START status.
    pub mechanism: &'static str,
    /// Initial response sent with the first OK status.
    pub initial: Vec<u8>,
    /// True when the exchange is expected to finish in one round trip.
    pub complete: bool,
}

/// A SASL mechanism bound to one negotiation attempt.
#[derive(Debug)]
pub enum Mechanism {
    Plain(PlainMechanism),
    Gssapi(GssapiMechanism),
}

impl Mechanism {
    pub fn name(&self) -> &'static str {
        match self {
            Mechanism::Plain(_) => plain::MECHANISM,
            Mechanism::Gssapi(_) => gssapi::MECHANISM,
        }
    }

    pub fn start(&mut self) -> Result<Start> {
        match self {
            Mechanism::Plain(m) => Ok(m.start()),
            Mechanism::Gssapi(m) => m.start(),
        }
    }

    /// Answers a server challenge; the flag reports local completion.
    pub fn step(&mut self, challenge: &[u8]) -> Result<(Vec<u8>, bool)> {
        match self {
            Mechanism::Plain(m) => m.step(challenge),
            Mechanism::Gssapi(m) => m.step(challenge),
        }
    }

    /// Maps an end-of-stream seen during negotiation to the error reported
    /// to the caller.
    pub fn interpret_receive_eof(&self, err: io::Error) -> Error {
        match self {
            Mechanism::Plain(m) => m.interpret_receive_eof(err),
            Mechanism::Gssapi(_) => Error::Io(err),
        }
    }

    /// Releases per-attempt state.
    pub fn free(&mut self) {
        if let Mechanism::Gssapi(m) = self {
            m.free();
        }
    }
}

impl From<PlainMechanism> for Mechanism {
    fn from(m: PlainMechanism) -> Self {
        Mechanism::Plain(m)
    }
}

impl From<GssapiMechanism> for Mechanism {
    fn from(m: GssapiMechanism) -> Self {
        Mechanism::Gssapi(m)
    }
}
