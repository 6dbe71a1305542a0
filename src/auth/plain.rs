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

//! PLAIN mechanism: credentials in the clear, one round trip.

use super::{Credentials, Start};
use crate::error::{AuthError, Error, Result};
use std::io;

pub const MECHANISM: &str = "PLAIN";

/// PLAIN authentication with the username as authorization id.
#[derive(Debug, Clone)]
pub struct PlainMechanism {
    credentials: Credentials,
}

impl PlainMechanism {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// `authzid NUL username NUL password`, authzid being the username.
    pub fn start(&self) -> Start {
        let Credentials { username, password } = &self.credentials;
        let mut initial = Vec::with_capacity(2 * username.len() + password.len() + 2);
        initial.extend_from_slice(username.as_bytes());
        initial.push(0);
        initial.extend_from_slice(username.as_bytes());
        initial.push(0);
        initial.extend_from_slice(password.as_bytes());
        Start {
            mechanism: MECHANISM,
            initial,
            complete: true,
        }
    }

    /// The server never challenges a PLAIN response.
    pub fn step(&self, _challenge: &[u8]) -> Result<(Vec<u8>, bool)> {
        Err(Error::UnexpectedServerChallenge)
    }

    /// The server drops the connection on bad credentials instead of
    /// answering BAD or ERROR.
    pub fn interpret_receive_eof(&self, err: io::Error) -> Error {
        AuthError::new(self.credentials.username.clone(), err).into()
    }
}
