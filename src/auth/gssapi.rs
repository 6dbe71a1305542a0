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

//! GSSAPI mechanism delegated to an external Kerberos implementation.
//!
//! The driver only carries tokens between the server and a
//! [`GssapiContext`]; ticket acquisition and token wrapping live in the
//! implementation supplied through [`TicketProvider`].

use super::Start;
use crate::error::{Error, Result};
use std::fmt;
use std::sync::Arc;

pub const MECHANISM: &str = "GSSAPI";

/// Security context of one Kerberos exchange.
pub trait GssapiContext: Send {
    /// Produces the next token. `challenge` is `None` for the initial token.
    /// Returns the token and whether the exchange is complete locally.
    fn step(&mut self, challenge: Option<&[u8]>) -> Result<(Vec<u8>, bool)>;

    /// Releases the context.
    fn free(&mut self) {}
}

/// Creates Kerberos security contexts for a service principal.
pub trait TicketProvider: Send + Sync + fmt::Debug {
    /// `service` is the principal's service part (usually `impala`) and
    /// `host` the server host name.
    fn new_context(&self, service: &str, host: &str) -> Result<Box<dyn GssapiContext>>;
}

pub struct GssapiMechanism {
    provider: Arc<dyn TicketProvider>,
    service: String,
    host: String,
    context: Option<Box<dyn GssapiContext>>,
}

impl GssapiMechanism {
    pub fn new(
        provider: Arc<dyn TicketProvider>,
        service: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            service: service.into(),
            host: host.into(),
            context: None,
        }
    }

    pub fn start(&mut self) -> Result<Start> {
        let mut context = self.provider.new_context(&self.service, &self.host)?;
        let (initial, complete) = context.step(None)?;
        self.context = Some(context);
        Ok(Start {
            mechanism: MECHANISM,
            initial,
            complete,
        })
    }

    pub fn step(&mut self, challenge: &[u8]) -> Result<(Vec<u8>, bool)> {
        let context = self
            .context
            .as_mut()
            .ok_or_else(|| Error::Mechanism("GSSAPI step before start".into()))?;
        context.step(Some(challenge))
    }

    pub fn free(&mut self) {
        if let Some(mut context) = self.context.take() {
            context.free();
        }
    }
}

impl fmt::Debug for GssapiMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GssapiMechanism")
            .field("provider", &self.provider)
            .field("service", &self.service)
            .field("host", &self.host)
            .field("started", &self.context.is_some())
            .finish()
    }
}
