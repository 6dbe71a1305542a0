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

//! HiveServer2 client for Impala.
//!
//! [`Client`] opens sessions over an authenticated [`HiveService`]; a
//! [`Session`] submits statements and hands back [`Operation`]s.

pub mod context;
pub mod metadata;
pub mod operation;
pub mod rpc;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use context::Context;
pub use metadata::{SchemaInfo, TableInfo};
pub use operation::Operation;
pub use rpc::{Connector, HiveService};
pub(crate) use session::close_after_failure;
pub use session::Session;

use crate::error::{Error, Result};
use rpc::{check_status, TOpenSessionReq, TProtocolVersion};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// First wait between status polls and between still-executing fetches.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Ceiling of the doubling backoff.
pub const MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Rows requested per fetch unless configured otherwise.
pub const DEFAULT_MAX_ROWS: i64 = 1024;

/// Doubling backoff shared by the poll and fetch loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// The wait after `current`: doubled, capped at the ceiling.
    pub fn next(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(INITIAL_BACKOFF, MAX_BACKOFF)
    }
}

/// Session and fetch settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    /// Maximum rows per fetch request.
    pub max_rows: i64,
    /// Session MEM_LIMIT, e.g. `"0"` or `"2g"`.
    pub mem_limit: String,
    /// Session QUERY_TIMEOUT_S; 0 disables the server-side timeout.
    pub query_timeout_s: u32,
    pub backoff: Backoff,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_MAX_ROWS,
            mem_limit: "0".to_string(),
            query_timeout_s: 0,
            backoff: Backoff::default(),
        }
    }
}

/// Entry point for RPCs over one authenticated connection.
pub struct Client {
    service: Arc<dyn HiveService>,
    options: ClientOptions,
}

impl Client {
    pub fn new(service: Arc<dyn HiveService>, options: ClientOptions) -> Self {
        Self { service, options }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub(crate) fn service(&self) -> &dyn HiveService {
        self.service.as_ref()
    }

    /// Opens a session carrying the configured memory limit and timeout.
    pub async fn open_session(self: &Arc<Self>, ctx: &Context) -> Result<Session> {
        let configuration = HashMap::from([
            ("MEM_LIMIT".to_string(), self.options.mem_limit.clone()),
            (
                "QUERY_TIMEOUT_S".to_string(),
                self.options.query_timeout_s.to_string(),
            ),
        ]);
        let req = TOpenSessionReq {
            client_protocol: TProtocolVersion::V7,
            configuration,
            ..Default::default()
        };

        let resp = ctx.coalesce(self.service.open_session(&req).await)?;
        check_status(&resp)?;
        let handle = resp
            .session_handle
            .ok_or_else(|| Error::Protocol("open session response without handle".into()))?;

        info!(session = %guid(&handle.session_id.guid), "open session");
        debug!(configuration = ?resp.configuration, "session config");
        Ok(Session::new(self.clone(), handle))
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Renders a 16-byte handle id as two little-endian halves, `hi:lo`.
pub fn guid(bytes: &[u8]) -> String {
    let half = |chunk: &[u8]| {
        let mut buf = [0u8; 8];
        buf[..chunk.len()].copy_from_slice(chunk);
        u64::from_le_bytes(buf)
    };
    if bytes.len() != 16 {
        return bytes.iter().map(|b| format!("{b:02x}")).collect();
    }
    format!("{:016x}:{:016x}", half(&bytes[8..]), half(&bytes[..8]))
}
