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

//! Database implementation for the Impala ADBC driver.

use crate::auth::{Credentials, GssapiMechanism, Mechanism, PlainMechanism, TicketProvider};
use crate::client::{Client, ClientOptions, Connector, Context, Session};
use crate::connection::Connection;
use crate::error::{Error, ImpalaErrorHelper};
use crate::transport::{self, SaslTransport, TlsConfig};
use adbc_core::error::Result;
use adbc_core::options::{OptionConnection, OptionDatabase, OptionValue};
use adbc_core::Optionable;
use driverbase::error::ErrorHelper;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_PORT: u16 = 21050;
pub const DEFAULT_BATCH_SIZE: i64 = 1024;
pub const DEFAULT_GSSAPI_SERVICE: &str = "impala";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub const OPTION_AUTH: &str = "impala.auth";
pub const OPTION_GSSAPI_SERVICE: &str = "impala.gssapi.service";
pub const OPTION_BATCH_SIZE: &str = "impala.batch_size";
pub const OPTION_MEM_LIMIT: &str = "impala.mem_limit";
pub const OPTION_QUERY_TIMEOUT_S: &str = "impala.query_timeout_s";
pub const OPTION_TLS: &str = "impala.tls";
pub const OPTION_TLS_CA_CERT: &str = "impala.tls.ca_cert";
pub const OPTION_CONNECT_TIMEOUT_MS: &str = "impala.connect_timeout_ms";

/// SASL mechanism selected by `impala.auth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMethod {
    #[default]
    Plain,
    Gssapi,
}

impl AuthMethod {
    fn as_str(self) -> &'static str {
        match self {
            AuthMethod::Plain => "plain",
            AuthMethod::Gssapi => "gssapi",
        }
    }
}

/// Represents a database instance that holds connection configuration.
///
/// Besides the ADBC options, the RPC codec is injected with
/// [`Database::with_connector`] and, for Kerberos, the ticket source with
/// [`Database::with_ticket_provider`].
#[derive(Clone)]
pub struct Database {
    host: Option<String>,
    port: u16,
    username: Option<String>,
    password: Option<String>,
    auth: AuthMethod,
    gssapi_service: String,
    batch_size: i64,
    mem_limit: String,
    query_timeout_s: u32,
    tls: bool,
    tls_ca_cert: Option<String>,
    connect_timeout: Duration,
    connector: Option<Arc<dyn Connector>>,
    ticket_provider: Option<Arc<dyn TicketProvider>>,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            username: None,
            password: None,
            auth: AuthMethod::default(),
            gssapi_service: DEFAULT_GSSAPI_SERVICE.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            mem_limit: "0".to_string(),
            query_timeout_s: 0,
            tls: false,
            tls_ca_cert: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            connector: None,
            ticket_provider: None,
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("auth", &self.auth)
            .field("tls", &self.tls)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Creates a new Database instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn with_ticket_provider(mut self, provider: Arc<dyn TicketProvider>) -> Self {
        self.ticket_provider = Some(provider);
        self
    }

    pub fn set_connector(&mut self, connector: Arc<dyn Connector>) {
        self.connector = Some(connector);
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn auth(&self) -> AuthMethod {
        self.auth
    }

    fn client_options(&self) -> ClientOptions {
        ClientOptions {
            max_rows: self.batch_size,
            mem_limit: self.mem_limit.clone(),
            query_timeout_s: self.query_timeout_s,
            ..Default::default()
        }
    }

    fn mechanism(&self, host: &str) -> crate::error::Result<Mechanism> {
        match self.auth {
            AuthMethod::Plain => Ok(PlainMechanism::new(Credentials::new(
                self.username.clone().unwrap_or_default(),
                self.password.clone().unwrap_or_default(),
            ))
            .into()),
            AuthMethod::Gssapi => {
                let provider = self.ticket_provider.clone().ok_or_else(|| {
                    Error::Config("GSSAPI authentication needs a ticket provider".into())
                })?;
                Ok(GssapiMechanism::new(provider, self.gssapi_service.clone(), host).into())
            }
        }
    }

    /// Dials the server, authenticates, binds the RPC codec and opens a
    /// session, all within the connect timeout.
    async fn open_session(
        &self,
        host: &str,
        connector: Arc<dyn Connector>,
    ) -> crate::error::Result<Session> {
        let tls = if self.tls {
            Some(TlsConfig::new(self.tls_ca_cert.as_deref().map(Path::new))?)
        } else {
            None
        };
        let mechanism = self.mechanism(host)?;

        let connect = async {
            let stream = transport::connect(host, self.port, tls.as_ref()).await?;
            let mut sasl = SaslTransport::new(stream, mechanism);
            sasl.open().await?;
            let service = connector.connect(sasl).await?;
            let client = Arc::new(Client::new(service, self.client_options()));
            client.open_session(&Context::background()).await
        };
        tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| Error::DeadlineExceeded)?
    }
}

fn string_value(key: &OptionDatabase, value: OptionValue) -> Result<String> {
    match value {
        OptionValue::String(s) => Ok(s),
        other => Err(ImpalaErrorHelper::set_invalid_option(key, &other).to_adbc()),
    }
}

fn int_value(key: &OptionDatabase, value: OptionValue) -> Result<i64> {
    let parsed = match &value {
        OptionValue::Int(v) => Some(*v),
        OptionValue::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed
        .filter(|v| *v >= 0)
        .ok_or_else(|| ImpalaErrorHelper::set_invalid_option(key, &value).to_adbc())
}

fn bool_value(key: &OptionDatabase, value: OptionValue) -> Result<bool> {
    let parsed = match &value {
        OptionValue::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        OptionValue::Int(v) => Some(*v != 0),
        _ => None,
    };
    parsed.ok_or_else(|| ImpalaErrorHelper::set_invalid_option(key, &value).to_adbc())
}

/// Splits `host[:port]`; IPv6 hosts are written in brackets.
pub fn parse_endpoint(uri: &str) -> crate::error::Result<(String, u16)> {
    let uri = uri.trim();
    let uri = uri.strip_prefix("impala://").unwrap_or(uri);
    let uri = uri.trim_end_matches('/');
    let invalid = || Error::Config(format!("invalid endpoint {uri:?}, expected host[:port]"));

    let (host, port) = if let Some(rest) = uri.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
        match tail.strip_prefix(':') {
            Some(port) => (host, Some(port)),
            None if tail.is_empty() => (host, None),
            None => return Err(invalid()),
        }
    } else {
        match uri.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (uri, None),
        }
    };
    if host.is_empty() {
        return Err(invalid());
    }
    let port = match port {
        Some(port) => port.parse().map_err(|_| invalid())?,
        None => DEFAULT_PORT,
    };
    Ok((host.to_string(), port))
}

impl Optionable for Database {
    type Option = OptionDatabase;

    fn set_option(&mut self, key: Self::Option, value: OptionValue) -> Result<()> {
        match key {
            OptionDatabase::Uri => {
                let uri = string_value(&key, value)?;
                let (host, port) = parse_endpoint(&uri).map_err(|e| {
                    ImpalaErrorHelper::invalid_argument()
                        .message(e.to_string())
                        .to_adbc()
                })?;
                self.host = Some(host);
                self.port = port;
            }
            OptionDatabase::Username => self.username = Some(string_value(&key, value)?),
            OptionDatabase::Password => self.password = Some(string_value(&key, value)?),
            OptionDatabase::Other(ref s) => match s.as_str() {
                OPTION_AUTH => {
                    let method = string_value(&key, value.clone())?;
                    self.auth = match method.to_ascii_lowercase().as_str() {
                        "plain" => AuthMethod::Plain,
                        "gssapi" | "kerberos" => AuthMethod::Gssapi,
                        _ => {
                            return Err(
                                ImpalaErrorHelper::set_invalid_option(&key, &value).to_adbc()
                            )
                        }
                    };
                }
                OPTION_GSSAPI_SERVICE => self.gssapi_service = string_value(&key, value)?,
                OPTION_BATCH_SIZE => {
                    let size = int_value(&key, value.clone())?;
                    if size == 0 {
                        return Err(ImpalaErrorHelper::set_invalid_option(&key, &value).to_adbc());
                    }
                    self.batch_size = size;
                }
                OPTION_MEM_LIMIT => self.mem_limit = string_value(&key, value)?,
                OPTION_QUERY_TIMEOUT_S => {
                    let timeout = int_value(&key, value.clone())?;
                    self.query_timeout_s = u32::try_from(timeout).map_err(|_| {
                        ImpalaErrorHelper::set_invalid_option(&key, &value).to_adbc()
                    })?;
                }
                OPTION_TLS => self.tls = bool_value(&key, value)?,
                OPTION_TLS_CA_CERT => self.tls_ca_cert = Some(string_value(&key, value)?),
                OPTION_CONNECT_TIMEOUT_MS => {
                    self.connect_timeout = Duration::from_millis(int_value(&key, value)? as u64)
                }
                _ => return Err(ImpalaErrorHelper::set_unknown_option(&key).to_adbc()),
            },
            _ => return Err(ImpalaErrorHelper::set_unknown_option(&key).to_adbc()),
        }
        Ok(())
    }

    fn get_option_string(&self, key: Self::Option) -> Result<String> {
        let not_set = |name: &str| {
            ImpalaErrorHelper::invalid_state()
                .message(format!("option '{name}' is not set"))
                .to_adbc()
        };
        match key {
            OptionDatabase::Uri => self
                .host
                .as_ref()
                .map(|host| {
                    if host.contains(':') {
                        format!("[{host}]:{}", self.port)
                    } else {
                        format!("{host}:{}", self.port)
                    }
                })
                .ok_or_else(|| not_set("uri")),
            OptionDatabase::Username => self.username.clone().ok_or_else(|| not_set("username")),
            OptionDatabase::Other(ref s) => match s.as_str() {
                OPTION_AUTH => Ok(self.auth.as_str().to_string()),
                OPTION_GSSAPI_SERVICE => Ok(self.gssapi_service.clone()),
                OPTION_MEM_LIMIT => Ok(self.mem_limit.clone()),
                OPTION_TLS => Ok(self.tls.to_string()),
                OPTION_TLS_CA_CERT => self
                    .tls_ca_cert
                    .clone()
                    .ok_or_else(|| not_set(OPTION_TLS_CA_CERT)),
                _ => Err(ImpalaErrorHelper::get_unknown_option(&key).to_adbc()),
            },
            _ => Err(ImpalaErrorHelper::get_unknown_option(&key).to_adbc()),
        }
    }

    fn get_option_bytes(&self, key: Self::Option) -> Result<Vec<u8>> {
        Err(ImpalaErrorHelper::get_unknown_option(&key).to_adbc())
    }

    fn get_option_int(&self, key: Self::Option) -> Result<i64> {
        match key {
            OptionDatabase::Other(ref s) => match s.as_str() {
                OPTION_BATCH_SIZE => Ok(self.batch_size),
                OPTION_QUERY_TIMEOUT_S => Ok(i64::from(self.query_timeout_s)),
                OPTION_CONNECT_TIMEOUT_MS => Ok(self.connect_timeout.as_millis() as i64),
                _ => Err(ImpalaErrorHelper::get_unknown_option(&key).to_adbc()),
            },
            _ => Err(ImpalaErrorHelper::get_unknown_option(&key).to_adbc()),
        }
    }

    fn get_option_double(&self, key: Self::Option) -> Result<f64> {
        Err(ImpalaErrorHelper::get_unknown_option(&key).to_adbc())
    }
}

impl adbc_core::Database for Database {
    type ConnectionType = Connection;

    fn new_connection(&self) -> Result<Self::ConnectionType> {
        let host = self.host.clone().ok_or_else(|| {
            ImpalaErrorHelper::invalid_state()
                .message("option 'uri' is not set")
                .to_adbc()
        })?;
        let connector = self.connector.clone().ok_or_else(|| {
            ImpalaErrorHelper::invalid_state()
                .message("no RPC connector configured")
                .to_adbc()
        })?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ImpalaErrorHelper::io().message(e.to_string()).to_adbc())?;
        let runtime = Arc::new(runtime);

        let session = runtime.block_on(self.open_session(&host, connector))?;
        info!(host = %host, port = self.port, auth = self.auth.as_str(), "connection established");
        Ok(Connection::new(
            runtime,
            session,
            usize::try_from(self.batch_size).unwrap_or(DEFAULT_BATCH_SIZE as usize),
        ))
    }

    fn new_connection_with_opts(
        &self,
        opts: impl IntoIterator<Item = (OptionConnection, OptionValue)>,
    ) -> Result<Self::ConnectionType> {
        let mut connection = self.new_connection()?;
        for (key, value) in opts {
            connection.set_option(key, value)?;
        }
        Ok(connection)
    }
}
