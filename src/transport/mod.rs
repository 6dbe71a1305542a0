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

//! Byte transports below the RPC layer: TCP and TLS dialing, framing and
//! SASL authentication.

pub mod framed;
pub mod sasl;

pub use framed::{FramedTransport, DEFAULT_MAX_FRAME_SIZE};
pub use sasl::SaslTransport;

use crate::error::{Error, Result};
use std::io::BufReader;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName};
use tokio_rustls::rustls::{self, ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::debug;

/// A bidirectional byte stream the SASL transport can run over.
pub trait IoStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> IoStream for T {}

pub type BoxedStream = Box<dyn IoStream>;

/// TLS settings for the server connection.
#[derive(Clone)]
pub struct TlsConfig {
    connector: TlsConnector,
}

impl TlsConfig {
    /// Trusts the certificates in the PEM file `ca_cert`, or the bundled
    /// web PKI roots when no file is given.
    pub fn new(ca_cert: Option<&Path>) -> Result<Self> {
        let mut roots = RootCertStore::empty();
        match ca_cert {
            Some(path) => {
                let file = std::fs::File::open(path).map_err(|e| {
                    Error::Tls(format!("open CA certificate {}: {e}", path.display()))
                })?;
                let certs = rustls_pemfile::certs(&mut BufReader::new(file))
                    .collect::<std::result::Result<Vec<CertificateDer<'static>>, _>>()
                    .map_err(|e| Error::Tls(format!("read CA certificate: {e}")))?;
                if certs.is_empty() {
                    return Err(Error::Tls(format!(
                        "no certificates in {}",
                        path.display()
                    )));
                }
                for cert in certs {
                    roots
                        .add(cert)
                        .map_err(|e| Error::Tls(format!("add CA certificate: {e}")))?;
                }
            }
            None => roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
        }

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::Tls(e.to_string()))?
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
        })
    }
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig").finish_non_exhaustive()
    }
}

/// Opens a TCP connection to `host:port`, wrapped in TLS when configured.
pub async fn connect(host: &str, port: u16, tls: Option<&TlsConfig>) -> Result<BoxedStream> {
    let tcp = TcpStream::connect((host, port)).await?;
    tcp.set_nodelay(true)?;
    debug!(host, port, tls = tls.is_some(), "connected");

    let Some(tls) = tls else {
        return Ok(Box::new(tcp));
    };
    let stream = tls
        .connector
        .connect(server_name(host)?, tcp)
        .await
        .map_err(|e| Error::Tls(format!("handshake with {host}: {e}")))?;
    Ok(Box::new(stream))
}

fn server_name(host: &str) -> Result<ServerName<'static>> {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ServerName::from(ip));
    }
    ServerName::try_from(host.to_string())
        .map_err(|e| Error::Tls(format!("invalid server name {host}: {e}")))
}
