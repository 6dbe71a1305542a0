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

//! SASL-authenticated transport.
//!
//! [`SaslTransport::open`] runs the client-initiated negotiation on the raw
//! stream. Each negotiation message is a status byte, a 4-byte big-endian
//! payload length and the payload. Once the server answers COMPLETE the
//! same stream carries length-framed RPC traffic.

use super::framed::{FramedTransport, DEFAULT_MAX_FRAME_SIZE};
use crate::auth::Mechanism;
use crate::error::{Error, Result};
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tracing::debug;

/// Negotiation status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Start = 1,
    Ok = 2,
    Bad = 3,
    Error = 4,
    Complete = 5,
}

impl Status {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Status::Start),
            2 => Some(Status::Ok),
            3 => Some(Status::Bad),
            4 => Some(Status::Error),
            5 => Some(Status::Complete),
            _ => None,
        }
    }
}

pub struct SaslTransport<T> {
    framed: FramedTransport<T>,
    mechanism: Mechanism,
    open: bool,
}

impl<T: AsyncRead + AsyncWrite + Unpin> SaslTransport<T> {
    /// Wraps an already connected stream. Nothing is sent until
    /// [`SaslTransport::open`].
    pub fn new(inner: T, mechanism: Mechanism) -> Self {
        Self {
            framed: FramedTransport::new(inner),
            mechanism,
            open: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn mechanism(&self) -> &Mechanism {
        &self.mechanism
    }

    /// Authenticates the stream. Calling it again after success is a no-op.
    pub async fn open(&mut self) -> Result<()> {
        if self.open {
            return Ok(());
        }
        if let Err(err) = self.negotiate().await {
            self.mechanism.free();
            return Err(Error::Negotiation(Box::new(err)));
        }
        self.open = true;
        Ok(())
    }

    /// Releases the mechanism, then shuts the stream down.
    pub async fn close(&mut self) -> Result<()> {
        self.mechanism.free();
        self.open = false;
        self.framed.get_mut().shutdown().await?;
        Ok(())
    }

    async fn negotiate(&mut self) -> Result<()> {
        let start = self.mechanism.start()?;
        debug!(mechanism = start.mechanism, "sasl start");
        self.send(Status::Start, start.mechanism.as_bytes()).await?;
        self.send(Status::Ok, &start.initial).await?;

        loop {
            let (status, challenge) = self.receive().await?;
            debug!(?status, "sasl status received");
            match status {
                Status::Complete => return Ok(()),
                Status::Ok => {
                    let (response, _) = self.mechanism.step(&challenge)?;
                    self.send(Status::Ok, &response).await?;
                }
                other => return Err(Error::BadStatus(other as u8)),
            }
        }
    }

    async fn send(&mut self, status: Status, payload: &[u8]) -> Result<()> {
        let stream = self.framed.get_mut();
        let mut message = Vec::with_capacity(5 + payload.len());
        message.push(status as u8);
        message.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        message.extend_from_slice(payload);
        stream.write_all(&message).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<(Status, Vec<u8>)> {
        let mut header = [0u8; 5];
        self.read_negotiation(&mut header).await?;
        let status = Status::from_byte(header[0]).ok_or(Error::BadStatus(header[0]))?;
        let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
        if len > DEFAULT_MAX_FRAME_SIZE {
            return Err(Error::Protocol(format!(
                "negotiation payload of {len} bytes exceeds limit"
            )));
        }
        let mut payload = vec![0u8; len];
        self.read_negotiation(&mut payload).await?;
        if matches!(status, Status::Bad | Status::Error) {
            debug!(
                status = header[0],
                message = %String::from_utf8_lossy(&payload),
                "sasl negotiation rejected"
            );
        }
        Ok((status, payload))
    }

    async fn read_negotiation(&mut self, buf: &mut [u8]) -> Result<()> {
        match self.framed.get_mut().read_exact(buf).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                Err(self.mechanism.interpret_receive_eof(err))
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl<T> fmt::Debug for SaslTransport<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslTransport")
            .field("mechanism", &self.mechanism)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for SaslTransport<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().framed).poll_read(cx, buf)
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for SaslTransport<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().framed).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().framed).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().framed).poll_shutdown(cx)
    }
}
