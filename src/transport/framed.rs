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

//! Length-prefixed framing over a byte stream.
//!
//! Writes are buffered until flush, which emits all buffered bytes as one
//! frame: a 4-byte big-endian length followed by the payload. Reads drain
//! the current frame and transparently pull the next one when it runs out.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Largest frame accepted from the server.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16_384_000;

const HEADER_LEN: usize = 4;

#[derive(Debug)]
enum ReadState {
    Header { buf: [u8; HEADER_LEN], filled: usize },
    Body { buf: BytesMut, len: usize },
}

impl Default for ReadState {
    fn default() -> Self {
        ReadState::Header {
            buf: [0; HEADER_LEN],
            filled: 0,
        }
    }
}

/// Framing adapter over an already open stream.
#[derive(Debug)]
pub struct FramedTransport<T> {
    inner: T,
    max_frame_size: usize,
    state: ReadState,
    /// Unread remainder of the current inbound frame.
    frame: Bytes,
    /// Bytes written since the last flush.
    wbuf: BytesMut,
    /// Encoded frame still being written to the stream.
    out: Bytes,
}

impl<T> FramedTransport<T> {
    pub fn new(inner: T) -> Self {
        Self::with_max_frame_size(inner, DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(inner: T, max_frame_size: usize) -> Self {
        Self {
            inner,
            max_frame_size,
            state: ReadState::default(),
            frame: Bytes::new(),
            wbuf: BytesMut::new(),
            out: Bytes::new(),
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: AsyncRead + Unpin> FramedTransport<T> {
    /// Reads until a complete frame is buffered. Returns `false` on a clean
    /// end of stream at a frame boundary.
    fn poll_fill_frame(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<bool>> {
        loop {
            match &mut self.state {
                ReadState::Header { buf, filled } => {
                    let mut rb = ReadBuf::new(&mut buf[*filled..]);
                    ready!(Pin::new(&mut self.inner).poll_read(cx, &mut rb))?;
                    let n = rb.filled().len();
                    if n == 0 {
                        if *filled == 0 {
                            return Poll::Ready(Ok(false));
                        }
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "end of stream inside frame header",
                        )));
                    }
                    *filled += n;
                    if *filled < HEADER_LEN {
                        continue;
                    }
                    let len = u32::from_be_bytes(*buf) as usize;
                    if len > self.max_frame_size {
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("frame of {len} bytes exceeds limit {}", self.max_frame_size),
                        )));
                    }
                    self.state = ReadState::Body {
                        buf: BytesMut::with_capacity(len),
                        len,
                    };
                }
                ReadState::Body { buf, len } => {
                    if buf.len() == *len {
                        self.frame = buf.split().freeze();
                        self.state = ReadState::default();
                        if self.frame.is_empty() {
                            continue;
                        }
                        return Poll::Ready(Ok(true));
                    }
                    let want = *len - buf.len();
                    let mut chunk = vec![0u8; want.min(64 * 1024)];
                    let mut rb = ReadBuf::new(&mut chunk);
                    ready!(Pin::new(&mut self.inner).poll_read(cx, &mut rb))?;
                    let n = rb.filled().len();
                    if n == 0 {
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "end of stream inside frame body",
                        )));
                    }
                    buf.put_slice(rb.filled());
                }
            }
        }
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for FramedTransport<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.frame.is_empty() && !ready!(this.poll_fill_frame(cx))? {
            return Poll::Ready(Ok(()));
        }
        let n = this.frame.len().min(buf.remaining());
        buf.put_slice(&this.frame[..n]);
        this.frame.advance(n);
        Poll::Ready(Ok(()))
    }
}

impl<T: AsyncWrite + Unpin> FramedTransport<T> {
    fn poll_write_out(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while !self.out.is_empty() {
            let n = ready!(Pin::new(&mut self.inner).poll_write(cx, &self.out))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.out.advance(n);
        }
        Poll::Ready(Ok(()))
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for FramedTransport<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.wbuf.len() + buf.len() > u32::MAX as usize {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "frame payload exceeds 4 GiB",
            )));
        }
        this.wbuf.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    /// Emits the buffered bytes as exactly one frame. A flush with nothing
    /// buffered writes no frame.
    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        // A frame left over from an interrupted flush goes out before the
        // bytes written since.
        loop {
            ready!(this.poll_write_out(cx))?;
            if this.wbuf.is_empty() {
                break;
            }
            let payload = this.wbuf.split();
            let mut frame = BytesMut::with_capacity(HEADER_LEN + payload.len());
            frame.put_u32(payload.len() as u32);
            frame.extend_from_slice(&payload);
            this.out = frame.freeze();
        }
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        ready!(self.as_mut().poll_flush(cx))?;
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
