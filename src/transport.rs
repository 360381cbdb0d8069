// Copyright 2025 Dustin McAfee
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

//! The transport (component C2): a single-socket wrapper around
//! [`tokio::net::TcpStream`] that exposes connect-with-timeout,
//! read/write-until-n-bytes, and a cancellable `wait` primitive that every
//! higher layer funnels through.
//!
//! The "wake-up channel" from the design notes is realised here as a
//! [`tokio::sync::Notify`]: the host calls `notify_one()` to interrupt
//! whatever the worker is currently waiting on.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Notify;

use crate::error::{Result, VncError};

/// Outcome of a cancellable wait.
pub enum WaitOutcome {
    /// The socket became ready for the requested direction.
    Ready,
    /// The timeout elapsed before the socket became ready.
    Timeout,
    /// The cancel channel fired before the socket became ready.
    Cancelled,
}

/// A connected VNC transport: owns the socket, a shared byte counter pair,
/// and the cancellation primitive the worker's main loop waits on.
pub struct Transport {
    stream: TcpStream,
    bytes_sent: Arc<AtomicU64>,
    bytes_received: Arc<AtomicU64>,
}

impl Transport {
    /// Resolves `host`, opens a TCP socket, disables Nagle's algorithm, and
    /// connects within `timeout`, watching `cancel` throughout.
    ///
    /// # Errors
    /// Returns [`VncError::NoSuchHost`], [`VncError::ConnectionRefused`],
    /// [`VncError::HostUnreachable`], [`VncError::ConnectTimeout`] or
    /// [`VncError::UserInterruption`] depending on how the attempt failed.
    pub async fn connect(
        host: &str,
        port: u16,
        timeout: Duration,
        cancel: &Notify,
        bytes_sent: Arc<AtomicU64>,
        bytes_received: Arc<AtomicU64>,
    ) -> Result<Self> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|_| VncError::NoSuchHost(host.to_string()))?
            .collect();
        if addrs.is_empty() {
            return Err(VncError::NoSuchHost(host.to_string()));
        }

        let connect_fut = TcpStream::connect(addrs.as_slice());
        tokio::select! {
            result = connect_fut => {
                let stream = map_connect_error(result)?;
                stream.set_nodelay(true).map_err(VncError::Io)?;
                Ok(Self { stream, bytes_sent, bytes_received })
            }
            () = tokio::time::sleep(timeout) => Err(VncError::ConnectTimeout),
            () = cancel.notified() => Err(VncError::UserInterruption),
        }
    }

    /// Wraps an already-connected stream (e.g. supplied by the host rather
    /// than resolved by this crate).
    #[must_use]
    pub fn from_stream(
        stream: TcpStream,
        bytes_sent: Arc<AtomicU64>,
        bytes_received: Arc<AtomicU64>,
    ) -> Self {
        Self { stream, bytes_sent, bytes_received }
    }

    /// Reads exactly `buf.len()` bytes, looping until satisfied or erroring.
    /// Watches `cancel` between iterations so a user disconnect mid-read
    /// surfaces as [`VncError::UserInterruption`] rather than hanging.
    pub async fn read_exact_cancellable(&mut self, buf: &mut [u8], cancel: &Notify) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            tokio::select! {
                result = self.stream.read(&mut buf[filled..]) => {
                    let n = result.map_err(|e| VncError::ReadFailed(e.to_string()))?;
                    if n == 0 {
                        return Err(VncError::ClosedByRemote);
                    }
                    filled += n;
                    self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
                }
                () = cancel.notified() => return Err(VncError::UserInterruption),
            }
        }
        Ok(())
    }

    /// Reads exactly `buf.len()` bytes with no cancellation (used once a
    /// connection is fully established and teardown goes through the
    /// worker's main select loop instead).
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.stream
            .read_exact(buf)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    VncError::ClosedByRemote
                } else {
                    VncError::ReadFailed(e.to_string())
                }
            })?;
        self.bytes_received
            .fetch_add(buf.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Writes the full buffer, looping until all bytes are accepted.
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.stream
            .write_all(buf)
            .await
            .map_err(|e| VncError::WriteFailed(e.to_string()))?;
        self.bytes_sent
            .fetch_add(buf.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Drains whatever is currently available into `buf`, returning the
    /// number of bytes read (0 only on orderly close).
    pub async fn read_available_nonblocking(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self
            .stream
            .read(buf)
            .await
            .map_err(|e| VncError::ReadFailed(e.to_string()))?;
        if n == 0 {
            return Err(VncError::ClosedByRemote);
        }
        self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }

    /// The sole blocking primitive: waits for the socket to become readable,
    /// or for `timeout` to elapse, or for `cancel` to fire, whichever comes
    /// first.
    pub async fn wait_readable(&self, timeout: Option<Duration>, cancel: &Notify) -> WaitOutcome {
        let readable = self.stream.readable();
        tokio::pin!(readable);
        match timeout {
            Some(timeout) => {
                tokio::select! {
                    result = &mut readable => {
                        match result {
                            Ok(()) => WaitOutcome::Ready,
                            Err(e) => { warn!("socket readiness check failed: {e}"); WaitOutcome::Ready }
                        }
                    }
                    () = tokio::time::sleep(timeout) => WaitOutcome::Timeout,
                    () = cancel.notified() => WaitOutcome::Cancelled,
                }
            }
            None => {
                tokio::select! {
                    result = &mut readable => {
                        match result {
                            Ok(()) => WaitOutcome::Ready,
                            Err(e) => { warn!("socket readiness check failed: {e}"); WaitOutcome::Ready }
                        }
                    }
                    () = cancel.notified() => WaitOutcome::Cancelled,
                }
            }
        }
    }

    /// Total bytes sent on this transport so far.
    #[must_use]
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Total bytes received on this transport so far.
    #[must_use]
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }
}

fn map_connect_error(result: std::io::Result<TcpStream>) -> Result<TcpStream> {
    use std::io::ErrorKind;
    result.map_err(|e| match e.kind() {
        ErrorKind::ConnectionRefused => VncError::ConnectionRefused,
        ErrorKind::TimedOut => VncError::ConnectTimeout,
        ErrorKind::NotFound | ErrorKind::AddrNotAvailable => {
            debug!("connect failed with {:?}", e.kind());
            VncError::HostUnreachable
        }
        _ => VncError::ConnectGeneric(e.to_string()),
    })
}
