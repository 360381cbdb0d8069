//! Error types for the VNC client library.
//!
//! The taxonomy mirrors the error-code domains used throughout the connection
//! lifecycle: a handful of generic/interruption codes, a block of connect-phase
//! errors produced while establishing a session, and a block of in-session
//! errors produced once the worker has reached the `Connected` state.

use std::io;
use thiserror::Error;

/// Result type for VNC client operations.
pub type Result<T> = std::result::Result<T, VncError>;

/// Errors that can occur in VNC client operations.
///
/// Every variant maps to a stable `code()` in the ranges documented on each
/// group below, so host code that only cares about the numeric code does not
/// need to match on the enum.
#[derive(Debug, Error)]
pub enum VncError {
    /// I/O error occurred talking to the transport.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The user (host) interrupted an in-progress operation.
    #[error("operation interrupted by user")]
    UserInterruption,

    // --- connect-phase errors (10..18) ---
    /// Unspecified connect-time failure.
    #[error("connection failed: {0}")]
    ConnectGeneric(String),

    /// DNS resolution did not find the host.
    #[error("no such host: {0}")]
    NoSuchHost(String),

    /// The remote end actively refused the connection.
    #[error("connection refused")]
    ConnectionRefused,

    /// The remote host was unreachable at the network layer.
    #[error("host unreachable")]
    HostUnreachable,

    /// The connect attempt exceeded its timeout budget.
    #[error("connection timed out")]
    ConnectTimeout,

    /// A malformed or unexpected byte sequence during the handshake.
    #[error("protocol error during handshake: {0}")]
    HandshakeProtocolError(String),

    /// Security-type negotiation completed but credentials were rejected.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The server rejected the connection outright (e.g. security count = 0).
    #[error("server rejected connection: {0}")]
    ServerRejectsConnection(String),

    /// The TLS handshake (Anonymous-TLS / VeNCrypt) failed.
    #[error("TLS handshake failed: {0}")]
    SslHandshake(String),

    // --- in-session errors (100..121) ---
    /// A read on the transport failed.
    #[error("read failed: {0}")]
    ReadFailed(String),

    /// A write on the transport failed.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// A malformed message was received after the connection was established.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The peer closed or reset the connection.
    #[error("connection closed by remote")]
    ClosedByRemote,

    /// A rectangle declared an encoding the decoder pipeline does not implement.
    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(i32),

    /// A rectangle's encoding-specific payload violated the wire format.
    #[error("invalid encoding data: {0}")]
    InvalidEncoding(String),

    /// A value supplied by the host violated a precondition (bad config, bad call order).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl VncError {
    /// The stable numeric error code exposed to host code, matching the
    /// connect-error (10..18) and in-session-error (100..121) domains.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            VncError::Io(_) => 100,
            VncError::UserInterruption => 2,
            VncError::ConnectGeneric(_) => 10,
            VncError::NoSuchHost(_) => 11,
            VncError::ConnectionRefused => 12,
            VncError::HostUnreachable => 13,
            VncError::ConnectTimeout => 14,
            VncError::HandshakeProtocolError(_) => 15,
            VncError::AuthenticationFailed(_) => 16,
            VncError::ServerRejectsConnection(_) => 17,
            VncError::SslHandshake(_) => 18,
            VncError::ReadFailed(_) => 100,
            VncError::WriteFailed(_) => 101,
            VncError::ProtocolError(_) => 102,
            VncError::ClosedByRemote => 103,
            VncError::UnsupportedEncoding(_) => 120,
            VncError::InvalidEncoding(_) => 121,
            VncError::InvalidOperation(_) => -1,
        }
    }

    /// Whether this error belongs to the connect-phase domain (10..18), as
    /// opposed to the in-session domain (100..121).
    #[must_use]
    pub fn is_connect_error(&self) -> bool {
        (10..19).contains(&self.code())
    }

    /// A human-readable message capped at 1 KiB, matching the host-facing
    /// error message size limit.
    #[must_use]
    pub fn truncated_message(&self) -> String {
        let full = self.to_string();
        if full.len() <= 1024 {
            full
        } else {
            full.chars().take(1024).collect()
        }
    }
}
