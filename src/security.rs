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

//! The security handler (component C3): per-security-type challenge/response
//! and sub-negotiation, run once the handshake driver has picked a type.

use bytes::{Buf, BufMut, BytesMut};
use log::warn;
use tokio::sync::Notify;

use crate::des::encrypt_challenge;
use crate::error::{Result, VncError};
use crate::protocol::{limits, SECURITY_TYPE_NONE, SECURITY_TYPE_VNC_AUTH};
use crate::transport::Transport;

/// A Tight-extension capability record: a 4-byte code, a 4-byte vendor tag
/// and an 8-byte signature, exactly as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TightCapability {
    /// Numeric code (reused as the `TightAuthType` discriminant for auth capabilities).
    pub code: i32,
    /// 4-byte ASCII vendor tag, e.g. `STDV`, `TGHT`.
    pub vendor: [u8; 4],
    /// 8-byte ASCII signature, e.g. `NOAUTH__`.
    pub signature: [u8; 8],
}

impl TightCapability {
    const WIRE_LEN: usize = 16;

    fn read_from(buf: &mut BytesMut) -> Self {
        let code = buf.get_i32();
        let mut vendor = [0u8; 4];
        buf.copy_to_slice(&mut vendor);
        let mut signature = [0u8; 8];
        buf.copy_to_slice(&mut signature);
        Self { code, vendor, signature }
    }

    fn write_to(&self, buf: &mut BytesMut) {
        buf.put_i32(self.code);
        buf.put_slice(&self.vendor);
        buf.put_slice(&self.signature);
    }

    const fn new(code: i32, vendor: &[u8; 4], signature: &[u8; 8]) -> Self {
        Self { code, vendor: *vendor, signature: *signature }
    }
}

/// The single registered tunnel capability this library recognises: no tunnel at all.
const REGISTERED_TUNNELS: [TightCapability; 1] =
    [TightCapability::new(0, b"TGHT", b"NOTUNNEL")];

/// `TightAuthType` discriminants, matching the codes registered below.
mod tight_auth_type {
    pub const NONE: i32 = 1;
    pub const VNC_AUTHENTICATION: i32 = 2;
    pub const VENCRYPT: i32 = 19;
    pub const GTK_VNC_SASL: i32 = 20;
    pub const UNIX_LOGIN_AUTHENTICATION: i32 = 129;
    pub const EXTERNAL_AUTHENTICATION: i32 = 130;
}

/// All auth capabilities known to this library, supported or otherwise. An
/// auth type not in this table cannot be negotiated by this library at all;
/// one that is in the table but not in [`is_supported`] is recognised but
/// rejected during selection, which keeps "unknown capability" errors
/// reserved for genuinely unregistered codes.
const REGISTERED_AUTH_TYPES: [TightCapability; 6] = [
    TightCapability::new(tight_auth_type::NONE, b"STDV", b"NOAUTH__"),
    TightCapability::new(tight_auth_type::VNC_AUTHENTICATION, b"STDV", b"VNCAUTH_"),
    TightCapability::new(tight_auth_type::VENCRYPT, b"VENC", b"VENCRYPT"),
    TightCapability::new(tight_auth_type::GTK_VNC_SASL, b"GTKV", b"SASL____"),
    TightCapability::new(tight_auth_type::UNIX_LOGIN_AUTHENTICATION, b"TGHT", b"ULGNAUTH"),
    TightCapability::new(tight_auth_type::EXTERNAL_AUTHENTICATION, b"TGHT", b"XTRNAUTH"),
];

fn is_supported(auth: &TightCapability) -> bool {
    matches!(auth.code, tight_auth_type::NONE | tight_auth_type::VNC_AUTHENTICATION)
}

fn find_registered<'a>(
    table: &'a [TightCapability],
    needle: &TightCapability,
) -> Option<&'a TightCapability> {
    table.iter().find(|reg| reg.vendor == needle.vendor && reg.signature == needle.signature)
}

/// Runs the VNC-Authentication challenge/response: read the 16-byte
/// challenge, compute the DES response, write it back.
pub async fn run_vnc_authentication(
    transport: &mut Transport,
    password: &[u8],
) -> Result<()> {
    let mut challenge = [0u8; 16];
    transport.read_exact(&mut challenge).await?;
    let response = encrypt_challenge(&challenge, password);
    transport.write_all(&response).await
}

/// Runs the Tight tunnel + auth capability negotiation, then dispatches to
/// the selected sub-handler. Returns once the sub-handler has completed; the
/// caller still reads the final `SecurityResult`.
pub async fn run_tight_negotiation(transport: &mut Transport, password: &[u8]) -> Result<()> {
    // --- tunnel capabilities ---
    let mut count_buf = [0u8; 4];
    transport.read_exact(&mut count_buf).await?;
    let tunnel_count = u32::from_be_bytes(count_buf) as usize;
    if tunnel_count > limits::MAX_TIGHT_NEGOTIATION_COUNT {
        return Err(VncError::HandshakeProtocolError(format!(
            "server advertised {tunnel_count} tight tunnels, exceeding the safety cap"
        )));
    }

    let mut tunnels = Vec::with_capacity(tunnel_count);
    for _ in 0..tunnel_count {
        let mut raw = [0u8; TightCapability::WIRE_LEN];
        transport.read_exact(&mut raw).await?;
        let mut buf = BytesMut::from(&raw[..]);
        tunnels.push(TightCapability::read_from(&mut buf));
    }

    if tunnel_count > 0 {
        let chosen = tunnels
            .iter()
            .find_map(|t| find_registered(&REGISTERED_TUNNELS, t))
            .ok_or_else(|| {
                VncError::HandshakeProtocolError("no registered tight tunnel offered".to_string())
            })?;
        let mut buf = BytesMut::with_capacity(4);
        buf.put_i32(chosen.code);
        transport.write_all(&buf).await?;
    }

    // --- auth capabilities ---
    transport.read_exact(&mut count_buf).await?;
    let auth_count = u32::from_be_bytes(count_buf) as usize;
    if auth_count > limits::MAX_TIGHT_NEGOTIATION_COUNT {
        return Err(VncError::HandshakeProtocolError(format!(
            "server advertised {auth_count} tight auth types, exceeding the safety cap"
        )));
    }

    let mut auths = Vec::with_capacity(auth_count);
    for _ in 0..auth_count {
        let mut raw = [0u8; TightCapability::WIRE_LEN];
        transport.read_exact(&mut raw).await?;
        let mut buf = BytesMut::from(&raw[..]);
        auths.push(TightCapability::read_from(&mut buf));
    }

    // Prefer NOAUTH__ then VNCAUTH_, matching the library's supported set.
    let chosen = auths
        .iter()
        .filter_map(|a| find_registered(&REGISTERED_AUTH_TYPES, a))
        .filter(|a| is_supported(a))
        .min_by_key(|a| if a.code == tight_auth_type::NONE { 0 } else { 1 })
        .ok_or_else(|| {
            VncError::HandshakeProtocolError(
                "no supported tight auth capability offered".to_string(),
            )
        })?;

    let mut buf = BytesMut::with_capacity(4);
    buf.put_i32(chosen.code);
    transport.write_all(&buf).await?;

    match chosen.code {
        tight_auth_type::NONE => Ok(()),
        tight_auth_type::VNC_AUTHENTICATION => run_vnc_authentication(transport, password).await,
        _ => unreachable!("is_supported() only admits None and VNCAuthentication"),
    }
}

/// Runs an Anonymous-TLS sub-negotiation: a stub that logs the inherent
/// insecurity and reports the type as unsupported since this core does not
/// embed a TLS library (see `SPEC_FULL.md` §4.3 and `DESIGN.md`).
pub async fn run_anonymous_tls(_transport: &mut Transport) -> Result<()> {
    warn!("Anonymous-TLS security type offered but this build has no TLS backend configured");
    Err(VncError::SslHandshake(
        "anonymous-TLS requires a host-supplied TLS backend".to_string(),
    ))
}

/// Runs a VeNCrypt sub-negotiation: stubbed, rejects cleanly (see `DESIGN.md`).
pub async fn run_vencrypt(_transport: &mut Transport) -> Result<()> {
    Err(VncError::SslHandshake(
        "VeNCrypt requires a host-supplied TLS backend".to_string(),
    ))
}

/// Dispatches to the appropriate sub-handler for `security_type` (excluding
/// Tight, Anonymous-TLS and VeNCrypt, which the handshake driver calls
/// directly since they need extra context). Watches `cancel` throughout, so a
/// host disconnect issued while waiting on the VNC-Authentication challenge
/// surfaces as [`VncError::UserInterruption`] rather than hanging.
pub async fn run_simple(
    transport: &mut Transport,
    security_type: u8,
    password: &[u8],
    cancel: &Notify,
) -> Result<()> {
    match security_type {
        SECURITY_TYPE_NONE => Ok(()),
        SECURITY_TYPE_VNC_AUTH => run_vnc_authentication_cancellable(transport, password, cancel).await,
        other => Err(VncError::HandshakeProtocolError(format!(
            "unsupported security type {other}"
        ))),
    }
}

/// Runs the VNC-Authentication challenge/response, watching `cancel` while
/// waiting on the server's 16-byte challenge.
pub async fn run_vnc_authentication_cancellable(
    transport: &mut Transport,
    password: &[u8],
    cancel: &Notify,
) -> Result<()> {
    let mut challenge = [0u8; 16];
    transport.read_exact_cancellable(&mut challenge, cancel).await?;
    let response = encrypt_challenge(&challenge, password);
    transport.write_all(&response).await
}
