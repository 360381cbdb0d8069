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

//! The handshake driver (component C4): version negotiation, security
//! selection, `ClientInit`/`ServerInit`, and the post-init pixel-format and
//! encoding preferences. Runs once per connection attempt, after the
//! transport is already connected.

use bytes::{Buf, BufMut, BytesMut};
use log::{info, warn};
use tokio::sync::Notify;

use crate::error::{Result, VncError};
use crate::protocol::{
    limits, PixelFormat, RfbVersion, CLIENT_MSG_SET_ENCODINGS, CLIENT_MSG_SET_PIXEL_FORMAT,
    ENCODING_CORRE, ENCODING_COPYRECT, ENCODING_CURSOR, ENCODING_HEXTILE, ENCODING_RAW,
    ENCODING_RRE, ENCODING_ZLIB, SECURITY_TYPE_ANONYMOUS_TLS, SECURITY_TYPE_NONE,
    SECURITY_TYPE_PREFERENCE, SECURITY_TYPE_TIGHT, SECURITY_TYPE_VENCRYPT, SECURITY_TYPE_VNC_AUTH,
};
use crate::quality::QualityProfile;
use crate::security;
use crate::transport::Transport;

/// An encoding capability as advertised by the server in `ServerInit` (Tight
/// extension only): a numeric code plus an 8-byte vendor+signature pair.
#[derive(Debug, Clone, Copy)]
pub struct EncodingCapability {
    /// The encoding identifier.
    pub code: i32,
    /// 4-byte vendor tag.
    pub vendor: [u8; 4],
    /// 8-byte signature.
    pub signature: [u8; 8],
}

/// Capabilities advertised by the server, collected during the handshake.
#[derive(Debug, Clone, Default)]
pub struct ServerCapabilities {
    /// The negotiated RFB version string, e.g. `"RFB 003.008\n"`.
    pub protocol_version_string: String,
    /// The security type that was actually selected and run.
    pub selected_security_type: u8,
    /// Encoding capability records (Tight extension only); empty otherwise.
    pub encodings: Vec<EncodingCapability>,
    /// Server-message capability records (Tight extension only).
    pub server_message_capabilities: Vec<EncodingCapability>,
    /// Client-message capability records (Tight extension only).
    pub client_message_capabilities: Vec<EncodingCapability>,
    /// Set when the server's encoding list could not be enumerated in full
    /// (truncated at the read cap) rather than genuinely being short.
    pub encodings_partial: bool,
}

/// The fully negotiated outcome of a successful handshake, handed to the
/// connection worker to seed its `Connected` state.
#[derive(Debug, Clone)]
pub struct HandshakeResult {
    /// Negotiated RFB version.
    pub version: RfbVersion,
    /// Framebuffer width as reported in `ServerInit`.
    pub framebuffer_width: u16,
    /// Framebuffer height as reported in `ServerInit`.
    pub framebuffer_height: u16,
    /// The server's native pixel format, before any `SetPixelFormat` override.
    pub default_pixel_format: PixelFormat,
    /// The pixel format this client asked the server to send from now on.
    pub communication_pixel_format: PixelFormat,
    /// Desktop name string, truncated to the hard cap.
    pub desktop_name: String,
    /// The security type actually negotiated.
    pub security_type: u8,
    /// Capabilities collected along the way.
    pub capabilities: ServerCapabilities,
}

/// Runs the full handshake over an already-connected `transport`.
///
/// # Errors
/// Any read/write failure, protocol violation, or authentication failure
/// surfaces as the corresponding [`VncError`] connect-phase variant.
pub async fn run(
    transport: &mut Transport,
    password: &[u8],
    shared_access: bool,
    quality: &QualityProfile,
    cancel: &Notify,
) -> Result<HandshakeResult> {
    let version = negotiate_version(transport, cancel).await?;
    let security_type = negotiate_security_type(transport, version, cancel).await?;

    run_security_handler(transport, security_type, password, cancel).await?;
    read_security_result(transport, version, security_type, cancel).await?;

    write_client_init(transport, shared_access).await?;
    let (framebuffer_width, framebuffer_height, default_pixel_format, desktop_name, mut capabilities) =
        read_server_init(transport, security_type, cancel).await?;
    capabilities.protocol_version_string = version.wire_string().to_string();
    capabilities.selected_security_type = security_type;

    let communication_pixel_format =
        derive_initial_pixel_format(quality, &default_pixel_format);

    write_set_pixel_format(transport, &communication_pixel_format).await?;
    write_set_encodings(transport).await?;

    info!(
        "handshake complete: {}x{} desktop \"{}\", security type {}",
        framebuffer_width, framebuffer_height, desktop_name, security_type
    );

    Ok(HandshakeResult {
        version,
        framebuffer_width,
        framebuffer_height,
        default_pixel_format,
        communication_pixel_format,
        desktop_name,
        security_type,
        capabilities,
    })
}

async fn negotiate_version(transport: &mut Transport, cancel: &Notify) -> Result<RfbVersion> {
    let mut line = [0u8; 12];
    transport.read_exact_cancellable(&mut line, cancel).await?;
    let version = RfbVersion::parse(&line).map_err(VncError::HandshakeProtocolError)?;
    transport.write_all(version.wire_string().as_bytes()).await?;
    Ok(version)
}

async fn negotiate_security_type(transport: &mut Transport, version: RfbVersion, cancel: &Notify) -> Result<u8> {
    match version {
        RfbVersion::V3_3 => {
            let mut buf = [0u8; 4];
            transport.read_exact_cancellable(&mut buf, cancel).await?;
            match u32::from_be_bytes(buf) {
                0 => {
                    let reason = read_length_prefixed_string(transport, limits::MAX_CUT_TEXT_LEN, cancel).await?;
                    Err(VncError::ServerRejectsConnection(reason))
                }
                1 => Ok(SECURITY_TYPE_NONE),
                2 => Ok(SECURITY_TYPE_VNC_AUTH),
                other => Err(VncError::HandshakeProtocolError(format!(
                    "server dictated unknown 3.3 security type {other}"
                ))),
            }
        }
        RfbVersion::V3_7 | RfbVersion::V3_8 => {
            let mut count_buf = [0u8; 1];
            transport.read_exact_cancellable(&mut count_buf, cancel).await?;
            let count = count_buf[0] as usize;
            if count == 0 {
                let reason = read_length_prefixed_string(transport, limits::MAX_CUT_TEXT_LEN, cancel).await?;
                return Err(VncError::ServerRejectsConnection(reason));
            }
            let count = count.min(limits::MAX_SECURITY_TYPES);
            let mut offered = vec![0u8; count];
            transport.read_exact_cancellable(&mut offered, cancel).await?;

            let chosen = SECURITY_TYPE_PREFERENCE
                .iter()
                .copied()
                .find(|pref| offered.contains(pref))
                .ok_or_else(|| {
                    VncError::HandshakeProtocolError(
                        "server offered no security type this client supports".to_string(),
                    )
                })?;
            transport.write_all(&[chosen]).await?;
            Ok(chosen)
        }
    }
}

async fn run_security_handler(
    transport: &mut Transport,
    security_type: u8,
    password: &[u8],
    cancel: &Notify,
) -> Result<()> {
    match security_type {
        SECURITY_TYPE_TIGHT => security::run_tight_negotiation(transport, password).await,
        SECURITY_TYPE_ANONYMOUS_TLS => security::run_anonymous_tls(transport).await,
        SECURITY_TYPE_VENCRYPT => security::run_vencrypt(transport).await,
        other => security::run_simple(transport, other, password, cancel).await,
    }
}

async fn read_security_result(
    transport: &mut Transport,
    version: RfbVersion,
    security_type: u8,
    cancel: &Notify,
) -> Result<()> {
    let sends_result = match version {
        RfbVersion::V3_8 => true,
        RfbVersion::V3_7 | RfbVersion::V3_3 => security_type != SECURITY_TYPE_NONE,
    };
    if !sends_result {
        return Ok(());
    }

    let mut buf = [0u8; 4];
    transport.read_exact_cancellable(&mut buf, cancel).await?;
    match u32::from_be_bytes(buf) {
        0 => Ok(()),
        1 => {
            let reason = if matches!(version, RfbVersion::V3_8) {
                read_length_prefixed_string(transport, limits::MAX_CUT_TEXT_LEN, cancel).await?
            } else {
                String::new()
            };
            Err(VncError::AuthenticationFailed(reason))
        }
        2 => Err(VncError::AuthenticationFailed("too many attempts".to_string())),
        other => Err(VncError::HandshakeProtocolError(format!(
            "unknown SecurityResult {other}"
        ))),
    }
}

async fn write_client_init(transport: &mut Transport, shared_access: bool) -> Result<()> {
    transport.write_all(&[u8::from(shared_access)]).await
}

type ServerInitOutcome = (u16, u16, PixelFormat, String, ServerCapabilities);

async fn read_server_init(transport: &mut Transport, security_type: u8, cancel: &Notify) -> Result<ServerInitOutcome> {
    let mut header = [0u8; 24];
    transport.read_exact_cancellable(&mut header, cancel).await?;
    let mut buf = BytesMut::from(&header[..]);

    let width = buf.get_u16();
    let height = buf.get_u16();
    let pixel_format = PixelFormat::read_from(&mut buf)?;
    let name_len = buf.get_u32() as usize;

    if !pixel_format.is_valid_for_receive() {
        return Err(VncError::HandshakeProtocolError(
            "server advertised an invalid pixel format".to_string(),
        ));
    }
    validate_framebuffer_size(width, height, pixel_format.bits_per_pixel)?;

    let name_len_capped = name_len.min(limits::MAX_DESKTOP_NAME_LEN);
    let mut name_bytes = vec![0u8; name_len_capped];
    transport.read_exact_cancellable(&mut name_bytes, cancel).await?;
    if name_len > name_len_capped {
        warn!("desktop name length {name_len} exceeds cap, truncating and discarding remainder");
        let mut discard = vec![0u8; name_len - name_len_capped];
        transport.read_exact_cancellable(&mut discard, cancel).await?;
    }
    let desktop_name = String::from_utf8_lossy(&name_bytes).into_owned();

    let mut capabilities = ServerCapabilities::default();

    if security_type == SECURITY_TYPE_TIGHT {
        let mut counts = [0u8; 6];
        transport.read_exact_cancellable(&mut counts, cancel).await?;
        let server_msg_count = u16::from_be_bytes([counts[0], counts[1]]) as usize;
        let client_msg_count = u16::from_be_bytes([counts[2], counts[3]]) as usize;
        let encoding_count = u16::from_be_bytes([counts[4], counts[5]]) as usize;

        capabilities.server_message_capabilities =
            read_capability_list(transport, server_msg_count, limits::MAX_TIGHT_MESSAGE_CAPS_READ, limits::MAX_TIGHT_MESSAGE_CAPS_STORED, cancel).await?;
        capabilities.client_message_capabilities =
            read_capability_list(transport, client_msg_count, limits::MAX_TIGHT_MESSAGE_CAPS_READ, limits::MAX_TIGHT_MESSAGE_CAPS_STORED, cancel).await?;
        capabilities.encodings =
            read_capability_list(transport, encoding_count, limits::MAX_ENCODING_TYPES_READ, limits::MAX_ENCODING_TYPES_STORED, cancel).await?;
        capabilities.encodings_partial = encoding_count > limits::MAX_ENCODING_TYPES_STORED;

        if !capabilities.encodings.iter().any(|e| e.code == ENCODING_RAW) {
            capabilities.encodings.push(EncodingCapability {
                code: ENCODING_RAW,
                vendor: *b"STDV",
                signature: *b"RAW_____",
            });
        }
    }

    Ok((width, height, pixel_format, desktop_name, capabilities))
}

async fn read_capability_list(
    transport: &mut Transport,
    count: usize,
    read_cap: usize,
    store_cap: usize,
    cancel: &Notify,
) -> Result<Vec<EncodingCapability>> {
    let to_read = count.min(read_cap);
    let mut stored = Vec::with_capacity(to_read.min(store_cap));
    for i in 0..to_read {
        let mut raw = [0u8; 16];
        transport.read_exact_cancellable(&mut raw, cancel).await?;
        if i < store_cap {
            let mut buf = BytesMut::from(&raw[..]);
            let code = buf.get_i32();
            let mut vendor = [0u8; 4];
            buf.copy_to_slice(&mut vendor);
            let mut signature = [0u8; 8];
            buf.copy_to_slice(&mut signature);
            stored.push(EncodingCapability { code, vendor, signature });
        }
    }
    if count > to_read {
        warn!("server declared {count} capability records, only {to_read} were read (hard cap)");
    }
    Ok(stored)
}

fn validate_framebuffer_size(width: u16, height: u16, bpp: u8) -> Result<()> {
    if u32::from(width) > limits::MAX_FRAMEBUFFER_DIMENSION
        || u32::from(height) > limits::MAX_FRAMEBUFFER_DIMENSION
    {
        return Err(VncError::HandshakeProtocolError(format!(
            "framebuffer {width}x{height} exceeds the maximum dimension"
        )));
    }
    let bytes = u64::from(width) * u64::from(height) * u64::from(bpp) / 8;
    if bytes > limits::MAX_FRAMEBUFFER_MEMORY {
        return Err(VncError::HandshakeProtocolError(format!(
            "framebuffer {width}x{height}@{bpp}bpp exceeds the memory cap"
        )));
    }
    Ok(())
}

fn derive_initial_pixel_format(quality: &QualityProfile, server_default: &PixelFormat) -> PixelFormat {
    match quality {
        QualityProfile::Low => PixelFormat::rgb332(),
        QualityProfile::Medium => PixelFormat::rgb565(),
        QualityProfile::Best => PixelFormat::xrgb8888(),
        QualityProfile::ServerDefault => {
            if server_default.is_palette_mode() {
                PixelFormat::fallback_for_bpp(server_default.bits_per_pixel)
            } else {
                *server_default
            }
        }
        QualityProfile::Custom(custom) => {
            if custom.is_valid_for_send() && !custom.is_palette_mode() {
                *custom
            } else {
                PixelFormat::fallback_for_bpp(custom.bits_per_pixel)
            }
        }
    }
}

async fn write_set_pixel_format(transport: &mut Transport, format: &PixelFormat) -> Result<()> {
    let mut buf = BytesMut::with_capacity(20);
    buf.put_u8(CLIENT_MSG_SET_PIXEL_FORMAT);
    buf.put_bytes(0, 3);
    format.write_to(&mut buf);
    transport.write_all(&buf).await
}

/// The hard-coded `SetEncodings` preference list. ZRLE is implemented by the
/// decoder pipeline but intentionally not advertised here (see `DESIGN.md`);
/// Raw must remain last, since it is the mandatory fallback.
const ENCODING_PREFERENCE: [i32; 7] = [
    ENCODING_CURSOR,
    ENCODING_COPYRECT,
    ENCODING_ZLIB,
    ENCODING_HEXTILE,
    ENCODING_CORRE,
    ENCODING_RRE,
    ENCODING_RAW,
];

async fn write_set_encodings(transport: &mut Transport) -> Result<()> {
    let mut buf = BytesMut::with_capacity(4 + ENCODING_PREFERENCE.len() * 4);
    buf.put_u8(CLIENT_MSG_SET_ENCODINGS);
    buf.put_u8(0);
    buf.put_u16(ENCODING_PREFERENCE.len() as u16);
    for encoding in ENCODING_PREFERENCE {
        buf.put_i32(encoding);
    }
    transport.write_all(&buf).await
}

async fn read_length_prefixed_string(transport: &mut Transport, cap: usize, cancel: &Notify) -> Result<String> {
    let mut len_buf = [0u8; 4];
    transport.read_exact_cancellable(&mut len_buf, cancel).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let capped = len.min(cap);
    let mut bytes = vec![0u8; capped];
    transport.read_exact_cancellable(&mut bytes, cancel).await?;
    if len > capped {
        let mut discard = vec![0u8; len - capped];
        transport.read_exact_cancellable(&mut discard, cancel).await?;
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
