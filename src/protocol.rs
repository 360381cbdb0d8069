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

//! VNC Remote Framebuffer (RFB) protocol constants and wire structures.
//!
//! This module provides the fundamental building blocks used by the
//! handshake driver, security handler and decoder pipeline: protocol version
//! strings, message type discriminants, encoding identifiers and the
//! [`PixelFormat`] wire structure.
//!
//! # Protocol Overview
//!
//! The RFB protocol, from the client's perspective, proceeds through:
//! 1. **Protocol Version** - client and server agree on a version string
//! 2. **Security Handshake** - authentication method selection and execution
//! 3. **Initialization** - exchange of framebuffer parameters and capabilities
//! 4. **Normal Operation** - ongoing message exchange for input events and screen updates

use bytes::{Buf, BufMut, BytesMut};
use std::io;

/// The highest RFB protocol version string this client will offer back to a server.
pub const PROTOCOL_VERSION_3_8: &str = "RFB 003.008\n";

/// Length in bytes of the RFB version handshake line, including the trailing newline.
pub const PROTOCOL_VERSION_STRING_LEN: usize = 12;

/// Default VNC port (display `:0`).
pub const DEFAULT_PORT: u16 = 5900;

/// Negotiated RFB protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfbVersion {
    /// RFB 3.3: security type is dictated by the server, no `SecurityResult` for `None`.
    V3_3,
    /// RFB 3.7: client picks from a list, no `SecurityResult` for `None`.
    V3_7,
    /// RFB 3.8 (or later, treated as 3.8): `SecurityResult` is always sent.
    V3_8,
}

impl RfbVersion {
    /// Parses the 12-byte `RFB xxx.yyy\n` line the server announces first.
    ///
    /// The `3.5` string is a known quirk emitted by some servers and is
    /// treated as a synonym for `3.3` (see `DESIGN.md`).
    pub fn parse(line: &[u8]) -> Result<Self, String> {
        if line.len() != PROTOCOL_VERSION_STRING_LEN {
            return Err(format!("version line has wrong length: {}", line.len()));
        }
        if &line[0..4] != b"RFB " || line[11] != b'\n' {
            return Err("malformed version line".to_string());
        }
        let major: u32 = std::str::from_utf8(&line[4..7])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| "malformed major version".to_string())?;
        let minor: u32 = std::str::from_utf8(&line[8..11])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| "malformed minor version".to_string())?;

        if major < 3 || (major == 3 && minor < 3) {
            return Err(format!("unsupported protocol version {major}.{minor}"));
        }
        if major == 3 && (minor == 3 || minor == 5) {
            // 3.5 is a known non-standard quirk some servers send; treat as 3.3.
            Ok(RfbVersion::V3_3)
        } else if major == 3 && minor == 7 {
            Ok(RfbVersion::V3_7)
        } else {
            Ok(RfbVersion::V3_8)
        }
    }

    /// The version string this client echoes back during the handshake.
    #[must_use]
    pub fn wire_string(self) -> &'static str {
        match self {
            RfbVersion::V3_3 => "RFB 003.003\n",
            RfbVersion::V3_7 => "RFB 003.007\n",
            RfbVersion::V3_8 => PROTOCOL_VERSION_3_8,
        }
    }

    /// Whether a `SecurityResult` message follows the `None` security type on this version.
    #[must_use]
    pub fn sends_security_result_for_none(self) -> bool {
        matches!(self, RfbVersion::V3_8)
    }
}

// Client-to-Server Message Types

/// Message type: Client requests to change the pixel format.
pub const CLIENT_MSG_SET_PIXEL_FORMAT: u8 = 0;
/// Message type: Client specifies supported encodings.
pub const CLIENT_MSG_SET_ENCODINGS: u8 = 2;
/// Message type: Client requests a framebuffer update.
pub const CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST: u8 = 3;
/// Message type: Client sends a keyboard event.
pub const CLIENT_MSG_KEY_EVENT: u8 = 4;
/// Message type: Client sends a pointer (mouse) event.
pub const CLIENT_MSG_POINTER_EVENT: u8 = 5;
/// Message type: Client sends cut text (clipboard data).
pub const CLIENT_MSG_CLIENT_CUT_TEXT: u8 = 6;

// Server-to-Client Message Types

/// Message type: Server sends a framebuffer update.
pub const SERVER_MSG_FRAMEBUFFER_UPDATE: u8 = 0;
/// Message type: Server sets colour map entries (parsed, never applied — see `DESIGN.md`).
pub const SERVER_MSG_SET_COLOUR_MAP_ENTRIES: u8 = 1;
/// Message type: Server sends a bell (beep) notification.
pub const SERVER_MSG_BELL: u8 = 2;
/// Message type: Server sends cut text (clipboard data).
pub const SERVER_MSG_SERVER_CUT_TEXT: u8 = 3;

// Encoding Types

/// Encoding type: Raw pixel data. The mandatory fallback.
pub const ENCODING_RAW: i32 = 0;
/// Encoding type: Copy Rectangle.
pub const ENCODING_COPYRECT: i32 = 1;
/// Encoding type: Rise-and-Run-length Encoding.
pub const ENCODING_RRE: i32 = 2;
/// Encoding type: Compact RRE.
pub const ENCODING_CORRE: i32 = 4;
/// Encoding type: Hextile.
pub const ENCODING_HEXTILE: i32 = 5;
/// Encoding type: Zlib compressed raw pixels.
pub const ENCODING_ZLIB: i32 = 6;
/// Encoding type: Zlib-compressed TRLE (ZRLE). Implemented but not advertised by default.
pub const ENCODING_ZRLE: i32 = 16;
/// Pseudo-encoding: Rich Cursor (cursor shape + hotspot).
pub const ENCODING_CURSOR: i32 = -239;

// Hextile subencoding flags

/// Hextile: Raw pixel data for this tile.
pub const HEXTILE_RAW: u8 = 1 << 0;
/// Hextile: Background color is specified.
pub const HEXTILE_BACKGROUND_SPECIFIED: u8 = 1 << 1;
/// Hextile: Foreground color is specified.
pub const HEXTILE_FOREGROUND_SPECIFIED: u8 = 1 << 2;
/// Hextile: Tile contains subrectangles.
pub const HEXTILE_ANY_SUBRECTS: u8 = 1 << 3;
/// Hextile: Subrectangles are colored (not monochrome).
pub const HEXTILE_SUBRECTS_COLOURED: u8 = 1 << 4;

// Security Types

/// Security type: Invalid/Unknown. Carries a reason string and terminates.
pub const SECURITY_TYPE_INVALID: u8 = 0;
/// Security type: None (no authentication).
pub const SECURITY_TYPE_NONE: u8 = 1;
/// Security type: VNC Authentication (DES challenge/response).
pub const SECURITY_TYPE_VNC_AUTH: u8 = 2;
/// Security type: RealVNC/TigerVNC "Tight" tunnel + auth capability negotiation.
pub const SECURITY_TYPE_TIGHT: u8 = 16;
/// Security type: VeNCrypt (real TLS tunnel, stubbed — see `DESIGN.md`).
pub const SECURITY_TYPE_VENCRYPT: u8 = 19;
/// Security type: anonymous-DH TLS tunnel (no certificate verification).
pub const SECURITY_TYPE_ANONYMOUS_TLS: u8 = 18;

/// The client's fixed security-type preference order, most to least preferred.
pub const SECURITY_TYPE_PREFERENCE: [u8; 5] = [
    SECURITY_TYPE_VENCRYPT,
    SECURITY_TYPE_ANONYMOUS_TLS,
    SECURITY_TYPE_NONE,
    SECURITY_TYPE_VNC_AUTH,
    SECURITY_TYPE_TIGHT,
];

// Security Results

/// Security result: Authentication successful.
pub const SECURITY_RESULT_OK: u32 = 0;
/// Security result: Authentication failed.
pub const SECURITY_RESULT_FAILED: u32 = 1;
/// Security result: too many failed attempts (Tight extension only).
pub const SECURITY_RESULT_TOO_MANY_ATTEMPTS: u32 = 2;

/// Hard limits the implementation must honour, mirroring the per-library
/// compile-time caps documented in the external interfaces section.
pub mod limits {
    /// Maximum accepted host name length.
    pub const MAX_HOSTNAME_LEN: usize = 255;
    /// Maximum accepted desktop name length.
    pub const MAX_DESKTOP_NAME_LEN: usize = 100 * 1024;
    /// Maximum accepted `ServerCutText` payload; longer text is truncated, not rejected.
    pub const MAX_CUT_TEXT_LEN: usize = 2 * 1024 * 1024;
    /// Maximum accepted password length.
    pub const MAX_PASSWORD_LEN: usize = 10 * 1024 * 1024;
    /// Maximum accepted framebuffer width or height.
    pub const MAX_FRAMEBUFFER_DIMENSION: u32 = 64 * 1024;
    /// Maximum accepted framebuffer memory footprint (width * height * bpp/8).
    pub const MAX_FRAMEBUFFER_MEMORY: u64 = 1024 * 1024 * 1024;
    /// Maximum number of encoding capability records retained in `ServerCapabilities`.
    pub const MAX_ENCODING_TYPES_STORED: usize = 100;
    /// Maximum number of encoding capability records read off the wire before truncating.
    pub const MAX_ENCODING_TYPES_READ: usize = 10_000;
    /// Maximum number of security types retained.
    pub const MAX_SECURITY_TYPES: usize = 255;
    /// Maximum number of Tight message-capability records retained (server or client side).
    pub const MAX_TIGHT_MESSAGE_CAPS_STORED: usize = 100;
    /// Maximum number of Tight message-capability records read off the wire before truncating.
    pub const MAX_TIGHT_MESSAGE_CAPS_READ: usize = 10_000;
    /// Maximum number of Tight tunnel or auth capability records accepted, before the
    /// negotiation is treated as a denial-of-service attempt and aborted.
    pub const MAX_TIGHT_NEGOTIATION_COUNT: usize = 1000;
    /// Maximum RRE/CoRRE subrectangle count accepted in a single rectangle.
    pub const MAX_SUBRECT_COUNT: u32 = 1_000_000;
    /// Maximum accepted zlib/ZRLE compressed block length.
    pub const MAX_COMPRESSED_BLOCK_LEN: u32 = 100 * 1024 * 1024;
}

/// Represents the pixel format of the VNC framebuffer, as exchanged in the
/// wire handshake (`ServerInit`) and in `SetPixelFormat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    /// Number of bits per pixel; one of 8, 16, 32.
    pub bits_per_pixel: u8,
    /// Depth of the pixel in bits; must not exceed `bits_per_pixel`.
    pub depth: u8,
    /// Flag indicating if the pixel data is big-endian (1) or little-endian (0).
    pub big_endian_flag: u8,
    /// Flag indicating if the pixel format is true-colour (1) or colormapped (0).
    pub true_colour_flag: u8,
    /// Maximum red color value.
    pub red_max: u16,
    /// Maximum green color value.
    pub green_max: u16,
    /// Maximum blue color value.
    pub blue_max: u16,
    /// Right-shift to apply to isolate the red color component.
    pub red_shift: u8,
    /// Right-shift to apply to isolate the green color component.
    pub green_shift: u8,
    /// Right-shift to apply to isolate the blue color component.
    pub blue_shift: u8,
}

impl PixelFormat {
    /// 8-bit RGB332: the `Low` quality profile preset.
    #[must_use]
    pub fn rgb332() -> Self {
        Self {
            bits_per_pixel: 8,
            depth: 8,
            big_endian_flag: 0,
            true_colour_flag: 1,
            red_max: 7,
            green_max: 7,
            blue_max: 3,
            red_shift: 0,
            green_shift: 3,
            blue_shift: 6,
        }
    }

    /// 16-bit RGB565: the `Medium` quality profile preset.
    #[must_use]
    pub fn rgb565() -> Self {
        Self {
            bits_per_pixel: 16,
            depth: 16,
            big_endian_flag: 0,
            true_colour_flag: 1,
            red_max: 31,
            green_max: 63,
            blue_max: 31,
            red_shift: 11,
            green_shift: 5,
            blue_shift: 0,
        }
    }

    /// 32-bit XRGB8888 (depth 24): the `Best` quality profile preset.
    #[must_use]
    pub fn xrgb8888() -> Self {
        Self {
            bits_per_pixel: 32,
            depth: 24,
            big_endian_flag: 0,
            true_colour_flag: 1,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 16,
            green_shift: 8,
            blue_shift: 0,
        }
    }

    /// The same-bpp preset to fall back to when a custom or server-echoed
    /// format is invalid or palette-mode (see `ServerDefault`/`Custom` profiles).
    #[must_use]
    pub fn fallback_for_bpp(bpp: u8) -> Self {
        match bpp {
            8 => Self::rgb332(),
            16 => Self::rgb565(),
            _ => Self::xrgb8888(),
        }
    }

    /// *valid-for-receive*: bpp in {8,16,32} and depth in (0, bpp].
    #[must_use]
    pub fn is_valid_for_receive(&self) -> bool {
        matches!(self.bits_per_pixel, 8 | 16 | 32) && self.depth > 0 && self.depth <= self.bits_per_pixel
    }

    /// *valid-for-send*: valid-for-receive, plus every shift below `depth`.
    #[must_use]
    pub fn is_valid_for_send(&self) -> bool {
        self.is_valid_for_receive()
            && (self.red_shift as u32) < self.depth as u32
            && (self.green_shift as u32) < self.depth as u32
            && (self.blue_shift as u32) < self.depth as u32
    }

    /// Whether this format declares itself palette/colour-mapped rather than true-colour.
    #[must_use]
    pub fn is_palette_mode(&self) -> bool {
        self.true_colour_flag == 0
    }

    /// Serializes this pixel format into the 16-byte RFB wire representation.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.bits_per_pixel);
        buf.put_u8(self.depth);
        buf.put_u8(self.big_endian_flag);
        buf.put_u8(self.true_colour_flag);
        buf.put_u16(self.red_max);
        buf.put_u16(self.green_max);
        buf.put_u16(self.blue_max);
        buf.put_u8(self.red_shift);
        buf.put_u8(self.green_shift);
        buf.put_u8(self.blue_shift);
        buf.put_bytes(0, 3); // padding
    }

    /// Parses a 16-byte RFB pixel format out of `buf`, advancing it.
    ///
    /// # Errors
    /// Returns an error if fewer than 16 bytes remain in `buf`.
    pub fn read_from(buf: &mut BytesMut) -> io::Result<Self> {
        if buf.len() < 16 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "not enough bytes for PixelFormat",
            ));
        }
        let pf = Self {
            bits_per_pixel: buf.get_u8(),
            depth: buf.get_u8(),
            big_endian_flag: buf.get_u8(),
            true_colour_flag: buf.get_u8(),
            red_max: buf.get_u16(),
            green_max: buf.get_u16(),
            blue_max: buf.get_u16(),
            red_shift: buf.get_u8(),
            green_shift: buf.get_u8(),
            blue_shift: buf.get_u8(),
        };
        buf.advance(3);
        Ok(pf)
    }
}

/// A parsed rectangle header from a `FramebufferUpdate` message: 12 bytes,
/// `{x, y, w, h}` as u16 followed by a signed 32-bit encoding identifier.
#[derive(Debug, Clone, Copy)]
pub struct RectangleHeader {
    /// X coordinate of the top-left corner.
    pub x: u16,
    /// Y coordinate of the top-left corner.
    pub y: u16,
    /// Width of the rectangle in pixels.
    pub width: u16,
    /// Height of the rectangle in pixels.
    pub height: u16,
    /// The encoding type used for this rectangle's pixel data.
    pub encoding: i32,
}

impl RectangleHeader {
    /// Byte length of an encoded rectangle header.
    pub const WIRE_LEN: usize = 12;

    /// Parses a 12-byte rectangle header out of `buf`, advancing it.
    pub fn read_from(buf: &mut BytesMut) -> Self {
        Self {
            x: buf.get_u16(),
            y: buf.get_u16(),
            width: buf.get_u16(),
            height: buf.get_u16(),
            encoding: buf.get_i32(),
        }
    }
}
