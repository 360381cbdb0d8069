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

//! The decoder pipeline (component C5): reads one `FramebufferUpdate`
//! message, dispatching each rectangle to the decoder for its encoding.
//!
//! Each encoding's resumability comes for free from `async`/`await`: a
//! decoder is just an `async fn` that calls `Transport::read_exact` as it
//! needs more bytes, and the task naturally suspends and resumes at those
//! points rather than threading a hand-rolled `(buffer, len) -> consumed`
//! state machine through every call (see `DESIGN.md`). The only state that
//! must outlive a single rectangle is the zlib/ZRLE inflate streams, which
//! live in [`DecoderState`] and persist for the whole connection.

mod copyrect;
mod cursor;
mod hextile;
mod inflate;
mod raw;
mod rre;
mod zlib;
mod zrle;

use bytes::BytesMut;
use flate2::Decompress;

use crate::error::{Result, VncError};
use crate::events::EventSink;
use crate::framebuffer::SharedSurfaces;
use crate::protocol::{
    PixelFormat, RectangleHeader, ENCODING_CORRE, ENCODING_COPYRECT, ENCODING_CURSOR,
    ENCODING_HEXTILE, ENCODING_RAW, ENCODING_RRE, ENCODING_ZLIB, ENCODING_ZRLE,
};
use crate::transport::Transport;

/// Persistent decoder state that must survive across `FramebufferUpdate`
/// messages for the life of one connection: the zlib and ZRLE inflate
/// streams, each a continuous deflate stream the server never resets
/// mid-connection.
pub struct DecoderState {
    zlib: Decompress,
    zrle: Decompress,
}

impl Default for DecoderState {
    fn default() -> Self {
        Self::new()
    }
}

impl DecoderState {
    /// Creates fresh (empty) inflate streams.
    #[must_use]
    pub fn new() -> Self {
        Self { zlib: Decompress::new(true), zrle: Decompress::new(true) }
    }

    /// Drops both inflate streams' dictionaries; called on disconnect, since
    /// a fresh connection starts a fresh deflate stream.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Reads and fully processes one `FramebufferUpdate` message: the 4-byte
/// header, then each rectangle in turn. Framebuffer-affecting rectangles
/// push [`crate::events::Event::FramebufferUpdated`]; the cursor
/// pseudo-encoding pushes [`crate::events::Event::CursorUpdated`] instead.
/// Pushes exactly one [`crate::events::Event::FramebufferUpdateRequestFinished`]
/// once every rectangle has been processed.
pub async fn read_framebuffer_update(
    transport: &mut Transport,
    format: &PixelFormat,
    surfaces: &SharedSurfaces,
    events: &dyn EventSink,
    state: &mut DecoderState,
) -> Result<()> {
    let mut message_header = [0u8; 4];
    transport.read_exact(&mut message_header).await?;
    let rect_count = u16::from_be_bytes([message_header[2], message_header[3]]);

    let (fb_width, fb_height) = {
        let fb = surfaces.framebuffer_mut();
        (fb.width(), fb.height())
    };

    for _ in 0..rect_count {
        let mut header_bytes = [0u8; RectangleHeader::WIRE_LEN];
        transport.read_exact(&mut header_bytes).await?;
        let mut buf = BytesMut::from(&header_bytes[..]);
        let header = RectangleHeader::read_from(&mut buf);

        if header.encoding != ENCODING_CURSOR {
            validate_bounds(&header, fb_width, fb_height)?;
        }

        match header.encoding {
            ENCODING_RAW => raw::decode(transport, &header, format, surfaces).await?,
            ENCODING_COPYRECT => copyrect::decode(transport, &header, surfaces).await?,
            ENCODING_RRE => rre::decode(transport, &header, format, surfaces, false).await?,
            ENCODING_CORRE => rre::decode(transport, &header, format, surfaces, true).await?,
            ENCODING_HEXTILE => hextile::decode(transport, &header, format, surfaces).await?,
            ENCODING_ZLIB => zlib::decode(transport, &header, format, surfaces, &mut state.zlib).await?,
            ENCODING_ZRLE => zrle::decode(transport, &header, format, surfaces, &mut state.zrle).await?,
            ENCODING_CURSOR => {
                cursor::decode(transport, &header, format, surfaces, events).await?;
                continue;
            }
            other => return Err(VncError::UnsupportedEncoding(other)),
        }

        events.on_event(crate::events::Event::FramebufferUpdated {
            x: header.x,
            y: header.y,
            width: header.width,
            height: header.height,
        });
    }

    events.on_event(crate::events::Event::FramebufferUpdateRequestFinished);
    Ok(())
}

fn validate_bounds(header: &RectangleHeader, fb_width: u16, fb_height: u16) -> Result<()> {
    if u32::from(header.x) + u32::from(header.width) > u32::from(fb_width)
        || u32::from(header.y) + u32::from(header.height) > u32::from(fb_height)
    {
        return Err(VncError::ProtocolError(format!(
            "rectangle {{x={}, y={}, w={}, h={}}} exceeds the {}x{} framebuffer",
            header.x, header.y, header.width, header.height, fb_width, fb_height
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_bounds_rejects_overflow() {
        let header = RectangleHeader { x: 10, y: 0, width: 5, height: 1, encoding: ENCODING_RAW };
        assert!(validate_bounds(&header, 12, 10).is_err());
    }

    #[test]
    fn validate_bounds_accepts_exact_fit() {
        let header = RectangleHeader { x: 10, y: 0, width: 2, height: 1, encoding: ENCODING_RAW };
        assert!(validate_bounds(&header, 12, 10).is_ok());
    }
}
