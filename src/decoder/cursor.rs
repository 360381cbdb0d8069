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

//! The Rich Cursor pseudo-encoding (-239): pixel data in the negotiated
//! format plus a 1-bit-per-pixel, row-padded-to-byte alpha mask. A `w=h=0`
//! rectangle clears the cursor.

use crate::error::Result;
use crate::events::{Event, EventSink};
use crate::framebuffer::SharedSurfaces;
use crate::protocol::{PixelFormat, RectangleHeader};
use crate::transport::Transport;
use crate::wire;

/// Reads the cursor image and mask (the rectangle header's `{x, y}` carry
/// the hotspot for this pseudo-encoding), publishes it to the cursor buffer,
/// and queues a [`Event::CursorUpdated`].
pub async fn decode(
    transport: &mut Transport,
    header: &RectangleHeader,
    format: &PixelFormat,
    surfaces: &SharedSurfaces,
    events: &dyn EventSink,
) -> Result<()> {
    let w = header.width;
    let h = header.height;

    if w == 0 || h == 0 {
        surfaces.cursor_mut().set(0, 0, 0, 0, Vec::new());
        events.on_event(Event::CursorUpdated);
        return Ok(());
    }

    let bpp = wire::bytes_per_pixel(format);
    let pixel_count = usize::from(w) * usize::from(h);
    let mut pixel_bytes = vec![0u8; pixel_count * bpp];
    transport.read_exact(&mut pixel_bytes).await?;

    let mask_row_bytes = usize::from(w).div_ceil(8);
    let mut mask = vec![0u8; mask_row_bytes * usize::from(h)];
    transport.read_exact(&mut mask).await?;

    let mut rgba = Vec::with_capacity(pixel_count * 4);
    for row in 0..usize::from(h) {
        for col in 0..usize::from(w) {
            let px_offset = (row * usize::from(w) + col) * bpp;
            let rgb = wire::unpack_pixel(&pixel_bytes[px_offset..px_offset + bpp], format);
            let mask_byte = mask[row * mask_row_bytes + col / 8];
            let alpha = if mask_byte & (0x80 >> (col % 8)) != 0 { 0xFF } else { 0x00 };
            rgba.extend_from_slice(&rgb);
            rgba.push(alpha);
        }
    }

    surfaces.cursor_mut().set(w, h, header.x, header.y, rgba);
    events.on_event(Event::CursorUpdated);
    Ok(())
}
