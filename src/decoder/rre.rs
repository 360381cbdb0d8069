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

//! RRE (type 2) and CoRRE (type 4): a background colour plus a list of
//! solid-colour subrectangles. CoRRE is RRE with subrectangle bounds packed
//! into a single byte each instead of a uint16, capping its rectangle size
//! at 255x255.

use crate::error::{Result, VncError};
use crate::framebuffer::SharedSurfaces;
use crate::protocol::{limits, PixelFormat, RectangleHeader};
use crate::transport::Transport;
use crate::wire;

/// Decodes an RRE (`corre = false`) or CoRRE (`corre = true`) rectangle.
pub async fn decode(
    transport: &mut Transport,
    header: &RectangleHeader,
    format: &PixelFormat,
    surfaces: &SharedSurfaces,
    corre: bool,
) -> Result<()> {
    let bpp = wire::bytes_per_pixel(format);

    let mut count_buf = [0u8; 4];
    transport.read_exact(&mut count_buf).await?;
    let subrect_count = u32::from_be_bytes(count_buf);
    if subrect_count > limits::MAX_SUBRECT_COUNT {
        return Err(VncError::ProtocolError(format!(
            "RRE subrectangle count {subrect_count} exceeds the safety cap"
        )));
    }

    let mut bg_pixel = vec![0u8; bpp];
    transport.read_exact(&mut bg_pixel).await?;
    let bg_rgb = wire::unpack_pixel(&bg_pixel, format);

    let w = usize::from(header.width);
    let h = usize::from(header.height);
    let mut rgb = vec![0u8; w * h * 3];
    for pixel in rgb.chunks_exact_mut(3) {
        pixel.copy_from_slice(&bg_rgb);
    }

    let geometry_len = if corre { 4 } else { 8 };
    for _ in 0..subrect_count {
        let mut pixel = vec![0u8; bpp];
        transport.read_exact(&mut pixel).await?;
        let subrect_rgb = wire::unpack_pixel(&pixel, format);

        let mut geometry = vec![0u8; geometry_len];
        transport.read_exact(&mut geometry).await?;
        let (sx, sy, sw, sh) = if corre {
            (
                u16::from(geometry[0]),
                u16::from(geometry[1]),
                u16::from(geometry[2]),
                u16::from(geometry[3]),
            )
        } else {
            (
                u16::from_be_bytes([geometry[0], geometry[1]]),
                u16::from_be_bytes([geometry[2], geometry[3]]),
                u16::from_be_bytes([geometry[4], geometry[5]]),
                u16::from_be_bytes([geometry[6], geometry[7]]),
            )
        };

        if usize::from(sx) + usize::from(sw) > w || usize::from(sy) + usize::from(sh) > h {
            return Err(VncError::ProtocolError(
                "RRE/CoRRE subrectangle exceeds its parent rectangle".to_string(),
            ));
        }

        for row in 0..usize::from(sh) {
            let row_start = (usize::from(sy) + row) * w + usize::from(sx);
            for col in 0..usize::from(sw) {
                let offset = (row_start + col) * 3;
                rgb[offset..offset + 3].copy_from_slice(&subrect_rgb);
            }
        }
    }

    surfaces
        .framebuffer_mut()
        .write_rect(header.x, header.y, header.width, header.height, &rgb);
    Ok(())
}
