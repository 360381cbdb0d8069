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

//! The Hextile encoding (type 5): the rectangle is tiled into 16x16 cells,
//! each either raw pixels or a background fill plus a list of monochrome or
//! coloured subrectangles. Background and foreground colours persist across
//! cells within one rectangle when a cell omits them.

use crate::error::{Result, VncError};
use crate::framebuffer::SharedSurfaces;
use crate::protocol::{
    PixelFormat, RectangleHeader, HEXTILE_ANY_SUBRECTS, HEXTILE_BACKGROUND_SPECIFIED,
    HEXTILE_FOREGROUND_SPECIFIED, HEXTILE_RAW, HEXTILE_SUBRECTS_COLOURED,
};
use crate::transport::Transport;
use crate::wire;

const TILE_SIZE: u16 = 16;

/// Decodes a Hextile rectangle, tile by tile, directly into the framebuffer.
pub async fn decode(
    transport: &mut Transport,
    header: &RectangleHeader,
    format: &PixelFormat,
    surfaces: &SharedSurfaces,
) -> Result<()> {
    let bpp = wire::bytes_per_pixel(format);
    let mut background = [0u8; 3];
    let mut foreground = [0u8; 3];

    let mut y = 0u16;
    while y < header.height {
        let tile_h = TILE_SIZE.min(header.height - y);
        let mut x = 0u16;
        while x < header.width {
            let tile_w = TILE_SIZE.min(header.width - x);
            decode_tile(
                transport,
                format,
                bpp,
                tile_w,
                tile_h,
                &mut background,
                &mut foreground,
                header,
                x,
                y,
                surfaces,
            )
            .await?;
            x += tile_w;
        }
        y += tile_h;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn decode_tile(
    transport: &mut Transport,
    format: &PixelFormat,
    bpp: usize,
    tile_w: u16,
    tile_h: u16,
    background: &mut [u8; 3],
    foreground: &mut [u8; 3],
    header: &RectangleHeader,
    tile_x: u16,
    tile_y: u16,
    surfaces: &SharedSurfaces,
) -> Result<()> {
    let mut subencoding_buf = [0u8; 1];
    transport.read_exact(&mut subencoding_buf).await?;
    let subencoding = subencoding_buf[0];

    let w = usize::from(tile_w);
    let h = usize::from(tile_h);

    if subencoding & HEXTILE_RAW != 0 {
        let count = w * h;
        let mut raw = vec![0u8; count * bpp];
        transport.read_exact(&mut raw).await?;
        let mut rgb = Vec::with_capacity(count * 3);
        wire::unpack_pixels_into(&raw, format, count, &mut rgb);
        surfaces
            .framebuffer_mut()
            .write_rect(header.x + tile_x, header.y + tile_y, tile_w, tile_h, &rgb);
        return Ok(());
    }

    if subencoding & HEXTILE_FOREGROUND_SPECIFIED != 0 && subencoding & HEXTILE_SUBRECTS_COLOURED != 0 {
        return Err(VncError::ProtocolError(
            "Hextile tile sets both ForegroundSpecified and SubrectsColoured".to_string(),
        ));
    }

    if subencoding & HEXTILE_BACKGROUND_SPECIFIED != 0 {
        let mut pixel = vec![0u8; bpp];
        transport.read_exact(&mut pixel).await?;
        *background = wire::unpack_pixel(&pixel, format);
    }
    if subencoding & HEXTILE_FOREGROUND_SPECIFIED != 0 {
        let mut pixel = vec![0u8; bpp];
        transport.read_exact(&mut pixel).await?;
        *foreground = wire::unpack_pixel(&pixel, format);
    }

    let mut rgb = vec![0u8; w * h * 3];
    for pixel in rgb.chunks_exact_mut(3) {
        pixel.copy_from_slice(background);
    }

    if subencoding & HEXTILE_ANY_SUBRECTS != 0 {
        let mut count_buf = [0u8; 1];
        transport.read_exact(&mut count_buf).await?;
        let subrect_count = count_buf[0];
        let coloured = subencoding & HEXTILE_SUBRECTS_COLOURED != 0;

        for _ in 0..subrect_count {
            let colour = if coloured {
                let mut pixel = vec![0u8; bpp];
                transport.read_exact(&mut pixel).await?;
                wire::unpack_pixel(&pixel, format)
            } else {
                *foreground
            };

            let mut geometry = [0u8; 2];
            transport.read_exact(&mut geometry).await?;
            let sx = usize::from(geometry[0] >> 4);
            let sy = usize::from(geometry[0] & 0x0F);
            let sw = usize::from(geometry[1] >> 4) + 1;
            let sh = usize::from(geometry[1] & 0x0F) + 1;

            if sx + sw > w || sy + sh > h {
                return Err(VncError::ProtocolError(
                    "Hextile subrectangle exceeds its tile".to_string(),
                ));
            }

            for row in 0..sh {
                let row_start = (sy + row) * w + sx;
                for col in 0..sw {
                    let offset = (row_start + col) * 3;
                    rgb[offset..offset + 3].copy_from_slice(&colour);
                }
            }
        }
    }

    surfaces
        .framebuffer_mut()
        .write_rect(header.x + tile_x, header.y + tile_y, tile_w, tile_h, &rgb);
    Ok(())
}
