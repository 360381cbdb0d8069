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

//! The ZRLE encoding (type 16): a uint32 compressed-length prefix, a
//! zlib-compressed stream tiled into 64x64 cells, each independently
//! raw, solid, palette-indexed, or run-length encoded.
//!
//! Implemented but not advertised in `SetEncodings` by default (see `DESIGN.md`).

use flate2::Decompress;

use crate::decoder::inflate::inflate_all;
use crate::error::{Result, VncError};
use crate::framebuffer::SharedSurfaces;
use crate::protocol::{limits, PixelFormat, RectangleHeader};
use crate::transport::Transport;
use crate::wire;

const TILE_SIZE: u16 = 64;

/// Decodes a ZRLE rectangle into the framebuffer using `stream`, the
/// connection's persistent inflate state (distinct from the plain zlib
/// encoding's stream).
pub async fn decode(
    transport: &mut Transport,
    header: &RectangleHeader,
    format: &PixelFormat,
    surfaces: &SharedSurfaces,
    stream: &mut Decompress,
) -> Result<()> {
    let mut len_buf = [0u8; 4];
    transport.read_exact(&mut len_buf).await?;
    let compressed_len = u32::from_be_bytes(len_buf);
    if compressed_len > limits::MAX_COMPRESSED_BLOCK_LEN {
        return Err(VncError::ProtocolError(format!(
            "ZRLE compressed block of {compressed_len} bytes exceeds the safety cap"
        )));
    }
    let mut compressed = vec![0u8; compressed_len as usize];
    transport.read_exact(&mut compressed).await?;

    // ZRLE's uncompressed tile stream has unpredictable length (RLE varies
    // with content), so the rectangle boundary is the compressed length read
    // off the wire, not a guessed output size: inflate until every declared
    // compressed byte is consumed.
    let uncompressed = inflate_all(stream, &compressed)?;

    let mut cursor = Cursor::new(&uncompressed);
    let mut fb = surfaces.framebuffer_mut();

    let mut y = 0u16;
    while y < header.height {
        let tile_h = TILE_SIZE.min(header.height - y);
        let mut x = 0u16;
        while x < header.width {
            let tile_w = TILE_SIZE.min(header.width - x);
            let rgb = decode_tile(&mut cursor, format, tile_w, tile_h)?;
            fb.write_rect(header.x + x, header.y + y, tile_w, tile_h, &rgb);
            x += tile_w;
        }
        y += tile_h;
    }
    Ok(())
}

/// A simple byte cursor into an in-memory inflated buffer.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.pos + len > self.data.len() {
            return Err(VncError::ProtocolError(
                "ZRLE tile stream ended unexpectedly".to_string(),
            ));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn take_one(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads a run-length encoded as a sequence of 255-valued bytes followed
    /// by a terminating byte strictly less than 255; total = sum + 1.
    fn take_run_length(&mut self) -> Result<u32> {
        let mut total: u32 = 0;
        loop {
            let byte = self.take_one()?;
            total += u32::from(byte);
            if byte != 255 {
                break;
            }
        }
        Ok(total + 1)
    }
}

fn palette_index_bits(palette_size: usize) -> u32 {
    match palette_size {
        2 => 1,
        3..=4 => 2,
        _ => 4,
    }
}

fn decode_tile(cursor: &mut Cursor, format: &PixelFormat, w: u16, h: u16) -> Result<Vec<u8>> {
    let subencoding = cursor.take_one()?;
    let cpixel_len = wire::cpixel_len(format);
    let w = usize::from(w);
    let h = usize::from(h);
    let mut rgb = vec![0u8; w * h * 3];

    match subencoding {
        0 => {
            for pixel in rgb.chunks_exact_mut(3) {
                let bytes = cursor.take(cpixel_len)?;
                pixel.copy_from_slice(&wire::unpack_cpixel(bytes, format));
            }
        }
        1 => {
            let bytes = cursor.take(cpixel_len)?;
            let solid = wire::unpack_cpixel(bytes, format);
            for pixel in rgb.chunks_exact_mut(3) {
                pixel.copy_from_slice(&solid);
            }
        }
        2..=16 => {
            let palette_size = usize::from(subencoding);
            let mut palette = Vec::with_capacity(palette_size);
            for _ in 0..palette_size {
                let bytes = cursor.take(cpixel_len)?;
                palette.push(wire::unpack_cpixel(bytes, format));
            }
            let bits = palette_index_bits(palette_size);
            let row_bytes = (w * bits as usize).div_ceil(8);
            for row in 0..h {
                let row_data = cursor.take(row_bytes)?;
                for col in 0..w {
                    let index = read_packed_index(row_data, col, bits as usize);
                    let colour = palette.get(index).copied().ok_or_else(|| {
                        VncError::ProtocolError("ZRLE palette index out of range".to_string())
                    })?;
                    let offset = (row * w + col) * 3;
                    rgb[offset..offset + 3].copy_from_slice(&colour);
                }
            }
        }
        128 => {
            let mut filled = 0usize;
            while filled < w * h {
                let bytes = cursor.take(cpixel_len)?;
                let colour = wire::unpack_cpixel(bytes, format);
                let run = cursor.take_run_length()? as usize;
                if filled + run > w * h {
                    return Err(VncError::ProtocolError(
                        "ZRLE plain-RLE run overruns its tile".to_string(),
                    ));
                }
                for i in 0..run {
                    let offset = (filled + i) * 3;
                    rgb[offset..offset + 3].copy_from_slice(&colour);
                }
                filled += run;
            }
        }
        130..=255 => {
            let palette_size = usize::from(subencoding - 128);
            let mut palette = Vec::with_capacity(palette_size);
            for _ in 0..palette_size {
                let bytes = cursor.take(cpixel_len)?;
                palette.push(wire::unpack_cpixel(bytes, format));
            }
            let mut filled = 0usize;
            while filled < w * h {
                let index_byte = cursor.take_one()?;
                let run = if index_byte & 0x80 != 0 {
                    cursor.take_run_length()? as usize
                } else {
                    1
                };
                let index = usize::from(index_byte & 0x7F);
                let colour = palette.get(index).copied().ok_or_else(|| {
                    VncError::ProtocolError("ZRLE palette-RLE index out of range".to_string())
                })?;
                if filled + run > w * h {
                    return Err(VncError::ProtocolError(
                        "ZRLE palette-RLE run overruns its tile".to_string(),
                    ));
                }
                for i in 0..run {
                    let offset = (filled + i) * 3;
                    rgb[offset..offset + 3].copy_from_slice(&colour);
                }
                filled += run;
            }
        }
        _ => {
            return Err(VncError::ProtocolError(format!(
                "ZRLE reserved subencoding {subencoding}"
            )));
        }
    }

    Ok(rgb)
}

fn read_packed_index(row: &[u8], col: usize, bits: usize) -> usize {
    match bits {
        1 => {
            let byte = row[col / 8];
            usize::from((byte >> (7 - col % 8)) & 0x01)
        }
        2 => {
            let byte = row[col / 4];
            usize::from((byte >> (6 - 2 * (col % 4))) & 0x03)
        }
        4 => {
            let byte = row[col / 2];
            if col % 2 == 0 {
                usize::from(byte >> 4)
            } else {
                usize::from(byte & 0x0F)
            }
        }
        _ => unreachable!("palette_index_bits only returns 1, 2 or 4"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_length_single_byte() {
        let data = [5u8];
        let mut cursor = Cursor::new(&data);
        assert_eq!(cursor.take_run_length().unwrap(), 6);
    }

    #[test]
    fn run_length_spans_255_bytes() {
        let data = [255u8, 10u8];
        let mut cursor = Cursor::new(&data);
        assert_eq!(cursor.take_run_length().unwrap(), 266);
    }

    #[test]
    fn palette_index_bits_thresholds() {
        assert_eq!(palette_index_bits(2), 1);
        assert_eq!(palette_index_bits(4), 2);
        assert_eq!(palette_index_bits(16), 4);
    }
}
