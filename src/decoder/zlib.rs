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

//! The zlib encoding (type 6): a uint32 compressed-length prefix followed by
//! that many bytes of zlib-compressed raw pixel data. The deflate stream
//! persists for the life of the connection.

use flate2::Decompress;

use crate::decoder::inflate::inflate_into;
use crate::error::{Result, VncError};
use crate::framebuffer::SharedSurfaces;
use crate::protocol::{limits, PixelFormat, RectangleHeader};
use crate::transport::Transport;
use crate::wire;

/// Decodes a zlib rectangle into the framebuffer using `stream`, the
/// connection's persistent inflate state.
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
            "zlib compressed block of {compressed_len} bytes exceeds the safety cap"
        )));
    }

    let mut compressed = vec![0u8; compressed_len as usize];
    transport.read_exact(&mut compressed).await?;

    let bpp = wire::bytes_per_pixel(format);
    let count = usize::from(header.width) * usize::from(header.height);
    let mut raw = vec![0u8; count * bpp];
    inflate_into(stream, &compressed, &mut raw)?;

    let mut rgb = Vec::with_capacity(count * 3);
    wire::unpack_pixels_into(&raw, format, count, &mut rgb);
    surfaces
        .framebuffer_mut()
        .write_rect(header.x, header.y, header.width, header.height, &rgb);
    Ok(())
}
