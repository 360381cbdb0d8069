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

//! The Raw encoding (type 0): pixels in the negotiated wire format, with no
//! compression. The mandatory fallback every server must support.

use crate::error::Result;
use crate::framebuffer::SharedSurfaces;
use crate::protocol::{PixelFormat, RectangleHeader};
use crate::transport::Transport;
use crate::wire;

/// Reads `w*h` pixels from `transport` and writes them into the framebuffer.
pub async fn decode(
    transport: &mut Transport,
    header: &RectangleHeader,
    format: &PixelFormat,
    surfaces: &SharedSurfaces,
) -> Result<()> {
    let rgb = read_raw_rect(transport, header, format).await?;
    surfaces
        .framebuffer_mut()
        .write_rect(header.x, header.y, header.width, header.height, &rgb);
    Ok(())
}

/// Reads `w*h` raw pixels and unpacks them to an RGB888 buffer, without
/// writing anywhere; shared by the zlib/Hextile-raw-tile decoders.
pub async fn read_raw_rect(
    transport: &mut Transport,
    header: &RectangleHeader,
    format: &PixelFormat,
) -> Result<Vec<u8>> {
    let bpp = wire::bytes_per_pixel(format);
    let count = usize::from(header.width) * usize::from(header.height);
    let mut raw = vec![0u8; count * bpp];
    transport.read_exact(&mut raw).await?;
    let mut rgb = Vec::with_capacity(count * 3);
    wire::unpack_pixels_into(&raw, format, count, &mut rgb);
    Ok(rgb)
}
