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

//! The CopyRect encoding (type 1): a source rectangle already present in the
//! framebuffer is copied to a new location, possibly overlapping.

use crate::error::{Result, VncError};
use crate::framebuffer::SharedSurfaces;
use crate::protocol::RectangleHeader;
use crate::transport::Transport;

/// Reads the 4-byte source coordinate pair and copies the rectangle.
pub async fn decode(
    transport: &mut Transport,
    header: &RectangleHeader,
    surfaces: &SharedSurfaces,
) -> Result<()> {
    let mut buf = [0u8; 4];
    transport.read_exact(&mut buf).await?;
    let src_x = u16::from_be_bytes([buf[0], buf[1]]);
    let src_y = u16::from_be_bytes([buf[2], buf[3]]);

    let mut fb = surfaces.framebuffer_mut();
    if u32::from(src_x) + u32::from(header.width) > u32::from(fb.width())
        || u32::from(src_y) + u32::from(header.height) > u32::from(fb.height())
    {
        return Err(VncError::ProtocolError(
            "CopyRect source rectangle lies outside the framebuffer".to_string(),
        ));
    }
    fb.copy_rect(src_x, src_y, header.x, header.y, header.width, header.height);
    Ok(())
}
