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

//! The quality profile a host picks before connecting: how much colour
//! fidelity to trade for bandwidth, realised as the pixel format this client
//! asks the server to send.

use crate::protocol::PixelFormat;

/// Selects the pixel format this client requests via `SetPixelFormat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityProfile {
    /// RGB332, 8 bits per pixel. Minimum bandwidth, lowest fidelity.
    Low,
    /// RGB565, 16 bits per pixel. A reasonable default over constrained links.
    Medium,
    /// XRGB8888 (depth 24), 32 bits per pixel. Full colour fidelity.
    Best,
    /// Echo whatever the server reported in `ServerInit`, falling back to a
    /// same-bpp preset if the server's format is palette-mode.
    ServerDefault,
    /// A host-supplied format, falling back to a same-bpp preset if it is
    /// not valid-for-send or is palette-mode.
    Custom(PixelFormat),
}

impl Default for QualityProfile {
    fn default() -> Self {
        QualityProfile::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_medium() {
        assert_eq!(QualityProfile::default(), QualityProfile::Medium);
    }
}
