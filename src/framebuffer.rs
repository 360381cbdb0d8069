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

//! The framebuffer and cursor buffers: the two pieces of decoded state the
//! worker writes and the host reads through a *scoped acquisition*.
//!
//! Both live behind one [`std::sync::Mutex`] inside [`SharedSurfaces`]; the
//! host's `acquire_framebuffer`/`acquire_cursor` return RAII guards
//! ([`FramebufferGuard`], [`CursorGuard`]) that hold the lock for their
//! lifetime and release it in `Drop`, so there is no `release_*` call to
//! forget (see `DESIGN.md`).

use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard};

/// The decoded framebuffer: always 24-bit RGB888 internally regardless of the
/// wire pixel format negotiated with the server.
#[derive(Debug, Clone)]
pub struct Framebuffer {
    width: u16,
    height: u16,
    /// `width * height * 3` bytes, row-major, no padding.
    bytes: Vec<u8>,
    /// Incremented on every write; lets a host detect whether anything
    /// changed between two acquisitions without comparing pixels.
    sequence: u64,
}

impl Framebuffer {
    /// Creates a zero-filled framebuffer of the given dimensions.
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        let len = usize::from(width) * usize::from(height) * 3;
        Self { width, height, bytes: vec![0u8; len], sequence: 0 }
    }

    /// Replaces the framebuffer contents entirely (on a `DesktopSize` change,
    /// were it implemented) or on first allocation after `ServerInit`.
    pub fn resize(&mut self, width: u16, height: u16) {
        let len = usize::from(width) * usize::from(height) * 3;
        self.width = width;
        self.height = height;
        self.bytes = vec![0u8; len];
        self.sequence += 1;
    }

    /// Framebuffer width in pixels.
    #[must_use]
    pub fn width(&self) -> u16 {
        self.width
    }

    /// Framebuffer height in pixels.
    #[must_use]
    pub fn height(&self) -> u16 {
        self.height
    }

    /// The monotonic update sequence number, incremented on every write.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// The full RGB888 buffer, row-major.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Writes `rgb` (exactly `w*h*3` bytes) into the rectangle at `(x, y, w,
    /// h)`. The caller (the decoder pipeline) is responsible for having
    /// already validated `x + w <= width && y + h <= height`.
    pub fn write_rect(&mut self, x: u16, y: u16, w: u16, h: u16, rgb: &[u8]) {
        debug_assert_eq!(rgb.len(), usize::from(w) * usize::from(h) * 3);
        let stride = usize::from(self.width) * 3;
        let row_len = usize::from(w) * 3;
        for row in 0..usize::from(h) {
            let dst_offset = (usize::from(y) + row) * stride + usize::from(x) * 3;
            let src_offset = row * row_len;
            self.bytes[dst_offset..dst_offset + row_len]
                .copy_from_slice(&rgb[src_offset..src_offset + row_len]);
        }
        self.sequence += 1;
    }

    /// Copies a rectangle of already-decoded pixels from `(src_x, src_y)` to
    /// `(x, y)`, both `w x h`, handling overlapping source/destination
    /// regions correctly (the CopyRect encoding aliases within one buffer).
    pub fn copy_rect(&mut self, src_x: u16, src_y: u16, x: u16, y: u16, w: u16, h: u16) {
        let stride = usize::from(self.width) * 3;
        let row_len = usize::from(w) * 3;
        let mut rows: Vec<Vec<u8>> = Vec::with_capacity(usize::from(h));
        for row in 0..usize::from(h) {
            let src_offset = (usize::from(src_y) + row) * stride + usize::from(src_x) * 3;
            rows.push(self.bytes[src_offset..src_offset + row_len].to_vec());
        }
        for (row, pixels) in rows.into_iter().enumerate() {
            let dst_offset = (usize::from(y) + row) * stride + usize::from(x) * 3;
            self.bytes[dst_offset..dst_offset + row_len].copy_from_slice(&pixels);
        }
        self.sequence += 1;
    }
}

/// The decoded cursor shape, delivered via the Rich Cursor pseudo-encoding.
#[derive(Debug, Clone)]
pub struct Cursor {
    valid: bool,
    width: u16,
    height: u16,
    hotspot_x: u16,
    hotspot_y: u16,
    /// `width * height * 4` bytes, row-major RGBA.
    rgba: Vec<u8>,
    sequence: u64,
}

impl Default for Cursor {
    fn default() -> Self {
        Self { valid: false, width: 0, height: 0, hotspot_x: 0, hotspot_y: 0, rgba: Vec::new(), sequence: 0 }
    }
}

impl Cursor {
    /// Whether a cursor shape is currently set. `false` after a `w=h=0`
    /// cursor rectangle, meaning "no cursor".
    #[must_use]
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Cursor width in pixels.
    #[must_use]
    pub fn width(&self) -> u16 {
        self.width
    }

    /// Cursor height in pixels.
    #[must_use]
    pub fn height(&self) -> u16 {
        self.height
    }

    /// Cursor hotspot, relative to the top-left corner of the cursor image.
    #[must_use]
    pub fn hotspot(&self) -> (u16, u16) {
        (self.hotspot_x, self.hotspot_y)
    }

    /// The RGBA pixel buffer, empty when `valid()` is false.
    #[must_use]
    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    /// The monotonic update sequence number.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Replaces the cursor shape. `width == 0 || height == 0` clears it.
    pub fn set(&mut self, width: u16, height: u16, hotspot_x: u16, hotspot_y: u16, rgba: Vec<u8>) {
        if width == 0 || height == 0 {
            self.valid = false;
            self.width = 0;
            self.height = 0;
            self.hotspot_x = 0;
            self.hotspot_y = 0;
            self.rgba.clear();
        } else {
            self.valid = true;
            self.width = width;
            self.height = height;
            self.hotspot_x = hotspot_x;
            self.hotspot_y = hotspot_y;
            self.rgba = rgba;
        }
        self.sequence += 1;
    }
}

/// The framebuffer and cursor, behind the one mutex both the worker and the
/// host's scoped acquisitions take.
pub struct SharedSurfaces {
    framebuffer: Mutex<Framebuffer>,
    cursor: Mutex<Cursor>,
}

impl SharedSurfaces {
    /// Allocates a new pair of surfaces for a freshly negotiated framebuffer size.
    #[must_use]
    pub fn new(width: u16, height: u16) -> Arc<Self> {
        Arc::new(Self {
            framebuffer: Mutex::new(Framebuffer::new(width, height)),
            cursor: Mutex::new(Cursor::default()),
        })
    }

    /// Takes the framebuffer lock for writing (worker side only).
    pub fn framebuffer_mut(&self) -> MutexGuard<'_, Framebuffer> {
        self.framebuffer.lock().expect("framebuffer mutex poisoned")
    }

    /// Takes the cursor lock for writing (worker side only).
    pub fn cursor_mut(&self) -> MutexGuard<'_, Cursor> {
        self.cursor.lock().expect("cursor mutex poisoned")
    }
}

/// An RAII scoped acquisition of the framebuffer: `Deref`s to [`Framebuffer`]
/// and releases the lock when dropped. Returned by `Context::acquire_framebuffer`.
pub struct FramebufferGuard<'a> {
    guard: MutexGuard<'a, Framebuffer>,
}

impl<'a> FramebufferGuard<'a> {
    pub(crate) fn new(guard: MutexGuard<'a, Framebuffer>) -> Self {
        Self { guard }
    }
}

impl Deref for FramebufferGuard<'_> {
    type Target = Framebuffer;

    fn deref(&self) -> &Framebuffer {
        &self.guard
    }
}

/// An RAII scoped acquisition of the cursor buffer. See [`FramebufferGuard`].
pub struct CursorGuard<'a> {
    guard: MutexGuard<'a, Cursor>,
}

impl<'a> CursorGuard<'a> {
    pub(crate) fn new(guard: MutexGuard<'a, Cursor>) -> Self {
        Self { guard }
    }
}

impl Deref for CursorGuard<'_> {
    type Target = Cursor;

    fn deref(&self) -> &Cursor {
        &self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_rect_places_pixels_at_offset() {
        let mut fb = Framebuffer::new(4, 2);
        let rgb = vec![1, 2, 3, 4, 5, 6];
        fb.write_rect(1, 1, 2, 1, &rgb);
        let stride = 4 * 3;
        let offset = stride + 3;
        assert_eq!(&fb.bytes()[offset..offset + 6], &rgb[..]);
        assert_eq!(fb.sequence(), 1);
    }

    #[test]
    fn copy_rect_handles_overlap() {
        let mut fb = Framebuffer::new(4, 1);
        fb.write_rect(0, 0, 4, 1, &[1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4]);
        fb.copy_rect(0, 0, 1, 0, 3, 1);
        assert_eq!(fb.bytes(), &[1, 1, 1, 1, 1, 1, 2, 2, 2, 3, 3, 3]);
    }

    #[test]
    fn cursor_zero_size_clears_validity() {
        let mut cursor = Cursor::default();
        cursor.set(2, 2, 0, 0, vec![0u8; 16]);
        assert!(cursor.valid());
        cursor.set(0, 0, 0, 0, vec![]);
        assert!(!cursor.valid());
    }
}
