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

//! The wire codec (component C1): stateless big-endian integer helpers and
//! pixel-unpack routines that turn a byte run in a negotiated [`PixelFormat`]
//! into RGB888 triples for the framebuffer.
//!
//! These are hot paths exercised once per pixel by every raw-pixel-bearing
//! encoding (Raw, Hextile raw tiles, ZRLE CPixel runs, RRE/CoRRE subrect
//! colours); correctness and predictable branching matter more here than
//! micro-optimisation.

use crate::protocol::PixelFormat;

/// Number of bytes one pixel occupies on the wire in `format`.
#[must_use]
pub fn bytes_per_pixel(format: &PixelFormat) -> usize {
    format.bits_per_pixel as usize / 8
}

/// Unpacks a single pixel's raw bytes (`format.bits_per_pixel / 8` of them,
/// native endianness as declared by `format.big_endian_flag`) into an RGB888
/// triple.
///
/// If any channel's `max` is zero, that channel's output byte is zero
/// (a palette-mode format with no true-colour channels decodes to black).
#[must_use]
pub fn unpack_pixel(pixel: &[u8], format: &PixelFormat) -> [u8; 3] {
    let raw = read_pixel_value(pixel, format);
    let r_raw = (raw >> format.red_shift) & format.red_max as u32;
    let g_raw = (raw >> format.green_shift) & format.green_max as u32;
    let b_raw = (raw >> format.blue_shift) & format.blue_max as u32;
    [
        scale_component(r_raw, format.red_max),
        scale_component(g_raw, format.green_max),
        scale_component(b_raw, format.blue_max),
    ]
}

/// Reads the raw, un-shifted pixel value out of its wire bytes, normalising
/// endianness to host order.
fn read_pixel_value(pixel: &[u8], format: &PixelFormat) -> u32 {
    match format.bits_per_pixel {
        8 => u32::from(pixel[0]),
        16 => {
            let bytes = [pixel[0], pixel[1]];
            if format.big_endian_flag != 0 {
                u32::from(u16::from_be_bytes(bytes))
            } else {
                u32::from(u16::from_le_bytes(bytes))
            }
        }
        32 => {
            let bytes = [pixel[0], pixel[1], pixel[2], pixel[3]];
            if format.big_endian_flag != 0 {
                u32::from_be_bytes(bytes)
            } else {
                u32::from_le_bytes(bytes)
            }
        }
        _ => u32::from(pixel[0]),
    }
}

/// Scales a component from its format-specific range (`0..=max`) to 8-bit
/// (`0..=255`), rounding to the nearest integer as the wire codec requires
/// (`round(channel * 255 / max)`), not truncating.
#[inline]
#[must_use]
pub fn scale_component(value: u32, max: u16) -> u8 {
    if max == 0 {
        return 0;
    }
    if max == 255 {
        return value as u8;
    }
    let numerator = u64::from(value) * 255 + u64::from(max) / 2;
    (numerator / u64::from(max)) as u8
}

/// Packs an RGB888 triple into the given pixel format's native byte width,
/// used only to build outbound `SetPixelFormat`-compatible test fixtures and
/// the cursor pseudo-encoding's RGBA conversion. Not used on the hot decode
/// path (decode only ever unpacks).
#[must_use]
pub fn pack_pixel(rgb: [u8; 3], format: &PixelFormat) -> Vec<u8> {
    let r = downscale_component(rgb[0], format.red_max);
    let g = downscale_component(rgb[1], format.green_max);
    let b = downscale_component(rgb[2], format.blue_max);
    let value = (u32::from(r) << format.red_shift)
        | (u32::from(g) << format.green_shift)
        | (u32::from(b) << format.blue_shift);

    match format.bits_per_pixel {
        8 => vec![value as u8],
        16 => {
            let v = value as u16;
            if format.big_endian_flag != 0 {
                v.to_be_bytes().to_vec()
            } else {
                v.to_le_bytes().to_vec()
            }
        }
        32 => {
            if format.big_endian_flag != 0 {
                value.to_be_bytes().to_vec()
            } else {
                value.to_le_bytes().to_vec()
            }
        }
        _ => vec![value as u8],
    }
}

#[inline]
fn downscale_component(value: u8, max: u16) -> u16 {
    if max == 0 {
        return 0;
    }
    if max == 255 {
        return u16::from(value);
    }
    ((u32::from(value) * u32::from(max)) / 255) as u16
}

/// How a 32-bit pixel value maps onto ZRLE's 3-byte "CPixel" wire form; see
/// [`cpixel_layout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CPixelLayout {
    /// `bits_per_pixel` is not 32 (or depth exceeds 24): no CPixel shrinkage applies.
    Full,
    /// All colour bits fit in the low 24 bits; the wire form drops the high byte.
    DropHighByte,
    /// All colour bits fit in the high 24 bits; the wire form drops the low byte.
    DropLowByte,
}

/// Determines whether `format` qualifies for ZRLE's CPixel shrinkage and, if
/// so, which byte is omitted from the wire form.
#[must_use]
pub fn cpixel_layout(format: &PixelFormat) -> CPixelLayout {
    if format.bits_per_pixel != 32 || format.depth > 24 {
        return CPixelLayout::Full;
    }
    let used_mask = (u32::from(format.red_max) << format.red_shift)
        | (u32::from(format.green_max) << format.green_shift)
        | (u32::from(format.blue_max) << format.blue_shift);
    if used_mask & 0xFF00_0000 == 0 {
        CPixelLayout::DropHighByte
    } else if used_mask & 0x0000_00FF == 0 {
        CPixelLayout::DropLowByte
    } else {
        CPixelLayout::Full
    }
}

/// The number of wire bytes one ZRLE CPixel occupies in `format`.
#[must_use]
pub fn cpixel_len(format: &PixelFormat) -> usize {
    match cpixel_layout(format) {
        CPixelLayout::Full => bytes_per_pixel(format),
        CPixelLayout::DropHighByte | CPixelLayout::DropLowByte => 3,
    }
}

/// Unpacks one ZRLE CPixel (`cpixel_len(format)` bytes) into RGB888.
#[must_use]
pub fn unpack_cpixel(bytes: &[u8], format: &PixelFormat) -> [u8; 3] {
    let layout = cpixel_layout(format);
    if layout == CPixelLayout::Full {
        return unpack_pixel(bytes, format);
    }
    let unused_index = match (format.big_endian_flag != 0, layout) {
        (true, CPixelLayout::DropHighByte) => 0,
        (true, CPixelLayout::DropLowByte) => 3,
        (false, CPixelLayout::DropHighByte) => 3,
        (false, CPixelLayout::DropLowByte) => 0,
        (_, CPixelLayout::Full) => unreachable!(),
    };
    let mut wire = [0u8; 4];
    let mut src = bytes.iter();
    for (i, slot) in wire.iter_mut().enumerate() {
        if i == unused_index {
            continue;
        }
        *slot = *src.next().expect("cpixel has exactly 3 bytes");
    }
    unpack_pixel(&wire, format)
}

/// Unpacks a contiguous run of `count` pixels from `src` (each
/// `bytes_per_pixel(format)` bytes wide) into RGB888 triples, appending them
/// to `dst` in order.
pub fn unpack_pixels_into(src: &[u8], format: &PixelFormat, count: usize, dst: &mut Vec<u8>) {
    let bpp = bytes_per_pixel(format);
    dst.reserve(count * 3);
    for i in 0..count {
        let px = &src[i * bpp..i * bpp + bpp];
        let rgb = unpack_pixel(px, format);
        dst.extend_from_slice(&rgb);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpack_rgb565_pure_red() {
        let format = PixelFormat::rgb565();
        // red=31 (max) << 11 = 0xF800, little-endian bytes.
        let bytes = 0xF800u16.to_le_bytes();
        let rgb = unpack_pixel(&bytes, &format);
        assert_eq!(rgb, [255, 0, 0]);
    }

    #[test]
    fn unpack_xrgb8888_round_trip() {
        let format = PixelFormat::xrgb8888();
        let packed = pack_pixel([10, 200, 77], &format);
        let rgb = unpack_pixel(&packed, &format);
        assert_eq!(rgb, [10, 200, 77]);
    }

    #[test]
    fn zero_max_channel_decodes_to_zero() {
        let mut format = PixelFormat::xrgb8888();
        format.blue_max = 0;
        let rgb = unpack_pixel(&[0xFF, 0xFF, 0xFF, 0xFF], &format);
        assert_eq!(rgb[2], 0);
    }

    #[test]
    fn scale_component_rounds_nearest() {
        // 15 * 255 / 31 = 123.387 -> rounds to 123
        assert_eq!(scale_component(15, 31), 123);
        assert_eq!(scale_component(0, 31), 0);
        assert_eq!(scale_component(31, 31), 255);
    }

    #[test]
    fn cpixel_layout_for_standard_xrgb8888() {
        let format = PixelFormat::xrgb8888();
        assert_eq!(cpixel_layout(&format), CPixelLayout::DropHighByte);
        assert_eq!(cpixel_len(&format), 3);
    }

    #[test]
    fn cpixel_roundtrip_matches_full_pixel() {
        let format = PixelFormat::xrgb8888();
        let full = pack_pixel([10, 20, 30], &format);
        // Drop the high (unused) wire byte to build the CPixel form.
        let cpixel = [full[0], full[1], full[2]];
        assert_eq!(unpack_cpixel(&cpixel, &format), [10, 20, 30]);
    }

    #[test]
    fn cpixel_layout_full_when_bpp_not_32() {
        let format = PixelFormat::rgb565();
        assert_eq!(cpixel_layout(&format), CPixelLayout::Full);
        assert_eq!(cpixel_len(&format), 2);
    }
}
