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

//! Shared inflate-loop helper for the zlib and ZRLE decoders, both of which
//! run one continuous deflate stream for the life of the connection.

use flate2::{Decompress, FlushDecompress, Status};

use crate::error::{Result, VncError};

/// Inflates the entirety of `input` (a rectangle's declared compressed
/// bytes) and returns however many bytes that produced.
///
/// ZRLE's uncompressed size is not known up front — unlike the plain zlib
/// encoding, which always produces exactly `w*h*bpp` bytes, the tile stream's
/// size depends on which subencodings the server chose. The rectangle
/// boundary is therefore defined by the *compressed* length read off the
/// wire, not by a target output size: this function keeps feeding the
/// persistent stream until every byte of `input` has been consumed (or the
/// stream reports `StreamEnd`, which a continuous per-connection deflate
/// stream never does mid-session but is honoured defensively).
pub fn inflate_all(decompress: &mut Decompress, input: &[u8]) -> Result<Vec<u8>> {
    let start_in = decompress.total_in();
    let mut output = Vec::new();
    let mut chunk = vec![0u8; 16 * 1024];

    loop {
        let consumed_so_far = (decompress.total_in() - start_in) as usize;
        if consumed_so_far >= input.len() {
            break;
        }

        let produced_before = decompress.total_out();
        let status = decompress
            .decompress(&input[consumed_so_far..], &mut chunk, FlushDecompress::None)
            .map_err(|e| VncError::InvalidEncoding(format!("zlib inflate failed: {e}")))?;
        let produced = (decompress.total_out() - produced_before) as usize;
        output.extend_from_slice(&chunk[..produced]);

        let new_consumed = (decompress.total_in() - start_in) as usize;
        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => {
                if new_consumed == consumed_so_far && produced == 0 {
                    return Err(VncError::InvalidEncoding(
                        "zlib stream stalled before consuming its declared length".to_string(),
                    ));
                }
            }
        }
    }
    Ok(output)
}

/// Feeds `input` into `decompress` until `output` is completely filled,
/// tracking progress via the stream's cumulative counters so the persistent
/// dictionary carries over correctly between rectangles.
pub fn inflate_into(decompress: &mut Decompress, input: &[u8], output: &mut [u8]) -> Result<()> {
    let start_in = decompress.total_in();
    let start_out = decompress.total_out();
    let target = output.len() as u64;

    loop {
        let produced_so_far = decompress.total_out() - start_out;
        if produced_so_far >= target {
            break;
        }
        let consumed_so_far = (decompress.total_in() - start_in) as usize;
        if consumed_so_far > input.len() {
            return Err(VncError::ProtocolError(
                "zlib stream consumed more bytes than were supplied".to_string(),
            ));
        }

        let status = decompress
            .decompress(
                &input[consumed_so_far..],
                &mut output[produced_so_far as usize..],
                FlushDecompress::Sync,
            )
            .map_err(|e| VncError::InvalidEncoding(format!("zlib inflate failed: {e}")))?;

        let new_consumed = (decompress.total_in() - start_in) as usize;
        let new_produced = decompress.total_out() - start_out;

        match status {
            Status::Ok | Status::BufError => {
                if new_consumed == consumed_so_far && new_produced == produced_so_far {
                    return Err(VncError::InvalidEncoding(
                        "zlib stream stalled before producing the expected bytes".to_string(),
                    ));
                }
            }
            Status::StreamEnd => {
                if new_produced < target {
                    return Err(VncError::InvalidEncoding(
                        "zlib stream ended before producing the expected bytes".to_string(),
                    ));
                }
                break;
            }
        }
    }
    Ok(())
}
