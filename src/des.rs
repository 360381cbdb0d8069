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

//! VNC's DES challenge/response key schedule.
//!
//! RFB's "VNC Authentication" security type reuses DES but with a
//! non-standard key: each byte of the password is bit-reversed before it is
//! used as the DES key. This module isolates that quirk from the rest of the
//! security handler.

use cipher::{BlockEncrypt, KeyInit};
use des::Des;

/// Encrypts a 16-byte challenge with the VNC variant of DES keyed on `password`.
///
/// The password is truncated to 8 bytes (zero-padded if shorter); each byte's
/// bits are reversed before DES key setup. The two 8-byte halves of the
/// challenge are encrypted independently (DES-ECB, ignoring chaining) into
/// the matching halves of the 16-byte response.
#[must_use]
pub fn encrypt_challenge(challenge: &[u8; 16], password: &[u8]) -> [u8; 16] {
    let mut key_bytes = [0u8; 8];
    let len = password.len().min(8);
    for (i, &byte) in password[..len].iter().enumerate() {
        key_bytes[i] = reverse_bits(byte);
    }

    let cipher = Des::new_from_slice(&key_bytes).expect("DES key is always exactly 8 bytes");

    let mut response = [0u8; 16];
    for half in 0..2 {
        let mut block = cipher::generic_array::GenericArray::clone_from_slice(
            &challenge[half * 8..half * 8 + 8],
        );
        cipher.encrypt_block(&mut block);
        response[half * 8..half * 8 + 8].copy_from_slice(&block);
    }
    response
}

/// Reverses the bit order of a single byte, as VNC's DES variant requires.
fn reverse_bits(mut value: u8) -> u8 {
    let mut result = 0u8;
    for _ in 0..8 {
        result = (result << 1) | (value & 1);
        value >>= 1;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_bits_matches_manual_table() {
        assert_eq!(reverse_bits(0b0000_0001), 0b1000_0000);
        assert_eq!(reverse_bits(0b1111_0000), 0b0000_1111);
        assert_eq!(reverse_bits(0x00), 0x00);
        assert_eq!(reverse_bits(0xFF), 0xFF);
    }

    #[test]
    fn short_password_is_zero_padded() {
        let challenge = [0u8; 16];
        // Password shorter than 8 bytes must not panic and must be deterministic.
        let r1 = encrypt_challenge(&challenge, b"ab");
        let r2 = encrypt_challenge(&challenge, b"ab");
        assert_eq!(r1, r2);
    }

    #[test]
    fn different_passwords_give_different_responses() {
        let challenge = [1u8; 16];
        let r1 = encrypt_challenge(&challenge, b"password");
        let r2 = encrypt_challenge(&challenge, b"swordfish");
        assert_ne!(r1, r2);
    }
}
