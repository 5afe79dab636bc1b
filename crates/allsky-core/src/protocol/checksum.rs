//! Frame checksums.
//!
//! Command frames carry a trailing checksum computed by complementing each
//! byte, clearing the most significant bit and XOR-ing into an accumulator
//! that starts at zero for every frame. The camera acknowledges a command by
//! echoing that same checksum as the first byte of its reply.
//!
//! Image blocks use a plain XOR of the raw bytes instead.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CameraError;

/// Checksum of a command over raw bytes.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |cs, &b| cs ^ (!b & 0x7F))
}

/// Checksum of a command given as text, one character code per byte.
pub fn checksum_str(command: &str) -> u8 {
    command
        .chars()
        .fold(0u8, |cs, c| cs ^ ((!(c as u32) & 0x7F) as u8))
}

/// Write the checksum of `frame[..len - 1]` into the last slot of `frame`.
///
/// Returns the checksum, or `None` for an empty frame.
pub fn seal(frame: &mut [u8]) -> Option<u8> {
    let (last, body) = frame.split_last_mut()?;
    *last = checksum(body);
    Some(*last)
}

/// XOR of the raw bytes of an image block.
pub fn block_checksum(block: &[u8]) -> u8 {
    block.iter().fold(0u8, |cs, &b| cs ^ b)
}

/// What to do when a received checksum does not match.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumPolicy {
    /// Log the mismatch and deliver the data anyway.
    #[default]
    Lenient,
    /// Fail the exchange with [`CameraError::ChecksumMismatch`].
    Strict,
}

impl ChecksumPolicy {
    /// Compare `received` against `expected`.
    ///
    /// Returns `Ok(true)` on a match, `Ok(false)` on a tolerated mismatch.
    pub fn verify(
        self,
        context: &'static str,
        expected: u8,
        received: u8,
    ) -> Result<bool, CameraError> {
        if expected == received {
            return Ok(true);
        }
        warn!(
            context,
            expected = %format!("0x{:02X}", expected),
            received = %format!("0x{:02X}", received),
            "Checksum mismatch"
        );
        match self {
            ChecksumPolicy::Lenient => Ok(false),
            ChecksumPolicy::Strict => Err(CameraError::ChecksumMismatch {
                context,
                expected,
                received,
            }),
        }
    }
}

impl fmt::Display for ChecksumPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumPolicy::Lenient => write!(f, "lenient"),
            ChecksumPolicy::Strict => write!(f, "strict"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_checksum_is_zero() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum_str(""), 0);
        assert_eq!(block_checksum(&[]), 0);
    }

    #[test]
    fn test_single_byte() {
        // !'E' = 0xBA, masked to 0x3A
        assert_eq!(checksum(b"E"), 0x3A);
        assert_eq!(checksum_str("E"), 0x3A);
    }

    #[test]
    fn test_text_and_bytes_agree() {
        assert_eq!(checksum(b"g\x01"), checksum_str("g\x01"));
        assert_eq!(checksum(b"U\x00"), checksum_str("U\x00"));
    }

    #[test]
    fn test_high_bit_is_cleared() {
        for b in 0..=255u8 {
            assert!(checksum(&[b]) < 0x80);
        }
    }

    #[test]
    fn test_seal_is_deterministic() {
        let payload = [b'T', 0x01, 0x86, 0xA0, 0x00, 0x01];
        let mut frame = [0u8; 7];
        frame[..6].copy_from_slice(&payload);
        let cs = seal(&mut frame).unwrap();
        assert_eq!(frame[6], cs);
        assert_eq!(cs, checksum(&payload));
        // Re-sealing the same frame restarts from zero and gives the same result
        assert_eq!(seal(&mut frame), Some(cs));
    }

    #[test]
    fn test_seal_empty_frame() {
        assert_eq!(seal(&mut []), None);
    }

    #[test]
    fn test_block_checksum_is_plain_xor() {
        assert_eq!(block_checksum(&[0xFF, 0x0F]), 0xF0);
        assert_eq!(block_checksum(&[0x12, 0x12]), 0);
    }

    #[test]
    fn test_policy() {
        assert!(ChecksumPolicy::Lenient.verify("test", 1, 1).unwrap());
        assert!(!ChecksumPolicy::Lenient.verify("test", 1, 2).unwrap());
        assert!(matches!(
            ChecksumPolicy::Strict.verify("test", 1, 2),
            Err(CameraError::ChecksumMismatch {
                expected: 1,
                received: 2,
                ..
            })
        ));
    }
}
