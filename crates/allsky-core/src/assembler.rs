//! Response assembler.
//!
//! Accumulates partial deliveries into one fixed-length buffer. The buffer
//! is handed out exactly once, the moment it is full, after which the
//! assembler is reset and can collect the next response of the same size.

use crate::error::CameraError;

#[derive(Debug, Clone)]
pub struct ResponseAssembler {
    total: usize,
    /// Leading byte still to be dropped. Consumed by the first delivery.
    skip_pending: bool,
    buf: Vec<u8>,
}

impl ResponseAssembler {
    /// Collect `total` bytes per response. With `skip_leading`, the first
    /// byte of the first delivery is dropped and not counted; later
    /// responses collected by the same assembler are not affected.
    pub fn new(total: usize, skip_leading: bool) -> Self {
        Self {
            total,
            skip_pending: skip_leading,
            buf: Vec::with_capacity(total),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Bytes still expected from the link for the current response.
    pub fn remaining(&self) -> usize {
        self.total - self.buf.len() + usize::from(self.skip_pending)
    }

    /// Feed one delivery.
    ///
    /// Returns the full buffer when this delivery completes it. A delivery
    /// reaching past the end of the buffer is a protocol error.
    pub fn push(&mut self, data: &[u8]) -> Result<Option<Vec<u8>>, CameraError> {
        if data.is_empty() {
            return Ok(None);
        }

        let payload = if self.skip_pending {
            self.skip_pending = false;
            &data[1..]
        } else {
            data
        };

        if self.buf.len() + payload.len() > self.total {
            let received = self.buf.len() + payload.len();
            self.reset();
            return Err(CameraError::Protocol(format!(
                "response overrun: expected {} bytes, received {}",
                self.total, received
            )));
        }
        self.buf.extend_from_slice(payload);

        if self.buf.len() == self.total {
            let full = std::mem::replace(&mut self.buf, Vec::with_capacity(self.total));
            return Ok(Some(full));
        }
        Ok(None)
    }

    /// Drop any partially collected response.
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragments_complete_once() {
        let mut asm = ResponseAssembler::new(6, false);
        assert_eq!(asm.push(b"ab").unwrap(), None);
        assert_eq!(asm.push(b"").unwrap(), None);
        assert_eq!(asm.push(b"c").unwrap(), None);
        assert_eq!(asm.remaining(), 3);
        assert_eq!(asm.push(b"def").unwrap(), Some(b"abcdef".to_vec()));
    }

    #[test]
    fn test_single_delivery() {
        let mut asm = ResponseAssembler::new(3, false);
        assert_eq!(asm.push(b"xyz").unwrap(), Some(b"xyz".to_vec()));
    }

    #[test]
    fn test_skip_leading_byte() {
        let mut asm = ResponseAssembler::new(3, true);
        assert_eq!(asm.remaining(), 4);
        assert_eq!(asm.push(b"#ab").unwrap(), None);
        assert_eq!(asm.remaining(), 1);
        assert_eq!(asm.push(b"c").unwrap(), Some(b"abc".to_vec()));
    }

    #[test]
    fn test_skip_leading_single_byte_delivery() {
        let mut asm = ResponseAssembler::new(2, true);
        assert_eq!(asm.push(b"#").unwrap(), None);
        assert_eq!(asm.push(b"ab").unwrap(), Some(b"ab".to_vec()));
    }

    #[test]
    fn test_reusable_after_completion() {
        let mut asm = ResponseAssembler::new(2, true);
        assert_eq!(asm.push(b"#ab").unwrap(), Some(b"ab".to_vec()));
        // Only the very first byte is skipped; later responses keep theirs
        assert_eq!(asm.remaining(), 2);
        assert_eq!(asm.push(b"c").unwrap(), None);
        assert_eq!(asm.push(b"d").unwrap(), Some(b"cd".to_vec()));
        assert_eq!(asm.push(b"ef").unwrap(), Some(b"ef".to_vec()));
    }

    #[test]
    fn test_overrun_is_an_error() {
        let mut asm = ResponseAssembler::new(2, false);
        assert!(matches!(asm.push(b"abc"), Err(CameraError::Protocol(_))));
        // State is clean afterwards
        assert_eq!(asm.push(b"ab").unwrap(), Some(b"ab".to_vec()));
    }
}
