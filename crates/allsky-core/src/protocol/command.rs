//! Command encoding.
//!
//! Every command is one ASCII opcode, an optional fixed-size payload and a
//! trailing checksum. The only exception is the raw block acknowledgment
//! sent during image transfer, which goes out as a single bare byte.

use std::fmt;

use byteorder::{BigEndian, ByteOrder};

use super::checksum::seal;
use super::constants::*;

/// Subframe location and size.
///
/// Each field is a 32-bit integer truncated to its low 16 bits on the wire
/// (only the low byte for `size`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubframeParams {
    pub x_start: i32,
    pub y_start: i32,
    pub size: i32,
}

/// A command understood by the camera.
///
/// `DefineSubframe` and `StopTransfer` share the `'S'` opcode but are kept
/// apart here so the two meanings can never be confused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Test,
    FirmwareVersion,
    SerialNumber,
    Heater(bool),
    Chopper(bool),
    OpenShutter,
    CloseShutter,
    DeEnergize,
    Abort,
    DefineSubframe(SubframeParams),
    StopTransfer,
    TakeImage {
        exposure_ticks: u32,
        frame_code: u8,
        image_code: u8,
    },
    TransferImage,
    BlockAck,
}

impl Command {
    pub fn opcode(&self) -> u8 {
        match self {
            Command::Test => OP_TEST,
            Command::FirmwareVersion => OP_FIRMWARE_VERSION,
            Command::SerialNumber => OP_SERIAL_NUMBER,
            Command::Heater(_) => OP_HEATER,
            Command::Chopper(_) => OP_CHOPPER,
            Command::OpenShutter => OP_OPEN_SHUTTER,
            Command::CloseShutter => OP_CLOSE_SHUTTER,
            Command::DeEnergize => OP_DE_ENERGIZE,
            Command::Abort => OP_ABORT,
            Command::DefineSubframe(_) | Command::StopTransfer => OP_SUBFRAME_OR_STOP,
            Command::TakeImage { .. } => OP_TAKE_IMAGE,
            Command::TransferImage => OP_TRANSFER_IMAGE,
            Command::BlockAck => BLOCK_ACK,
        }
    }

    /// Encode into the bytes actually written to the link.
    pub fn encode(&self) -> Frame {
        if let Command::BlockAck = self {
            return Frame {
                bytes: vec![BLOCK_ACK],
                checksum: None,
            };
        }

        let mut bytes = vec![self.opcode()];
        match *self {
            Command::Heater(on) | Command::Chopper(on) => bytes.push(on as u8),
            Command::DefineSubframe(params) => {
                let mut field = [0u8; 2];
                BigEndian::write_u16(&mut field, params.x_start as u16);
                bytes.extend_from_slice(&field);
                BigEndian::write_u16(&mut field, params.y_start as u16);
                bytes.extend_from_slice(&field);
                bytes.push(params.size as u8);
            }
            Command::TakeImage {
                exposure_ticks,
                frame_code,
                image_code,
            } => {
                let mut ticks = [0u8; 4];
                BigEndian::write_u32(&mut ticks, exposure_ticks.min(MAX_EXPOSURE_TICKS));
                bytes.extend_from_slice(&ticks[1..]);
                bytes.push(frame_code);
                bytes.push(image_code);
            }
            _ => {}
        }

        bytes.push(0);
        let checksum = seal(&mut bytes);
        Frame { bytes, checksum }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Test => "TEST",
            Command::FirmwareVersion => "FIRMWARE_VERSION",
            Command::SerialNumber => "SERIAL_NUMBER",
            Command::Heater(true) => "HEATER_ON",
            Command::Heater(false) => "HEATER_OFF",
            Command::Chopper(true) => "CHOP_ON",
            Command::Chopper(false) => "CHOP_OFF",
            Command::OpenShutter => "OPEN_SHUTTER",
            Command::CloseShutter => "CLOSE_SHUTTER",
            Command::DeEnergize => "DE_ENERGIZE",
            Command::Abort => "ABORT",
            Command::DefineSubframe(_) => "DEFINE_SUBFRAME",
            Command::StopTransfer => "STOP_TRANSFER",
            Command::TakeImage { .. } => "TAKE_IMAGE",
            Command::TransferImage => "TRANSFER_IMAGE",
            Command::BlockAck => "BLOCK_ACK",
        };
        write!(f, "{}", name)
    }
}

/// An encoded command, ready for the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
    checksum: Option<u8>,
}

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Checksum stored in the last byte, if the frame carries one.
    pub fn checksum(&self) -> Option<u8> {
        self.checksum
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame(")?;
        for (i, b) in self.bytes.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02X}", b)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::checksum::{checksum, checksum_str};

    #[test]
    fn test_simple_frame() {
        let frame = Command::Test.encode();
        assert_eq!(frame.as_bytes(), &[b'E', checksum_str("E")]);
        assert_eq!(frame.checksum(), Some(checksum(b"E")));
    }

    #[test]
    fn test_switch_payload() {
        assert_eq!(
            Command::Heater(true).encode().as_bytes(),
            &[b'g', 1, checksum(b"g\x01")]
        );
        assert_eq!(
            Command::Chopper(false).encode().as_bytes(),
            &[b'U', 0, checksum(b"U\x00")]
        );
    }

    #[test]
    fn test_subframe_layout() {
        let frame = Command::DefineSubframe(SubframeParams {
            x_start: 0x0102,
            y_start: 0x0304,
            size: 100,
        })
        .encode();
        let bytes = frame.as_bytes();
        assert_eq!(bytes.len(), 7);
        assert_eq!(&bytes[..6], &[b'S', 0x01, 0x02, 0x03, 0x04, 100]);
        assert_eq!(bytes[6], checksum(&bytes[..6]));
    }

    #[test]
    fn test_subframe_truncates_to_16_bits() {
        let frame = Command::DefineSubframe(SubframeParams {
            x_start: 0x0012_3456,
            y_start: -1,
            size: 0x1FF,
        })
        .encode();
        assert_eq!(&frame.as_bytes()[1..6], &[0x34, 0x56, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_take_image_layout() {
        let frame = Command::TakeImage {
            exposure_ticks: 10_000,
            frame_code: FULL_FRAME_CODE,
            image_code: LIGHT_IMAGE_CODE,
        }
        .encode();
        let bytes = frame.as_bytes();
        assert_eq!(bytes.len(), 7);
        assert_eq!(&bytes[..6], &[b'T', 0x00, 0x27, 0x10, 0, 1]);
        assert_eq!(frame.checksum(), Some(checksum(&bytes[..6])));
    }

    #[test]
    fn test_stop_and_subframe_share_opcode() {
        assert_eq!(Command::StopTransfer.opcode(), OP_SUBFRAME_OR_STOP);
        assert_ne!(
            Command::StopTransfer,
            Command::DefineSubframe(SubframeParams {
                x_start: 0,
                y_start: 0,
                size: 0
            })
        );
        assert_eq!(Command::StopTransfer.encode().len(), 2);
    }

    #[test]
    fn test_block_ack_is_bare() {
        let frame = Command::BlockAck.encode();
        assert_eq!(frame.as_bytes(), b"K");
        assert_eq!(frame.checksum(), None);
        // The de-energize command shares the byte but is framed
        assert_eq!(Command::DeEnergize.encode().len(), 2);
    }
}
