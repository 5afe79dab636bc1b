//! Camera error types.

use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("{context}: checksum mismatch, expected 0x{expected:02X}, received 0x{received:02X}")]
    ChecksumMismatch {
        context: &'static str,
        expected: u8,
        received: u8,
    },

    #[error("Test failed: answer should be 'O', received {received:?}")]
    TestFailed { received: String },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Listener slot is held by '{owner}'")]
    Busy { owner: &'static str },

    #[error("No data from camera for {idle_ms}ms")]
    Timeout { idle_ms: u64 },

    #[error("Protocol error: {0}")]
    Protocol(String),
}

pub type Result<T, E = CameraError> = std::result::Result<T, E>;
