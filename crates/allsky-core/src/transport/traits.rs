//! Byte-stream transport abstraction.
//!
//! Defines the `Transport` trait for the camera link,
//! allowing different implementations (serial port, mock, etc.).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to open {device}: {message}")]
    OpenFailed { device: String, message: String },

    #[error("Transport is not open")]
    NotOpen,

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Drain failed: {0}")]
    DrainFailed(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstract byte-stream link to the camera.
///
/// This trait enables:
/// - Production implementation using the `serialport` crate
/// - Mock implementation for unit testing
pub trait Transport: Send {
    /// Open the link. Opening an already open link succeeds.
    fn open(&mut self) -> Result<(), TransportError>;

    /// Close the link. Closing a closed link succeeds.
    fn close(&mut self) -> Result<(), TransportError>;

    fn is_open(&self) -> bool;

    /// Queue raw bytes for transmission.
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Block until every written byte has left the output buffer.
    fn drain(&mut self) -> Result<(), TransportError>;

    /// Read up to `max_len` bytes.
    ///
    /// Returns an empty buffer when nothing arrived within the poll interval.
    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError>;

    /// Human readable name of the link, for logs.
    fn name(&self) -> String;
}
