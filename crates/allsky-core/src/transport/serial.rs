//! serialport-based transport implementation.

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, info, instrument};

use super::traits::{Transport, TransportError};

/// Serial port transport.
pub struct SerialTransport {
    device: String,
    baud_rate: u32,
    poll_interval: Duration,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Create a closed transport for `device`.
    pub fn new(device: impl Into<String>, baud_rate: u32, poll_interval: Duration) -> Self {
        Self {
            device: device.into(),
            baud_rate,
            poll_interval,
            port: None,
        }
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, TransportError> {
        self.port.as_mut().ok_or(TransportError::NotOpen)
    }
}

impl Transport for SerialTransport {
    #[instrument(level = "info", skip(self), fields(device = %self.device, baud = self.baud_rate))]
    fn open(&mut self) -> Result<(), TransportError> {
        if self.port.is_some() {
            return Ok(());
        }
        info!("Opening serial port");
        let port = serialport::new(&self.device, self.baud_rate)
            .timeout(self.poll_interval)
            .open()
            .map_err(|e| TransportError::OpenFailed {
                device: self.device.clone(),
                message: e.to_string(),
            })?;
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.port.take().is_some() {
            info!(device = %self.device, "Serial port closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    #[instrument(skip(self, data), fields(len = data.len()))]
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let port = self.port()?;
        port.write_all(data).map_err(|e| match e.kind() {
            ErrorKind::BrokenPipe | ErrorKind::NotConnected => TransportError::Disconnected,
            _ => TransportError::WriteFailed(e.to_string()),
        })?;
        Ok(data.len())
    }

    fn drain(&mut self) -> Result<(), TransportError> {
        let port = self.port()?;
        port.flush()
            .map_err(|e| TransportError::DrainFailed(e.to_string()))?;
        debug!("Drain complete");
        Ok(())
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let port = self.port()?;
        let mut buf = vec![0u8; max_len];
        match port.read(&mut buf) {
            Ok(0) => Err(TransportError::Disconnected),
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Err(TransportError::Disconnected),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> String {
        format!("{}@{}", self.device, self.baud_rate)
    }
}
