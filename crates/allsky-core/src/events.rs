//! Event system for UI decoupling.
//!
//! Allows CLI/GUI front ends to subscribe to camera events without
//! tight coupling to the protocol logic.

use std::fmt;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Progress of an acquisition.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Exposure phase. Times are in milliseconds; `exposure_time` is the
    /// requested exposure rounded up to the marker period.
    Exposure {
        exposure_time: u64,
        elapsed_time: u64,
        percent: f64,
    },
    /// Transfer phase.
    Transfer {
        received_bytes: usize,
        total_bytes: usize,
        percent: f64,
    },
}

impl ProgressEvent {
    pub fn percent(&self) -> f64 {
        match self {
            ProgressEvent::Exposure { percent, .. } | ProgressEvent::Transfer { percent, .. } => {
                *percent
            }
        }
    }

    /// Percent clamped to 0..=100 for display.
    pub fn display_percent(&self) -> u8 {
        self.percent().clamp(0.0, 100.0).round() as u8
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::Exposure {
                exposure_time,
                elapsed_time,
                ..
            } => write!(
                f,
                "exposure {}/{} ms ({}%)",
                elapsed_time,
                exposure_time,
                self.display_percent()
            ),
            ProgressEvent::Transfer {
                received_bytes,
                total_bytes,
                ..
            } => write!(
                f,
                "transfer {}/{} bytes ({}%)",
                received_bytes,
                total_bytes,
                self.display_percent()
            ),
        }
    }
}

/// Events emitted by the camera driver.
#[derive(Debug, Clone)]
pub enum CameraEvent {
    /// Link opened.
    Opened,
    /// Link closed.
    Closed,
    /// Device went away.
    Disconnected,
    /// Transport reported an error.
    TransportError { message: String },
    /// Acquisition progress.
    Progress(ProgressEvent),
    /// Received checksum did not match.
    ChecksumMismatch {
        context: &'static str,
        expected: u8,
        received: u8,
    },
    /// Log message.
    Log { level: LogLevel, message: String },
    /// Packet sent/received.
    Packet {
        direction: PacketDirection,
        length: usize,
        data: Option<Vec<u8>>,
    },
}

/// Packet direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Host -> Camera
    Rx, // Camera -> Host
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Observer trait for receiving camera events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait CameraObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &CameraEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl CameraObserver for NullObserver {
    fn on_event(&self, _event: &CameraEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl CameraObserver for TracingObserver {
    fn on_event(&self, event: &CameraEvent) {
        match event {
            CameraEvent::Opened => tracing::info!("Link opened"),
            CameraEvent::Closed => tracing::info!("Link closed"),
            CameraEvent::Disconnected => tracing::warn!("Camera disconnected"),
            CameraEvent::TransportError { message } => {
                tracing::error!("Transport error: {}", message);
            }
            CameraEvent::Progress(progress) => {
                tracing::debug!(progress = %progress, "Progress");
            }
            CameraEvent::ChecksumMismatch {
                context,
                expected,
                received,
            } => {
                tracing::warn!(
                    context,
                    expected = %format!("0x{:02X}", expected),
                    received = %format!("0x{:02X}", received),
                    "Checksum error"
                );
            }
            CameraEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            CameraEvent::Packet {
                direction, length, ..
            } => {
                tracing::trace!(dir = %direction, len = length, "Packet");
            }
        }
    }
}
