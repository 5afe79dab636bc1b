//! AllSky-Core: SBIG AllSky 340 camera driver in Rust.
//!
//! This crate implements the AllSky 340 serial protocol: single-letter
//! commands sealed with a 7-bit checksum, exposure markers, and the
//! block-acknowledged image transfer.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Opcodes, checksums, command framing, acquisition parameters
//! - **Transport**: Byte-stream abstraction (serial port, mock)
//! - **Bus**: Transport events and the exclusive data listener slot
//! - **Channel**: Command/response exchanges over a transport
//! - **Acquisition**: Exposure and transfer listeners, abort handling
//! - **Camera**: High-level command API
//! - **Events**: Observer pattern for UI decoupling
//!
//! # Example
//!
//! ```no_run
//! use allsky_core::{AcquisitionParams, AllskyCamera, CameraConfig, FrameKind, ImageKind};
//!
//! let config = CameraConfig {
//!     device: "/dev/ttyUSB0".to_string(),
//!     ..Default::default()
//! };
//!
//! let mut camera = AllskyCamera::from_config(&config);
//! camera.open().expect("open failed");
//! camera.send_test().expect("camera not responding");
//!
//! let params = AcquisitionParams::new(ImageKind::Light, FrameKind::Full, 2.0);
//! let outcome = camera
//!     .acquire(&params, |progress| println!("{progress}"))
//!     .expect("acquisition failed");
//! if let Some(image) = outcome.into_image() {
//!     println!("{}x{} image, {} bytes", image.width, image.height, image.data.len());
//! }
//! ```

pub mod acquisition;
pub mod assembler;
pub mod bus;
pub mod camera;
pub mod channel;
pub mod config;
pub mod error;
pub mod events;
pub mod protocol;
pub mod transport;

// Re-exports for convenience
pub use acquisition::{AbortHandle, AcquisitionOutcome, Image};
pub use bus::{EventBus, EventKind, SubscriptionId, TransportEvent};
pub use camera::AllskyCamera;
pub use channel::{CommandChannel, ResponseArity};
pub use config::CameraConfig;
pub use error::CameraError;
pub use events::{CameraEvent, CameraObserver, LogLevel, ProgressEvent, TracingObserver};
pub use protocol::{
    AcquisitionParams, ChecksumPolicy, Command, FrameKind, ImageKind, SubframeParams,
};
pub use transport::{MockTransport, SerialTransport, Transport, TransportError};
