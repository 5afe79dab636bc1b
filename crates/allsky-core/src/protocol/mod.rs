//! Protocol module - AllSky 340 wire protocol definitions.

pub mod checksum;
pub mod command;
pub mod constants;
pub mod params;

pub use checksum::{ChecksumPolicy, block_checksum, checksum, checksum_str};
pub use command::{Command, Frame, SubframeParams};
pub use constants::*;
pub use params::{AcquisitionParams, FrameKind, ImageKind, ResolvedParams};
