//! Acquisition parameters and their resolution into wire values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::constants::*;
use crate::error::CameraError;

/// What the sensor integrates during the exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Dark,
    Light,
    /// Light minus dark. Forces a binned frame.
    Auto,
}

impl ImageKind {
    pub fn code(&self) -> u8 {
        match self {
            ImageKind::Dark => DARK_IMAGE_CODE,
            ImageKind::Light => LIGHT_IMAGE_CODE,
            ImageKind::Auto => AUTO_IMAGE_CODE,
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageKind::Dark => write!(f, "dark"),
            ImageKind::Light => write!(f, "light"),
            ImageKind::Auto => write!(f, "auto"),
        }
    }
}

impl FromStr for ImageKind {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dark" => Ok(ImageKind::Dark),
            "light" => Ok(ImageKind::Light),
            "auto" => Ok(ImageKind::Auto),
            other => Err(CameraError::InvalidParameter(format!(
                "unknown image kind '{}'",
                other
            ))),
        }
    }
}

/// Readout geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Full,
    Crop,
    Binned,
    /// Square subframe previously placed with `define_subframe`.
    Custom,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameKind::Full => write!(f, "full"),
            FrameKind::Crop => write!(f, "crop"),
            FrameKind::Binned => write!(f, "binned"),
            FrameKind::Custom => write!(f, "custom"),
        }
    }
}

impl FromStr for FrameKind {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(FrameKind::Full),
            "crop" => Ok(FrameKind::Crop),
            "binned" => Ok(FrameKind::Binned),
            "custom" => Ok(FrameKind::Custom),
            other => Err(CameraError::InvalidParameter(format!(
                "unknown frame kind '{}'",
                other
            ))),
        }
    }
}

/// Parameters of one image acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionParams {
    pub image_kind: ImageKind,
    pub frame_kind: FrameKind,
    /// Subframe edge in pixels, only used with [`FrameKind::Custom`].
    pub subframe_size: Option<u32>,
    pub exposure_seconds: f64,
}

impl AcquisitionParams {
    pub fn new(image_kind: ImageKind, frame_kind: FrameKind, exposure_seconds: f64) -> Self {
        Self {
            image_kind,
            frame_kind,
            subframe_size: None,
            exposure_seconds,
        }
    }

    pub fn with_subframe_size(mut self, size: u32) -> Self {
        self.subframe_size = Some(size);
        self
    }

    /// Resolve into the values the exposure and transfer phases work with.
    pub fn resolve(&self) -> Result<ResolvedParams, CameraError> {
        if !self.exposure_seconds.is_finite() || self.exposure_seconds < 0.0 {
            return Err(CameraError::InvalidParameter(format!(
                "exposure must be a non-negative number of seconds, got {}",
                self.exposure_seconds
            )));
        }

        let frame_kind = match self.image_kind {
            ImageKind::Auto => FrameKind::Binned,
            _ => self.frame_kind,
        };

        let (width, height, block_count, frame_code) = match frame_kind {
            FrameKind::Full => (FULL_WIDTH, FULL_HEIGHT, FULL_BLOCKS, FULL_FRAME_CODE),
            FrameKind::Crop => (CROP_WIDTH, CROP_HEIGHT, CROP_BLOCKS, CROP_FRAME_CODE),
            FrameKind::Binned => (
                BINNED_WIDTH,
                BINNED_HEIGHT,
                BINNED_BLOCKS,
                BINNED_FRAME_CODE,
            ),
            FrameKind::Custom => {
                let size = self.subframe_size.unwrap_or(MAX_SUBFRAME_SIZE);
                if size == 0 || size > MAX_SUBFRAME_SIZE {
                    return Err(CameraError::InvalidParameter(format!(
                        "subframe size must be within 1..={}, got {}",
                        MAX_SUBFRAME_SIZE, size
                    )));
                }
                (size, size, size, CUSTOM_FRAME_CODE)
            }
        };

        Ok(ResolvedParams {
            image_kind: self.image_kind,
            frame_kind,
            width,
            height,
            block_count,
            frame_code,
            image_code: self.image_kind.code(),
            exposure_ticks: exposure_ticks(self.exposure_seconds),
            exposure_seconds: self.exposure_seconds,
        })
    }
}

/// Convert seconds to 100 µs ticks, clamped to what the camera accepts.
pub fn exposure_ticks(seconds: f64) -> u32 {
    let ticks = seconds * EXPOSURE_TICKS_PER_SECOND;
    if ticks >= MAX_EXPOSURE_TICKS as f64 {
        MAX_EXPOSURE_TICKS
    } else if ticks > 0.0 {
        ticks as u32
    } else {
        0
    }
}

/// Acquisition parameters resolved into wire values and frame geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedParams {
    pub image_kind: ImageKind,
    /// Effective frame kind (`auto` images are always binned).
    pub frame_kind: FrameKind,
    pub width: u32,
    pub height: u32,
    pub block_count: u32,
    pub frame_code: u8,
    pub image_code: u8,
    pub exposure_ticks: u32,
    pub exposure_seconds: f64,
}

impl ResolvedParams {
    /// Payload bytes in one transfer block.
    pub fn block_bytes(&self) -> usize {
        BYTES_PER_PIXEL * self.block_count as usize
    }

    /// Number of blocks the camera sends.
    pub fn blocks_expected(&self) -> usize {
        (self.width as usize * self.height as usize) / self.block_count as usize
    }

    /// Total image payload in bytes.
    pub fn total_bytes(&self) -> usize {
        self.blocks_expected() * self.block_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_frame() {
        let p = AcquisitionParams::new(ImageKind::Light, FrameKind::Full, 1.0)
            .resolve()
            .unwrap();
        assert_eq!((p.width, p.height, p.block_count), (640, 480, 4096));
        assert_eq!(p.frame_code, 0);
        assert_eq!(p.image_code, 1);
        assert_eq!(p.exposure_ticks, 10_000);
        assert_eq!(p.blocks_expected(), 75);
        assert_eq!(p.block_bytes(), 8192);
        assert_eq!(p.total_bytes(), 640 * 480 * 2);
    }

    #[test]
    fn test_exposure_is_clamped() {
        let p = AcquisitionParams::new(ImageKind::Dark, FrameKind::Full, 1000.0)
            .resolve()
            .unwrap();
        assert_eq!(p.exposure_ticks, 0x63FFFF);
        assert_eq!(exposure_ticks(0.0), 0);
    }

    #[test]
    fn test_auto_forces_binned() {
        let p = AcquisitionParams::new(ImageKind::Auto, FrameKind::Full, 0.5)
            .resolve()
            .unwrap();
        assert_eq!(p.frame_kind, FrameKind::Binned);
        assert_eq!((p.width, p.height, p.block_count, p.frame_code), (320, 240, 1024, 2));
        assert_eq!(p.image_code, 2);
        assert_eq!(p.blocks_expected(), 75);
    }

    #[test]
    fn test_crop_frame() {
        let p = AcquisitionParams::new(ImageKind::Light, FrameKind::Crop, 0.1)
            .resolve()
            .unwrap();
        assert_eq!(p.blocks_expected(), 60);
        assert_eq!(p.frame_code, 1);
    }

    #[test]
    fn test_custom_frame() {
        let p = AcquisitionParams::new(ImageKind::Dark, FrameKind::Custom, 0.1)
            .with_subframe_size(10)
            .resolve()
            .unwrap();
        assert_eq!((p.width, p.height, p.block_count, p.frame_code), (10, 10, 10, 255));
        assert_eq!(p.blocks_expected(), 10);
        assert_eq!(p.total_bytes(), 200);

        let default = AcquisitionParams::new(ImageKind::Dark, FrameKind::Custom, 0.1)
            .resolve()
            .unwrap();
        assert_eq!(default.width, 127);
    }

    #[test]
    fn test_invalid_params() {
        assert!(
            AcquisitionParams::new(ImageKind::Dark, FrameKind::Custom, 1.0)
                .with_subframe_size(128)
                .resolve()
                .is_err()
        );
        assert!(
            AcquisitionParams::new(ImageKind::Dark, FrameKind::Custom, 1.0)
                .with_subframe_size(0)
                .resolve()
                .is_err()
        );
        assert!(
            AcquisitionParams::new(ImageKind::Dark, FrameKind::Full, -1.0)
                .resolve()
                .is_err()
        );
        assert!(
            AcquisitionParams::new(ImageKind::Dark, FrameKind::Full, f64::NAN)
                .resolve()
                .is_err()
        );
    }

    #[test]
    fn test_parse_kinds() {
        assert_eq!("light".parse::<ImageKind>().unwrap(), ImageKind::Light);
        assert_eq!("binned".parse::<FrameKind>().unwrap(), FrameKind::Binned);
        assert!("bright".parse::<ImageKind>().is_err());
    }
}
