//! Image acquisition.
//!
//! An acquisition runs in two phases, each driven by its own listener:
//! - `exposure`: waits on the `'E'`/`'D'` markers while the sensor integrates
//! - `transfer`: reads the image block by block, acknowledging each one
//!
//! Both phases share a [`TransferState`] with the [`AbortHandle`]s handed
//! out by the camera, which is how cooperative aborts reach them.

mod exposure;
mod transfer;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::protocol::{BYTES_PER_PIXEL, FrameKind, ImageKind, ResolvedParams};

pub use exposure::{ExposureListener, ExposureOutcome, rounded_exposure_ms};
pub use transfer::{TransferListener, TransferOutcome};

/// Flags shared between one in-flight acquisition and abort requests.
#[derive(Debug, Default)]
pub struct TransferState {
    aborting: AtomicBool,
    transferring: AtomicBool,
}

impl TransferState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to idle: not aborting, not transferring.
    pub fn reset(&self) {
        self.aborting.store(false, Ordering::SeqCst);
        self.transferring.store(false, Ordering::SeqCst);
    }

    pub fn request_abort(&self) {
        self.aborting.store(true, Ordering::SeqCst);
    }

    pub fn is_aborting(&self) -> bool {
        self.aborting.load(Ordering::SeqCst)
    }

    pub fn set_transferring(&self, transferring: bool) {
        self.transferring.store(transferring, Ordering::SeqCst);
    }

    pub fn is_transferring(&self) -> bool {
        self.transferring.load(Ordering::SeqCst)
    }
}

/// Requests cancellation of the acquisition running on a camera.
///
/// Usable from progress callbacks and from other threads. During exposure
/// the request is honored at the next poll of the link; during transfer at
/// the next block boundary.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    state: Arc<TransferState>,
}

impl AbortHandle {
    pub(crate) fn new(state: Arc<TransferState>) -> Self {
        Self { state }
    }

    pub fn abort(&self) {
        self.state.request_abort();
    }

    pub fn is_transferring(&self) -> bool {
        self.state.is_transferring()
    }
}

/// A transferred image: raw sensor bytes plus what is needed to read them.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub frame_kind: FrameKind,
    pub image_kind: ImageKind,
    pub exposure_seconds: f64,
    /// Two bytes per pixel, in transfer order.
    pub data: Vec<u8>,
}

impl Image {
    pub(crate) fn new(params: &ResolvedParams, data: Vec<u8>) -> Self {
        Self {
            width: params.width,
            height: params.height,
            frame_kind: params.frame_kind,
            image_kind: params.image_kind,
            exposure_seconds: params.exposure_seconds,
            data,
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        BYTES_PER_PIXEL
    }

    pub fn pixel_count(&self) -> usize {
        self.data.len() / BYTES_PER_PIXEL
    }
}

/// How an acquisition ended. Cancellation is an outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionOutcome {
    Complete(Image),
    Cancelled,
}

impl AcquisitionOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AcquisitionOutcome::Cancelled)
    }

    pub fn into_image(self) -> Option<Image> {
        match self {
            AcquisitionOutcome::Complete(image) => Some(image),
            AcquisitionOutcome::Cancelled => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_flags() {
        let state = Arc::new(TransferState::new());
        let handle = AbortHandle::new(state.clone());
        assert!(!state.is_aborting());

        state.set_transferring(true);
        handle.abort();
        assert!(state.is_aborting());
        assert!(handle.is_transferring());

        state.reset();
        assert!(!state.is_aborting());
        assert!(!state.is_transferring());
    }

    #[test]
    fn test_outcome_accessors() {
        assert!(AcquisitionOutcome::Cancelled.is_cancelled());
        assert_eq!(AcquisitionOutcome::Cancelled.into_image(), None);
    }
}
