//! Exposure phase: `'T'` has been sent, wait for the camera to finish.

use std::sync::Arc;

use tracing::debug;

use super::TransferState;
use crate::channel::{DataListener, Flow, Link};
use crate::error::Result;
use crate::events::{CameraEvent, LogLevel, ProgressEvent};
use crate::protocol::{Command, EXPOSING_MARKER_PERIOD_MS, MARKER_EXPOSING, MARKER_EXPOSURE_DONE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExposureOutcome {
    /// `'D'` received, the image is ready for transfer.
    Complete,
    /// Aborted before the exposure completed; `'A'` was sent.
    Cancelled,
}

/// Exposure duration rounded up to the marker period, at least one period.
pub fn rounded_exposure_ms(exposure_seconds: f64) -> u64 {
    let period = EXPOSING_MARKER_PERIOD_MS;
    let ms = exposure_seconds * 1000.0;
    if ms > period as f64 {
        (ms / period as f64).ceil() as u64 * period
    } else {
        period
    }
}

/// Interprets the marker stream that follows the take-image command.
///
/// The first byte echoes the command checksum. After that the camera sends
/// `'E'` roughly every 160 ms and a single `'D'` when the exposure is over.
pub struct ExposureListener<'p> {
    command_checksum: Option<u8>,
    acknowledged: bool,
    exposure_time: u64,
    markers: u64,
    state: Arc<TransferState>,
    progress: &'p mut dyn FnMut(&ProgressEvent),
}

impl<'p> ExposureListener<'p> {
    pub fn new(
        exposure_seconds: f64,
        command_checksum: Option<u8>,
        state: Arc<TransferState>,
        progress: &'p mut dyn FnMut(&ProgressEvent),
    ) -> Self {
        Self {
            command_checksum,
            acknowledged: false,
            exposure_time: rounded_exposure_ms(exposure_seconds),
            markers: 0,
            state,
            progress,
        }
    }

    fn report(&mut self, link: &Link<'_>, event: ProgressEvent) {
        (self.progress)(&event);
        link.emit(CameraEvent::Progress(event));
    }

    /// Honor a pending abort: not transferring yet, so it takes effect now.
    fn check_abort(&mut self, link: &mut Link<'_>) -> Result<Flow<ExposureOutcome>> {
        if !self.state.is_aborting() {
            return Ok(Flow::Continue);
        }
        link.log(LogLevel::Info, "Exposure abort requested, sending A");
        link.send(Command::Abort)?;
        self.state.reset();
        Ok(Flow::Done(ExposureOutcome::Cancelled))
    }
}

impl DataListener for ExposureListener<'_> {
    type Output = ExposureOutcome;

    fn name(&self) -> &'static str {
        "exposure"
    }

    fn on_data(&mut self, data: &[u8], link: &mut Link<'_>) -> Result<Flow<ExposureOutcome>> {
        if let Flow::Done(outcome) = self.check_abort(link)? {
            return Ok(Flow::Done(outcome));
        }

        for &byte in data {
            if !self.acknowledged {
                self.acknowledged = true;
                if let Some(expected) = self.command_checksum {
                    link.verify("take image", expected, byte)?;
                }
                continue;
            }

            match byte {
                MARKER_EXPOSING => {
                    let elapsed_time = self.markers * EXPOSING_MARKER_PERIOD_MS;
                    self.markers += 1;
                    let percent = elapsed_time as f64 / self.exposure_time as f64 * 100.0;
                    self.report(
                        link,
                        ProgressEvent::Exposure {
                            exposure_time: self.exposure_time,
                            elapsed_time,
                            percent,
                        },
                    );
                }
                MARKER_EXPOSURE_DONE => {
                    debug!(markers = self.markers, "Exposure complete");
                    self.report(
                        link,
                        ProgressEvent::Exposure {
                            exposure_time: self.exposure_time,
                            elapsed_time: self.exposure_time,
                            percent: 100.0,
                        },
                    );
                    return Ok(Flow::Done(ExposureOutcome::Complete));
                }
                other => {
                    link.log(
                        LogLevel::Warn,
                        format!("Unexpected byte 0x{:02X} during exposure", other),
                    );
                }
            }
        }
        Ok(Flow::Continue)
    }

    fn on_idle(&mut self, link: &mut Link<'_>) -> Result<Flow<ExposureOutcome>> {
        self.check_abort(link)
    }

    fn read_hint(&self) -> usize {
        // Stop at each marker so a 'D' never swallows the first image bytes
        1
    }
}
