//! Transfer phase: `'X'` has been sent, read the image block by block.

use std::sync::Arc;

use tracing::debug;

use super::TransferState;
use crate::assembler::ResponseAssembler;
use crate::channel::{DataListener, Flow, Link};
use crate::error::Result;
use crate::events::{CameraEvent, LogLevel, ProgressEvent};
use crate::protocol::{Command, ResolvedParams, block_checksum};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Every block arrived. Holds the image payload.
    Complete(Vec<u8>),
    /// Stopped at a block boundary after an abort request; `'S'` was sent.
    Cancelled { received_bytes: usize },
}

/// Reads `block_bytes + 1` bytes per block (payload plus XOR checksum),
/// acknowledging each block with a bare `'K'` until the image is complete.
///
/// The camera answers `'X'` with its checksum echo ahead of the first block;
/// that single byte is dropped.
pub struct TransferListener<'p> {
    assembler: ResponseAssembler,
    block_bytes: usize,
    total_bytes: usize,
    image: Vec<u8>,
    blocks_read: usize,
    state: Arc<TransferState>,
    progress: &'p mut dyn FnMut(&ProgressEvent),
}

impl<'p> TransferListener<'p> {
    pub fn new(
        params: &ResolvedParams,
        state: Arc<TransferState>,
        progress: &'p mut dyn FnMut(&ProgressEvent),
    ) -> Self {
        let block_bytes = params.block_bytes();
        let total_bytes = params.total_bytes();
        Self {
            assembler: ResponseAssembler::new(block_bytes + 1, true),
            block_bytes,
            total_bytes,
            image: Vec::with_capacity(total_bytes),
            blocks_read: 0,
            state,
            progress,
        }
    }

    pub fn received_bytes(&self) -> usize {
        self.image.len()
    }

    pub fn blocks_read(&self) -> usize {
        self.blocks_read
    }
}

impl DataListener for TransferListener<'_> {
    type Output = TransferOutcome;

    fn name(&self) -> &'static str {
        "transfer"
    }

    fn on_data(&mut self, data: &[u8], link: &mut Link<'_>) -> Result<Flow<TransferOutcome>> {
        let Some(block) = self.assembler.push(data)? else {
            return Ok(Flow::Continue);
        };
        self.blocks_read += 1;

        let (payload, trailer) = block.split_at(self.block_bytes);
        link.verify("image block", block_checksum(payload), trailer[0])?;

        self.image.extend_from_slice(payload);
        let received_bytes = self.image.len();

        let event = ProgressEvent::Transfer {
            received_bytes,
            total_bytes: self.total_bytes,
            percent: received_bytes as f64 / self.total_bytes as f64 * 100.0,
        };
        (self.progress)(&event);
        link.emit(CameraEvent::Progress(event));

        if received_bytes >= self.total_bytes {
            self.state.set_transferring(false);
            link.send(Command::BlockAck)?;
            link.log(
                LogLevel::Info,
                format!("Received all data: {} blocks, {} bytes", self.blocks_read, received_bytes),
            );
            return Ok(Flow::Done(TransferOutcome::Complete(std::mem::take(
                &mut self.image,
            ))));
        }

        if self.state.is_aborting() {
            link.log(LogLevel::Info, "Transfer abort detected, sending S");
            self.state.set_transferring(false);
            link.send(Command::StopTransfer)?;
            self.state.reset();
            return Ok(Flow::Done(TransferOutcome::Cancelled { received_bytes }));
        }

        debug!(block = self.blocks_read, received_bytes, "Block accepted");
        link.send(Command::BlockAck)?;
        Ok(Flow::Continue)
    }

    fn read_hint(&self) -> usize {
        self.assembler.remaining()
    }
}
