//! AllSky camera - high-level command API.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, info, instrument};

use crate::acquisition::{
    AbortHandle, AcquisitionOutcome, ExposureListener, ExposureOutcome, Image, TransferListener,
    TransferOutcome, TransferState,
};
use crate::bus::{EventKind, SubscriptionId, TransportEvent};
use crate::channel::{CommandChannel, Reply, ResponseArity};
use crate::config::CameraConfig;
use crate::error::{CameraError, Result};
use crate::events::{CameraObserver, ProgressEvent, TracingObserver};
use crate::protocol::{
    AcquisitionParams, Command, FIRMWARE_REPLY_LEN, ResolvedParams, SERIAL_REPLY_LEN,
    SHUTTER_SETTLE_MS, SubframeParams, TEST_REPLY, TEST_REPLY_LEN,
};
use crate::transport::{SerialTransport, Transport};

/// Driver for an AllSky 340 camera on a byte-stream link.
///
/// Every operation borrows the camera mutably, so only one command is ever
/// in flight. Acquisitions can be cancelled through an [`AbortHandle`].
pub struct AllskyCamera<T: Transport> {
    channel: CommandChannel<T>,
    state: Arc<TransferState>,
    shutter_settle: Duration,
}

impl AllskyCamera<SerialTransport> {
    /// Camera on the serial port described by `config`, logging through tracing.
    pub fn from_config(config: &CameraConfig) -> Self {
        AllskyCamera::new(config.serial_transport()).with_config(config)
    }
}

impl<T: Transport> AllskyCamera<T> {
    /// Create a camera with the default tracing observer.
    pub fn new(transport: T) -> Self {
        Self::with_observer(transport, Arc::new(TracingObserver))
    }

    /// Create a camera with a custom observer.
    pub fn with_observer(transport: T, observer: Arc<dyn CameraObserver>) -> Self {
        Self {
            channel: CommandChannel::new(transport, observer)
                .with_idle_timeout(CameraConfig::default().idle_timeout()),
            state: Arc::new(TransferState::new()),
            shutter_settle: Duration::from_millis(SHUTTER_SETTLE_MS),
        }
    }

    /// Apply the protocol settings of `config`.
    pub fn with_config(mut self, config: &CameraConfig) -> Self {
        self.channel = self
            .channel
            .with_checksum_policy(config.checksum_policy)
            .with_idle_timeout(config.idle_timeout());
        self.shutter_settle = config.shutter_settle();
        self
    }

    pub fn transport(&self) -> &T {
        self.channel.transport()
    }

    /// Subscribe to transport events.
    pub fn on<F>(&mut self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: FnMut(&TransportEvent) + Send + 'static,
    {
        self.channel.bus_mut().subscribe(kind, handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.channel.bus_mut().unsubscribe(id)
    }

    /// Open the link.
    pub fn open(&mut self) -> Result<()> {
        info!(link = %self.channel.transport().name(), "Opening camera link");
        self.channel.open()
    }

    /// Close the link.
    pub fn close(&mut self) -> Result<()> {
        self.channel.close()
    }

    /// Send a raw command.
    pub fn send_command(&mut self, command: Command, arity: ResponseArity) -> Result<Reply> {
        self.channel.send(command, arity)
    }

    fn payload(&mut self, command: Command, arity: ResponseArity) -> Result<Vec<u8>> {
        Ok(self
            .channel
            .send(command, arity)?
            .payload
            .unwrap_or_default())
    }

    /// Link test: the camera must answer `'O'`.
    #[instrument(skip(self))]
    pub fn send_test(&mut self) -> Result<()> {
        let data = self.payload(Command::Test, ResponseArity::Bytes(TEST_REPLY_LEN))?;
        if data != [TEST_REPLY] {
            return Err(CameraError::TestFailed {
                received: String::from_utf8_lossy(&data).into_owned(),
            });
        }
        info!("Test passed");
        Ok(())
    }

    /// Firmware version, a signed little-endian 16-bit word.
    #[instrument(skip(self))]
    pub fn get_firmware_version(&mut self) -> Result<i16> {
        let data = self.payload(
            Command::FirmwareVersion,
            ResponseArity::Bytes(FIRMWARE_REPLY_LEN),
        )?;
        if data.len() < 2 {
            return Err(CameraError::Protocol(format!(
                "firmware version reply too short: {} bytes",
                data.len()
            )));
        }
        Ok(LittleEndian::read_i16(&data))
    }

    #[instrument(skip(self))]
    pub fn get_serial_number(&mut self) -> Result<String> {
        let data = self.payload(Command::SerialNumber, ResponseArity::Bytes(SERIAL_REPLY_LEN))?;
        Ok(String::from_utf8_lossy(&data)
            .trim_end_matches(['\0', ' '])
            .to_string())
    }

    pub fn heater_on(&mut self) -> Result<()> {
        self.payload(Command::Heater(true), ResponseArity::Echo).map(drop)
    }

    pub fn heater_off(&mut self) -> Result<()> {
        self.payload(Command::Heater(false), ResponseArity::Echo).map(drop)
    }

    pub fn chop_on(&mut self) -> Result<()> {
        self.payload(Command::Chopper(true), ResponseArity::Echo).map(drop)
    }

    pub fn chop_off(&mut self) -> Result<()> {
        self.payload(Command::Chopper(false), ResponseArity::Echo).map(drop)
    }

    /// Open the shutter and de-energize the motor once it has moved.
    #[instrument(skip(self))]
    pub fn open_shutter(&mut self) -> Result<()> {
        self.move_shutter(Command::OpenShutter)
    }

    /// Close the shutter and de-energize the motor once it has moved.
    #[instrument(skip(self))]
    pub fn close_shutter(&mut self) -> Result<()> {
        self.move_shutter(Command::CloseShutter)
    }

    fn move_shutter(&mut self, command: Command) -> Result<()> {
        self.payload(command, ResponseArity::Echo)?;
        debug!(
            command = %command,
            settle_ms = self.shutter_settle.as_millis() as u64,
            "Shutter moved"
        );
        thread::sleep(self.shutter_settle);
        self.payload(Command::DeEnergize, ResponseArity::Echo)?;
        Ok(())
    }

    /// Place the subframe used by [`FrameKind::Custom`](crate::protocol::FrameKind::Custom)
    /// acquisitions. Returns the reply payload.
    #[instrument(skip(self))]
    pub fn define_subframe(&mut self, params: SubframeParams) -> Result<Vec<u8>> {
        self.payload(Command::DefineSubframe(params), ResponseArity::Echo)
    }

    /// Handle that can cancel the running acquisition.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle::new(self.state.clone())
    }

    /// Abort an exposure that is not being waited on by this driver.
    ///
    /// Acquisitions in progress are cancelled through [`AbortHandle`]; this
    /// call sends `'A'` right away.
    #[instrument(skip(self))]
    pub fn abort(&mut self) -> Result<()> {
        self.state.request_abort();
        if !self.state.is_transferring() {
            let sent = self.channel.send(Command::Abort, ResponseArity::Ignore);
            // Nothing is in flight to consume the request
            self.state.reset();
            sent?;
        }
        Ok(())
    }

    /// Take an image.
    ///
    /// `progress` is called for every exposure marker and every transferred
    /// block, in the order the bytes arrive.
    #[instrument(
        skip(self, params, progress),
        fields(
            image = %params.image_kind,
            frame = %params.frame_kind,
            exposure = params.exposure_seconds
        )
    )]
    pub fn acquire<F>(
        &mut self,
        params: &AcquisitionParams,
        mut progress: F,
    ) -> Result<AcquisitionOutcome>
    where
        F: FnMut(&ProgressEvent),
    {
        let resolved = params.resolve()?;
        self.state.reset();
        let result = self.run_acquisition(&resolved, &mut progress);
        self.state.reset();
        result
    }

    fn run_acquisition(
        &mut self,
        params: &ResolvedParams,
        progress: &mut dyn FnMut(&ProgressEvent),
    ) -> Result<AcquisitionOutcome> {
        let take_image = Command::TakeImage {
            exposure_ticks: params.exposure_ticks,
            frame_code: params.frame_code,
            image_code: params.image_code,
        };
        let reply = self.channel.send(take_image, ResponseArity::Listener)?;
        info!(
            ticks = params.exposure_ticks,
            width = params.width,
            height = params.height,
            "Exposure started"
        );

        let mut exposure = ExposureListener::new(
            params.exposure_seconds,
            reply.frame.checksum(),
            self.state.clone(),
            &mut *progress,
        );
        if let ExposureOutcome::Cancelled = self.channel.receive(&mut exposure)? {
            info!("Exposure aborted");
            return Ok(AcquisitionOutcome::Cancelled);
        }

        info!(blocks = params.blocks_expected(), "Exposure complete, transferring image");
        self.state.set_transferring(true);
        let mut transfer = TransferListener::new(params, self.state.clone(), progress);
        self.channel.send(Command::TransferImage, ResponseArity::Ignore)?;

        match self.channel.receive(&mut transfer)? {
            TransferOutcome::Complete(data) => {
                Ok(AcquisitionOutcome::Complete(Image::new(params, data)))
            }
            TransferOutcome::Cancelled { received_bytes } => {
                info!(received_bytes, "Transfer aborted");
                Ok(AcquisitionOutcome::Cancelled)
            }
        }
    }
}
