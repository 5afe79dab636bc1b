//! Command channel.
//!
//! Frames outgoing commands, writes them through the transport and decides
//! how the bytes that come back are interpreted. Every exchange claims the
//! bus's data listener slot for its whole duration, so at most one command
//! is in flight.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, trace};

use crate::assembler::ResponseAssembler;
use crate::bus::{EventBus, TransportEvent};
use crate::error::{CameraError, Result};
use crate::events::{CameraEvent, CameraObserver, LogLevel, PacketDirection};
use crate::protocol::{ChecksumPolicy, Command, Frame};
use crate::transport::{Transport, TransportError};

/// Default read size while a listener has no better idea.
const DEFAULT_READ_SIZE: usize = 64;

/// How the reply to a command is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseArity {
    /// The next delivery is the checksum echo followed by the payload.
    Echo,
    /// Collect exactly this many bytes, checksum echo included.
    Bytes(usize),
    /// The caller drives the reply with its own [`DataListener`].
    Listener,
    /// Nothing is expected back.
    Ignore,
}

/// Outcome of one [`CommandChannel::send`].
#[derive(Debug, Clone)]
pub struct Reply {
    /// Frame that was written.
    pub frame: Frame,
    /// Reply payload without the checksum echo, when one was awaited.
    pub payload: Option<Vec<u8>>,
}

/// What a listener wants after handling a delivery.
#[derive(Debug)]
pub enum Flow<T> {
    Continue,
    Done(T),
}

/// Interprets data delivered while it owns the listener slot.
pub trait DataListener {
    type Output;

    /// Name recorded as the slot owner.
    fn name(&self) -> &'static str;

    fn on_data(&mut self, data: &[u8], link: &mut Link<'_>) -> Result<Flow<Self::Output>>;

    /// Called when a poll interval passed without data.
    fn on_idle(&mut self, _link: &mut Link<'_>) -> Result<Flow<Self::Output>> {
        Ok(Flow::Continue)
    }

    /// Upper bound for the next read, so deliveries never straddle a
    /// response boundary.
    fn read_hint(&self) -> usize {
        DEFAULT_READ_SIZE
    }
}

/// Write half of the channel, lent to listeners.
pub struct Link<'a> {
    transport: &'a mut dyn Transport,
    observer: &'a dyn CameraObserver,
    policy: ChecksumPolicy,
}

impl<'a> Link<'a> {
    /// Write a frame and wait for it to drain.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.transport.write(frame.as_bytes())?;
        self.transport.drain()?;
        trace!(frame = ?frame, "Frame written");
        self.observer.on_event(&CameraEvent::Packet {
            direction: PacketDirection::Tx,
            length: frame.len(),
            data: Some(frame.as_bytes().to_vec()),
        });
        Ok(())
    }

    /// Encode and write a command.
    pub fn send(&mut self, command: Command) -> Result<Frame> {
        let frame = command.encode();
        debug!(command = %command, "Sending command");
        self.write_frame(&frame)?;
        Ok(frame)
    }

    /// Check a received checksum under the channel's policy.
    pub fn verify(&self, context: &'static str, expected: u8, received: u8) -> Result<bool> {
        let matched = self.policy.verify(context, expected, received);
        if !matches!(matched, Ok(true)) {
            self.observer.on_event(&CameraEvent::ChecksumMismatch {
                context,
                expected,
                received,
            });
        }
        matched
    }

    pub fn emit(&self, event: CameraEvent) {
        self.observer.on_event(&event);
    }

    /// Emit a log event.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(CameraEvent::Log {
            level,
            message: message.into(),
        });
    }
}

/// Default listener: one delivery, checksum echo first.
struct EchoListener {
    context: &'static str,
    expected: Option<u8>,
}

impl DataListener for EchoListener {
    type Output = Vec<u8>;

    fn name(&self) -> &'static str {
        self.context
    }

    fn on_data(&mut self, data: &[u8], link: &mut Link<'_>) -> Result<Flow<Vec<u8>>> {
        if let Some(expected) = self.expected {
            link.verify(self.context, expected, data[0])?;
        }
        Ok(Flow::Done(data[1..].to_vec()))
    }
}

/// Fixed-length listener backed by the response assembler.
struct CollectListener {
    context: &'static str,
    expected: Option<u8>,
    assembler: ResponseAssembler,
}

impl DataListener for CollectListener {
    type Output = Vec<u8>;

    fn name(&self) -> &'static str {
        self.context
    }

    fn on_data(&mut self, data: &[u8], link: &mut Link<'_>) -> Result<Flow<Vec<u8>>> {
        let Some(buf) = self.assembler.push(data)? else {
            return Ok(Flow::Continue);
        };
        if let (Some(expected), Some(&received)) = (self.expected, buf.first()) {
            link.verify(self.context, expected, received)?;
        }
        Ok(Flow::Done(buf.get(1..).unwrap_or_default().to_vec()))
    }

    fn read_hint(&self) -> usize {
        self.assembler.remaining()
    }
}

pub struct CommandChannel<T: Transport> {
    transport: T,
    bus: EventBus,
    observer: Arc<dyn CameraObserver>,
    policy: ChecksumPolicy,
    idle_timeout: Option<Duration>,
}

impl<T: Transport> CommandChannel<T> {
    pub fn new(transport: T, observer: Arc<dyn CameraObserver>) -> Self {
        Self {
            transport,
            bus: EventBus::new(),
            observer,
            policy: ChecksumPolicy::default(),
            idle_timeout: None,
        }
    }

    pub fn with_checksum_policy(mut self, policy: ChecksumPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fail an exchange when no data arrives for `timeout`. `None` waits forever.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn checksum_policy(&self) -> ChecksumPolicy {
        self.policy
    }

    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn observer(&self) -> &dyn CameraObserver {
        self.observer.as_ref()
    }

    pub fn open(&mut self) -> Result<()> {
        if self.transport.is_open() {
            return Ok(());
        }
        match self.transport.open() {
            Ok(()) => {
                self.observer.on_event(&CameraEvent::Opened);
                self.bus.publish(&TransportEvent::Opened);
                Ok(())
            }
            Err(e) => Err(self.report(e.into())),
        }
    }

    pub fn close(&mut self) -> Result<()> {
        if !self.transport.is_open() {
            return Ok(());
        }
        match self.transport.close() {
            Ok(()) => {
                self.observer.on_event(&CameraEvent::Closed);
                self.bus.publish(&TransportEvent::Closed);
                Ok(())
            }
            Err(e) => Err(self.report(e.into())),
        }
    }

    pub fn link(&mut self) -> Link<'_> {
        Link {
            transport: &mut self.transport,
            observer: self.observer.as_ref(),
            policy: self.policy,
        }
    }

    /// Write a frame outside of any exchange.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let result = self.link().write_frame(frame);
        result.map_err(|e| self.report(e))
    }

    /// Send a command and interpret the reply according to `arity`.
    #[instrument(level = "debug", skip(self, command), fields(command = %command))]
    pub fn send(&mut self, command: Command, arity: ResponseArity) -> Result<Reply> {
        let frame = command.encode();
        let context = command_context(&command);
        let expected = frame.checksum();

        let payload = match arity {
            ResponseArity::Ignore | ResponseArity::Listener => {
                self.write_frame(&frame)?;
                None
            }
            ResponseArity::Echo => {
                let mut listener = EchoListener { context, expected };
                Some(self.exchange(&frame, &mut listener)?)
            }
            ResponseArity::Bytes(n) => {
                let mut listener = CollectListener {
                    context,
                    expected,
                    assembler: ResponseAssembler::new(n, false),
                };
                Some(self.exchange(&frame, &mut listener)?)
            }
        };
        Ok(Reply { frame, payload })
    }

    /// Write `frame` while holding the listener slot, then receive.
    fn exchange<L: DataListener>(&mut self, frame: &Frame, listener: &mut L) -> Result<L::Output> {
        self.bus.claim_listener(listener.name())?;
        let written = self.link().write_frame(frame);
        let result = written.and_then(|()| self.pump(listener));
        self.bus.release_listener();
        result.map_err(|e| self.report(e))
    }

    /// Drive `listener` with incoming data until it is done.
    pub fn receive<L: DataListener>(&mut self, listener: &mut L) -> Result<L::Output> {
        self.bus.claim_listener(listener.name())?;
        let result = self.pump(listener);
        self.bus.release_listener();
        result.map_err(|e| self.report(e))
    }

    fn pump<L: DataListener>(&mut self, listener: &mut L) -> Result<L::Output> {
        let mut last_data = Instant::now();
        loop {
            let data = self.transport.read(listener.read_hint().max(1))?;

            let mut link = Link {
                transport: &mut self.transport,
                observer: self.observer.as_ref(),
                policy: self.policy,
            };

            let flow = if data.is_empty() {
                let flow = listener.on_idle(&mut link)?;
                if let (Flow::Continue, Some(limit)) = (&flow, self.idle_timeout)
                    && last_data.elapsed() >= limit
                {
                    return Err(CameraError::Timeout {
                        idle_ms: limit.as_millis() as u64,
                    });
                }
                flow
            } else {
                last_data = Instant::now();
                link.emit(CameraEvent::Packet {
                    direction: PacketDirection::Rx,
                    length: data.len(),
                    data: Some(data.iter().take(32).cloned().collect()),
                });
                self.bus
                    .publish_data(&data, |d| listener.on_data(d, &mut link))?
            };

            if let Flow::Done(output) = flow {
                return Ok(output);
            }
        }
    }

    /// Publish transport failures on the bus before handing them back.
    fn report(&mut self, err: CameraError) -> CameraError {
        if let CameraError::Transport(e) = &err {
            let (event, camera_event) = match e {
                TransportError::Disconnected => {
                    (TransportEvent::Disconnected, CameraEvent::Disconnected)
                }
                other => (
                    TransportEvent::Errored(other.to_string()),
                    CameraEvent::TransportError {
                        message: other.to_string(),
                    },
                ),
            };
            self.observer.on_event(&camera_event);
            self.bus.publish(&event);
        }
        err
    }
}

fn command_context(command: &Command) -> &'static str {
    match command {
        Command::Test => "test",
        Command::FirmwareVersion => "firmware version",
        Command::SerialNumber => "serial number",
        Command::Heater(_) => "heater",
        Command::Chopper(_) => "chopper",
        Command::OpenShutter => "open shutter",
        Command::CloseShutter => "close shutter",
        Command::DeEnergize => "de-energize",
        Command::Abort => "abort",
        Command::DefineSubframe(_) => "define subframe",
        Command::StopTransfer => "stop transfer",
        Command::TakeImage { .. } => "take image",
        Command::TransferImage => "transfer image",
        Command::BlockAck => "block ack",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventKind;
    use crate::events::NullObserver;
    use crate::protocol::checksum;
    use crate::transport::MockTransport;
    use std::sync::Mutex;

    fn channel(mock: &MockTransport) -> CommandChannel<MockTransport> {
        CommandChannel::new(mock.clone(), Arc::new(NullObserver))
            .with_idle_timeout(Some(Duration::from_millis(50)))
    }

    #[test]
    fn test_send_writes_frame_and_drains() {
        let mock = MockTransport::new();
        let mut ch = channel(&mock);
        let reply = ch.send(Command::Test, ResponseArity::Ignore).unwrap();

        assert_eq!(mock.get_writes(), vec![vec![b'E', checksum(b"E")]]);
        assert_eq!(mock.drain_count(), 1);
        assert!(reply.payload.is_none());
        assert_eq!(reply.frame.checksum(), Some(checksum(b"E")));
    }

    #[test]
    fn test_echo_strips_checksum() {
        let cs = checksum(b"g\x01");
        let mock = MockTransport::with_responder(move |_| vec![vec![cs, 0x42]]);
        let mut ch = channel(&mock);
        let reply = ch.send(Command::Heater(true), ResponseArity::Echo).unwrap();
        assert_eq!(reply.payload, Some(vec![0x42]));
    }

    #[test]
    fn test_lenient_mismatch_still_delivers() {
        let mock = MockTransport::with_responder(|_| vec![vec![0x00]]);
        let mut ch = channel(&mock);
        let reply = ch.send(Command::OpenShutter, ResponseArity::Echo).unwrap();
        assert_eq!(reply.payload, Some(vec![]));
    }

    #[test]
    fn test_strict_mismatch_fails() {
        let mock = MockTransport::with_responder(|_| vec![vec![0x00, b'O']]);
        let mut ch = channel(&mock).with_checksum_policy(ChecksumPolicy::Strict);
        let err = ch.send(Command::Test, ResponseArity::Bytes(2)).unwrap_err();
        assert!(matches!(err, CameraError::ChecksumMismatch { .. }));
        // Slot is released on the error path
        assert_eq!(ch.bus_mut().listener_owner(), None);
    }

    #[test]
    fn test_fixed_length_reply_in_fragments() {
        let cs = checksum(b"V");
        let mock = MockTransport::with_responder(move |_| vec![vec![cs], vec![0x34], vec![0x12]]);
        let mut ch = channel(&mock);
        let reply = ch.send(Command::FirmwareVersion, ResponseArity::Bytes(3)).unwrap();
        assert_eq!(reply.payload, Some(vec![0x34, 0x12]));
    }

    #[test]
    fn test_reads_never_straddle_reply() {
        let cs = checksum(b"E");
        // Reply and an unrelated trailing byte arrive in one burst
        let mock = MockTransport::with_responder(move |_| vec![vec![cs, b'O', b'E']]);
        let mut ch = channel(&mock);
        let reply = ch.send(Command::Test, ResponseArity::Bytes(2)).unwrap();
        assert_eq!(reply.payload, Some(vec![b'O']));
        assert_eq!(mock.pending_deliveries(), 1);
    }

    #[test]
    fn test_idle_timeout() {
        let mock = MockTransport::new();
        let mut ch = channel(&mock);
        let err = ch.send(Command::SerialNumber, ResponseArity::Bytes(11)).unwrap_err();
        assert!(matches!(err, CameraError::Timeout { idle_ms: 50 }));
    }

    #[test]
    fn test_write_failure_is_published() {
        let mock = MockTransport::new();
        mock.fail_writes(true);
        let mut ch = channel(&mock);
        let errors = Arc::new(Mutex::new(Vec::new()));
        let log = errors.clone();
        ch.bus_mut().subscribe(EventKind::Errored, move |e| {
            log.lock().unwrap().push(e.clone());
        });

        let err = ch.send(Command::Abort, ResponseArity::Ignore).unwrap_err();
        assert!(matches!(
            err,
            CameraError::Transport(TransportError::WriteFailed(_))
        ));
        assert_eq!(errors.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_read_failure_is_published() {
        let mock = MockTransport::new();
        mock.fail_reads(true);
        let mut ch = channel(&mock);
        let errors = Arc::new(Mutex::new(Vec::new()));
        let log = errors.clone();
        ch.bus_mut().subscribe(EventKind::Errored, move |e| {
            log.lock().unwrap().push(e.clone());
        });

        let err = ch.send(Command::Test, ResponseArity::Bytes(2)).unwrap_err();
        assert!(matches!(err, CameraError::Transport(TransportError::Io(_))));
        assert_eq!(errors.lock().unwrap().len(), 1);
        assert_eq!(ch.bus_mut().listener_owner(), None);
    }

    #[test]
    fn test_data_subscribers_see_replies() {
        let cs = checksum(b"C");
        let mock = MockTransport::with_responder(move |_| vec![vec![cs]]);
        let mut ch = channel(&mock);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        ch.bus_mut().subscribe(EventKind::Data, move |e| {
            if let TransportEvent::Data(d) = e {
                log.lock().unwrap().extend_from_slice(d);
            }
        });

        ch.send(Command::CloseShutter, ResponseArity::Echo).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![cs]);
    }

    #[test]
    fn test_open_close_publish_events() {
        let mock = MockTransport::new();
        let mut ch = channel(&mock);
        let events = Arc::new(Mutex::new(Vec::new()));
        for kind in [EventKind::Opened, EventKind::Closed] {
            let log = events.clone();
            ch.bus_mut()
                .subscribe(kind, move |e| log.lock().unwrap().push(e.kind()));
        }

        // Already open: no event
        ch.open().unwrap();
        ch.close().unwrap();
        ch.close().unwrap();
        ch.open().unwrap();
        assert_eq!(
            *events.lock().unwrap(),
            vec![EventKind::Closed, EventKind::Opened]
        );
    }
}
