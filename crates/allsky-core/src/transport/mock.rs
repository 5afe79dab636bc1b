//! Mock transport for testing.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use super::traits::{Transport, TransportError};

/// Produces the deliveries a simulated camera sends back for one write.
pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

/// A captured write.
#[derive(Debug, Clone)]
pub struct WriteRecord {
    pub at: Instant,
    pub data: Vec<u8>,
}

#[derive(Default)]
struct MockState {
    /// Queued deliveries returned on read.
    deliveries: VecDeque<Vec<u8>>,
    /// Captured writes.
    write_log: Vec<WriteRecord>,
    drain_count: usize,
    responder: Option<Responder>,
    open: bool,
    disconnected: bool,
    fail_writes: bool,
    fail_reads: bool,
}

/// Mock transport for unit testing protocol logic.
///
/// Clones share state, so a test can keep one handle to inspect writes while
/// the camera owns the other.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    poll_interval: Duration,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                open: true,
                ..Default::default()
            })),
            poll_interval: Duration::from_millis(1),
        }
    }

    /// Mock whose responses are computed from each write.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    {
        let mock = Self::new();
        mock.state().responder = Some(Box::new(responder));
        mock
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue one delivery to be returned on a later read.
    pub fn queue_data(&self, data: &[u8]) {
        self.state().deliveries.push_back(data.to_vec());
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.state()
            .write_log
            .iter()
            .map(|w| w.data.clone())
            .collect()
    }

    /// Get all captured writes with their timestamps.
    pub fn get_write_records(&self) -> Vec<WriteRecord> {
        self.state().write_log.clone()
    }

    /// Clear captured writes.
    pub fn clear_writes(&self) {
        self.state().write_log.clear();
    }

    pub fn drain_count(&self) -> usize {
        self.state().drain_count
    }

    pub fn pending_deliveries(&self) -> usize {
        self.state().deliveries.len()
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        self.state().disconnected = true;
    }

    /// Simulate device reconnect.
    pub fn reconnect(&self) {
        self.state().disconnected = false;
    }

    /// Make every subsequent write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    /// Make every subsequent read fail with an I/O error.
    pub fn fail_reads(&self, fail: bool) {
        self.state().fail_reads = fail;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        let mut state = self.state();
        if state.disconnected {
            return Err(TransportError::OpenFailed {
                device: "mock".into(),
                message: "device unplugged".into(),
            });
        }
        state.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.state().open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state().open
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut guard = self.state();
        let state = &mut *guard;
        if state.disconnected {
            return Err(TransportError::Disconnected);
        }
        if !state.open {
            return Err(TransportError::NotOpen);
        }
        if state.fail_writes {
            return Err(TransportError::WriteFailed("injected failure".into()));
        }
        state.write_log.push(WriteRecord {
            at: Instant::now(),
            data: data.to_vec(),
        });
        if let Some(responder) = state.responder.as_mut() {
            let replies = responder(data);
            state.deliveries.extend(replies);
        }
        Ok(data.len())
    }

    fn drain(&mut self) -> Result<(), TransportError> {
        let mut state = self.state();
        if state.disconnected {
            return Err(TransportError::Disconnected);
        }
        state.drain_count += 1;
        Ok(())
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let next = {
            let mut state = self.state();
            if state.disconnected {
                return Err(TransportError::Disconnected);
            }
            if !state.open {
                return Err(TransportError::NotOpen);
            }
            if state.fail_reads {
                return Err(io::Error::other("injected read failure").into());
            }
            match state.deliveries.pop_front() {
                Some(mut data) if data.len() > max_len => {
                    let rest = data.split_off(max_len);
                    state.deliveries.push_front(rest);
                    Some(data)
                }
                other => other,
            }
        };
        match next {
            Some(data) => Ok(data),
            None => {
                thread::sleep(self.poll_interval);
                Ok(Vec::new())
            }
        }
    }

    fn name(&self) -> String {
        "mock".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_delivery_queue() {
        let mut mock = MockTransport::new();
        mock.queue_data(b"AB");
        mock.queue_data(b"C");

        assert_eq!(mock.read(16).unwrap(), b"AB");
        assert_eq!(mock.read(16).unwrap(), b"C");

        // Queue is empty now
        assert!(mock.read(16).unwrap().is_empty());
    }

    #[test]
    fn test_mock_read_respects_max_len() {
        let mut mock = MockTransport::new();
        mock.queue_data(b"ABCDE");
        assert_eq!(mock.read(2).unwrap(), b"AB");
        assert_eq!(mock.read(16).unwrap(), b"CDE");
    }

    #[test]
    fn test_mock_write_capture() {
        let mut mock = MockTransport::new();
        mock.write(b"Hello").unwrap();
        mock.write(b"World").unwrap();
        mock.drain().unwrap();

        let writes = mock.get_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], b"Hello");
        assert_eq!(writes[1], b"World");
        assert_eq!(mock.drain_count(), 1);
    }

    #[test]
    fn test_mock_responder() {
        let mut mock = MockTransport::with_responder(|data| vec![data.to_vec()]);
        mock.write(b"echo").unwrap();
        assert_eq!(mock.read(16).unwrap(), b"echo");
    }

    #[test]
    fn test_mock_shared_state() {
        let mock = MockTransport::new();
        let mut owned = mock.clone();
        owned.write(b"x").unwrap();
        assert_eq!(mock.get_writes(), vec![b"x".to_vec()]);
    }

    #[test]
    fn test_mock_disconnect() {
        let mut mock = MockTransport::new();
        assert!(mock.is_open());

        mock.disconnect();
        assert!(matches!(mock.write(b"test"), Err(TransportError::Disconnected)));
        assert!(mock.read(1).is_err());

        mock.reconnect();
        assert!(mock.write(b"test").is_ok());
    }

    #[test]
    fn test_mock_write_failure() {
        let mut mock = MockTransport::new();
        mock.fail_writes(true);
        assert!(matches!(mock.write(b"E"), Err(TransportError::WriteFailed(_))));
        assert!(mock.get_writes().is_empty());
    }

    #[test]
    fn test_mock_read_failure() {
        let mut mock = MockTransport::new();
        mock.queue_data(b"O");
        mock.fail_reads(true);
        assert!(matches!(mock.read(8), Err(TransportError::Io(_))));
        mock.fail_reads(false);
        assert_eq!(mock.read(8).unwrap(), b"O".to_vec());
    }
}
