//! Transport event bus.
//!
//! Routes link lifecycle events and received data to registered
//! subscribers, synchronously and in registration order. Data deliveries go
//! to the current data listener first; that slot has a single owner at a
//! time and is claimed by the command channel for each exchange.

use std::fmt;

use tracing::trace;

use crate::error::CameraError;

/// Kinds of transport events a subscriber can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Opened,
    Closed,
    Disconnected,
    Errored,
    Data,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Opened => write!(f, "open"),
            EventKind::Closed => write!(f, "close"),
            EventKind::Disconnected => write!(f, "disconnect"),
            EventKind::Errored => write!(f, "error"),
            EventKind::Data => write!(f, "data"),
        }
    }
}

/// An event raised by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Closed,
    Disconnected,
    Errored(String),
    Data(Vec<u8>),
}

impl TransportEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            TransportEvent::Opened => EventKind::Opened,
            TransportEvent::Closed => EventKind::Closed,
            TransportEvent::Disconnected => EventKind::Disconnected,
            TransportEvent::Errored(_) => EventKind::Errored,
            TransportEvent::Data(_) => EventKind::Data,
        }
    }
}

pub type EventHandler = Box<dyn FnMut(&TransportEvent) + Send>;

/// Identifies a subscription for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    kind: EventKind,
    handler: EventHandler,
}

#[derive(Default)]
pub struct EventBus {
    subscriptions: Vec<Subscription>,
    next_id: u64,
    listener_owner: Option<&'static str>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every event of `kind`.
    pub fn subscribe<F>(&mut self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: FnMut(&TransportEvent) + Send + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscriptions.push(Subscription {
            id,
            kind,
            handler: Box::new(handler),
        });
        id
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    /// Deliver `event` to its subscribers.
    pub fn publish(&mut self, event: &TransportEvent) {
        let kind = event.kind();
        trace!(event = %kind, "Publishing transport event");
        for sub in self.subscriptions.iter_mut().filter(|s| s.kind == kind) {
            (sub.handler)(event);
        }
    }

    /// Deliver received bytes: the current listener first, then the
    /// `data` subscribers. Returns what the listener returned.
    pub fn publish_data<R>(&mut self, data: &[u8], listener: impl FnOnce(&[u8]) -> R) -> R {
        let result = listener(data);
        if self.subscriptions.iter().any(|s| s.kind == EventKind::Data) {
            self.publish(&TransportEvent::Data(data.to_vec()));
        }
        result
    }

    /// Take exclusive ownership of the data listener slot.
    pub fn claim_listener(&mut self, owner: &'static str) -> Result<(), CameraError> {
        match self.listener_owner {
            Some(current) => Err(CameraError::Busy { owner: current }),
            None => {
                self.listener_owner = Some(owner);
                Ok(())
            }
        }
    }

    pub fn release_listener(&mut self) {
        self.listener_owner = None;
    }

    pub fn listener_owner(&self) -> Option<&'static str> {
        self.listener_owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_handlers_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        for tag in ["first", "second"] {
            let log = log.clone();
            bus.subscribe(EventKind::Opened, move |_| log.lock().unwrap().push(tag));
        }
        let other = log.clone();
        bus.subscribe(EventKind::Closed, move |_| other.lock().unwrap().push("closed"));

        bus.publish(&TransportEvent::Opened);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_listener_sees_data_before_subscribers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        let sub_log = log.clone();
        bus.subscribe(EventKind::Data, move |event| {
            if let TransportEvent::Data(d) = event {
                sub_log.lock().unwrap().push(format!("subscriber {}", d.len()));
            }
        });

        let result = bus.publish_data(b"abc", |d| {
            log.lock().unwrap().push(format!("listener {}", d.len()));
            d[0]
        });
        assert_eq!(result, b'a');
        assert_eq!(*log.lock().unwrap(), vec!["listener 3", "subscriber 3"]);
    }

    #[test]
    fn test_unsubscribe() {
        let count = Arc::new(Mutex::new(0));
        let mut bus = EventBus::new();
        let c = count.clone();
        let id = bus.subscribe(EventKind::Errored, move |_| *c.lock().unwrap() += 1);

        bus.publish(&TransportEvent::Errored("boom".into()));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(&TransportEvent::Errored("boom".into()));
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_listener_slot_is_exclusive() {
        let mut bus = EventBus::new();
        bus.claim_listener("exposure").unwrap();
        assert!(matches!(
            bus.claim_listener("test"),
            Err(CameraError::Busy { owner: "exposure" })
        ));
        bus.release_listener();
        assert!(bus.claim_listener("test").is_ok());
        assert_eq!(bus.listener_owner(), Some("test"));
    }
}
