//! Port lifecycle events
//!
//! Observers run on the sensor task right after the event happens and
//! must not block.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

/// Event to subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Ready,
    PortClose,
    PortError,
}

/// Event delivered to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorEvent {
    /// Port open and settle delay elapsed
    Ready,
    /// Port closed, by request or because the device went away
    PortClose,
    /// Transport I/O failed
    PortError(String),
}

impl SensorEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Ready => EventKind::Ready,
            Self::PortClose => EventKind::PortClose,
            Self::PortError(_) => EventKind::PortError,
        }
    }
}

impl fmt::Display for SensorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::PortClose => write!(f, "port closed"),
            Self::PortError(reason) => write!(f, "port error: {}", reason),
        }
    }
}

/// Port state as seen by handles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    /// Open, settle delay running
    Opening,
    Ready,
    Closed,
}

type Observer = Arc<dyn Fn(&SensorEvent) + Send + Sync>;
type OnceObserver = Box<dyn FnOnce(&SensorEvent) + Send>;

#[derive(Default)]
struct Observers {
    persistent: Vec<Observer>,
    once: Vec<OnceObserver>,
}

/// Observer registry keyed by event kind
#[derive(Default)]
pub struct EventHub {
    observers: Mutex<HashMap<EventKind, Observers>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `observer` on every `kind` event
    pub fn on(&self, kind: EventKind, observer: impl Fn(&SensorEvent) + Send + Sync + 'static) {
        self.observers
            .lock()
            .entry(kind)
            .or_default()
            .persistent
            .push(Arc::new(observer));
    }

    /// Call `observer` on the next `kind` event only
    pub fn once(&self, kind: EventKind, observer: impl FnOnce(&SensorEvent) + Send + 'static) {
        self.observers
            .lock()
            .entry(kind)
            .or_default()
            .once
            .push(Box::new(observer));
    }

    /// Notify persistent observers, then drain the one-shot ones
    pub fn emit(&self, event: &SensorEvent) {
        // Observers may subscribe again; call them without the lock held
        let (persistent, once) = {
            let mut observers = self.observers.lock();
            let entry = observers.entry(event.kind()).or_default();
            (entry.persistent.clone(), std::mem::take(&mut entry.once))
        };

        trace!(
            event = %event,
            persistent = persistent.len(),
            once = once.len(),
            "Emitting event"
        );

        for observer in persistent {
            observer(event);
        }
        for observer in once {
            observer(event);
        }
    }

    /// Registered observers for `kind`
    pub fn observer_count(&self, kind: EventKind) -> usize {
        self.observers
            .lock()
            .get(&kind)
            .map(|o| o.persistent.len() + o.once.len())
            .unwrap_or(0)
    }
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("ready", &self.observer_count(EventKind::Ready))
            .field("port_close", &self.observer_count(EventKind::PortClose))
            .field("port_error", &self.observer_count(EventKind::PortError))
            .finish()
    }
}
