//! Registry of observers for tempo, activation and connection changes.

use log::{error, trace};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

pub type TempoListener = Box<dyn Fn(f64, f64) + Send + Sync>;
pub type ActivationListener = Box<dyn Fn(bool) + Send + Sync>;
pub type ConnectionListener = Box<dyn Fn(bool) + Send + Sync>;

/// A callback tagged with the kind of change it observes.
pub enum Listener {
    /// Receives `(bpm, quantum)`
    Tempo(TempoListener),
    /// Receives whether synchronization is enabled
    Activation(ActivationListener),
    /// Receives whether peers are connected
    Connection(ConnectionListener),
}

impl Listener {
    pub fn tempo(f: impl Fn(f64, f64) + Send + Sync + 'static) -> Self {
        Listener::Tempo(Box::new(f))
    }

    pub fn activation(f: impl Fn(bool) + Send + Sync + 'static) -> Self {
        Listener::Activation(Box::new(f))
    }

    pub fn connection(f: impl Fn(bool) + Send + Sync + 'static) -> Self {
        Listener::Connection(Box::new(f))
    }

    pub fn kind(&self) -> ListenerKind {
        match self {
            Listener::Tempo(_) => ListenerKind::Tempo,
            Listener::Activation(_) => ListenerKind::Activation,
            Listener::Connection(_) => ListenerKind::Connection,
        }
    }

    fn invoke(&self, event: &SyncEvent) {
        match (self, event) {
            (Listener::Tempo(f), SyncEvent::TempoChanged { bpm, quantum }) => f(*bpm, *quantum),
            (Listener::Activation(f), SyncEvent::ActivationChanged(enabled)) => f(*enabled),
            (Listener::Connection(f), SyncEvent::ConnectionChanged(connected)) => f(*connected),
            _ => {}
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener::{:?}", self.kind())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Tempo,
    Activation,
    Connection,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncEvent {
    TempoChanged { bpm: f64, quantum: f64 },
    ActivationChanged(bool),
    ConnectionChanged(bool),
}

impl SyncEvent {
    pub fn kind(&self) -> ListenerKind {
        match self {
            SyncEvent::TempoChanged { .. } => ListenerKind::Tempo,
            SyncEvent::ActivationChanged(_) => ListenerKind::Activation,
            SyncEvent::ConnectionChanged(_) => ListenerKind::Connection,
        }
    }
}

/// Handle returned when registering a listener. Keep it and pass it to
/// `remove` before the state the callback captures goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(Uuid);

impl ListenerToken {
    fn new() -> Self {
        ListenerToken(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ListenerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct Entry {
    token: ListenerToken,
    live: Arc<AtomicBool>,
    listener: Arc<Listener>,
}

#[derive(Default)]
pub struct ListenerRegistry {
    entries: Mutex<Vec<Entry>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, listener: Listener) -> ListenerToken {
        let token = ListenerToken::new();
        trace!("Adding {:?} listener {}", listener.kind(), token);
        self.entries().push(Entry {
            token,
            live: Arc::new(AtomicBool::new(true)),
            listener: Arc::new(listener),
        });
        token
    }

    pub fn remove(&self, token: ListenerToken) -> bool {
        let mut entries = self.entries();
        match entries.iter().position(|entry| entry.token == token) {
            Some(index) => {
                let entry = entries.remove(index);
                entry.live.store(false, Ordering::SeqCst);
                trace!("Removed listener {}", token);
                true
            }
            None => false,
        }
    }

    pub fn remove_all(&self) {
        let removed = std::mem::take(&mut *self.entries());
        for entry in &removed {
            entry.live.store(false, Ordering::SeqCst);
        }
        trace!("Removed all {} listeners", removed.len());
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Invokes every listener of the event's kind, in registration order, on
    /// the calling thread. No lock is held while callbacks run, so callbacks
    /// may add or remove listeners. A panicking callback is logged and the
    /// remaining listeners still run. Returns how many callbacks completed.
    pub fn dispatch(&self, event: SyncEvent) -> usize {
        let kind = event.kind();
        let targets: Vec<(ListenerToken, Arc<AtomicBool>, Arc<Listener>)> = self
            .entries()
            .iter()
            .filter(|entry| entry.listener.kind() == kind)
            .map(|entry| (entry.token, entry.live.clone(), entry.listener.clone()))
            .collect();

        let mut delivered = 0;
        for (token, live, listener) in targets {
            if !live.load(Ordering::SeqCst) {
                continue;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| listener.invoke(&event))) {
                Ok(()) => delivered += 1,
                Err(payload) => error!(
                    "{:?} listener {} panicked: {}",
                    kind,
                    token,
                    panic_message(payload.as_ref())
                ),
            }
        }
        delivered
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}
