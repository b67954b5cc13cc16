use super::{FlagCallback, SessionClock, SessionState, StartStopState, TempoCallback, Timeline};
use crate::config::{MAX_TEMPO, MIN_TEMPO};
use crate::error::ClockError;
use crate::host_time::{HostClock, HostTime};
use crate::spin_lock::SpinLock;
use crossbeam::channel::{self, Receiver, Sender};
use log::{debug, error, info, trace};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

enum ClockEvent {
    Tempo(f64),
    Enabled(bool),
    Connected(bool),
    Flush(Sender<()>),
    Shutdown,
}

#[derive(Default)]
struct CallbackSlots {
    tempo: Option<Arc<dyn Fn(f64) + Send + Sync>>,
    enabled: Option<Arc<dyn Fn(bool) + Send + Sync>>,
    connected: Option<Arc<dyn Fn(bool) + Send + Sync>>,
}

struct ClockShared {
    host_clock: HostClock,
    session: SpinLock<SessionState>,
    enabled: AtomicBool,
    peers: AtomicUsize,
    /// Last connection state announced to the connected callback
    reported_connection: Mutex<bool>,
    callbacks: Mutex<CallbackSlots>,
}

impl ClockShared {
    fn is_connected(&self) -> bool {
        self.enabled.load(Ordering::SeqCst) && self.peers.load(Ordering::SeqCst) > 0
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, CallbackSlots> {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// An in-process session clock.
///
/// It keeps a real session timeline and transport state, simulates remote
/// peers through [`set_peer_count`](Self::set_peer_count) and
/// [`apply_peer_tempo`](Self::apply_peer_tempo), and delivers callbacks on
/// its own worker thread.
pub struct LocalSessionClock {
    shared: Arc<ClockShared>,
    events: Sender<ClockEvent>,
    worker: Option<JoinHandle<()>>,
}

impl LocalSessionClock {
    pub fn new(initial_bpm: f64) -> Result<Self, ClockError> {
        if !initial_bpm.is_finite() || !(MIN_TEMPO..=MAX_TEMPO).contains(&initial_bpm) {
            return Err(ClockError::InvalidTempo(initial_bpm));
        }

        let host_clock = HostClock::new();
        let timeline = Timeline::new(initial_bpm, 0.0, host_clock.now());
        let shared = Arc::new(ClockShared {
            host_clock,
            session: SpinLock::new(SessionState::new(
                timeline,
                StartStopState::default(),
                false,
            )),
            enabled: AtomicBool::new(false),
            peers: AtomicUsize::new(0),
            reported_connection: Mutex::new(false),
            callbacks: Mutex::new(CallbackSlots::default()),
        });

        let (events, rx) = channel::unbounded();
        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("session-clock-callbacks".to_string())
            .spawn(move || run_callback_worker(worker_shared, rx))
            .map_err(|e| ClockError::Worker(e.to_string()))?;

        info!("Session clock created at {} BPM", initial_bpm);
        Ok(Self {
            shared,
            events,
            worker: Some(worker),
        })
    }

    pub fn peer_count(&self) -> usize {
        self.shared.peers.load(Ordering::SeqCst)
    }

    /// Simulates peers joining or leaving the session.
    pub fn set_peer_count(&self, peers: usize) {
        self.shared.peers.store(peers, Ordering::SeqCst);
        debug!("Session peer count set to {}", peers);
        self.notify_connection_change();
    }

    /// Simulates a tempo change made by a remote peer.
    pub fn apply_peer_tempo(&self, bpm: f64) {
        let now = self.host_time();
        let mut state = self.capture_session_state();
        state.set_tempo(bpm, now);
        self.commit_session_state(state);
    }

    /// Blocks until every callback queued so far has been delivered.
    /// Returns immediately when called from a callback.
    pub fn flush(&self) {
        if self.is_worker_thread() {
            return;
        }
        let (ack_tx, ack_rx) = channel::bounded(1);
        if self.events.send(ClockEvent::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    fn is_worker_thread(&self) -> bool {
        self.worker
            .as_ref()
            .map(|w| w.thread().id() == thread::current().id())
            .unwrap_or(false)
    }

    /// Announces the connection state if it differs from the last one
    /// announced. The comparison and the send happen under one lock, so
    /// racing writers report each transition once and in order.
    fn notify_connection_change(&self) {
        let mut reported = self
            .shared
            .reported_connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let connected = self.shared.is_connected();
        if connected != *reported {
            *reported = connected;
            info!("Session connection changed: connected = {}", connected);
            self.send(ClockEvent::Connected(connected));
        }
    }

    fn send(&self, event: ClockEvent) {
        if self.events.send(event).is_err() {
            error!("Session clock callback worker is gone; dropping event");
        }
    }
}

impl SessionClock for LocalSessionClock {
    fn create(initial_bpm: f64) -> Result<Self, ClockError> {
        Self::new(initial_bpm)
    }

    fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::SeqCst)
    }

    fn set_enabled(&self, enabled: bool) {
        let previous = self.shared.enabled.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            info!("Session sync enabled = {}", enabled);
            self.send(ClockEvent::Enabled(enabled));
            self.notify_connection_change();
        }
    }

    fn capture_session_state(&self) -> SessionState {
        let state = *self.shared.session.lock();
        state.with_connected(self.shared.is_connected())
    }

    fn commit_session_state(&self, state: SessionState) {
        let previous_tempo = {
            let mut session = self.shared.session.lock();
            let previous = session.tempo();
            *session = state;
            previous
        };

        if state.tempo() != previous_tempo {
            debug!(
                "Session tempo changed from {} to {} BPM",
                previous_tempo,
                state.tempo()
            );
            self.send(ClockEvent::Tempo(state.tempo()));
        }
    }

    fn host_time(&self) -> HostTime {
        self.shared.host_clock.now()
    }

    fn set_tempo_callback(&self, callback: TempoCallback) {
        self.shared.slots().tempo = Some(Arc::from(callback));
    }

    fn set_enabled_callback(&self, callback: FlagCallback) {
        self.shared.slots().enabled = Some(Arc::from(callback));
    }

    fn set_connected_callback(&self, callback: FlagCallback) {
        self.shared.slots().connected = Some(Arc::from(callback));
    }
}

impl Drop for LocalSessionClock {
    fn drop(&mut self) {
        let _ = self.events.send(ClockEvent::Shutdown);
        if let Some(worker) = self.worker.take() {
            // The last owner may be released from inside a callback.
            if worker.thread().id() != thread::current().id() && worker.join().is_err() {
                error!("Session clock callback worker panicked");
            }
        }
        info!("Session clock released");
    }
}

fn run_callback_worker(shared: Arc<ClockShared>, events: Receiver<ClockEvent>) {
    trace!("Session clock callback worker started");
    for event in events.iter() {
        match event {
            ClockEvent::Tempo(bpm) => {
                let callback = shared.slots().tempo.clone();
                if let Some(callback) = callback {
                    callback(bpm);
                }
            }
            ClockEvent::Enabled(enabled) => {
                let callback = shared.slots().enabled.clone();
                if let Some(callback) = callback {
                    callback(enabled);
                }
            }
            ClockEvent::Connected(connected) => {
                let callback = shared.slots().connected.clone();
                if let Some(callback) = callback {
                    callback(connected);
                }
            }
            ClockEvent::Flush(ack) => {
                let _ = ack.send(());
            }
            ClockEvent::Shutdown => break,
        }
    }
    trace!("Session clock callback worker stopped");
}
