//! The process-wide tempo/transport coordinator.
//!
//! [`SyncManager`] owns the session clock, the shared engine data and the
//! listener registry. It is a cheap handle: clone it and pass it to whatever
//! needs it. The composition root creates exactly one per process.

use crate::config::{INVALID_BPM, INVALID_BEAT_TIME};
use crate::engine_data::{EngineData, SharedEngineData};
use crate::error::{Result, SyncError};
use crate::host_time::{latency_to_host_ticks, Timebase};
use crate::listeners::{Listener, ListenerRegistry, ListenerToken, SyncEvent};
use crate::render::RenderSync;
use crate::route::AudioRoute;
use crate::session::{phase, LocalSessionClock, SessionClock};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

/// Constants captured once at initialization and never written again.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub seconds_to_host_time: f64,
    pub sample_rate: f64,
}

pub(crate) struct Session<C> {
    pub(crate) clock: C,
    pub(crate) calibration: Calibration,
}

pub(crate) struct Inner<C> {
    session: OnceLock<Session<C>>,
    route: Arc<dyn AudioRoute>,
    engine: SharedEngineData,
    listeners: ListenerRegistry,
    initializing: AtomicBool,
    render_claimed: AtomicBool,
}

impl<C: SessionClock> Inner<C> {
    fn on_session_tempo_changed(&self, bpm: f64) {
        let quantum = self.engine.snapshot().quantum;
        info!("Session tempo changed to {} BPM (quantum {})", bpm, quantum);
        self.listeners
            .dispatch(SyncEvent::TempoChanged { bpm, quantum });
    }

    fn on_enabled_changed(&self, enabled: bool) {
        info!("Sync enabled = {}", enabled);
        self.listeners.dispatch(SyncEvent::ActivationChanged(enabled));
    }

    fn on_connection_changed(&self, connected: bool) {
        info!("Connection status changed: connected = {}", connected);
        self.listeners
            .dispatch(SyncEvent::ConnectionChanged(connected));
    }
}

impl<C> Drop for Inner<C> {
    fn drop(&mut self) {
        if self.session.get().is_some() {
            info!("Releasing session clock");
        }
    }
}

pub struct SyncManager<C: SessionClock = LocalSessionClock> {
    inner: Arc<Inner<C>>,
}

impl<C: SessionClock> Clone for SyncManager<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: SessionClock> SyncManager<C> {
    pub fn new(route: Arc<dyn AudioRoute>) -> Self {
        Self {
            inner: Arc::new(Inner {
                session: OnceLock::new(),
                route,
                engine: SharedEngineData::new(),
                listeners: ListenerRegistry::new(),
                initializing: AtomicBool::new(false),
                render_claimed: AtomicBool::new(false),
            }),
        }
    }

    /// Creates the session clock with a starting tempo and installs its
    /// callbacks. May only succeed once per manager; concurrent callers see
    /// `AlreadyInitialized` while the first one is still running.
    pub fn initialize(&self, initial_bpm: f64, quantum: f64) -> Result<()> {
        if self
            .inner
            .initializing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SyncError::AlreadyInitialized);
        }

        let result = self.create_session(initial_bpm, quantum);
        if result.is_err() {
            self.inner.initializing.store(false, Ordering::Release);
        }
        result
    }

    fn create_session(&self, initial_bpm: f64, quantum: f64) -> Result<()> {
        validate_quantum(quantum)?;
        let sample_rate = self.inner.route.sample_rate();
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            warn!("Rejecting audio route with sample rate {}", sample_rate);
            return Err(SyncError::InvalidSampleRate(sample_rate));
        }

        info!(
            "Initializing sync manager at {} BPM, quantum {}",
            initial_bpm, quantum
        );

        let clock = C::create(initial_bpm)?;
        let calibration = Calibration {
            seconds_to_host_time: Timebase::native().seconds_to_host_time(),
            sample_rate,
        };
        let output_latency = latency_to_host_ticks(
            self.inner.route.output_latency(),
            calibration.seconds_to_host_time,
        );

        if self
            .inner
            .session
            .set(Session { clock, calibration })
            .is_err()
        {
            return Err(SyncError::AlreadyInitialized);
        }

        self.inner.engine.reset(output_latency, quantum);
        debug!("Initial output latency: {} host ticks", output_latency);

        self.install_callbacks();
        Ok(())
    }

    fn install_callbacks(&self) {
        let Some(session) = self.inner.session.get() else {
            return;
        };

        let weak: Weak<Inner<C>> = Arc::downgrade(&self.inner);
        session.clock.set_tempo_callback(Box::new(move |bpm| {
            if let Some(inner) = weak.upgrade() {
                inner.on_session_tempo_changed(bpm);
            }
        }));

        let weak: Weak<Inner<C>> = Arc::downgrade(&self.inner);
        session.clock.set_enabled_callback(Box::new(move |enabled| {
            if let Some(inner) = weak.upgrade() {
                inner.on_enabled_changed(enabled);
            }
        }));

        let weak: Weak<Inner<C>> = Arc::downgrade(&self.inner);
        session.clock.set_connected_callback(Box::new(move |connected| {
            if let Some(inner) = weak.upgrade() {
                inner.on_connection_changed(connected);
            }
        }));
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.session.get().is_some()
    }

    pub(crate) fn session(&self) -> Option<&Session<C>> {
        self.inner.session.get()
    }

    pub(crate) fn engine(&self) -> &SharedEngineData {
        &self.inner.engine
    }

    pub fn calibration(&self) -> Option<Calibration> {
        self.session().map(|s| s.calibration)
    }

    /// Runs `f` with the session clock, if there is one.
    pub fn with_session_clock<R>(&self, f: impl FnOnce(&C) -> R) -> Option<R> {
        self.session().map(|s| f(&s.clock))
    }

    pub fn is_connected(&self) -> bool {
        self.session()
            .map(|s| s.clock.is_connected())
            .unwrap_or(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.session()
            .map(|s| s.clock.is_enabled())
            .unwrap_or(false)
    }

    pub fn set_enabled(&self, enabled: bool) {
        match self.session() {
            Some(session) => session.clock.set_enabled(enabled),
            None => warn!("Ignoring set_enabled({}) before initialization", enabled),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.session()
            .map(|s| s.clock.capture_session_state().is_playing())
            .unwrap_or(false)
    }

    /// Requests transport start or stop. The render path applies it.
    pub fn set_playing(&self, playing: bool) {
        self.inner.engine.update(|data| {
            data.request_start = playing;
            data.request_stop = !playing;
        });
        debug!("Requested transport {}", if playing { "start" } else { "stop" });
    }

    pub fn tempo(&self) -> f64 {
        self.session()
            .map(|s| s.clock.capture_session_state().tempo())
            .unwrap_or(INVALID_BPM)
    }

    /// Proposes a new session tempo. The render path applies it.
    pub fn set_tempo(&self, bpm: f64) -> Result<()> {
        if !bpm.is_finite() || bpm <= 0.0 {
            warn!("Rejecting tempo proposal {}", bpm);
            return Err(SyncError::InvalidTempo(bpm));
        }
        self.inner.engine.update(|data| data.propose_bpm = bpm);
        debug!("Proposed tempo {} BPM", bpm);
        Ok(())
    }

    /// Beat position now. Returns 0 before initialization.
    pub fn beat_time(&self) -> f64 {
        let Some(session) = self.session() else {
            debug!("Beat requested before initialization; returning 0");
            return 0.0;
        };
        let quantum = self.quantum();
        session
            .clock
            .capture_session_state()
            .beat_at_time(session.clock.host_time(), quantum)
    }

    /// Position of the current beat within the quantum.
    pub fn phase(&self) -> f64 {
        phase(self.beat_time(), self.quantum())
    }

    pub fn quantum(&self) -> f64 {
        self.inner.engine.snapshot().quantum
    }

    pub fn set_quantum(&self, quantum: f64) -> Result<()> {
        validate_quantum(quantum)?;
        self.inner.engine.update(|data| data.quantum = quantum);
        debug!("Quantum set to {}", quantum);
        Ok(())
    }

    /// Asks the render path to map `beat` onto the current output time.
    pub fn request_beat_reset(&self, beat: f64) {
        if !beat.is_finite() || beat == INVALID_BEAT_TIME {
            warn!("Rejecting beat reset to {}", beat);
            return;
        }
        self.inner
            .engine
            .update(|data| data.reset_to_beat_time = beat);
        debug!("Requested beat reset to {}", beat);
    }

    /// Recomputes the output latency after the audio route changed.
    pub fn handle_route_change(&self) {
        let Some(calibration) = self.calibration() else {
            debug!("Route change before initialization ignored");
            return;
        };
        let output_latency = latency_to_host_ticks(
            self.inner.route.output_latency(),
            calibration.seconds_to_host_time,
        );
        self.inner
            .engine
            .update(|data| data.output_latency = output_latency);
        info!("Route change: output latency {} host ticks", output_latency);
    }

    /// Copy of the shared engine data.
    pub fn engine_data(&self) -> EngineData {
        self.inner.engine.snapshot()
    }

    pub fn add_listener(&self, listener: Listener) -> ListenerToken {
        self.inner.listeners.add(listener)
    }

    pub fn remove_listener(&self, token: ListenerToken) -> bool {
        self.inner.listeners.remove(token)
    }

    pub fn remove_all_listeners(&self) {
        self.inner.listeners.remove_all();
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Claims the render-path side of the engine data. Only one may exist at
    /// a time; dropping it releases the claim.
    pub fn render_sync(&self) -> Result<RenderSync<C>> {
        let Some(session) = self.session() else {
            return Err(SyncError::NotInitialized);
        };
        if self
            .inner
            .render_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SyncError::RenderPathClaimed);
        }
        Ok(RenderSync::new(self.clone(), session.calibration))
    }

    pub(crate) fn release_render_claim(&self) {
        self.inner.render_claimed.store(false, Ordering::Release);
    }
}

fn validate_quantum(quantum: f64) -> Result<()> {
    if quantum.is_finite() && quantum > 0.0 {
        Ok(())
    } else {
        warn!("Rejecting quantum {}", quantum);
        Err(SyncError::InvalidQuantum(quantum))
    }
}
