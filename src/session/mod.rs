//! Session clock: the networked musical clock the manager synchronizes with.
//!
//! This module provides:
//! - [`SessionClock`], the black-box contract a clock implementation fulfils
//! - [`SessionState`], a momentary, internally consistent capture of the
//!   session timeline and transport state
//! - [`LocalSessionClock`], an in-process clock with simulated peers
//!
//! Callbacks installed on a clock fire on a thread owned by the clock, never
//! on the caller's thread.

mod local;
mod state;

pub use local::LocalSessionClock;
pub use state::{phase, SessionState, StartStopState, Timeline};

use crate::error::ClockError;
use crate::host_time::HostTime;

pub type TempoCallback = Box<dyn Fn(f64) + Send + Sync>;
pub type FlagCallback = Box<dyn Fn(bool) + Send + Sync>;

pub trait SessionClock: Send + Sync + 'static {
    /// Joins (or starts) a session. A starting tempo is always required.
    fn create(initial_bpm: f64) -> Result<Self, ClockError>
    where
        Self: Sized;

    /// True while synchronization is enabled and at least one peer is present.
    fn is_connected(&self) -> bool;

    fn is_enabled(&self) -> bool;

    fn set_enabled(&self, enabled: bool);

    fn capture_session_state(&self) -> SessionState;

    /// Proposes a modified capture back to the session.
    fn commit_session_state(&self, state: SessionState);

    /// Current host time in the clock's tick unit.
    fn host_time(&self) -> HostTime;

    fn set_tempo_callback(&self, callback: TempoCallback);

    fn set_enabled_callback(&self, callback: FlagCallback);

    fn set_connected_callback(&self, callback: FlagCallback);
}
