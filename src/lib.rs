pub mod cli;
pub mod config;
pub mod engine_data;
pub mod error;
pub mod host_time;
pub mod listeners;
pub mod logging;
pub mod manager;
pub mod render;
pub mod route;
pub mod scheduler;
pub mod session;
pub mod spin_lock;
pub mod ui;

pub use cli::Args;
pub use config::{Settings, INVALID_BEAT_TIME, INVALID_BPM, QUANTUM_DEFAULT};
pub use engine_data::EngineData;
pub use error::{ClockError, SyncError};
pub use listeners::{Listener, ListenerKind, ListenerToken, SyncEvent};
pub use manager::SyncManager;
pub use render::{RenderFrame, RenderSync};
pub use route::{AudioRoute, FixedRoute};
pub use scheduler::{Scheduler, ThreadScheduler};
pub use session::{LocalSessionClock, SessionClock, SessionState};

use std::sync::Arc;

pub fn create_scheduler() -> ThreadScheduler {
    ThreadScheduler::new()
}

/// Builds an uninitialized manager backed by the in-process session clock.
pub fn create_sync_manager(route: Arc<dyn AudioRoute>) -> SyncManager<LocalSessionClock> {
    SyncManager::new(route)
}
