//! Audio output route as seen by the sync manager.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// The current audio output device.
pub trait AudioRoute: Send + Sync {
    /// Hardware output latency of the current route.
    fn output_latency(&self) -> Duration;

    fn sample_rate(&self) -> f64;
}

/// A route with a fixed sample rate whose latency can be changed at runtime,
/// e.g. when headphones are plugged in.
#[derive(Debug)]
pub struct FixedRoute {
    sample_rate: f64,
    latency_nanos: AtomicU64,
}

impl FixedRoute {
    pub fn new(sample_rate: f64, output_latency: Duration) -> Self {
        Self {
            sample_rate,
            latency_nanos: AtomicU64::new(output_latency.as_nanos() as u64),
        }
    }

    pub fn set_output_latency(&self, latency: Duration) {
        self.latency_nanos
            .store(latency.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl AudioRoute for FixedRoute {
    fn output_latency(&self) -> Duration {
        Duration::from_nanos(self.latency_nanos.load(Ordering::SeqCst))
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}
