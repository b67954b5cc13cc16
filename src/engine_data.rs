use crate::config::{INVALID_BEAT_TIME, INVALID_BPM, QUANTUM_DEFAULT};
use crate::spin_lock::SpinLock;
use log::trace;

/// Engine-related data that can be changed from any thread and is consumed
/// by the render thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineData {
    /// Hardware output latency in host ticks
    pub output_latency: u32,
    pub reset_to_beat_time: f64,
    pub request_start: bool,
    pub request_stop: bool,
    pub propose_bpm: f64,
    pub quantum: f64,
}

impl Default for EngineData {
    fn default() -> Self {
        Self {
            output_latency: 0,
            reset_to_beat_time: INVALID_BEAT_TIME,
            request_start: false,
            request_stop: false,
            propose_bpm: INVALID_BPM,
            quantum: QUANTUM_DEFAULT,
        }
    }
}

impl EngineData {
    pub fn has_tempo_proposal(&self) -> bool {
        self.propose_bpm != INVALID_BPM
    }

    pub fn has_beat_reset(&self) -> bool {
        self.reset_to_beat_time != INVALID_BEAT_TIME
    }

    fn clear_requests(&mut self) {
        self.request_start = false;
        self.request_stop = false;
        self.propose_bpm = INVALID_BPM;
        self.reset_to_beat_time = INVALID_BEAT_TIME;
    }
}

/// The cross-thread copy of [`EngineData`]. Every access is a short
/// critical section on a spin lock.
#[derive(Debug, Default)]
pub struct SharedEngineData {
    data: SpinLock<EngineData>,
}

impl SharedEngineData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts the shared copy into its post-initialization state.
    pub fn reset(&self, output_latency: u32, quantum: f64) {
        self.data.with(|data| {
            *data = EngineData {
                output_latency,
                quantum,
                ..EngineData::default()
            }
        });
    }

    pub fn snapshot(&self) -> EngineData {
        *self.data.lock()
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut EngineData) -> R) -> R {
        self.data.with(f)
    }

    /// Copies the shared data into `local` without blocking, consuming the
    /// one-shot requests. Returns false if the lock was contended; `local`
    /// then keeps its latency and quantum but drops its one-shot requests.
    pub fn pull_into(&self, local: &mut EngineData) -> bool {
        match self.data.try_lock() {
            Some(mut shared) => {
                *local = *shared;
                shared.clear_requests();
                true
            }
            None => {
                trace!("Shared engine data contended; skipping pull");
                local.clear_requests();
                false
            }
        }
    }
}
