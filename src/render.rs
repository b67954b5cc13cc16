//! Render-thread side of the engine data.
//!
//! [`RenderSync`] owns the local copy of [`EngineData`]. Once per audio
//! buffer it pulls pending requests from the shared copy without blocking,
//! applies them to the session clock at the buffer's output time, and reports
//! where the buffer lands on the beat grid.

use crate::config::INVALID_BPM;
use crate::engine_data::EngineData;
use crate::host_time::HostTime;
use crate::manager::{Calibration, SyncManager};
use crate::session::{phase, SessionClock};
use log::{debug, error, info, trace};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// A beat boundary that falls inside a rendered buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Click {
    pub beat: f64,
    /// True when the beat starts a new quantum
    pub downbeat: bool,
    pub host_time: HostTime,
}

/// Where one buffer sits on the session timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderFrame {
    /// Beat at the buffer's output time
    pub beat: f64,
    pub phase: f64,
    pub tempo: f64,
    pub quantum: f64,
    pub is_playing: bool,
    pub click: Option<Click>,
}

pub struct RenderSync<C: SessionClock> {
    manager: SyncManager<C>,
    calibration: Calibration,
    local: EngineData,
    is_playing: bool,
    time_at_last_click: HostTime,
}

impl<C: SessionClock> RenderSync<C> {
    pub(crate) fn new(manager: SyncManager<C>, calibration: Calibration) -> Self {
        let local = manager.engine().snapshot();
        Self {
            manager,
            calibration,
            local,
            is_playing: false,
            time_at_last_click: HostTime::default(),
        }
    }

    /// The render thread's private copy of the engine data.
    pub fn local(&self) -> &EngineData {
        &self.local
    }

    pub fn time_at_last_click(&self) -> HostTime {
        self.time_at_last_click
    }

    /// Host ticks spanned by `frames` samples.
    pub fn buffer_ticks(&self, frames: u32) -> u64 {
        let seconds = f64::from(frames) / self.calibration.sample_rate;
        (seconds * self.calibration.seconds_to_host_time).round() as u64
    }

    /// Processes one buffer of `frames` samples starting at `host_time`.
    pub fn process(&mut self, host_time: HostTime, frames: u32) -> RenderFrame {
        self.manager.engine().pull_into(&mut self.local);

        let Some(session) = self.manager.session() else {
            return RenderFrame {
                beat: 0.0,
                phase: 0.0,
                tempo: INVALID_BPM,
                quantum: self.local.quantum,
                is_playing: false,
                click: None,
            };
        };

        let clock = &session.clock;
        let quantum = self.local.quantum;
        let output_time = host_time.add_ticks(u64::from(self.local.output_latency));
        let mut state = clock.capture_session_state();
        let mut modified = false;

        if self.local.request_start && !state.is_playing() {
            state.set_is_playing(true, output_time);
            modified = true;
        }
        if self.local.request_stop && state.is_playing() {
            state.set_is_playing(false, output_time);
            modified = true;
        }

        if !self.is_playing && state.is_playing() {
            // Start from beat 0 at the start time.
            state.request_beat_at_start_playing_time(0.0, quantum);
            self.is_playing = true;
            modified = true;
            info!("Transport started");
        } else if self.is_playing && !state.is_playing() {
            self.is_playing = false;
            info!("Transport stopped");
        }

        if self.local.has_tempo_proposal() {
            state.set_tempo(self.local.propose_bpm, output_time);
            modified = true;
            debug!("Applied tempo proposal {} BPM", self.local.propose_bpm);
        }

        if self.local.has_beat_reset() {
            state.request_beat_at_time(self.local.reset_to_beat_time, output_time, quantum);
            modified = true;
            debug!("Applied beat reset to {}", self.local.reset_to_beat_time);
        }

        if modified {
            clock.commit_session_state(state);
        }

        let beat = state.beat_at_time(output_time, quantum);
        let end_time = output_time.add_ticks(self.buffer_ticks(frames));
        let end_beat = state.beat_at_time(end_time, quantum);

        // A beat boundary in [beat, end_beat), skipping the count-in before 0.
        let next_beat = beat.ceil();
        let click = if self.is_playing && next_beat >= 0.0 && next_beat < end_beat {
            let click_beat = next_beat;
            let click_time = state.time_at_beat(click_beat, quantum);
            self.time_at_last_click = click_time;
            trace!("Click at beat {} (tick {})", click_beat, click_time.ticks());
            Some(Click {
                beat: click_beat,
                downbeat: phase(click_beat, quantum) < 1e-9,
                host_time: click_time,
            })
        } else {
            None
        };

        RenderFrame {
            beat,
            phase: phase(beat, quantum),
            tempo: state.tempo(),
            quantum,
            is_playing: self.is_playing,
            click,
        }
    }
}

impl<C: SessionClock> Drop for RenderSync<C> {
    fn drop(&mut self) {
        self.manager.release_render_claim();
    }
}

/// Drives `render` at buffer cadence until `running` is cleared, calling
/// `on_frame` for every processed buffer.
pub fn run_render_loop<C, F>(
    mut render: RenderSync<C>,
    buffer_frames: u32,
    running: Arc<AtomicBool>,
    mut on_frame: F,
) where
    C: SessionClock,
    F: FnMut(&RenderFrame),
{
    if buffer_frames == 0 {
        error!("Render loop needs at least one frame per buffer");
        return;
    }
    let buffer_duration =
        Duration::from_secs_f64(f64::from(buffer_frames) / render.calibration.sample_rate);
    info!(
        "Render loop started: {} frames per buffer ({:?})",
        buffer_frames, buffer_duration
    );

    while running.load(Ordering::SeqCst) {
        let buffer_start = Instant::now();
        let host_time = render
            .manager
            .with_session_clock(|clock| clock.host_time())
            .unwrap_or_default();

        let frame = render.process(host_time, buffer_frames);
        on_frame(&frame);

        let elapsed = buffer_start.elapsed();
        if elapsed < buffer_duration {
            thread::sleep(buffer_duration - elapsed);
        }
    }

    info!("Render loop stopped");
}
