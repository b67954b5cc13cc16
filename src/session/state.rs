use crate::config::{MAX_TEMPO, MIN_TEMPO};
use crate::host_time::HostTime;

/// Linear mapping between host time and beats at a constant tempo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timeline {
    pub bpm: f64,
    pub beat_origin: f64,
    pub time_origin: HostTime,
}

impl Timeline {
    pub fn new(bpm: f64, beat_origin: f64, time_origin: HostTime) -> Self {
        Self {
            bpm,
            beat_origin,
            time_origin,
        }
    }

    pub fn to_beats(&self, time: HostTime) -> f64 {
        self.beat_origin + time.seconds_since(self.time_origin) * self.bpm / 60.0
    }

    pub fn from_beats(&self, beats: f64) -> HostTime {
        let seconds = (beats - self.beat_origin) * 60.0 / self.bpm;
        self.time_origin.offset_seconds(seconds)
    }

    /// Same beat grid, re-anchored at `time` with a new tempo.
    fn retempo(&self, bpm: f64, time: HostTime) -> Self {
        Timeline::new(bpm, self.to_beats(time), time)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartStopState {
    pub is_playing: bool,
    pub time: HostTime,
}

/// Position of `beats` within the quantum, always in `[0, quantum)`.
pub fn phase(beats: f64, quantum: f64) -> f64 {
    if quantum <= 0.0 {
        return 0.0;
    }
    beats.rem_euclid(quantum)
}

/// Smallest value >= `x` whose phase equals the phase of `target`.
fn next_phase_match(x: f64, target: f64, quantum: f64) -> f64 {
    if quantum <= 0.0 {
        return x;
    }
    x + (phase(target, quantum) - phase(x, quantum)).rem_euclid(quantum)
}

/// Value closest to `x` whose phase equals the phase of `target`.
fn closest_phase_match(x: f64, target: f64, quantum: f64) -> f64 {
    next_phase_match(x - 0.5 * quantum, target, quantum)
}

/// A snapshot of the session. Modify it and hand it back through
/// [`SessionClock::commit_session_state`](super::SessionClock::commit_session_state).
///
/// Beat values are local to this process: their magnitude may differ from
/// other peers', but while connected their phase within any quantum is shared.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionState {
    timeline: Timeline,
    beat_shift: f64,
    start_stop: StartStopState,
    connected: bool,
}

impl SessionState {
    pub fn new(timeline: Timeline, start_stop: StartStopState, connected: bool) -> Self {
        Self {
            timeline,
            beat_shift: 0.0,
            start_stop,
            connected,
        }
    }

    pub(crate) fn with_connected(mut self, connected: bool) -> Self {
        self.connected = connected;
        self
    }

    pub fn timeline(&self) -> Timeline {
        self.timeline
    }

    pub fn tempo(&self) -> f64 {
        self.timeline.bpm
    }

    pub fn is_playing(&self) -> bool {
        self.start_stop.is_playing
    }

    pub fn start_stop(&self) -> StartStopState {
        self.start_stop
    }

    /// Host time of the last start or stop.
    pub fn time_for_is_playing(&self) -> HostTime {
        self.start_stop.time
    }

    pub fn beat_at_time(&self, time: HostTime, quantum: f64) -> f64 {
        let session_beat = self.timeline.to_beats(time);
        closest_phase_match(session_beat - self.beat_shift, session_beat, quantum)
    }

    pub fn phase_at_time(&self, time: HostTime, quantum: f64) -> f64 {
        phase(self.beat_at_time(time, quantum), quantum)
    }

    pub fn time_at_beat(&self, beat: f64, quantum: f64) -> HostTime {
        let session_beat = closest_phase_match(beat + self.beat_shift, beat, quantum);
        self.timeline.from_beats(session_beat)
    }

    /// Changes tempo from `time` on, keeping the beat at `time` in place.
    /// The tempo is clamped to the range the session accepts.
    pub fn set_tempo(&mut self, bpm: f64, time: HostTime) {
        let bpm = bpm.clamp(MIN_TEMPO, MAX_TEMPO);
        self.timeline = self.timeline.retempo(bpm, time);
    }

    pub fn set_is_playing(&mut self, is_playing: bool, time: HostTime) {
        self.start_stop = StartStopState { is_playing, time };
    }

    /// Maps `beat` to `time`. Alone, the mapping is exact; while connected,
    /// the session phase is kept and the closest matching beat is used.
    pub fn request_beat_at_time(&mut self, beat: f64, time: HostTime, quantum: f64) {
        if self.connected {
            self.beat_shift = self.timeline.to_beats(time) - beat;
        } else {
            self.timeline = Timeline::new(self.timeline.bpm, beat, time);
            self.beat_shift = 0.0;
        }
        log::trace!(
            "Requested beat {} at {:?} (quantum {}, connected {})",
            beat,
            time,
            quantum,
            self.connected
        );
    }

    /// Maps `beat` to the time transport started, if it is playing.
    pub fn request_beat_at_start_playing_time(&mut self, beat: f64, quantum: f64) {
        if self.is_playing() {
            self.request_beat_at_time(beat, self.start_stop.time, quantum);
        }
    }

    pub fn set_is_playing_and_request_beat_at_time(
        &mut self,
        is_playing: bool,
        time: HostTime,
        beat: f64,
        quantum: f64,
    ) {
        self.set_is_playing(is_playing, time);
        self.request_beat_at_start_playing_time(beat, quantum);
    }
}
