// ui.rs

use crate::listeners::{Listener, ListenerToken};
use crate::manager::SyncManager;
use crate::session::SessionClock;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const REFRESH_INTERVAL: Duration = Duration::from_millis(50);

fn create_beat_progress(multi_progress: &MultiProgress, quantum: u64) -> ProgressBar {
    let pb = multi_progress.add(ProgressBar::new(quantum));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:.bold} [{bar:40.cyan}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("⣀⣤⣦⣶⣷⣿ "),
    );
    pb.set_prefix("Beat");
    pb
}

fn create_session_spinner(multi_progress: &MultiProgress) -> ProgressBar {
    let pb = multi_progress.add(ProgressBar::new_spinner());
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix("Session");
    pb
}

/// Terminal view of the beat position within the quantum and the session
/// status. Listener registrations are removed when the monitor is dropped.
pub struct BeatMonitor<C: SessionClock> {
    manager: SyncManager<C>,
    #[allow(dead_code)]
    multi_progress: MultiProgress,
    beat_pb: ProgressBar,
    session_pb: ProgressBar,
    tokens: Vec<ListenerToken>,
}

impl<C: SessionClock> BeatMonitor<C> {
    pub fn new(manager: SyncManager<C>) -> Self {
        Self::with_draw_target(manager, ProgressDrawTarget::stderr())
    }

    pub fn with_draw_target(manager: SyncManager<C>, target: ProgressDrawTarget) -> Self {
        let multi_progress = MultiProgress::with_draw_target(target);
        let beat_pb = create_beat_progress(&multi_progress, manager.quantum().ceil() as u64);
        let session_pb = create_session_spinner(&multi_progress);

        let mut tokens = Vec::new();

        let pb = beat_pb.clone();
        tokens.push(manager.add_listener(Listener::tempo(move |bpm, quantum| {
            pb.set_length(quantum.ceil() as u64);
            pb.println(format!("Tempo changed: {:.1} BPM", bpm));
        })));

        let pb = session_pb.clone();
        tokens.push(manager.add_listener(Listener::activation(move |enabled| {
            pb.println(format!(
                "Sync {}",
                if enabled { "enabled" } else { "disabled" }
            ));
        })));

        let pb = session_pb.clone();
        tokens.push(manager.add_listener(Listener::connection(move |connected| {
            pb.println(format!(
                "Peers {}",
                if connected { "connected" } else { "disconnected" }
            ));
        })));

        BeatMonitor {
            manager,
            multi_progress,
            beat_pb,
            session_pb,
            tokens,
        }
    }

    /// Redraws once from the manager's current state.
    pub fn refresh(&self) {
        let beat = self.manager.beat_time();
        let phase = self.manager.phase();
        self.beat_pb.set_position(phase.floor() as u64 + 1);

        self.session_pb.set_message(format!(
            "BPM: {:.1}, Beat: {:.2}, Quantum: {}, Playing: {}, Enabled: {}, Connected: {}",
            self.manager.tempo(),
            beat,
            self.manager.quantum(),
            self.manager.is_playing(),
            self.manager.is_enabled(),
            self.manager.is_connected()
        ));
        self.session_pb.tick();
    }

    pub fn run(&self, running: Arc<AtomicBool>) {
        info!("Beat monitor started");
        while running.load(Ordering::SeqCst) {
            self.refresh();
            thread::sleep(REFRESH_INTERVAL);
        }
        self.beat_pb.finish_and_clear();
        self.session_pb.finish_and_clear();
        info!("Beat monitor stopped");
    }
}

impl<C: SessionClock> Drop for BeatMonitor<C> {
    fn drop(&mut self) {
        for token in self.tokens.drain(..) {
            self.manager.remove_listener(token);
        }
    }
}
