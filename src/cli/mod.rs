use crate::config::{Settings, MAX_TEMPO, MIN_TEMPO};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Settings file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Starting tempo of the session
    #[arg(short, long)]
    pub bpm: Option<f64>,

    /// Quantum (beats per bar/phrase)
    #[arg(short, long)]
    pub quantum: Option<f64>,

    /// Tempo to propose once the session is running
    #[arg(long)]
    pub propose: Option<f64>,

    /// Enable synchronization on startup
    #[arg(long)]
    pub enable: bool,

    /// Number of simulated session peers
    #[arg(long)]
    pub peers: Option<usize>,

    /// Do not start the transport
    #[arg(long)]
    pub stopped: bool,

    /// Exit after this many seconds
    #[arg(long)]
    pub run_for: Option<u64>,

    /// Log to stderr instead of the log file
    #[arg(long)]
    pub log_stderr: bool,
}

impl Args {
    /// Applies command line overrides on top of loaded settings.
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(bpm) = self.bpm {
            settings.initial_bpm = bpm;
        }
        if let Some(quantum) = self.quantum {
            settings.quantum = quantum;
        }
        if let Some(peers) = self.peers {
            settings.peers = peers;
        }
        if self.enable {
            settings.enabled = true;
        }
    }
}

pub fn validate_tempo(bpm: f64) -> Result<(), String> {
    if !bpm.is_finite() || !(MIN_TEMPO..=MAX_TEMPO).contains(&bpm) {
        return Err(format!(
            "Error: tempo {} is outside the supported range {}-{} BPM",
            bpm, MIN_TEMPO, MAX_TEMPO
        ));
    }
    Ok(())
}

pub fn validate_quantum(quantum: f64) -> Result<(), String> {
    if !quantum.is_finite() || quantum <= 0.0 {
        return Err(format!(
            "Error: quantum {} must be a positive number of beats",
            quantum
        ));
    }
    Ok(())
}
