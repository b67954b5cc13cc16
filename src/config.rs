// config.rs

use config::{Config, ConfigError, Environment, File};
use log::{debug, info};
use std::path::Path;
use std::time::Duration;

/// Sentinel for "no tempo" (matches the session clock's DBL_MIN convention).
pub const INVALID_BPM: f64 = f64::MIN_POSITIVE;
/// Sentinel for "no beat reset pending".
pub const INVALID_BEAT_TIME: f64 = f64::MIN_POSITIVE;

pub const QUANTUM_DEFAULT: f64 = 4.0;
pub const DEFAULT_BPM: f64 = 120.0;
pub const MIN_TEMPO: f64 = 20.0;
pub const MAX_TEMPO: f64 = 999.0;

pub const DEFAULT_SAMPLE_RATE: f64 = 48_000.0;
pub const DEFAULT_BUFFER_FRAMES: u32 = 512;
pub const DEFAULT_OUTPUT_LATENCY_MS: f64 = 5.0;

const ENV_PREFIX: &str = "LINKSYNC";

/// Runtime settings: defaults, then an optional TOML file, then
/// `LINKSYNC_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub initial_bpm: f64,
    pub quantum: f64,
    pub sample_rate: f64,
    pub buffer_frames: u32,
    pub output_latency_ms: f64,
    pub enabled: bool,
    pub peers: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            initial_bpm: DEFAULT_BPM,
            quantum: QUANTUM_DEFAULT,
            sample_rate: DEFAULT_SAMPLE_RATE,
            buffer_frames: DEFAULT_BUFFER_FRAMES,
            output_latency_ms: DEFAULT_OUTPUT_LATENCY_MS,
            enabled: false,
            peers: 0,
        }
    }
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = Settings::default();
        let mut builder = Config::builder()
            .set_default("initial_bpm", defaults.initial_bpm)?
            .set_default("quantum", defaults.quantum)?
            .set_default("sample_rate", defaults.sample_rate)?
            .set_default("buffer_frames", i64::from(defaults.buffer_frames))?
            .set_default("output_latency_ms", defaults.output_latency_ms)?
            .set_default("enabled", defaults.enabled)?
            .set_default("peers", defaults.peers as i64)?;

        if let Some(path) = path {
            info!("Loading settings from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?;

        let settings = Self::from_config(&config)?;
        debug!("Loaded settings: {:?}", settings);
        Ok(settings)
    }

    fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let sample_rate = config.get_float("sample_rate")?;
        let buffer_frames = config.get_int("buffer_frames")?;
        let peers = config.get_int("peers")?;

        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(ConfigError::Message(format!(
                "sample_rate must be a positive number of Hz: {}",
                sample_rate
            )));
        }

        Ok(Settings {
            initial_bpm: config.get_float("initial_bpm")?,
            quantum: config.get_float("quantum")?,
            sample_rate,
            buffer_frames: u32::try_from(buffer_frames)
                .ok()
                .filter(|frames| *frames > 0)
                .ok_or_else(|| {
                    ConfigError::Message(format!("buffer_frames out of range: {}", buffer_frames))
                })?,
            output_latency_ms: config.get_float("output_latency_ms")?,
            enabled: config.get_bool("enabled")?,
            peers: usize::try_from(peers)
                .map_err(|_| ConfigError::Message(format!("peers out of range: {}", peers)))?,
        })
    }

    pub fn output_latency(&self) -> Duration {
        Duration::from_secs_f64(self.output_latency_ms.max(0.0) / 1000.0)
    }
}
