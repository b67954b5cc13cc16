use std::error::Error;
use std::fmt;

/// Errors raised by a session clock implementation
#[derive(Debug, Clone, PartialEq)]
pub enum ClockError {
    /// The clock cannot start from this tempo
    InvalidTempo(f64),
    /// The callback worker could not be started
    Worker(String),
}

impl fmt::Display for ClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockError::InvalidTempo(bpm) => write!(f, "invalid session tempo: {} BPM", bpm),
            ClockError::Worker(msg) => write!(f, "session clock worker error: {}", msg),
        }
    }
}

impl Error for ClockError {}

/// Errors surfaced by the sync manager
#[derive(Debug, Clone, PartialEq)]
pub enum SyncError {
    /// `initialize` was called on an already initialized manager
    AlreadyInitialized,
    /// The operation needs an initialized manager
    NotInitialized,
    /// The session clock could not be constructed
    ClockUnavailable(ClockError),
    /// A tempo that is not finite and positive
    InvalidTempo(f64),
    /// A quantum that is not finite and positive
    InvalidQuantum(f64),
    /// The audio route reports a sample rate that is not finite and positive
    InvalidSampleRate(f64),
    /// Another render path consumer is already attached
    RenderPathClaimed,
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::AlreadyInitialized => write!(f, "sync manager is already initialized"),
            SyncError::NotInitialized => write!(f, "sync manager is not initialized"),
            SyncError::ClockUnavailable(err) => write!(f, "session clock unavailable: {}", err),
            SyncError::InvalidTempo(bpm) => write!(f, "invalid tempo: {}", bpm),
            SyncError::InvalidQuantum(quantum) => write!(f, "invalid quantum: {}", quantum),
            SyncError::InvalidSampleRate(rate) => write!(f, "invalid sample rate: {} Hz", rate),
            SyncError::RenderPathClaimed => write!(f, "render path is already claimed"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SyncError::ClockUnavailable(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ClockError> for SyncError {
    fn from(err: ClockError) -> Self {
        SyncError::ClockUnavailable(err)
    }
}

/// Result type for sync manager operations
pub type Result<T> = std::result::Result<T, SyncError>;
