//! Error types for the Vizor core

use thiserror::Error;

/// Core error type. Only control-thread operations return these; the audio
/// path degrades to frame skips instead of erroring.
#[derive(Error, Debug)]
pub enum VzError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(f64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Graph error: {0}")]
    Graph(String),
}

/// Result type alias
pub type VzResult<T> = Result<T, VzError>;
