//! Error types for the bridge library.

use std::path::PathBuf;

/// Result type alias
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Bridge error types
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file could not be read
    #[error("Failed to read settings {path:?}: {source}")]
    SettingsRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Settings file could not be parsed
    #[error("Invalid settings: {0}")]
    SettingsParse(#[from] serde_yaml::Error),

    /// Settings parsed but hold an unusable value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Encoded frame could not be decoded
    #[error("Image decode failed: {0}")]
    Decode(#[from] image::ImageError),

    /// Pixel buffer does not match its declared dimensions
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Shutdown export could not create or write an artifact
    #[error("Export failed at {path:?}: {source}")]
    Export {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Tabular output error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A worker thread panicked before it could be joined cleanly
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),

    /// The bridge no longer accepts frames
    #[error("Bridge is shutting down")]
    ShuttingDown,
}
