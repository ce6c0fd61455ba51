//! Error types shared across the crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoutError {
    /// File system I/O failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client construction or request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The requested candidate kind tag is not known.
    #[error("Unknown candidate kind: {0}")]
    UnknownCandidateKind(String),

    #[error("Invalid proxy: {0}")]
    InvalidProxy(String),

    /// A run needs at least one candidate source.
    #[error("No candidate sources given")]
    NoSources,

    /// A run was requested while another one is still active.
    #[error("A run is already in progress")]
    AlreadyRunning,
}

/// Result type alias for scout operations.
pub type Result<T> = std::result::Result<T, ScoutError>;
