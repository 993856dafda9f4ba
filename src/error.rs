//! Error types for the swcache library.

use thiserror::Error;

/// Errors that can occur during cache and registration operations.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error from the disk-backed store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A pre-listed asset could not be fetched or stored during install.
    /// The whole candidate generation is discarded when this occurs.
    #[error("install failed for {url}: {reason}")]
    Install {
        /// URL of the asset that failed.
        url: String,
        /// What went wrong with this asset.
        reason: String,
    },

    /// The network was unreachable for a request.
    #[error("network failure for {url}: {reason}")]
    Network {
        /// URL that could not be reached.
        url: String,
        /// Underlying failure description.
        reason: String,
    },

    /// A lifecycle operation was attempted in the wrong worker state.
    #[error("invalid worker state: expected {expected}, got {actual}")]
    InvalidState {
        /// State the operation requires.
        expected: String,
        /// State the worker was actually in.
        actual: String,
    },

    /// A stored cache entry could not be encoded or decoded.
    #[error("cache entry error: {0}")]
    Entry(#[from] serde_json::Error),

    /// Asset manifest could not be parsed.
    #[error("manifest error: {0}")]
    Manifest(#[from] toml::de::Error),

    /// Service workers are not available in this environment.
    #[error("registration unsupported: {0}")]
    Unsupported(String),
}

/// A specialized `Result` type for swcache operations.
pub type Result<T> = std::result::Result<T, Error>;
