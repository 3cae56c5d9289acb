//! Error types for srxauto.
//!
//! Step-level failures inside a configuration attempt are converted into
//! step results by the engine and surfaced in the outcome, so they never
//! appear here. This module covers everything rejected before or outside
//! an attempt: malformed requests, in-flight contention, standalone
//! backups, configuration and I/O problems.

use thiserror::Error;

use crate::request::RequestError;
use crate::session::SessionError;

/// Result type alias for srxauto operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for srxauto.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed request, rejected before any session work.
    #[error("Invalid request: {0}")]
    Request(#[from] RequestError),

    /// A session operation failed outside the staged sequence.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Another attempt is already in flight for the target device.
    #[error("A configuration attempt against '{host}' is already in flight")]
    AttemptInFlight {
        /// The contended target
        host: String,
    },

    /// Standalone configuration backup failed.
    #[error("Backup of '{host}' failed: {message}")]
    Backup {
        /// Target device
        host: String,
        /// Failure detail
        message: String,
    },

    /// Runtime configuration problem.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Request(_) => 2,
            Error::Session(SessionError::Authentication { .. }) => 3,
            Error::Session(_) => 4,
            Error::AttemptInFlight { .. } => 5,
            Error::Backup { .. } => 6,
            _ => 1,
        }
    }
}
