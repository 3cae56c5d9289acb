//! Device session layer.
//!
//! A [`DeviceSession`] is one authenticated (or simulated) connection to
//! a firewall, exposing the staged-configuration primitives the engine
//! drives: stage directives, validate, commit, roll back. Two variants
//! implement the contract:
//!
//! - [`netconf::NetconfSession`]: NETCONF over SSH against a real device
//!   (feature `russh`, enabled by default)
//! - [`mock::MockSession`]: fully in-memory, no transport
//!
//! The variant is selected once, at construction time, by the request's
//! `simulate` flag; see [`open`]. Sessions are owned exclusively by a
//! single configuration attempt and are never shared across concurrent
//! requests.

pub mod mock;

#[cfg(feature = "russh")]
pub mod netconf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::request::ConfigurationRequest;

/// Errors that can occur during session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Credentials were rejected by the device.
    #[error("Authentication failed for '{user}@{host}': {message}")]
    Authentication {
        /// Target device
        host: String,
        /// Login user
        user: String,
        /// Failure detail
        message: String,
    },

    /// Transport-level failure reaching the device.
    #[error("Device '{host}' unreachable: {message}")]
    Unreachable {
        /// Target device
        host: String,
        /// Failure detail
        message: String,
    },

    /// A connection or RPC exceeded its bounded wait.
    #[error("Operation against '{host}' timed out after {timeout_secs} seconds")]
    Timeout {
        /// Target device
        host: String,
        /// The bound that was exceeded
        timeout_secs: u64,
    },

    /// A staged directive was rejected.
    #[error("Directive rejected: {0}")]
    Apply(String),

    /// Candidate validation (commit check) failed.
    #[error("Validation failed: {0}")]
    Validate(String),

    /// The staged batch was rejected atomically at commit time.
    #[error("Commit failed: {0}")]
    Commit(String),

    /// Discarding staged directives failed.
    #[error("Rollback failed: {0}")]
    Rollback(String),

    /// Reading device state (facts or configuration) failed.
    #[error("Device query failed: {0}")]
    Query(String),

    /// An operation was attempted on a session that is not connected.
    #[error("Session to '{0}' is not connected")]
    NotConnected(String),

    /// No transport backend was compiled in.
    #[error("No device transport available: {0}")]
    Unsupported(String),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No transport established yet, or the session was closed.
    Disconnected,
    /// Transport and protocol session are up.
    Connected,
    /// The session failed and cannot be used further.
    Failed,
}

/// Identity facts gathered from a connected device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFacts {
    /// Configured host name
    pub hostname: String,
    /// Hardware model, e.g. `vSRX`
    pub model: String,
    /// Software version
    pub version: String,
    /// Chassis serial number
    pub serial: String,
    /// Routing-engine uptime, when the device reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<String>,
}

/// One connection to a device, real or simulated.
///
/// Directives staged with [`apply_command`](DeviceSession::apply_command)
/// take no effect until [`commit`](DeviceSession::commit); a failed
/// commit leaves the committed state untouched, and
/// [`rollback`](DeviceSession::rollback) discards everything staged
/// since the last commit.
#[async_trait]
pub trait DeviceSession: Send {
    /// Target address this session talks to.
    fn target(&self) -> &str;

    /// Current connection state.
    fn state(&self) -> SessionState;

    /// Establish the session and gather device facts.
    ///
    /// Idempotent: calling it on an already-connected session returns
    /// the cached facts without reconnecting.
    async fn connect(&mut self) -> SessionResult<DeviceFacts>;

    /// Acquire the candidate configuration lock.
    async fn lock_candidate(&mut self) -> SessionResult<()>;

    /// Stage one configuration directive.
    async fn apply_command(&mut self, directive: &str) -> SessionResult<()>;

    /// Syntax-check the staged candidate without committing it.
    async fn validate(&mut self) -> SessionResult<()>;

    /// Atomically apply all staged directives. On failure no directive
    /// from the batch takes effect.
    async fn commit(&mut self) -> SessionResult<()>;

    /// Discard staged-but-uncommitted directives, restoring the last
    /// committed state.
    async fn rollback(&mut self) -> SessionResult<()>;

    /// Snapshot of the committed device configuration.
    async fn fetch_config(&mut self) -> SessionResult<String>;

    /// Release the session. Safe to call repeatedly; a no-op after the
    /// first call.
    async fn close(&mut self);
}

/// Open a session for a request: mock when simulating, NETCONF otherwise.
pub fn open(request: &ConfigurationRequest) -> SessionResult<Box<dyn DeviceSession>> {
    if request.simulate {
        return Ok(Box::new(mock::MockSession::new(&request.host)));
    }

    #[cfg(feature = "russh")]
    {
        Ok(Box::new(netconf::NetconfSession::from_request(request)?))
    }

    #[cfg(not(feature = "russh"))]
    {
        Err(SessionError::Unsupported(
            "rebuild with the 'russh' feature to talk to real devices".to_string(),
        ))
    }
}
