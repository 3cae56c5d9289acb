//! Configuration request types and validation.
//!
//! A [`ConfigurationRequest`] describes one configuration attempt against
//! a device: which interface to address, which security zone it joins,
//! and how the device is reached. Requests are validated before any
//! session work so malformed input never opens a transport.

use ipnet::Ipv4Net;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default NETCONF-over-SSH port.
pub const DEFAULT_NETCONF_PORT: u16 = 830;

/// Default bound on each session I/O operation, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Physical Junos interface names: media prefix plus fpc/pic/port,
/// e.g. `ge-0/0/1` or `xe-0/1/0`.
static INTERFACE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]{2}-\d+/\d+/\d+$").expect("valid interface name pattern"));

/// Zone names: leading letter, then letters, digits, `_` or `-`.
static ZONE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").expect("valid zone name pattern"));

/// Errors produced by request validation.
///
/// These are rejected before any session is opened and are never recorded
/// as configuration attempts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The device address is empty.
    #[error("Device address must not be empty")]
    EmptyHost,

    /// The interface address is not valid IPv4 CIDR notation.
    #[error("Invalid interface address '{address}': {message}")]
    InvalidAddress {
        /// The address as submitted
        address: String,
        /// Parse failure detail
        message: String,
    },

    /// The interface name is not a physical Junos interface.
    #[error("Invalid interface name '{0}' (expected e.g. 'ge-0/0/1')")]
    InvalidInterface(String),

    /// The security zone name is malformed.
    #[error("Invalid security zone name '{0}'")]
    InvalidZone(String),

    /// Credentials are required when not simulating.
    #[error("Credentials are required when not in simulated mode")]
    MissingCredentials,
}

/// Authentication material for a real device session.
#[derive(Clone)]
pub struct Credentials {
    /// Login user on the device
    pub username: String,
    /// Login password
    pub password: String,
}

impl Credentials {
    /// Create credentials from a username and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// The password must never reach logs or debug dumps.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Parameters of one configuration attempt.
///
/// Immutable once submitted to the engine; construct with
/// [`ConfigurationRequest::new`] and the `with_*` setters.
#[derive(Debug, Clone)]
pub struct ConfigurationRequest {
    /// Device management address (IP or hostname).
    pub host: String,
    /// NETCONF-over-SSH port.
    pub port: u16,
    /// Authentication material; optional in simulated mode.
    pub credentials: Option<Credentials>,
    /// Run against the in-memory mock device instead of a real transport.
    pub simulate: bool,
    /// Interface to configure, e.g. `ge-0/0/1`.
    pub interface: String,
    /// Interface address in CIDR notation, e.g. `192.168.10.1/24`.
    pub address: String,
    /// Security zone the interface joins.
    pub zone: String,
    /// Bound on each session I/O operation, in seconds.
    pub timeout_secs: u64,
}

impl ConfigurationRequest {
    /// Create a request for a device with the stock interface defaults.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_NETCONF_PORT,
            credentials: None,
            simulate: false,
            interface: "ge-0/0/1".to_string(),
            address: "192.168.10.1/24".to_string(),
            zone: "trust".to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Set the login credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    /// Set the NETCONF port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the interface to configure.
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = interface.into();
        self
    }

    /// Set the interface address (CIDR notation).
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Set the security zone.
    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = zone.into();
        self
    }

    /// Set the per-operation timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Enable or disable simulated mode.
    pub fn simulated(mut self, simulate: bool) -> Self {
        self.simulate = simulate;
        self
    }

    /// Parse the interface address as an IPv4 network.
    pub fn parsed_address(&self) -> Result<Ipv4Net, RequestError> {
        self.address
            .parse::<Ipv4Net>()
            .map_err(|e| RequestError::InvalidAddress {
                address: self.address.clone(),
                message: e.to_string(),
            })
    }

    /// Validate the connection parameters only (host and credentials).
    ///
    /// Used by operations that open a session without staging
    /// configuration, like connection probes and backups.
    pub fn validate_target(&self) -> Result<(), RequestError> {
        if self.host.trim().is_empty() {
            return Err(RequestError::EmptyHost);
        }
        if !self.simulate && self.credentials.is_none() {
            return Err(RequestError::MissingCredentials);
        }
        Ok(())
    }

    /// Validate the full request before any session work.
    pub fn validate(&self) -> Result<(), RequestError> {
        self.validate_target()?;
        self.parsed_address()?;
        if !INTERFACE_NAME.is_match(&self.interface) {
            return Err(RequestError::InvalidInterface(self.interface.clone()));
        }
        if !ZONE_NAME.is_match(&self.zone) {
            return Err(RequestError::InvalidZone(self.zone.clone()));
        }
        Ok(())
    }

    /// Credential-free snapshot for the audit trail.
    pub fn summary(&self) -> RequestSummary {
        RequestSummary {
            host: self.host.clone(),
            simulate: self.simulate,
            interface: self.interface.clone(),
            address: self.address.clone(),
            zone: self.zone.clone(),
            username: self.credentials.as_ref().map(|c| c.username.clone()),
        }
    }
}

/// Snapshot of a request as recorded in the audit log.
///
/// Carries everything needed to display the attempt except the password,
/// which is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSummary {
    /// Device management address
    pub host: String,
    /// Whether the attempt ran in simulated mode
    pub simulate: bool,
    /// Interface that was configured
    pub interface: String,
    /// Interface address in CIDR notation
    pub address: String,
    /// Security zone
    pub zone: String,
    /// Login user, when credentials were supplied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}
