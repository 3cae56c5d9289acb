//! Runtime configuration.
//!
//! Configuration is merged from three layers, later layers winning:
//! built-in defaults, an optional TOML file (`--config`,
//! `$SRXAUTO_CONFIG`, or `./srxauto.toml`), and `SRXAUTO_*` environment
//! variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::request::{DEFAULT_NETCONF_PORT, DEFAULT_TIMEOUT_SECS};
use crate::telemetry::LogFormat;

/// Default project-local configuration file name.
const PROJECT_CONFIG: &str = "srxauto.toml";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default request parameters
    pub defaults: Defaults,
    /// Logging settings
    pub logging: LoggingConfig,
    /// Audit trail settings
    pub audit: AuditConfig,
}

/// Default request parameters, used when CLI flags are omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Interface to configure
    pub interface: String,
    /// Interface address in CIDR notation
    pub address: String,
    /// Security zone
    pub zone: String,
    /// NETCONF port
    pub port: u16,
    /// Per-operation timeout in seconds
    pub timeout_secs: u64,
    /// Default login user
    pub username: Option<String>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            interface: "ge-0/0/1".to_string(),
            address: "192.168.10.1/24".to_string(),
            zone: "trust".to_string(),
            port: DEFAULT_NETCONF_PORT,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            username: None,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (`error`, `warn`, `info`, `debug`, `trace`)
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Log file; stderr when unset
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

/// Audit trail settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// JSON-lines sink mirroring audit entries; in-memory only when unset
    pub file: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration, merging file and environment layers.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("SRXAUTO_CONFIG").map(PathBuf::from))
            .or_else(|| {
                let local = PathBuf::from(PROJECT_CONFIG);
                local.exists().then_some(local)
            });

        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config file '{}'", path.display()))?;
                toml::from_str(&text)
                    .with_context(|| format!("failed to parse config file '{}'", path.display()))?
            }
            None => Self::default(),
        };

        config.apply_env();
        Ok(config)
    }

    /// Apply `SRXAUTO_*` environment overrides.
    fn apply_env(&mut self) {
        if let Ok(interface) = std::env::var("SRXAUTO_INTERFACE") {
            self.defaults.interface = interface;
        }
        if let Ok(address) = std::env::var("SRXAUTO_ADDRESS") {
            self.defaults.address = address;
        }
        if let Ok(zone) = std::env::var("SRXAUTO_ZONE") {
            self.defaults.zone = zone;
        }
        if let Ok(username) = std::env::var("SRXAUTO_USERNAME") {
            self.defaults.username = Some(username);
        }
        if let Ok(timeout) = std::env::var("SRXAUTO_TIMEOUT") {
            if let Ok(timeout) = timeout.parse() {
                self.defaults.timeout_secs = timeout;
            }
        }
        if let Ok(level) = std::env::var("SRXAUTO_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(file) = std::env::var("SRXAUTO_AUDIT_FILE") {
            self.audit.file = Some(PathBuf::from(file));
        }
    }
}
