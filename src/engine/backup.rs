//! Configuration backup.
//!
//! A backup captures the committed configuration of a device (real or
//! simulated) together with a timestamp. Backups run as the second step
//! of every configuration attempt and are also invocable standalone via
//! [`ConfigurationEngine::backup`](crate::engine::ConfigurationEngine::backup).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::session::{DeviceSession, SessionResult};

/// Snapshot of a device's committed configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Device the snapshot was taken from
    pub host: String,
    /// Whether the snapshot came from a simulated session
    pub simulate: bool,
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
    /// Opaque configuration snapshot
    pub configuration: String,
}

/// Capture the committed configuration of a connected session.
pub async fn create_backup(
    session: &mut dyn DeviceSession,
    simulate: bool,
) -> SessionResult<BackupRecord> {
    let configuration = session.fetch_config().await?;
    info!(
        host = %session.target(),
        bytes = configuration.len(),
        "configuration backup created"
    );

    Ok(BackupRecord {
        host: session.target().to_string(),
        simulate,
        timestamp: Utc::now(),
        configuration,
    })
}
