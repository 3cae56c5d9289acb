//! Append-only audit history of configuration attempts.
//!
//! Every completed configuration attempt is recorded as an
//! [`AuditEntry`]: the request snapshot (credentials excluded), the full
//! outcome, and a timestamp. Entries are kept in insertion order for the
//! process lifetime and are never edited or removed. An optional
//! JSON-lines file sink mirrors entries to disk for the CLI `history`
//! command; sink failures are logged and ignored (fail-open) so history
//! recording never blocks a configuration attempt.
//!
//! The log is an owned, injected instance; there is no ambient global
//! history.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::engine::ConfigurationOutcome;
use crate::error::{Error, Result};
use crate::request::RequestSummary;

/// One recorded configuration attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entry identifier
    pub id: Uuid,
    /// When the entry was recorded
    pub timestamp: DateTime<Utc>,
    /// The request, with credentials excluded
    pub request: RequestSummary,
    /// The attempt's outcome
    pub outcome: ConfigurationOutcome,
}

/// Append-only, insertion-ordered history of configuration attempts.
pub struct AuditLog {
    entries: Mutex<Vec<AuditEntry>>,
    sink: Option<PathBuf>,
}

impl AuditLog {
    /// Create an in-memory audit log.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            sink: None,
        }
    }

    /// Create an audit log that mirrors entries to a JSON-lines file.
    pub fn with_sink(path: impl Into<PathBuf>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            sink: Some(path.into()),
        }
    }

    /// Record one attempt. Returns the stored entry.
    pub fn record(&self, request: RequestSummary, outcome: ConfigurationOutcome) -> AuditEntry {
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            request,
            outcome,
        };

        self.entries.lock().push(entry.clone());
        debug!(entry_id = %entry.id, host = %entry.request.host, "audit entry recorded");

        if let Some(path) = &self.sink {
            if let Err(e) = append_to_sink(path, &entry) {
                warn!(path = %path.display(), error = %e, "failed to mirror audit entry to sink");
            }
        }

        entry
    }

    /// All entries, in insertion order.
    ///
    /// Returns clones; callers wanting most-recent-first reverse at
    /// presentation time.
    pub fn list(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    /// Number of recorded entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no entries have been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

fn append_to_sink(path: &Path, entry: &AuditEntry) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let line = serde_json::to_string(entry)?;
    writeln!(file, "{}", line)?;
    Ok(())
}

/// Read entries back from a JSON-lines sink file, in file order.
pub fn read_sink(path: &Path) -> Result<Vec<AuditEntry>> {
    let file = std::fs::File::open(path).map_err(Error::Io)?;
    let reader = BufReader::new(file);

    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(&line)?);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ConfigurationRequest;

    fn sample_outcome() -> ConfigurationOutcome {
        ConfigurationOutcome {
            attempt_id: Uuid::new_v4(),
            success: true,
            message: "Configuration applied successfully".to_string(),
            completed_steps: Vec::new(),
            failed_step: None,
            commands: Vec::new(),
            facts: None,
            simulate: true,
            timestamp: Utc::now(),
            duration_ms: 12,
        }
    }

    fn sample_request() -> RequestSummary {
        ConfigurationRequest::new("192.168.1.1")
            .simulated(true)
            .summary()
    }

    #[test]
    fn test_entries_preserve_insertion_order() {
        let log = AuditLog::new();
        for host in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
            let request = ConfigurationRequest::new(host).simulated(true).summary();
            log.record(request, sample_outcome());
        }

        let entries = log.list();
        assert_eq!(entries.len(), 3);
        let hosts: Vec<&str> = entries.iter().map(|e| e.request.host.as_str()).collect();
        assert_eq!(hosts, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    }

    #[test]
    fn test_list_returns_clones() {
        let log = AuditLog::new();
        log.record(sample_request(), sample_outcome());

        let mut entries = log.list();
        entries.clear();
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_empty_log() {
        let log = AuditLog::new();
        assert!(log.is_empty());
        assert_eq!(log.len(), 0);
        assert!(log.list().is_empty());
    }
}
