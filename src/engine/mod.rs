//! Configuration orchestration engine.
//!
//! The engine drives the staged apply sequence that turns a
//! [`ConfigurationRequest`] into committed device state:
//!
//! ```text
//! Connect -> Backup -> LoadInterfaceConfig -> ConfigureIp
//!         -> AssignZone -> CreatePolicies -> Validate -> Commit
//! ```
//!
//! Steps execute strictly in order. A failing step records its error,
//! triggers a rollback of everything staged on the session (when the
//! connection had been established), and terminates the attempt: no
//! later step runs and nothing is retried. Every attempt produces a
//! well-formed [`ConfigurationOutcome`]; step-level failures never
//! propagate to the caller as faults.
//!
//! One attempt runs per device target at a time: a second request for a
//! target already in flight is rejected so staged directives on the
//! device are never interleaved. Attempts against different targets are
//! independent and proceed in parallel.

pub mod backup;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audit::{AuditEntry, AuditLog};
use crate::callback::{EngineEvent, NullCallback, SharedCallback};
use crate::commands;
use crate::error::{Error, Result};
use crate::request::ConfigurationRequest;
use crate::session::{self, DeviceFacts, DeviceSession, SessionResult};
use backup::BackupRecord;

/// One stage of the apply sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplyStep {
    /// Establish the device session and gather facts.
    Connect,
    /// Snapshot the committed configuration.
    Backup,
    /// Acquire the candidate configuration lock.
    LoadInterfaceConfig,
    /// Stage the interface address and description directives.
    ConfigureIp,
    /// Stage the zone-membership directive.
    AssignZone,
    /// Stage the traffic policy directives.
    CreatePolicies,
    /// Commit-check the staged candidate.
    Validate,
    /// Atomically commit the staged batch.
    Commit,
}

impl ApplyStep {
    /// The canonical step order.
    pub const SEQUENCE: [ApplyStep; 8] = [
        ApplyStep::Connect,
        ApplyStep::Backup,
        ApplyStep::LoadInterfaceConfig,
        ApplyStep::ConfigureIp,
        ApplyStep::AssignZone,
        ApplyStep::CreatePolicies,
        ApplyStep::Validate,
        ApplyStep::Commit,
    ];

    /// Human-readable progress description.
    pub fn description(&self) -> &'static str {
        match self {
            ApplyStep::Connect => "Connecting to device",
            ApplyStep::Backup => "Backing up current configuration",
            ApplyStep::LoadInterfaceConfig => "Loading interface configuration",
            ApplyStep::ConfigureIp => "Configuring IP address",
            ApplyStep::AssignZone => "Assigning to security zone",
            ApplyStep::CreatePolicies => "Creating security policies",
            ApplyStep::Validate => "Validating configuration",
            ApplyStep::Commit => "Committing changes",
        }
    }
}

impl fmt::Display for ApplyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApplyStep::Connect => "connect",
            ApplyStep::Backup => "backup",
            ApplyStep::LoadInterfaceConfig => "load-interface-config",
            ApplyStep::ConfigureIp => "configure-ip",
            ApplyStep::AssignZone => "assign-zone",
            ApplyStep::CreatePolicies => "create-policies",
            ApplyStep::Validate => "validate",
            ApplyStep::Commit => "commit",
        };
        write!(f, "{}", name)
    }
}

/// Record of one executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Which step ran
    pub step: ApplyStep,
    /// Whether it succeeded
    pub succeeded: bool,
    /// Result detail, or the error text on failure
    pub detail: String,
    /// Directives staged during this step
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,
}

/// Final outcome of one configuration attempt.
///
/// `completed_steps` is always a strict prefix of
/// [`ApplyStep::SEQUENCE`]; `failed_step` is set exactly when `success`
/// is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationOutcome {
    /// Attempt identifier
    pub attempt_id: Uuid,
    /// Overall success
    pub success: bool,
    /// Human-readable summary
    pub message: String,
    /// Successfully completed steps, in execution order
    pub completed_steps: Vec<StepResult>,
    /// The failing step, when the attempt did not succeed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<StepResult>,
    /// Directives that were committed (or would have been, in simulated
    /// mode); populated only on success
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,
    /// Facts gathered at connect time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facts: Option<DeviceFacts>,
    /// Whether the attempt ran in simulated mode
    pub simulate: bool,
    /// When the attempt finished
    pub timestamp: DateTime<Utc>,
    /// Wall-clock duration of the attempt
    pub duration_ms: u64,
}

impl ConfigurationOutcome {
    /// Names of the completed steps, in order.
    pub fn completed_step_names(&self) -> Vec<ApplyStep> {
        self.completed_steps.iter().map(|s| s.step).collect()
    }
}

/// Result of a connection probe.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionReport {
    /// Target device
    pub host: String,
    /// Whether a session was established
    pub connected: bool,
    /// Facts from the device, when connected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facts: Option<DeviceFacts>,
    /// Failure detail, when not connected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a dry-run validation.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    /// Whether the staged configuration validated
    pub valid: bool,
    /// Human-readable summary
    pub message: String,
    /// Directives that were staged and checked
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,
}

/// Whether an attempt commits or stops after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptMode {
    Commit,
    DryRun,
}

/// Releases a target's in-flight slot when the attempt finishes.
struct InFlightGuard<'a> {
    targets: &'a DashMap<String, Uuid>,
    host: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.targets.remove(&self.host);
    }
}

/// Drives configuration attempts against devices.
pub struct ConfigurationEngine {
    audit: Arc<AuditLog>,
    callback: SharedCallback,
    in_flight: DashMap<String, Uuid>,
}

impl ConfigurationEngine {
    /// Create an engine recording attempts into the given audit log.
    pub fn new(audit: Arc<AuditLog>) -> Self {
        Self {
            audit,
            callback: Arc::new(NullCallback),
            in_flight: DashMap::new(),
        }
    }

    /// Attach a callback receiving step-completion events.
    pub fn with_callback(mut self, callback: SharedCallback) -> Self {
        self.callback = callback;
        self
    }

    /// The audit log this engine records into.
    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// Run the full staged sequence and commit.
    ///
    /// Returns `Err` only for request validation failures and in-flight
    /// rejections, both before any session work. Step-level failures
    /// are reported inside the returned outcome.
    pub async fn configure(&self, request: &ConfigurationRequest) -> Result<ConfigurationOutcome> {
        request.validate()?;
        let mut session = session::open(request)?;
        let outcome = self.configure_with(request, session.as_mut()).await;
        // The session is closed by the attempt; nothing further to do here.
        outcome
    }

    /// Run a configuration attempt against a caller-supplied session.
    ///
    /// `configure` delegates here; callers with a pre-built session
    /// (tests, fault injection) can drive the sequence directly.
    pub async fn configure_with(
        &self,
        request: &ConfigurationRequest,
        session: &mut dyn DeviceSession,
    ) -> Result<ConfigurationOutcome> {
        request.validate()?;
        let attempt_id = Uuid::new_v4();
        let _slot = self.claim(&request.host, attempt_id)?;

        let outcome = self
            .run_attempt(request, attempt_id, session, AttemptMode::Commit)
            .await;
        self.audit.record(request.summary(), outcome.clone());
        Ok(outcome)
    }

    /// Dry run: execute the sequence up to `Validate`, then discard the
    /// staged candidate. No side effects on the device.
    pub async fn validate(&self, request: &ConfigurationRequest) -> Result<ValidationReport> {
        request.validate()?;
        let mut session = session::open(request)?;
        self.validate_with(request, session.as_mut()).await
    }

    /// Dry run against a caller-supplied session.
    pub async fn validate_with(
        &self,
        request: &ConfigurationRequest,
        session: &mut dyn DeviceSession,
    ) -> Result<ValidationReport> {
        request.validate()?;
        let attempt_id = Uuid::new_v4();
        let _slot = self.claim(&request.host, attempt_id)?;

        let outcome = self
            .run_attempt(request, attempt_id, session, AttemptMode::DryRun)
            .await;
        Ok(ValidationReport {
            valid: outcome.success,
            message: outcome.message,
            commands: outcome.commands,
        })
    }

    /// Probe connectivity and return device facts.
    pub async fn test_connection(&self, request: &ConfigurationRequest) -> Result<ConnectionReport> {
        request.validate_target()?;
        let mut session = session::open(request)?;

        let report = match session.connect().await {
            Ok(facts) => ConnectionReport {
                host: request.host.clone(),
                connected: true,
                facts: Some(facts),
                error: None,
            },
            Err(e) => ConnectionReport {
                host: request.host.clone(),
                connected: false,
                facts: None,
                error: Some(e.to_string()),
            },
        };
        session.close().await;
        Ok(report)
    }

    /// Standalone backup of a device's committed configuration.
    pub async fn backup(&self, request: &ConfigurationRequest) -> Result<BackupRecord> {
        request.validate_target()?;
        let mut session = session::open(request)?;

        let result = async {
            session.connect().await.map_err(|e| Error::Backup {
                host: request.host.clone(),
                message: e.to_string(),
            })?;
            backup::create_backup(session.as_mut(), request.simulate)
                .await
                .map_err(|e| Error::Backup {
                    host: request.host.clone(),
                    message: e.to_string(),
                })
        }
        .await;

        session.close().await;
        result
    }

    /// Recorded configuration attempts, oldest first.
    pub fn history(&self) -> Vec<AuditEntry> {
        self.audit.list()
    }

    /// Claim the in-flight slot for a target, rejecting contention.
    fn claim<'a>(&'a self, host: &str, attempt_id: Uuid) -> Result<InFlightGuard<'a>> {
        use dashmap::mapref::entry::Entry;

        match self.in_flight.entry(host.to_string()) {
            Entry::Occupied(_) => {
                warn!(host = %host, "rejecting request: attempt already in flight");
                Err(Error::AttemptInFlight {
                    host: host.to_string(),
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(attempt_id);
                Ok(InFlightGuard {
                    targets: &self.in_flight,
                    host: host.to_string(),
                })
            }
        }
    }

    fn emit(&self, event: EngineEvent) {
        self.callback.on_event(&event);
    }

    /// Execute the staged sequence against a session.
    async fn run_attempt(
        &self,
        request: &ConfigurationRequest,
        attempt_id: Uuid,
        session: &mut dyn DeviceSession,
        mode: AttemptMode,
    ) -> ConfigurationOutcome {
        let started = Instant::now();
        let steps: &[ApplyStep] = match mode {
            AttemptMode::Commit => &ApplyStep::SEQUENCE,
            // Dry runs stop before Commit.
            AttemptMode::DryRun => &ApplyStep::SEQUENCE[..ApplyStep::SEQUENCE.len() - 1],
        };

        info!(
            host = %request.host,
            interface = %request.interface,
            zone = %request.zone,
            simulate = request.simulate,
            dry_run = (mode == AttemptMode::DryRun),
            "starting configuration attempt"
        );
        self.emit(EngineEvent::AttemptStart {
            attempt_id,
            host: request.host.clone(),
            simulate: request.simulate,
            total_steps: steps.len(),
        });

        let mut completed: Vec<StepResult> = Vec::new();
        let mut commands: Vec<String> = Vec::new();
        let mut facts: Option<DeviceFacts> = None;
        let mut failed: Option<StepResult> = None;
        let mut connected = false;

        for (position, step) in steps.iter().enumerate() {
            self.emit(EngineEvent::StepStart {
                attempt_id,
                step: *step,
                index: position + 1,
                total: steps.len(),
            });

            match self.run_step(*step, request, session, &mut facts).await {
                Ok(result) => {
                    debug!(host = %request.host, step = %step, "step completed");
                    if *step == ApplyStep::Connect {
                        connected = true;
                    }
                    commands.extend(result.commands.iter().cloned());
                    self.emit(EngineEvent::StepOk {
                        attempt_id,
                        step: *step,
                        detail: result.detail.clone(),
                    });
                    completed.push(result);
                }
                Err(err) => {
                    let detail = err.to_string();
                    error!(host = %request.host, step = %step, error = %detail, "step failed");
                    self.emit(EngineEvent::StepFailed {
                        attempt_id,
                        step: *step,
                        error: detail.clone(),
                    });
                    failed = Some(StepResult {
                        step: *step,
                        succeeded: false,
                        detail,
                        commands: Vec::new(),
                    });

                    if connected {
                        match session.rollback().await {
                            Ok(()) => {
                                self.emit(EngineEvent::RollbackCompleted { attempt_id, ok: true });
                            }
                            Err(rollback_err) => {
                                // The original failure stays the reported one.
                                warn!(
                                    host = %request.host,
                                    error = %rollback_err,
                                    "rollback after failed step also failed"
                                );
                                self.emit(EngineEvent::RollbackCompleted {
                                    attempt_id,
                                    ok: false,
                                });
                            }
                        }
                    }
                    break;
                }
            }
        }

        let success = failed.is_none();

        // A successful dry run discards its staged candidate so the
        // attempt leaves no residue on the device.
        if success && mode == AttemptMode::DryRun {
            if let Err(e) = session.rollback().await {
                warn!(host = %request.host, error = %e, "failed to discard dry-run candidate");
            }
        }

        session.close().await;

        let message = match (&failed, mode) {
            (None, AttemptMode::Commit) => "Configuration applied successfully".to_string(),
            (None, AttemptMode::DryRun) => "Configuration validated successfully".to_string(),
            (Some(step), _) => format!(
                "Configuration failed at {}: {}",
                step.step, step.detail
            ),
        };

        let outcome = ConfigurationOutcome {
            attempt_id,
            success,
            message: message.clone(),
            completed_steps: completed,
            failed_step: failed,
            commands: if success { commands } else { Vec::new() },
            facts,
            simulate: request.simulate,
            timestamp: Utc::now(),
            duration_ms: started.elapsed().as_millis() as u64,
        };

        self.emit(EngineEvent::AttemptEnd {
            attempt_id,
            success,
            message,
        });
        outcome
    }

    /// Execute one step and describe what it did.
    async fn run_step(
        &self,
        step: ApplyStep,
        request: &ConfigurationRequest,
        session: &mut dyn DeviceSession,
        facts: &mut Option<DeviceFacts>,
    ) -> SessionResult<StepResult> {
        let mut staged: Vec<String> = Vec::new();

        let detail = match step {
            ApplyStep::Connect => {
                let device = session.connect().await?;
                let detail = format!(
                    "connected to {} ({} {})",
                    device.hostname, device.model, device.version
                );
                *facts = Some(device);
                detail
            }
            ApplyStep::Backup => {
                let record = backup::create_backup(session, request.simulate).await?;
                format!(
                    "captured {} bytes of configuration",
                    record.configuration.len()
                )
            }
            ApplyStep::LoadInterfaceConfig => {
                session.lock_candidate().await?;
                "candidate configuration locked".to_string()
            }
            ApplyStep::ConfigureIp => {
                for directive in commands::interface_directives(&request.interface, &request.address)
                {
                    session.apply_command(&directive).await?;
                    staged.push(directive);
                }
                format!("{} addressed with {}", request.interface, request.address)
            }
            ApplyStep::AssignZone => {
                let directive = commands::zone_directive(&request.zone, &request.interface);
                session.apply_command(&directive).await?;
                staged.push(directive);
                format!("{} joined zone '{}'", request.interface, request.zone)
            }
            ApplyStep::CreatePolicies => {
                for directive in commands::policy_directives(&request.zone) {
                    session.apply_command(&directive).await?;
                    staged.push(directive);
                }
                format!(
                    "installed policy allow-http from-zone {} to-zone untrust",
                    request.zone
                )
            }
            ApplyStep::Validate => {
                session.validate().await?;
                "candidate configuration check passed".to_string()
            }
            ApplyStep::Commit => {
                session.commit().await?;
                "configuration committed".to_string()
            }
        };

        Ok(StepResult {
            step,
            succeeded: true,
            detail,
            commands: staged,
        })
    }
}
