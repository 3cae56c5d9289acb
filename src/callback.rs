//! Engine lifecycle events.
//!
//! The engine emits an [`EngineEvent`] at every real step boundary so
//! callers can display progress that reflects true device state rather
//! than guessed timers. Consumers implement [`EngineCallback`] (or use
//! one of the built-ins) and receive events synchronously as the attempt
//! progresses.

use std::sync::Arc;

use colored::Colorize;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::engine::ApplyStep;

/// Events emitted during a configuration attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A configuration attempt started.
    AttemptStart {
        /// Attempt identifier
        attempt_id: Uuid,
        /// Target device
        host: String,
        /// Whether the attempt runs in simulated mode
        simulate: bool,
        /// Number of steps this attempt will execute
        total_steps: usize,
    },

    /// A step began executing.
    StepStart {
        /// Attempt identifier
        attempt_id: Uuid,
        /// The step
        step: ApplyStep,
        /// 1-based position in the sequence
        index: usize,
        /// Number of steps this attempt will execute
        total: usize,
    },

    /// A step completed successfully.
    StepOk {
        /// Attempt identifier
        attempt_id: Uuid,
        /// The step
        step: ApplyStep,
        /// Human-readable result detail
        detail: String,
    },

    /// A step failed; the attempt stops after rollback.
    StepFailed {
        /// Attempt identifier
        attempt_id: Uuid,
        /// The step
        step: ApplyStep,
        /// Failure detail
        error: String,
    },

    /// Rollback after a failed step finished.
    RollbackCompleted {
        /// Attempt identifier
        attempt_id: Uuid,
        /// Whether the rollback itself succeeded
        ok: bool,
    },

    /// The attempt finished.
    AttemptEnd {
        /// Attempt identifier
        attempt_id: Uuid,
        /// Overall success
        success: bool,
        /// Outcome message
        message: String,
    },
}

/// Receives engine events as an attempt progresses.
pub trait EngineCallback: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: &EngineEvent);
}

/// Shared, reference-counted callback handle.
pub type SharedCallback = Arc<dyn EngineCallback>;

/// Discards all events.
pub struct NullCallback;

impl EngineCallback for NullCallback {
    fn on_event(&self, _event: &EngineEvent) {}
}

/// Prints step progress to stderr with colored status markers.
#[derive(Default)]
pub struct ConsoleCallback;

impl ConsoleCallback {
    /// Create a console callback.
    pub fn new() -> Self {
        Self
    }
}

impl EngineCallback for ConsoleCallback {
    fn on_event(&self, event: &EngineEvent) {
        match event {
            EngineEvent::AttemptStart { host, simulate, .. } => {
                let mode = if *simulate { " (simulated)" } else { "" };
                eprintln!("{} configuring {}{}", "==>".bold(), host.bold(), mode);
            }
            EngineEvent::StepStart {
                step, index, total, ..
            } => {
                eprintln!("  [{}/{}] {}...", index, total, step.description());
            }
            EngineEvent::StepOk { detail, .. } => {
                eprintln!("        {} {}", "ok:".green(), detail);
            }
            EngineEvent::StepFailed { step, error, .. } => {
                eprintln!("        {} {}: {}", "failed:".red().bold(), step, error);
            }
            EngineEvent::RollbackCompleted { ok, .. } => {
                if *ok {
                    eprintln!("        {} staged changes discarded", "rollback:".yellow());
                } else {
                    eprintln!("        {} rollback also failed", "rollback:".red());
                }
            }
            EngineEvent::AttemptEnd {
                success, message, ..
            } => {
                if *success {
                    eprintln!("{} {}", "==>".green().bold(), message);
                } else {
                    eprintln!("{} {}", "==>".red().bold(), message);
                }
            }
        }
    }
}

/// Forwards events to a tokio channel for asynchronous consumers
/// (progress displays, web front ends, tests).
pub struct ChannelCallback {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelCallback {
    /// Create a callback and the receiver for its events.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EngineCallback for ChannelCallback {
    fn on_event(&self, event: &EngineEvent) {
        // Receiver may have been dropped; events are best-effort.
        let _ = self.tx.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_callback_forwards_events() {
        let (callback, mut rx) = ChannelCallback::new();
        let attempt_id = Uuid::new_v4();

        callback.on_event(&EngineEvent::AttemptStart {
            attempt_id,
            host: "192.168.1.1".to_string(),
            simulate: true,
            total_steps: 8,
        });
        callback.on_event(&EngineEvent::AttemptEnd {
            attempt_id,
            success: true,
            message: "done".to_string(),
        });

        assert!(matches!(
            rx.try_recv(),
            Ok(EngineEvent::AttemptStart { .. })
        ));
        assert!(matches!(rx.try_recv(), Ok(EngineEvent::AttemptEnd { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_events_serialize_with_tags() {
        let event = EngineEvent::StepOk {
            attempt_id: Uuid::new_v4(),
            step: ApplyStep::Commit,
            detail: "configuration committed".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"step_ok\""));
        assert!(json.contains("commit"));
    }
}
