//! # srxauto - Juniper SRX Configuration Automation
//!
//! srxauto automates configuration of Juniper SRX firewalls: assigning
//! an interface IP address, placing the interface into a security zone,
//! and installing traffic policies, over NETCONF/SSH, with a fully
//! simulated mode for environments lacking hardware.
//!
//! ## Core Concepts
//!
//! - **Requests**: Validated descriptions of one configuration attempt
//! - **Sessions**: One connection to a device, real (NETCONF over SSH)
//!   or simulated (in-memory mock), behind a single trait
//! - **Engine**: The staged apply sequence (connect, backup, stage
//!   directives, validate, commit) with fail-fast rollback
//! - **Audit**: Append-only history of every configuration attempt
//! - **Callbacks**: Real step-completion events for progress display
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      CLI Interface                        │
//! │                (clap-based command parsing)               │
//! └──────────────────────────────────────────────────────────┘
//!                             │
//!                             ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                  ConfigurationEngine                      │
//! │   (staged apply sequence, rollback, in-flight guard)      │
//! └──────────────────────────────────────────────────────────┘
//!        │                    │                    │
//!        ▼                    ▼                    ▼
//! ┌──────────────┐   ┌────────────────┐   ┌──────────────────┐
//! │   AuditLog   │   │ EngineCallback │   │  DeviceSession   │
//! │  (history)   │   │ (step events)  │   │ (mock / NETCONF) │
//! └──────────────┘   └────────────────┘   └──────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use srxauto::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> srxauto::error::Result<()> {
//!     let audit = Arc::new(AuditLog::new());
//!     let engine = ConfigurationEngine::new(audit);
//!
//!     let request = ConfigurationRequest::new("192.168.1.1")
//!         .simulated(true)
//!         .with_interface("ge-0/0/1")
//!         .with_address("192.168.10.1/24")
//!         .with_zone("trust");
//!
//!     let outcome = engine.configure(&request).await?;
//!     println!("{}", outcome.message);
//!     for command in &outcome.commands {
//!         println!("  {}", command);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of the most commonly needed types.

    pub use crate::audit::{AuditEntry, AuditLog};
    pub use crate::callback::{
        ChannelCallback, ConsoleCallback, EngineCallback, EngineEvent, NullCallback,
        SharedCallback,
    };
    pub use crate::engine::backup::BackupRecord;
    pub use crate::engine::{
        ApplyStep, ConfigurationEngine, ConfigurationOutcome, ConnectionReport, StepResult,
        ValidationReport,
    };
    pub use crate::error::{Error, Result};
    pub use crate::request::{ConfigurationRequest, Credentials, RequestError, RequestSummary};
    pub use crate::session::{
        DeviceFacts, DeviceSession, SessionError, SessionResult, SessionState,
    };
}

/// Error types and result aliases for srxauto operations.
pub mod error;

/// Configuration request types and validation.
pub mod request;

/// Junos configuration directive generation.
pub mod commands;

/// Device session layer: the [`DeviceSession`](session::DeviceSession)
/// trait with its NETCONF and mock implementations.
pub mod session;

/// The configuration orchestration engine and backup support.
pub mod engine;

/// Append-only audit history of configuration attempts.
pub mod audit;

/// Engine lifecycle events for progress reporting.
pub mod callback;

/// Runtime configuration loaded from TOML and environment.
pub mod config;

/// Logging initialization built on tracing.
pub mod telemetry;

/// Returns the current version of srxauto.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
