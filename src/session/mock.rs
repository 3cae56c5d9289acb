//! In-memory mock device session.
//!
//! Stands in for a real SRX when no hardware is available. Connection
//! always succeeds (unless a fault is injected), device facts are
//! deterministic, and staged directives are recorded rather than sent
//! anywhere. After a commit the directives are interpreted against an
//! internal model of the device (interfaces, zones, policies) so state
//! queries and backups return plausible data.
//!
//! Failures are never random: tests and demos inject a [`MockFault`] to
//! exercise a specific failure point deterministically.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use super::{DeviceFacts, DeviceSession, SessionError, SessionResult, SessionState};

/// Latency of the simulated connection handshake.
const CONNECT_LATENCY: Duration = Duration::from_millis(5);

/// Latency of each simulated configuration operation.
const OPERATION_LATENCY: Duration = Duration::from_millis(1);

/// Deterministic fault injection points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFault {
    /// Refuse the transport connection.
    ConnectRefused,
    /// Time out while connecting.
    ConnectTimeout,
    /// Reject the credentials.
    AuthRejected,
    /// Fail to acquire the candidate lock.
    Lock,
    /// Reject any staged directive containing the substring.
    Command(String),
    /// Fail candidate validation.
    Validate,
    /// Reject the staged batch at commit time.
    Commit,
}

/// State of one mock interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MockInterface {
    /// `up` or `down`
    pub status: String,
    /// Assigned address, if any
    pub address: Option<String>,
    /// Zone membership, if any
    pub zone: Option<String>,
    /// Interface description
    pub description: String,
}

/// One installed mock security policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MockPolicy {
    /// Policy name
    pub name: String,
    /// Source zone
    pub from_zone: String,
    /// Destination zone
    pub to_zone: String,
    /// Accumulated match terms
    pub matches: Vec<String>,
    /// Terminal action, once set
    pub action: Option<String>,
}

/// Serialized device state, used as the simulated backup payload.
#[derive(Serialize)]
struct StateSnapshot<'a> {
    facts: &'a DeviceFacts,
    interfaces: &'a BTreeMap<String, MockInterface>,
    zones: &'a BTreeMap<String, Vec<String>>,
    policies: &'a [MockPolicy],
    committed_commands: &'a [String],
}

/// Simulated device session with no external transport.
pub struct MockSession {
    target: String,
    state: SessionState,
    facts: DeviceFacts,
    locked: bool,
    staged: Vec<String>,
    committed: Vec<String>,
    interfaces: BTreeMap<String, MockInterface>,
    zones: BTreeMap<String, Vec<String>>,
    policies: Vec<MockPolicy>,
    rollback_count: usize,
    fault: Option<MockFault>,
}

impl MockSession {
    /// Create a mock session for a target address.
    pub fn new(target: impl Into<String>) -> Self {
        let target = target.into();
        let facts = DeviceFacts {
            hostname: "vSRX-Mock".to_string(),
            model: "vSRX".to_string(),
            version: "20.4R3.8".to_string(),
            serial: derive_serial(&target),
            uptime: Some("45 days, 12:34:56".to_string()),
        };

        let mut interfaces = BTreeMap::new();
        interfaces.insert(
            "ge-0/0/0".to_string(),
            MockInterface {
                status: "up".to_string(),
                address: Some("10.0.0.1/24".to_string()),
                zone: Some("untrust".to_string()),
                description: "WAN Interface".to_string(),
            },
        );
        interfaces.insert(
            "ge-0/0/1".to_string(),
            MockInterface {
                status: "down".to_string(),
                address: None,
                zone: None,
                description: "LAN Interface".to_string(),
            },
        );

        let mut zones = BTreeMap::new();
        zones.insert("trust".to_string(), Vec::new());
        zones.insert("untrust".to_string(), vec!["ge-0/0/0.0".to_string()]);

        Self {
            target,
            state: SessionState::Disconnected,
            facts,
            locked: false,
            staged: Vec::new(),
            committed: Vec::new(),
            interfaces,
            zones,
            policies: Vec::new(),
            rollback_count: 0,
            fault: None,
        }
    }

    /// Inject a deterministic fault.
    pub fn with_fault(mut self, fault: MockFault) -> Self {
        self.fault = Some(fault);
        self
    }

    /// Replace or clear the injected fault on a live session.
    pub fn set_fault(&mut self, fault: Option<MockFault>) {
        self.fault = fault;
    }

    /// Directives staged since the last commit or rollback.
    pub fn staged_commands(&self) -> &[String] {
        &self.staged
    }

    /// Directives applied by successful commits, in order.
    pub fn committed_commands(&self) -> &[String] {
        &self.committed
    }

    /// Number of rollback invocations over the session's lifetime.
    pub fn rollback_count(&self) -> usize {
        self.rollback_count
    }

    /// Current interface table.
    pub fn interfaces(&self) -> &BTreeMap<String, MockInterface> {
        &self.interfaces
    }

    /// Current zone membership table.
    pub fn zones(&self) -> &BTreeMap<String, Vec<String>> {
        &self.zones
    }

    /// Currently installed policies.
    pub fn policies(&self) -> &[MockPolicy] {
        &self.policies
    }

    fn require_connected(&self) -> SessionResult<()> {
        if self.state == SessionState::Connected {
            Ok(())
        } else {
            Err(SessionError::NotConnected(self.target.clone()))
        }
    }

    /// Interpret one committed directive against the device model.
    fn apply_to_state(&mut self, directive: &str) {
        let words: Vec<&str> = directive.split_whitespace().collect();
        match words.as_slice() {
            ["set", "interfaces", ifname, "unit", "0", "family", "inet", "address", address] => {
                let entry = self
                    .interfaces
                    .entry((*ifname).to_string())
                    .or_insert_with(|| MockInterface {
                        status: "down".to_string(),
                        address: None,
                        zone: None,
                        description: String::new(),
                    });
                entry.status = "up".to_string();
                entry.address = Some((*address).to_string());
            }
            ["set", "interfaces", ifname, "unit", "0", "description", rest @ ..] => {
                let description = rest.join(" ");
                let description = description.trim_matches('\'').to_string();
                if let Some(entry) = self.interfaces.get_mut(*ifname) {
                    entry.description = description;
                }
            }
            ["set", "security", "zones", "security-zone", zone, "interfaces", unit] => {
                let members = self.zones.entry((*zone).to_string()).or_default();
                if !members.iter().any(|m| m == unit) {
                    members.push((*unit).to_string());
                }
                let ifname = unit.strip_suffix(".0").unwrap_or(unit);
                if let Some(entry) = self.interfaces.get_mut(ifname) {
                    entry.zone = Some((*zone).to_string());
                }
            }
            ["set", "security", "policies", "from-zone", from_zone, "to-zone", to_zone, "policy", name, tail @ ..] =>
            {
                let index = self
                    .policies
                    .iter()
                    .position(|p| {
                        p.name == *name && p.from_zone == *from_zone && p.to_zone == *to_zone
                    })
                    .unwrap_or_else(|| {
                        self.policies.push(MockPolicy {
                            name: (*name).to_string(),
                            from_zone: (*from_zone).to_string(),
                            to_zone: (*to_zone).to_string(),
                            matches: Vec::new(),
                            action: None,
                        });
                        self.policies.len() - 1
                    });
                let policy = &mut self.policies[index];
                match tail {
                    ["match", term @ ..] => policy.matches.push(term.join(" ")),
                    ["then", action] => policy.action = Some((*action).to_string()),
                    _ => {}
                }
            }
            _ => {
                debug!(directive = %directive, "mock ignoring directive outside the device model");
            }
        }
    }
}

#[async_trait]
impl DeviceSession for MockSession {
    fn target(&self) -> &str {
        &self.target
    }

    fn state(&self) -> SessionState {
        self.state
    }

    async fn connect(&mut self) -> SessionResult<DeviceFacts> {
        if self.state == SessionState::Connected {
            return Ok(self.facts.clone());
        }

        tokio::time::sleep(CONNECT_LATENCY).await;

        match &self.fault {
            Some(MockFault::ConnectRefused) => {
                self.state = SessionState::Failed;
                return Err(SessionError::Unreachable {
                    host: self.target.clone(),
                    message: "connection refused (simulated)".to_string(),
                });
            }
            Some(MockFault::ConnectTimeout) => {
                self.state = SessionState::Failed;
                return Err(SessionError::Timeout {
                    host: self.target.clone(),
                    timeout_secs: 30,
                });
            }
            Some(MockFault::AuthRejected) => {
                self.state = SessionState::Failed;
                return Err(SessionError::Authentication {
                    host: self.target.clone(),
                    user: "admin".to_string(),
                    message: "permission denied (simulated)".to_string(),
                });
            }
            _ => {}
        }

        self.state = SessionState::Connected;
        info!(host = %self.target, "mock session established");
        Ok(self.facts.clone())
    }

    async fn lock_candidate(&mut self) -> SessionResult<()> {
        self.require_connected()?;
        tokio::time::sleep(OPERATION_LATENCY).await;
        if self.fault == Some(MockFault::Lock) {
            return Err(SessionError::Apply(
                "candidate configuration database locked by another user (simulated)".to_string(),
            ));
        }
        self.locked = true;
        Ok(())
    }

    async fn apply_command(&mut self, directive: &str) -> SessionResult<()> {
        self.require_connected()?;
        tokio::time::sleep(OPERATION_LATENCY).await;

        if !directive.starts_with("set ") {
            return Err(SessionError::Apply(format!(
                "unsupported directive '{}': only set statements are accepted",
                directive
            )));
        }
        if let Some(MockFault::Command(needle)) = &self.fault {
            if directive.contains(needle.as_str()) {
                return Err(SessionError::Apply(format!(
                    "directive '{}' rejected (simulated)",
                    directive
                )));
            }
        }

        self.staged.push(directive.to_string());
        debug!(directive = %directive, staged = self.staged.len(), "mock directive staged");
        Ok(())
    }

    async fn validate(&mut self) -> SessionResult<()> {
        self.require_connected()?;
        tokio::time::sleep(OPERATION_LATENCY).await;
        if self.fault == Some(MockFault::Validate) {
            return Err(SessionError::Validate(
                "candidate configuration check failed (simulated)".to_string(),
            ));
        }
        Ok(())
    }

    async fn commit(&mut self) -> SessionResult<()> {
        self.require_connected()?;
        tokio::time::sleep(OPERATION_LATENCY).await;
        if self.fault == Some(MockFault::Commit) {
            return Err(SessionError::Commit(
                "commit rejected by device (simulated)".to_string(),
            ));
        }

        let staged = std::mem::take(&mut self.staged);
        for directive in &staged {
            self.apply_to_state(directive);
        }
        info!(host = %self.target, directives = staged.len(), "mock commit complete");
        self.committed.extend(staged);
        self.locked = false;
        Ok(())
    }

    async fn rollback(&mut self) -> SessionResult<()> {
        tokio::time::sleep(OPERATION_LATENCY).await;
        let discarded = self.staged.len();
        self.staged.clear();
        self.locked = false;
        self.rollback_count += 1;
        info!(host = %self.target, discarded, "mock rollback discarded staged directives");
        Ok(())
    }

    async fn fetch_config(&mut self) -> SessionResult<String> {
        self.require_connected()?;
        tokio::time::sleep(OPERATION_LATENCY).await;
        let snapshot = StateSnapshot {
            facts: &self.facts,
            interfaces: &self.interfaces,
            zones: &self.zones,
            policies: &self.policies,
            committed_commands: &self.committed,
        };
        serde_json::to_string_pretty(&snapshot)
            .map_err(|e| SessionError::Query(format!("failed to render mock state: {}", e)))
    }

    async fn close(&mut self) {
        if self.state != SessionState::Disconnected {
            debug!(host = %self.target, "mock session closed");
        }
        self.locked = false;
        self.state = SessionState::Disconnected;
    }
}

/// Derive a stable serial number from the target address (FNV-1a).
fn derive_serial(target: &str) -> String {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in target.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    format!("VM{:09}", hash % 1_000_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::block_on;

    #[test]
    fn test_facts_are_deterministic_per_target() {
        let facts_a = block_on(MockSession::new("192.168.1.1").connect()).unwrap();
        let facts_b = block_on(MockSession::new("192.168.1.1").connect()).unwrap();
        let facts_c = block_on(MockSession::new("192.168.1.2").connect()).unwrap();

        assert_eq!(facts_a, facts_b);
        assert_ne!(facts_a.serial, facts_c.serial);
        assert_eq!(facts_a.hostname, "vSRX-Mock");
        assert!(facts_a.serial.starts_with("VM"));
    }

    #[test]
    fn test_connect_is_idempotent() {
        let mut session = MockSession::new("10.0.0.1");
        let first = block_on(session.connect()).unwrap();
        let second = block_on(session.connect()).unwrap();
        assert_eq!(first, second);
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[test]
    fn test_staged_directives_take_no_effect_until_commit() {
        let mut session = MockSession::new("10.0.0.1");
        block_on(session.connect()).unwrap();
        block_on(
            session.apply_command("set interfaces ge-0/0/1 unit 0 family inet address 192.168.10.1/24"),
        )
        .unwrap();

        assert_eq!(session.staged_commands().len(), 1);
        assert!(session.committed_commands().is_empty());
        assert_eq!(session.interfaces()["ge-0/0/1"].address, None);

        block_on(session.commit()).unwrap();
        assert!(session.staged_commands().is_empty());
        assert_eq!(session.committed_commands().len(), 1);
        assert_eq!(
            session.interfaces()["ge-0/0/1"].address.as_deref(),
            Some("192.168.10.1/24")
        );
        assert_eq!(session.interfaces()["ge-0/0/1"].status, "up");
    }

    #[test]
    fn test_commit_updates_zone_and_policy_state() {
        let mut session = MockSession::new("10.0.0.1");
        block_on(session.connect()).unwrap();
        for directive in [
            "set security zones security-zone trust interfaces ge-0/0/1.0",
            "set security policies from-zone trust to-zone untrust policy allow-http match application junos-http",
            "set security policies from-zone trust to-zone untrust policy allow-http then permit",
        ] {
            block_on(session.apply_command(directive)).unwrap();
        }
        block_on(session.commit()).unwrap();

        assert!(session.zones()["trust"].contains(&"ge-0/0/1.0".to_string()));
        assert_eq!(
            session.interfaces()["ge-0/0/1"].zone.as_deref(),
            Some("trust")
        );
        assert_eq!(session.policies().len(), 1);
        let policy = &session.policies()[0];
        assert_eq!(policy.name, "allow-http");
        assert_eq!(policy.action.as_deref(), Some("permit"));
        assert_eq!(policy.matches, vec!["application junos-http"]);
    }

    #[test]
    fn test_rollback_discards_staged_and_counts() {
        let mut session = MockSession::new("10.0.0.1");
        block_on(session.connect()).unwrap();
        block_on(session.apply_command("set interfaces ge-0/0/1 unit 0 description 'x'")).unwrap();
        block_on(session.rollback()).unwrap();

        assert!(session.staged_commands().is_empty());
        assert!(session.committed_commands().is_empty());
        assert_eq!(session.rollback_count(), 1);
    }

    #[test]
    fn test_malformed_directive_rejected() {
        let mut session = MockSession::new("10.0.0.1");
        block_on(session.connect()).unwrap();
        let err = block_on(session.apply_command("delete interfaces ge-0/0/1")).unwrap_err();
        assert!(matches!(err, SessionError::Apply(_)));
    }

    #[test]
    fn test_command_fault_rejects_matching_directive() {
        let mut session =
            MockSession::new("10.0.0.1").with_fault(MockFault::Command("policy".to_string()));
        block_on(session.connect()).unwrap();

        block_on(session.apply_command("set interfaces ge-0/0/1 unit 0 description 'ok'")).unwrap();
        let err = block_on(session.apply_command(
            "set security policies from-zone trust to-zone untrust policy allow-http then permit",
        ))
        .unwrap_err();
        assert!(matches!(err, SessionError::Apply(_)));
    }

    #[test]
    fn test_connect_faults_map_to_error_taxonomy() {
        let mut refused = MockSession::new("10.0.0.1").with_fault(MockFault::ConnectRefused);
        assert!(matches!(
            block_on(refused.connect()),
            Err(SessionError::Unreachable { .. })
        ));
        assert_eq!(refused.state(), SessionState::Failed);

        let mut timeout = MockSession::new("10.0.0.1").with_fault(MockFault::ConnectTimeout);
        assert!(matches!(
            block_on(timeout.connect()),
            Err(SessionError::Timeout { .. })
        ));

        let mut auth = MockSession::new("10.0.0.1").with_fault(MockFault::AuthRejected);
        assert!(matches!(
            block_on(auth.connect()),
            Err(SessionError::Authentication { .. })
        ));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut session = MockSession::new("10.0.0.1");
        block_on(session.connect()).unwrap();
        block_on(session.close());
        block_on(session.close());
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_fetch_config_renders_device_state() {
        let mut session = MockSession::new("10.0.0.1");
        block_on(session.connect()).unwrap();
        let config = block_on(session.fetch_config()).unwrap();
        assert!(config.contains("vSRX-Mock"));
        assert!(config.contains("ge-0/0/0"));
    }
}
