//! NETCONF-over-SSH device session.
//!
//! Talks to a real device through the NETCONF SSH subsystem (RFC 6242)
//! using NETCONF 1.0 end-of-message framing. Configuration changes are
//! loaded into the candidate datastore as `set` statements and only take
//! effect on an explicit commit; `discard-changes` restores the last
//! committed state.

use std::time::Duration;

use async_trait::async_trait;
use russh::client::{Handle, Handler, Msg};
use russh::keys::key::PublicKey;
use russh::{Channel, ChannelMsg, Disconnect};
use tracing::{debug, info, trace, warn};

use super::{DeviceFacts, DeviceSession, SessionError, SessionResult, SessionState};
use crate::request::ConfigurationRequest;

/// NETCONF base namespace (RFC 6241).
const NETCONF_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";

/// Junos configuration namespace.
const JUNOS_NS: &str = "http://xml.juniper.net/junos/*/junos";

/// NETCONF 1.0 end-of-message delimiter.
const EOM_DELIMITER: &str = "]]>]]>";

/// NETCONF SSH subsystem name.
const NETCONF_SUBSYSTEM: &str = "netconf";

/// Wrapper so the russh client handler can use a local error type.
#[derive(Debug)]
pub struct TransportError(pub russh::Error);

impl From<russh::Error> for TransportError {
    fn from(err: russh::Error) -> Self {
        TransportError(err)
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SSH transport error: {}", self.0)
    }
}

impl std::error::Error for TransportError {}

/// SSH client handler for device connections.
///
/// Host keys are accepted on first use (accept-new semantics); device
/// management networks pin keys out of band.
struct DeviceHandler {
    host: String,
}

#[async_trait]
impl Handler for DeviceHandler {
    type Error = TransportError;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        warn!(host = %self.host, "accepting device host key without verification");
        Ok(true)
    }
}

/// Parsed NETCONF rpc-reply.
#[derive(Debug, Clone)]
struct NetconfReply {
    /// Whether the reply carried `<ok/>` or usable data
    ok: bool,
    /// Data payload, when present
    data: Option<String>,
    /// rpc-error messages, when the operation failed
    errors: Vec<String>,
}

impl NetconfReply {
    /// Parse an rpc-reply body (delimiter already stripped).
    fn parse(reply: &str) -> Self {
        if reply.contains("<rpc-error>") {
            return Self {
                ok: false,
                data: None,
                errors: parse_rpc_errors(reply),
            };
        }

        if reply.contains("<ok/>") || reply.contains("<ok />") {
            return Self {
                ok: true,
                data: None,
                errors: Vec::new(),
            };
        }

        // Replies to get-style RPCs carry their payload directly.
        Self {
            ok: true,
            data: Some(reply.to_string()),
            errors: Vec::new(),
        }
    }

    /// Joined error detail for reporting.
    fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            "device returned an unspecified rpc-error".to_string()
        } else {
            self.errors.join("; ")
        }
    }
}

/// Extract the messages of every rpc-error element in a reply.
fn parse_rpc_errors(reply: &str) -> Vec<String> {
    let mut errors = Vec::new();
    let mut search_start = 0;

    while let Some(start) = reply[search_start..].find("<rpc-error>") {
        let abs_start = search_start + start;
        let Some(end) = reply[abs_start..].find("</rpc-error>") else {
            break;
        };
        let block = &reply[abs_start..abs_start + end];
        let message = extract_element(block, "error-message")
            .or_else(|| extract_element(block, "error-tag"))
            .unwrap_or_else(|| "unknown error".to_string());
        errors.push(message);
        search_start = abs_start + end + "</rpc-error>".len();
    }

    errors
}

/// Extract the trimmed text content of an XML element.
fn extract_element(xml: &str, element: &str) -> Option<String> {
    let start_tag = format!("<{}>", element);
    let end_tag = format!("</{}>", element);

    let start = xml.find(&start_tag)?;
    let content_start = start + start_tag.len();
    let end = xml[content_start..].find(&end_tag)?;
    Some(xml[content_start..content_start + end].trim().to_string())
}

/// Escape special XML characters in text content.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// NETCONF session against a real device.
pub struct NetconfSession {
    host: String,
    port: u16,
    user: String,
    password: String,
    timeout: Duration,
    state: SessionState,
    facts: Option<DeviceFacts>,
    handle: Option<Handle<DeviceHandler>>,
    channel: Option<Channel<Msg>>,
    session_id: Option<u32>,
    message_id: u32,
}

impl NetconfSession {
    /// Build a session from a validated request.
    pub fn from_request(request: &ConfigurationRequest) -> SessionResult<Self> {
        let credentials =
            request
                .credentials
                .as_ref()
                .ok_or_else(|| SessionError::Authentication {
                    host: request.host.clone(),
                    user: String::new(),
                    message: "no credentials provided".to_string(),
                })?;

        Ok(Self {
            host: request.host.clone(),
            port: request.port,
            user: credentials.username.clone(),
            password: credentials.password.clone(),
            timeout: Duration::from_secs(request.timeout_secs),
            state: SessionState::Disconnected,
            facts: None,
            handle: None,
            channel: None,
            session_id: None,
            message_id: 0,
        })
    }

    fn timeout_error(&self) -> SessionError {
        SessionError::Timeout {
            host: self.host.clone(),
            timeout_secs: self.timeout.as_secs(),
        }
    }

    /// Open the SSH transport and the NETCONF subsystem channel.
    async fn open_transport(&mut self) -> SessionResult<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let socket = tokio::time::timeout(self.timeout, tokio::net::TcpStream::connect(&addr))
            .await
            .map_err(|_| self.timeout_error())?
            .map_err(|e| SessionError::Unreachable {
                host: self.host.clone(),
                message: format!("failed to connect to {}: {}", addr, e),
            })?;
        socket.set_nodelay(true).map_err(|e| SessionError::Unreachable {
            host: self.host.clone(),
            message: format!("failed to set TCP_NODELAY: {}", e),
        })?;

        let mut config = russh::client::Config::default();
        config.inactivity_timeout = Some(self.timeout);
        let config = std::sync::Arc::new(config);

        let handler = DeviceHandler {
            host: self.host.clone(),
        };
        let mut handle = russh::client::connect_stream(config, socket, handler)
            .await
            .map_err(|e| SessionError::Unreachable {
                host: self.host.clone(),
                message: format!("SSH handshake failed: {}", e),
            })?;

        let authenticated = handle
            .authenticate_password(&self.user, &self.password)
            .await
            .map_err(|e| SessionError::Authentication {
                host: self.host.clone(),
                user: self.user.clone(),
                message: e.to_string(),
            })?;
        if !authenticated {
            return Err(SessionError::Authentication {
                host: self.host.clone(),
                user: self.user.clone(),
                message: "password rejected".to_string(),
            });
        }

        let channel =
            handle
                .channel_open_session()
                .await
                .map_err(|e| SessionError::Unreachable {
                    host: self.host.clone(),
                    message: format!("failed to open channel: {}", e),
                })?;
        channel
            .request_subsystem(true, NETCONF_SUBSYSTEM)
            .await
            .map_err(|e| SessionError::Unreachable {
                host: self.host.clone(),
                message: format!("failed to request NETCONF subsystem: {}", e),
            })?;

        self.handle = Some(handle);
        self.channel = Some(channel);
        Ok(())
    }

    /// Exchange hello messages and record the server session-id.
    async fn establish_netconf(&mut self) -> SessionResult<()> {
        let hello = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<hello xmlns="{}">
  <capabilities>
    <capability>urn:ietf:params:netconf:base:1.0</capability>
    <capability>urn:ietf:params:netconf:capability:candidate:1.0</capability>
    <capability>urn:ietf:params:netconf:capability:validate:1.0</capability>
    <capability>urn:ietf:params:netconf:capability:rollback-on-error:1.0</capability>
  </capabilities>
</hello>
{}"#,
            NETCONF_NS, EOM_DELIMITER
        );

        let server_hello = self.exchange(&hello).await?;
        self.session_id = extract_element(&server_hello, "session-id")
            .and_then(|id| id.parse::<u32>().ok());
        debug!(host = %self.host, session_id = ?self.session_id, "NETCONF session established");
        Ok(())
    }

    /// Write one framed message and read until the end-of-message
    /// delimiter, bounded by the session timeout.
    async fn exchange(&mut self, message: &str) -> SessionResult<String> {
        let host = self.host.clone();
        let timeout = self.timeout;
        let channel = self
            .channel
            .as_mut()
            .ok_or_else(|| SessionError::NotConnected(host.clone()))?;

        let io = async {
            let mut cursor = tokio::io::BufReader::new(message.as_bytes());
            channel
                .data(&mut cursor)
                .await
                .map_err(|e| SessionError::Unreachable {
                    host: host.clone(),
                    message: format!("failed to send NETCONF message: {}", e),
                })?;

            let mut buffer = Vec::new();
            loop {
                if let Some(end) = find_delimiter(&buffer) {
                    let reply = String::from_utf8_lossy(&buffer[..end]).to_string();
                    return Ok(reply);
                }
                match channel.wait().await {
                    Some(ChannelMsg::Data { ref data }) => buffer.extend_from_slice(data),
                    Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                        return Err(SessionError::Unreachable {
                            host: host.clone(),
                            message: "NETCONF channel closed mid-reply".to_string(),
                        });
                    }
                    Some(_) => {}
                }
            }
        };

        match tokio::time::timeout(timeout, io).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Timeout {
                host: self.host.clone(),
                timeout_secs: timeout.as_secs(),
            }),
        }
    }

    /// Send one RPC operation and parse the reply.
    async fn rpc(&mut self, operation: &str) -> SessionResult<NetconfReply> {
        self.message_id += 1;
        let envelope = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<rpc xmlns="{}" message-id="{}">
{}
</rpc>
{}"#,
            NETCONF_NS, self.message_id, operation, EOM_DELIMITER
        );

        trace!(host = %self.host, message_id = self.message_id, "sending NETCONF rpc");
        let reply = self.exchange(&envelope).await?;
        Ok(NetconfReply::parse(&reply))
    }

    /// Gather identity facts from the connected device.
    async fn gather_facts(&mut self) -> SessionResult<DeviceFacts> {
        let reply = self.rpc("<get-system-information/>").await?;
        if !reply.ok {
            return Err(SessionError::Query(reply.error_summary()));
        }
        let body = reply.data.unwrap_or_default();

        let field = |name: &str| {
            extract_element(&body, name).unwrap_or_else(|| "unknown".to_string())
        };
        Ok(DeviceFacts {
            hostname: field("host-name"),
            model: field("hardware-model"),
            version: field("os-version"),
            serial: field("serial-number"),
            uptime: None,
        })
    }
}

#[async_trait]
impl DeviceSession for NetconfSession {
    fn target(&self) -> &str {
        &self.host
    }

    fn state(&self) -> SessionState {
        self.state
    }

    async fn connect(&mut self) -> SessionResult<DeviceFacts> {
        if self.state == SessionState::Connected {
            if let Some(facts) = &self.facts {
                return Ok(facts.clone());
            }
        }

        info!(host = %self.host, port = self.port, "connecting to device");
        if let Err(err) = self.open_transport().await {
            self.state = SessionState::Failed;
            return Err(err);
        }
        if let Err(err) = self.establish_netconf().await {
            self.state = SessionState::Failed;
            return Err(err);
        }

        let facts = match self.gather_facts().await {
            Ok(facts) => facts,
            Err(err) => {
                self.state = SessionState::Failed;
                return Err(err);
            }
        };

        info!(
            host = %self.host,
            hostname = %facts.hostname,
            model = %facts.model,
            version = %facts.version,
            "connected"
        );
        self.facts = Some(facts.clone());
        self.state = SessionState::Connected;
        Ok(facts)
    }

    async fn lock_candidate(&mut self) -> SessionResult<()> {
        let reply = self
            .rpc("<lock><target><candidate/></target></lock>")
            .await?;
        if reply.ok {
            debug!(host = %self.host, "candidate configuration locked");
            Ok(())
        } else {
            Err(SessionError::Apply(format!(
                "failed to lock candidate configuration: {}",
                reply.error_summary()
            )))
        }
    }

    async fn apply_command(&mut self, directive: &str) -> SessionResult<()> {
        let operation = format!(
            r#"<load-configuration xmlns="{}" action="set" format="text">
  <configuration-set>{}</configuration-set>
</load-configuration>"#,
            JUNOS_NS,
            escape_xml(directive)
        );

        let reply = self.rpc(&operation).await?;
        if reply.ok {
            trace!(host = %self.host, directive = %directive, "directive staged");
            Ok(())
        } else {
            Err(SessionError::Apply(reply.error_summary()))
        }
    }

    async fn validate(&mut self) -> SessionResult<()> {
        let reply = self
            .rpc("<validate><source><candidate/></source></validate>")
            .await?;
        if reply.ok {
            debug!(host = %self.host, "candidate configuration check passed");
            Ok(())
        } else {
            Err(SessionError::Validate(reply.error_summary()))
        }
    }

    async fn commit(&mut self) -> SessionResult<()> {
        let operation = format!(
            r#"<commit-configuration xmlns="{}">
  <log>srxauto automated change</log>
</commit-configuration>"#,
            JUNOS_NS
        );

        let reply = self.rpc(&operation).await?;
        if reply.ok {
            info!(host = %self.host, "configuration committed");
            Ok(())
        } else {
            Err(SessionError::Commit(reply.error_summary()))
        }
    }

    async fn rollback(&mut self) -> SessionResult<()> {
        let reply = self.rpc("<discard-changes/>").await?;
        if reply.ok {
            info!(host = %self.host, "staged directives discarded");
            Ok(())
        } else {
            Err(SessionError::Rollback(reply.error_summary()))
        }
    }

    async fn fetch_config(&mut self) -> SessionResult<String> {
        let operation = format!(r#"<get-configuration xmlns="{}" format="text"/>"#, JUNOS_NS);
        let reply = self.rpc(&operation).await?;
        match (reply.ok, reply.data.clone()) {
            (true, Some(data)) => Ok(data),
            (true, None) => Ok(String::new()),
            (false, _) => Err(SessionError::Query(reply.error_summary())),
        }
    }

    async fn close(&mut self) {
        if let Some(channel) = self.channel.take() {
            let close = format!(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<rpc xmlns="{}" message-id="{}"><close-session/></rpc>
{}"#,
                NETCONF_NS,
                self.message_id + 1,
                EOM_DELIMITER
            );
            let mut cursor = tokio::io::BufReader::new(close.as_bytes());
            let _ = channel.data(&mut cursor).await;
            let _ = channel.eof().await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle
                .disconnect(Disconnect::ByApplication, "session closed", "en")
                .await;
            debug!(host = %self.host, "device session closed");
        }
        self.state = SessionState::Disconnected;
    }
}

/// Position of the end-of-message delimiter in the buffer, if present.
fn find_delimiter(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(EOM_DELIMITER.len())
        .position(|window| window == EOM_DELIMITER.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_parse_ok() {
        let reply = NetconfReply::parse(r#"<rpc-reply message-id="1"><ok/></rpc-reply>"#);
        assert!(reply.ok);
        assert!(reply.errors.is_empty());
    }

    #[test]
    fn test_reply_parse_rpc_error() {
        let reply = NetconfReply::parse(
            r#"<rpc-reply>
  <rpc-error>
    <error-type>application</error-type>
    <error-tag>invalid-value</error-tag>
    <error-message>syntax error</error-message>
  </rpc-error>
</rpc-reply>"#,
        );
        assert!(!reply.ok);
        assert_eq!(reply.errors, vec!["syntax error"]);
        assert_eq!(reply.error_summary(), "syntax error");
    }

    #[test]
    fn test_reply_parse_multiple_errors_falls_back_to_tag() {
        let reply = NetconfReply::parse(
            r#"<rpc-error><error-tag>operation-failed</error-tag></rpc-error>
<rpc-error><error-message>daemon busy</error-message></rpc-error>"#,
        );
        assert_eq!(reply.errors, vec!["operation-failed", "daemon busy"]);
    }

    #[test]
    fn test_reply_parse_data_payload() {
        let reply = NetconfReply::parse(
            "<rpc-reply><system-information><host-name>srx01</host-name></system-information></rpc-reply>",
        );
        assert!(reply.ok);
        assert_eq!(
            extract_element(reply.data.as_deref().unwrap(), "host-name").as_deref(),
            Some("srx01")
        );
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("plain"), "plain");
        assert_eq!(escape_xml("<set>"), "&lt;set&gt;");
        assert_eq!(escape_xml("a & b"), "a &amp; b");
        assert_eq!(
            escape_xml("description 'x'"),
            "description &apos;x&apos;"
        );
    }

    #[test]
    fn test_find_delimiter() {
        assert_eq!(find_delimiter(b"<ok/>]]>]]>"), Some(5));
        assert_eq!(find_delimiter(b"partial]]>]]"), None);
        assert_eq!(find_delimiter(b""), None);
    }
}
