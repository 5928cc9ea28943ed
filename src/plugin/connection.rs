//! Plugin connection
//!
//! Correlates requests and responses on one transport. A connection serves
//! one request at a time; concurrent archive units queue on its mutex.
//! After a transport or protocol failure the response stream can no longer
//! be trusted, so the connection is closed and later calls fail fast.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use relforge_plugin::{
    ArchiveRequest, ArchiveResponse, ErrorPayload, HeartbeatPayload, Operation, PluginRequest,
    PROTOCOL_VERSION,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::transport::{PluginTransport, TransportError};

/// Errors talking to a running plugin
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// The pipe broke, the process is gone or a line was not JSON
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The plugin answered with `ok: false`
    #[error("plugin rejected request: {0}")]
    Rejected(ErrorPayload),

    /// The plugin answered, but not what was asked
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An earlier request failed in a way that desynchronized the stream
    #[error("connection unusable after an earlier failure: {0}")]
    Broken(String),
}

impl PluginError {
    /// Whether the request/response stream may be out of step
    fn breaks_connection(&self) -> bool {
        matches!(self, PluginError::Transport(_) | PluginError::Protocol(_))
    }
}

struct Channel {
    transport: Box<dyn PluginTransport>,
    broken: Option<String>,
}

/// A started plugin
pub struct PluginConnection {
    id: String,
    channel: Mutex<Channel>,
    request_counter: AtomicU64,
    closed: AtomicBool,
}

impl PluginConnection {
    pub fn new(id: impl Into<String>, transport: Box<dyn PluginTransport>) -> Self {
        Self {
            id: id.into(),
            channel: Mutex::new(Channel {
                transport,
                broken: None,
            }),
            request_counter: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Plugin identity from the configuration
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Reason the connection was given up, if it was
    pub fn broken(&self) -> Option<String> {
        self.lock().broken.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Channel> {
        self.channel.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn next_request_id(&self) -> String {
        let counter = self.request_counter.fetch_add(1, Ordering::SeqCst);
        let timestamp = chrono::Utc::now().timestamp_millis();
        format!("req-{:x}-{:08x}", timestamp, counter)
    }

    fn call<P: Serialize, R: DeserializeOwned>(
        &self,
        op: Operation,
        payload: &P,
    ) -> Result<R, PluginError> {
        let request = PluginRequest::new(op, self.next_request_id(), payload)
            .map_err(TransportError::from)?;

        // Held across validation so no other request reads a stale line
        let mut channel = self.lock();
        if let Some(reason) = &channel.broken {
            return Err(PluginError::Broken(reason.clone()));
        }
        if self.is_closed() {
            return Err(TransportError::Closed.into());
        }

        let result = exchange(channel.transport.as_mut(), &request);
        if let Err(err) = &result {
            if err.breaks_connection() {
                channel.broken = Some(err.to_string());
                tracing::warn!(plugin = %self.id, error = %err, "Closing plugin connection");
                if !self.closed.swap(true, Ordering::SeqCst) {
                    if let Err(close_err) = channel.transport.close() {
                        tracing::warn!(plugin = %self.id, error = %close_err, "Failed to close plugin");
                    }
                }
            }
        }
        result
    }

    /// Send a heartbeat and require the nonce to come back unchanged
    pub fn heartbeat(&self, nonce: &str) -> Result<(), PluginError> {
        let echo: HeartbeatPayload = self.call(
            Operation::Heartbeat,
            &HeartbeatPayload {
                nonce: nonce.to_string(),
            },
        )?;
        if echo.nonce != nonce {
            return Err(PluginError::Protocol(format!(
                "heartbeat mismatch: sent {:?}, got {:?}",
                nonce, echo.nonce
            )));
        }
        Ok(())
    }

    /// Ask the plugin to build an archive and return its bytes
    pub fn archive(&self, request: &ArchiveRequest) -> Result<Vec<u8>, PluginError> {
        let response: ArchiveResponse = self.call(Operation::Archive, request)?;
        response
            .to_bytes()
            .map_err(|e| PluginError::Protocol(format!("archive content is not base64: {}", e)))
    }

    /// Close the transport. Closing an already closed connection succeeds.
    pub fn close(&self) -> Result<(), TransportError> {
        let mut channel = self.lock();
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        channel.transport.close()
    }
}

fn exchange<R: DeserializeOwned>(
    transport: &mut dyn PluginTransport,
    request: &PluginRequest,
) -> Result<R, PluginError> {
    let response = transport.round_trip(request)?;

    if response.request_id != request.request_id {
        return Err(PluginError::Protocol(format!(
            "response id {:?} does not match request id {:?}",
            response.request_id, request.request_id
        )));
    }
    if response.protocol_version != PROTOCOL_VERSION {
        return Err(PluginError::Protocol(format!(
            "response protocol version {} (expected {})",
            response.protocol_version, PROTOCOL_VERSION
        )));
    }
    if !response.ok {
        let error = response
            .error
            .unwrap_or_else(|| ErrorPayload::archive_failed("plugin returned ok=false without an error"));
        return Err(PluginError::Rejected(error));
    }

    let payload = response.payload.unwrap_or(Value::Null);
    serde_json::from_value(payload)
        .map_err(|e| PluginError::Protocol(format!("invalid {} payload: {}", request.op, e)))
}

impl std::fmt::Debug for PluginConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginConnection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::mock::{MockFault, MockTransport};
    use relforge_plugin::{ArchiveSettings, BuildInfo, ErrorCode};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn archive_request(out_name: &str) -> ArchiveRequest {
        ArchiveRequest {
            build_info: BuildInfo::default(),
            settings: ArchiveSettings {
                format: "plugin".to_string(),
                extension: ".deb".to_string(),
                custom_settings: Default::default(),
            },
            files: vec![],
            out_name: out_name.to_string(),
        }
    }

    #[test]
    fn test_heartbeat_echo() {
        let conn = PluginConnection::new("deb", Box::new(MockTransport::new()));
        conn.heartbeat("heartbeat-1").unwrap();
        conn.heartbeat("heartbeat-2").unwrap();
    }

    #[test]
    fn test_heartbeat_mismatch() {
        let conn = PluginConnection::new("deb", Box::new(MockTransport::with_fault(MockFault::WrongNonce)));
        let err = conn.heartbeat("heartbeat-1").unwrap_err();
        assert!(matches!(err, PluginError::Protocol(ref m) if m.contains("heartbeat mismatch")));
    }

    #[test]
    fn test_archive_returns_bytes() {
        let conn = PluginConnection::new("deb", Box::new(MockTransport::new()));
        let bytes = conn.archive(&archive_request("hugo.deb")).unwrap();
        assert_eq!(bytes, MockTransport::content_for("hugo.deb"));
    }

    #[test]
    fn test_transport_failure_vs_rejection() {
        let broken = PluginConnection::new("deb", Box::new(MockTransport::with_fault(MockFault::BreakOnArchive)));
        broken.heartbeat("ok").unwrap();
        assert!(matches!(
            broken.archive(&archive_request("a.deb")),
            Err(PluginError::Transport(_))
        ));

        let rejecting = PluginConnection::new("deb", Box::new(MockTransport::with_fault(MockFault::RejectArchive)));
        match rejecting.archive(&archive_request("a.deb")) {
            Err(PluginError::Rejected(payload)) => assert_eq!(payload.code, ErrorCode::ArchiveFailed),
            other => panic!("expected rejection, got {:?}", other.map(|b| b.len())),
        }
    }

    #[test]
    fn test_mismatched_request_id() {
        let conn = PluginConnection::new("deb", Box::new(MockTransport::with_fault(MockFault::WrongRequestId)));
        assert!(matches!(conn.heartbeat("x"), Err(PluginError::Protocol(_))));
    }

    #[test]
    fn test_closed_connection() {
        let conn = PluginConnection::new("deb", Box::new(MockTransport::new()));
        conn.close().unwrap();
        conn.close().unwrap();
        assert!(conn.is_closed());
        assert!(matches!(
            conn.heartbeat("x"),
            Err(PluginError::Transport(TransportError::Closed))
        ));
    }

    #[test]
    fn test_request_ids_are_unique() {
        let conn = PluginConnection::new("deb", Box::new(MockTransport::new()));
        let a = conn.next_request_id();
        let b = conn.next_request_id();
        assert_ne!(a, b);
        assert!(a.starts_with("req-"));
    }

    #[test]
    fn test_stray_line_breaks_connection() {
        let closes = Arc::new(AtomicUsize::new(0));
        let transport = MockTransport::with_fault(MockFault::StrayLineOnArchive).counting_closes(Arc::clone(&closes));
        let conn = PluginConnection::new("deb", Box::new(transport));

        let first = conn.archive(&archive_request("a.deb")).unwrap_err();
        assert!(matches!(first, PluginError::Transport(TransportError::Decode { .. })));
        assert!(conn.is_closed());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(conn.broken().unwrap().contains("building package"));

        // Later units fail fast without touching the transport
        match conn.archive(&archive_request("b.deb")) {
            Err(PluginError::Broken(reason)) => assert!(reason.contains("building package")),
            other => panic!("expected broken connection, got {:?}", other.map(|b| b.len())),
        }
        assert!(matches!(conn.heartbeat("x"), Err(PluginError::Broken(_))));

        conn.close().unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mismatched_request_id_breaks_connection() {
        let conn = PluginConnection::new("deb", Box::new(MockTransport::with_fault(MockFault::WrongRequestId)));
        assert!(matches!(conn.heartbeat("x"), Err(PluginError::Protocol(_))));
        assert!(matches!(conn.heartbeat("y"), Err(PluginError::Broken(_))));
    }

    #[test]
    fn test_rejection_keeps_connection() {
        let conn = PluginConnection::new("deb", Box::new(MockTransport::with_fault(MockFault::RejectArchive)));
        assert!(matches!(conn.archive(&archive_request("a.deb")), Err(PluginError::Rejected(_))));
        assert!(conn.broken().is_none());
        assert!(!conn.is_closed());
        conn.heartbeat("still-there").unwrap();
    }
}
