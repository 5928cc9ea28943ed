//! In-process plugin for tests
//!
//! `MockTransport` feeds requests through a real [`PluginServer`] whose
//! handler returns predictable bytes, with optional failure injection.
//! `MockLauncher` hands out mock transports and counts launches and closes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use relforge_plugin::{
    ArchiveHandler, ArchiveRequest, ErrorPayload, HeartbeatPayload, Operation, PluginRequest,
    PluginResponse, PluginServer,
};

use super::registry::PluginLauncher;
use super::transport::{PluginTransport, TransportError};
use crate::config::PluginConfig;

/// Failure injected into a [`MockTransport`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFault {
    /// Heartbeats answer with a different nonce
    WrongNonce,
    /// Responses carry a foreign request id
    WrongRequestId,
    /// Archive requests fail as if the process died
    BreakOnArchive,
    /// Archive requests are answered with `ok: false`
    RejectArchive,
    /// Archive requests read a stray non-JSON line instead of a response
    StrayLineOnArchive,
}

struct MockHandler;

impl ArchiveHandler for MockHandler {
    fn archive(&self, request: &ArchiveRequest) -> Result<Vec<u8>, ErrorPayload> {
        Ok(MockTransport::content_for(&request.out_name))
    }
}

/// Transport answering in-process
pub struct MockTransport {
    server: PluginServer<MockHandler>,
    fault: Option<MockFault>,
    closes: Arc<AtomicUsize>,
    closed: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            server: PluginServer::new(MockHandler),
            fault: None,
            closes: Arc::new(AtomicUsize::new(0)),
            closed: false,
        }
    }

    pub fn with_fault(fault: MockFault) -> Self {
        Self {
            fault: Some(fault),
            ..Self::new()
        }
    }

    /// Bytes the mock plugin produces for an archive name
    pub fn content_for(out_name: &str) -> Vec<u8> {
        format!("mock-archive:{}", out_name).into_bytes()
    }

    /// Count `close` calls into a shared counter
    pub fn counting_closes(mut self, closes: Arc<AtomicUsize>) -> Self {
        self.closes = closes;
        self
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginTransport for MockTransport {
    fn round_trip(&mut self, request: &PluginRequest) -> Result<PluginResponse, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        match (self.fault, request.op) {
            (Some(MockFault::BreakOnArchive), Operation::Archive) => return Err(TransportError::Closed),
            (Some(MockFault::StrayLineOnArchive), Operation::Archive) => {
                return Err(TransportError::Decode {
                    line: "building package...".to_string(),
                    message: "expected value at line 1 column 1".to_string(),
                })
            }
            (Some(MockFault::RejectArchive), Operation::Archive) => {
                return Ok(PluginResponse::error(
                    request.request_id.clone(),
                    ErrorPayload::archive_failed("mock rejection"),
                ))
            }
            _ => {}
        }

        let line = serde_json::to_string(request)?;
        let mut response = self.server.handle_line(&line);

        match self.fault {
            Some(MockFault::WrongNonce) if request.op == Operation::Heartbeat => {
                let payload = HeartbeatPayload {
                    nonce: "not-the-nonce".to_string(),
                };
                response.payload = Some(serde_json::to_value(payload)?);
            }
            Some(MockFault::WrongRequestId) => response.request_id = "req-other".to_string(),
            _ => {}
        }
        Ok(response)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed = true;
        Ok(())
    }
}

/// Launcher handing out [`MockTransport`]s
#[derive(Debug, Default)]
pub struct MockLauncher {
    launches: AtomicUsize,
    closes: Arc<AtomicUsize>,
    fault: Option<MockFault>,
    refuse: bool,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every launched transport carries this fault
    pub fn with_fault(fault: MockFault) -> Self {
        Self {
            fault: Some(fault),
            ..Self::default()
        }
    }

    /// Every launch fails as if the command did not exist
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    /// Number of processes "started" so far
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Transport `close` calls across every launched transport
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl PluginLauncher for MockLauncher {
    fn launch(&self, plugin: &PluginConfig) -> Result<Box<dyn PluginTransport>, TransportError> {
        if self.refuse {
            return Err(TransportError::Spawn {
                command: plugin.command.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "mock launcher refuses"),
            });
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        let transport = match self.fault {
            Some(fault) => MockTransport::with_fault(fault),
            None => MockTransport::new(),
        };
        Ok(Box::new(transport.counting_closes(Arc::clone(&self.closes))))
    }
}
