//! Plugin-side request loop.
//!
//! A plugin binary wraps its archive logic in an [`ArchiveHandler`] and hands
//! it to [`PluginServer::run`]. The server reads one JSON request per line
//! from stdin, answers heartbeats itself, dispatches archive requests to the
//! handler and writes one JSON response per line to stdout. It returns when
//! stdin is closed, which is how relforge shuts a plugin down.

use std::io::{self, BufRead, Write};

use crate::archive::{ArchiveRequest, ArchiveResponse};
use crate::error::{ErrorCode, ErrorPayload};
use crate::request::{HeartbeatPayload, Operation, PluginRequest};
use crate::response::PluginResponse;
use crate::PROTOCOL_VERSION;

/// Archive logic implemented by a plugin.
pub trait ArchiveHandler {
    /// Produce the archive described by `request` and return its bytes.
    fn archive(&self, request: &ArchiveRequest) -> Result<Vec<u8>, ErrorPayload>;
}

/// Request loop for a plugin process.
pub struct PluginServer<H> {
    handler: H,
}

impl<H: ArchiveHandler> PluginServer<H> {
    /// Create a server around the given handler.
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    /// Serve requests on stdin/stdout until stdin is closed.
    pub fn run(&self) -> io::Result<()> {
        self.run_with_io(&mut io::stdin().lock(), &mut io::stdout().lock())
    }

    /// Serve requests with custom I/O (for testing).
    pub fn run_with_io<R: BufRead, W: Write>(
        &self,
        reader: &mut R,
        writer: &mut W,
    ) -> io::Result<()> {
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                return Ok(());
            }
            if line.trim().is_empty() {
                continue;
            }

            let response = self.handle_line(&line);
            serde_json::to_writer(&mut *writer, &response)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
    }

    /// Handle a single request line and build its response.
    pub fn handle_line(&self, line: &str) -> PluginResponse {
        let request: PluginRequest = match serde_json::from_str(line) {
            Ok(req) => req,
            Err(e) => {
                return PluginResponse::error(
                    String::new(),
                    ErrorPayload::invalid_request(format!("invalid JSON: {}", e)),
                )
            }
        };

        if request.protocol_version != PROTOCOL_VERSION {
            return PluginResponse::error(
                request.request_id,
                ErrorPayload::new(
                    ErrorCode::UnsupportedProtocol,
                    format!(
                        "protocol version {} not supported, expected {}",
                        request.protocol_version, PROTOCOL_VERSION
                    ),
                ),
            );
        }

        match self.dispatch(&request) {
            Ok(payload) => PluginResponse::success(request.request_id, payload),
            Err(e) => PluginResponse::error(request.request_id, e),
        }
    }

    fn dispatch(&self, request: &PluginRequest) -> Result<serde_json::Value, ErrorPayload> {
        match request.op {
            Operation::Heartbeat => {
                let heartbeat: HeartbeatPayload = parse_payload(request)?;
                to_payload(&heartbeat)
            }
            Operation::Archive => {
                let archive: ArchiveRequest = parse_payload(request)?;
                let bytes = self.handler.archive(&archive)?;
                to_payload(&ArchiveResponse::from_bytes(&bytes))
            }
        }
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(request: &PluginRequest) -> Result<T, ErrorPayload> {
    serde_json::from_value(request.payload.clone()).map_err(|e| {
        ErrorPayload::invalid_request(format!("invalid {} payload: {}", request.op, e))
    })
}

fn to_payload<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, ErrorPayload> {
    serde_json::to_value(value)
        .map_err(|e| ErrorPayload::archive_failed(format!("failed to encode response: {}", e)))
}
