//! Plugin request types.

use serde::{Deserialize, Serialize};

/// Operations a plugin understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Liveness probe. The plugin echoes the payload nonce.
    Heartbeat,
    /// Produce one archive and return its bytes.
    Archive,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Heartbeat => write!(f, "heartbeat"),
            Operation::Archive => write!(f, "archive"),
        }
    }
}

/// Request envelope.
///
/// Written by relforge as a single JSON line on the plugin's stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRequest {
    /// Protocol version of the sender.
    pub protocol_version: i32,

    /// Operation to perform.
    pub op: Operation,

    /// Caller-chosen request ID, echoed in the response.
    pub request_id: String,

    /// Operation-specific payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl PluginRequest {
    /// Build a request with a typed payload.
    pub fn new<P: Serialize>(
        op: Operation,
        request_id: impl Into<String>,
        payload: &P,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            protocol_version: crate::PROTOCOL_VERSION,
            op,
            request_id: request_id.into(),
            payload: serde_json::to_value(payload)?,
        })
    }
}

/// Payload of a heartbeat request and of its response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    /// Unique value the plugin must echo back unchanged.
    pub nonce: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_request_json() {
        let request = PluginRequest::new(
            Operation::Heartbeat,
            "req-1",
            &HeartbeatPayload { nonce: "n-1".to_string() },
        )
        .unwrap();

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["op"], "heartbeat");
        assert_eq!(json["request_id"], "req-1");
        assert_eq!(json["payload"]["nonce"], "n-1");
        assert_eq!(json["protocol_version"], crate::PROTOCOL_VERSION);
    }

    #[test]
    fn test_request_parsing_without_payload() {
        let json = r#"{"protocol_version": 1, "op": "archive", "request_id": "r"}"#;
        let request: PluginRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.op, Operation::Archive);
        assert!(request.payload.is_null());
    }
}
