//! Plugin response types.

use serde::{Deserialize, Serialize};

use crate::error::ErrorPayload;

/// Response envelope.
///
/// Emitted by the plugin as a single JSON line on stdout, exactly one per
/// request, in request order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginResponse {
    /// Protocol version of the plugin.
    pub protocol_version: i32,
    /// Request ID echoed from the request.
    pub request_id: String,
    /// Whether the operation succeeded.
    pub ok: bool,
    /// Success payload (present when ok=true).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Error details (present when ok=false).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl PluginResponse {
    /// Create a success response.
    pub fn success(request_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            protocol_version: crate::PROTOCOL_VERSION,
            request_id: request_id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(request_id: impl Into<String>, error: ErrorPayload) -> Self {
        Self {
            protocol_version: crate::PROTOCOL_VERSION,
            request_id: request_id.into(),
            ok: false,
            payload: None,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_success_omits_error() {
        let resp = PluginResponse::success("r-1", serde_json::json!({"nonce": "x"}));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["ok"], true);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_error_response_roundtrip() {
        let resp = PluginResponse::error(
            "r-2",
            ErrorPayload::new(ErrorCode::Unsupported, "no such format"),
        );
        let line = serde_json::to_string(&resp).unwrap();
        let parsed: PluginResponse = serde_json::from_str(&line).unwrap();

        assert!(!parsed.ok);
        assert!(parsed.payload.is_none());
        assert_eq!(parsed.error.unwrap().code, ErrorCode::Unsupported);
    }
}
