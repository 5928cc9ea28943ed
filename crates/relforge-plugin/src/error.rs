//! Error types for the plugin protocol.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes carried by a failed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed JSON or missing payload fields.
    InvalidRequest,
    /// Protocol version not spoken by the plugin.
    UnsupportedProtocol,
    /// The plugin could not produce the archive.
    ArchiveFailed,
    /// The plugin does not support the requested format or settings.
    Unsupported,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest => write!(f, "INVALID_REQUEST"),
            Self::UnsupportedProtocol => write!(f, "UNSUPPORTED_PROTOCOL"),
            Self::ArchiveFailed => write!(f, "ARCHIVE_FAILED"),
            Self::Unsupported => write!(f, "UNSUPPORTED"),
        }
    }
}

/// Error payload of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ErrorPayload {
    /// Error code from the registry.
    pub code: ErrorCode,
    /// Human-readable, single-line message.
    pub message: String,
}

impl ErrorPayload {
    /// Create a new error payload.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn archive_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ArchiveFailed, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::ArchiveFailed).unwrap();
        assert_eq!(json, "\"ARCHIVE_FAILED\"");
        assert_eq!(ErrorCode::InvalidRequest.to_string(), "INVALID_REQUEST");
    }

    #[test]
    fn test_error_payload_display() {
        let err = ErrorPayload::archive_failed("disk full");
        assert_eq!(err.to_string(), "ARCHIVE_FAILED: disk full");
    }
}
