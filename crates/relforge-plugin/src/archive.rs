//! Archive operation payloads.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Target the archive is produced for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    /// Project name from the configuration.
    pub project: String,
    /// Release tag, e.g. `v1.2.0`.
    pub tag: String,
    /// Operating system, e.g. `linux`.
    pub os: String,
    /// CPU architecture, e.g. `amd64`.
    pub arch: String,
}

/// Format settings of the archive definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveSettings {
    pub format: String,
    pub extension: String,
    /// Format-specific settings, passed through untouched.
    #[serde(default)]
    pub custom_settings: serde_json::Map<String, serde_json::Value>,
}

/// One file to place in the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveFile {
    /// Absolute path of the file on disk.
    pub source_path: String,
    /// Path of the entry inside the archive.
    pub target_path: String,
    /// Unix permission bits of the entry.
    pub mode: u32,
}

/// Payload of an `archive` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRequest {
    pub build_info: BuildInfo,
    pub settings: ArchiveSettings,
    pub files: Vec<ArchiveFile>,
    /// File name the archive will be written under.
    pub out_name: String,
}

/// Payload of a successful `archive` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveResponse {
    /// Base64-encoded archive bytes.
    pub content: String,
}

impl ArchiveResponse {
    /// Encode archive bytes for the wire.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            content: STANDARD.encode(bytes),
        }
    }

    /// Decode the archive bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_response_bytes() {
        let resp = ArchiveResponse::from_bytes(b"\x00\x01archive");
        assert_eq!(resp.to_bytes().unwrap(), b"\x00\x01archive".to_vec());
    }

    #[test]
    fn test_archive_response_bad_base64() {
        let resp = ArchiveResponse {
            content: "not base64!".to_string(),
        };
        assert!(resp.to_bytes().is_err());
    }

    #[test]
    fn test_custom_settings_default_empty() {
        let json = r#"{"format": "deb", "extension": ".deb"}"#;
        let settings: ArchiveSettings = serde_json::from_str(json).unwrap();
        assert!(settings.custom_settings.is_empty());
    }
}
