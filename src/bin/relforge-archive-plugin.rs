//! Reference archive plugin
//!
//! Speaks the relforge plugin protocol on stdin/stdout and builds archives
//! with relforge's own encoders. `custom_settings.format` selects `tar`
//! (the default) or `zip`. Logs go to stderr, stdout carries responses only.

use relforge::encode::{encode, ArchiveEntry};
use relforge::logging;
use relforge::plan::ArchiveFormat;
use relforge_plugin::{ArchiveHandler, ArchiveRequest, ErrorCode, ErrorPayload, PluginServer};
use std::path::PathBuf;
use std::process;

struct EncodeHandler;

impl EncodeHandler {
    fn format(request: &ArchiveRequest) -> Result<ArchiveFormat, ErrorPayload> {
        let Some(value) = request.settings.custom_settings.get("format") else {
            return Ok(ArchiveFormat::Tar);
        };
        let name = value
            .as_str()
            .ok_or_else(|| ErrorPayload::invalid_request("custom_settings.format must be a string"))?;
        match name.parse::<ArchiveFormat>() {
            Ok(ArchiveFormat::Plugin) | Err(_) => Err(ErrorPayload::new(
                ErrorCode::Unsupported,
                format!("unsupported format {:?}, expected tar or zip", name),
            )),
            Ok(format) => Ok(format),
        }
    }
}

impl ArchiveHandler for EncodeHandler {
    fn archive(&self, request: &ArchiveRequest) -> Result<Vec<u8>, ErrorPayload> {
        let format = Self::format(request)?;
        let entries: Vec<ArchiveEntry> = request
            .files
            .iter()
            .map(|file| ArchiveEntry {
                source: PathBuf::from(&file.source_path),
                target: file.target_path.clone(),
                mode: file.mode,
            })
            .collect();

        let bytes = encode(format, &entries).map_err(|e| ErrorPayload::archive_failed(e.to_string()))?;
        tracing::info!(
            out_name = %request.out_name,
            format = %format,
            files = entries.len(),
            bytes = bytes.len(),
            "Archive built"
        );
        Ok(bytes)
    }
}

fn main() {
    logging::init(false);

    if let Err(e) = PluginServer::new(EncodeHandler).run() {
        tracing::error!(error = %e, "Plugin I/O failed");
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relforge_plugin::{ArchiveFile, ArchiveSettings, BuildInfo};
    use std::fs;
    use tempfile::TempDir;

    fn request(dir: &TempDir, custom: serde_json::Value) -> ArchiveRequest {
        let source = dir.path().join("tool");
        fs::write(&source, b"binary").unwrap();
        ArchiveRequest {
            build_info: BuildInfo {
                project: "tool".to_string(),
                tag: "v1.0.0".to_string(),
                os: "linux".to_string(),
                arch: "amd64".to_string(),
            },
            settings: ArchiveSettings {
                format: "plugin".to_string(),
                extension: "tar".to_string(),
                custom_settings: custom.as_object().cloned().unwrap_or_default(),
            },
            files: vec![ArchiveFile {
                source_path: source.to_string_lossy().to_string(),
                target_path: "tool".to_string(),
                mode: 0o755,
            }],
            out_name: "tool_v1.0.0_linux-amd64.tar".to_string(),
        }
    }

    #[test]
    fn test_default_format_is_tar() {
        let dir = TempDir::new().unwrap();
        let bytes = EncodeHandler.archive(&request(&dir, serde_json::json!({}))).unwrap();

        let mut archive = tar::Archive::new(bytes.as_slice());
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["tool"]);
    }

    #[test]
    fn test_zip_format() {
        let dir = TempDir::new().unwrap();
        let bytes = EncodeHandler
            .archive(&request(&dir, serde_json::json!({"format": "zip"})))
            .unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn test_rejects_unknown_format() {
        let dir = TempDir::new().unwrap();
        let err = EncodeHandler
            .archive(&request(&dir, serde_json::json!({"format": "rar"})))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Unsupported);
    }

    #[test]
    fn test_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let mut req = request(&dir, serde_json::json!({}));
        req.files[0].source_path = dir.path().join("absent").to_string_lossy().to_string();
        let err = EncodeHandler.archive(&req).unwrap_err();
        assert_eq!(err.code, ErrorCode::ArchiveFailed);
    }
}
