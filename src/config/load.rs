//! Loading `relforge.toml`
//!
//! Decoding errors are reported with file, line and column whenever the
//! decoder can point at a location in the source.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::model::Config;

/// Default config file name, relative to the project directory
pub const DEFAULT_CONFIG_FILE: &str = "relforge.toml";

/// Errors loading the configuration
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("error opening config file {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("error decoding config file {path:?}:{line}:{column}: {message}")]
    DecodeAt {
        path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("error decoding config file {path:?}: {message}")]
    Decode { path: PathBuf, message: String },
}

/// Decoder errors that may know where in the source they happened
pub trait ReportsPosition: fmt::Display {
    /// Byte offset of the offending input, if known
    fn byte_offset(&self) -> Option<usize>;

    /// Message without any location prefix
    fn bare_message(&self) -> String {
        self.to_string()
    }
}

impl ReportsPosition for toml::de::Error {
    fn byte_offset(&self) -> Option<usize> {
        self.span().map(|span| span.start)
    }

    fn bare_message(&self) -> String {
        self.message().trim().to_string()
    }
}

/// 1-based line and column (in characters) of a byte offset
pub fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let mut offset = offset.min(source.len());
    while !source.is_char_boundary(offset) {
        offset -= 1;
    }
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}

/// Turn any positioned decoder error into a [`LoadError`]
pub fn decode_error<E: ReportsPosition>(path: &Path, source: &str, err: &E) -> LoadError {
    match err.byte_offset() {
        Some(offset) => {
            let (line, column) = line_column(source, offset);
            LoadError::DecodeAt {
                path: path.to_path_buf(),
                line,
                column,
                message: err.bare_message(),
            }
        }
        None => LoadError::Decode {
            path: path.to_path_buf(),
            message: err.bare_message(),
        },
    }
}

/// Decode configuration text and apply defaults
pub fn decode_str(source: &str, path: &Path) -> Result<Config, LoadError> {
    let mut config: Config =
        toml::from_str(source).map_err(|e| decode_error(path, source, &e))?;
    config.apply_defaults();
    Ok(config)
}

/// Read and decode a config file
pub fn load_file(path: &Path) -> Result<Config, LoadError> {
    let source = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_str(&source, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const VALID: &str = r#"
project = "hugo"

[build_settings]
command = ["make", "build"]

[archive_settings]
name_template = "{{ .Project }}_{{ .Tag }}_{{ .Os }}-{{ .Arch }}"
[archive_settings.type]
format = "tar"
extension = ".tar"
[archive_settings.custom_settings]
compression = "none"
level = 3

[[builds]]
path = "unix"
[[builds.os]]
name = "linux"
archs = ["amd64", "arm64"]

[[archives]]
paths = ["builds/unix/**"]

[[releases]]
paths = ["archives/**"]
dir = "main"
"#;

    #[test]
    fn test_decode_valid_config() {
        let config = decode_str(VALID, Path::new("relforge.toml")).unwrap();
        assert_eq!(config.project, "hugo");
        assert_eq!(config.builds[0].os[0].archs.len(), 2);
        assert_eq!(config.builds[0].build_settings.binary, "hugo");

        let settings = &config.archives[0].archive_settings;
        assert_eq!(settings.archive_type.format, "tar");
        assert_eq!(settings.custom_settings["level"], serde_json::json!(3));
        assert_eq!(config.releases[0].dir, "main");
    }

    #[test]
    fn test_unknown_field_is_error() {
        let source = "project = \"hugo\"\nflavour = \"vanilla\"\n";
        let err = decode_str(source, Path::new("relforge.toml")).unwrap_err();
        assert!(err.to_string().contains("unknown field"), "{}", err);
        assert!(err.to_string().contains("flavour"), "{}", err);
    }

    #[test]
    fn test_syntax_error_has_position() {
        let source = "project = \"hugo\"\n\n[[builds]\npath = \"x\"\n";
        match decode_str(source, Path::new("conf/relforge.toml")).unwrap_err() {
            LoadError::DecodeAt { path, line, column, .. } => {
                assert_eq!(path, PathBuf::from("conf/relforge.toml"));
                assert_eq!(line, 3);
                assert!(column >= 1);
            }
            other => panic!("expected positioned error, got {:?}", other),
        }
    }

    #[test]
    fn test_line_column() {
        let source = "ab\ncdé\nf";
        assert_eq!(line_column(source, 0), (1, 1));
        assert_eq!(line_column(source, 3), (2, 1));
        assert_eq!(line_column(source, 5), (2, 3));
        assert_eq!(line_column(source, 8), (3, 1));
        assert_eq!(line_column(source, 100), (3, 2));
    }

    struct Unplaced;

    impl fmt::Display for Unplaced {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "something broke")
        }
    }

    impl ReportsPosition for Unplaced {
        fn byte_offset(&self) -> Option<usize> {
            None
        }
    }

    #[test]
    fn test_error_without_position() {
        let err = decode_error(Path::new("x.toml"), "", &Unplaced);
        assert!(matches!(err, LoadError::Decode { .. }));
        assert!(err.to_string().contains("something broke"));
    }

    #[test]
    fn test_load_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", VALID).unwrap();
        let config = load_file(file.path()).unwrap();
        assert_eq!(config.archives.len(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_file(Path::new("/definitely/not/here/relforge.toml")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
