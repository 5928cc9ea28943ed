//! Archive format identifiers

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Known archive formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    /// Uncompressed tar, built in
    Tar,
    /// Zip with deflate, built in
    Zip,
    /// Delegated to an external plugin process
    Plugin,
}

impl ArchiveFormat {
    pub fn is_plugin(&self) -> bool {
        matches!(self, ArchiveFormat::Plugin)
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveFormat::Tar => write!(f, "tar"),
            ArchiveFormat::Zip => write!(f, "zip"),
            ArchiveFormat::Plugin => write!(f, "plugin"),
        }
    }
}

impl FromStr for ArchiveFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tar" => Ok(ArchiveFormat::Tar),
            "zip" => Ok(ArchiveFormat::Zip),
            "plugin" | "_plugin" => Ok(ArchiveFormat::Plugin),
            _ => Err(format!("unknown archive format {:?}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_formats() {
        assert_eq!("tar".parse::<ArchiveFormat>().unwrap(), ArchiveFormat::Tar);
        assert_eq!("ZIP".parse::<ArchiveFormat>().unwrap(), ArchiveFormat::Zip);
        assert_eq!("plugin".parse::<ArchiveFormat>().unwrap(), ArchiveFormat::Plugin);
        assert_eq!("_plugin".parse::<ArchiveFormat>().unwrap(), ArchiveFormat::Plugin);
        assert!("rar".parse::<ArchiveFormat>().is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for format in [ArchiveFormat::Tar, ArchiveFormat::Zip, ArchiveFormat::Plugin] {
            assert_eq!(format.to_string().parse::<ArchiveFormat>().unwrap(), format);
        }
    }
}
