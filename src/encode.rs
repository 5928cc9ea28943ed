//! Built-in archive encoders
//!
//! Archives are reproducible: entries keep the given order, timestamps are
//! zeroed and ownership is normalized.

use std::fs;
use std::io::{self, Cursor, Write};
use std::path::PathBuf;

use tar::{Builder, Header};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::plan::ArchiveFormat;

/// Default mode for extra files without an explicit one
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Mode of the binary inside an archive
pub const BINARY_MODE: u32 = 0o755;

/// One file to place in an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub source: PathBuf,
    /// `/`-separated path inside the archive
    pub target: String,
    pub mode: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("failed to read {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("format {0} has no built-in encoder")]
    Unsupported(ArchiveFormat),
}

/// Encode the entries in the given built-in format
pub fn encode(format: ArchiveFormat, entries: &[ArchiveEntry]) -> Result<Vec<u8>, EncodeError> {
    match format {
        ArchiveFormat::Tar => encode_tar(entries),
        ArchiveFormat::Zip => encode_zip(entries),
        ArchiveFormat::Plugin => Err(EncodeError::Unsupported(format)),
    }
}

fn read_entry(entry: &ArchiveEntry) -> Result<Vec<u8>, EncodeError> {
    fs::read(&entry.source).map_err(|source| EncodeError::Read {
        path: entry.source.clone(),
        source,
    })
}

fn encode_tar(entries: &[ArchiveEntry]) -> Result<Vec<u8>, EncodeError> {
    let mut buffer = Vec::new();
    {
        let mut builder = Builder::new(&mut buffer);
        for entry in entries {
            let contents = read_entry(entry)?;

            let mut header = Header::new_gnu();
            header.set_path(&entry.target)?;
            header.set_size(contents.len() as u64);
            header.set_mtime(0);
            header.set_uid(0);
            header.set_gid(0);
            header.set_mode(entry.mode);
            header.set_cksum();

            builder.append(&header, contents.as_slice())?;
        }
        builder.finish()?;
    }
    Ok(buffer)
}

fn encode_zip(entries: &[ArchiveEntry]) -> Result<Vec<u8>, EncodeError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for entry in entries {
        let contents = read_entry(entry)?;
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(entry.mode);
        zip.start_file(entry.target.as_str(), options)?;
        zip.write_all(&contents)?;
    }
    Ok(zip.finish()?.into_inner())
}
