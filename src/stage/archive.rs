//! Archive stage
//!
//! One unit per archive path. Built-in formats are encoded in process;
//! plugin formats go through the plugin's shared connection. Aliases get
//! a copy of the same bytes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use relforge_plugin::{ArchiveFile, ArchiveRequest, ArchiveSettings};

use super::{write_file, StageContext, UnitError};
use crate::encode::{self, ArchiveEntry, BINARY_MODE, DEFAULT_FILE_MODE};
use crate::plan::{ArchivePath, CompiledArchive};
use crate::pool::{BatchReport, WorkerPool};

pub(super) fn run(ctx: &Arc<StageContext>, pool: &WorkerPool) -> BatchReport<UnitError> {
    let mut batch = pool.batch();
    for (archive_index, archive) in ctx.plan.archives.iter().enumerate() {
        for (path_index, path) in archive.paths.iter().enumerate() {
            let ctx = Arc::clone(ctx);
            let label = format!("{}/{}", path.path, path.name);
            batch.submit(label, move || archive_unit(&ctx, archive_index, path_index));
        }
    }
    batch.wait()
}

fn archive_unit(ctx: &StageContext, archive_index: usize, path_index: usize) -> Result<(), UnitError> {
    let archive = &ctx.plan.archives[archive_index];
    let path = &archive.paths[path_index];
    let out_dir = ctx.layout.archive_dir(&path.arch);
    let entries = entries(ctx, archive, path);

    if ctx.trial {
        for name in path.file_names() {
            tracing::info!(
                archive = %archive.label,
                format = %archive.format,
                output = %ctx.layout.display(&out_dir.join(name)),
                files = entries.len(),
                "Would archive"
            );
        }
        return Ok(());
    }

    let source = ctx.layout.archive_source(path);
    if !source.is_file() {
        return Err(UnitError::MissingBinary(source));
    }

    let bytes = match &archive.plugin {
        Some(plugin) => {
            let connection = ctx
                .registry
                .get(&plugin.id)
                .ok_or_else(|| UnitError::PluginNotStarted {
                    id: plugin.id.clone(),
                })?;
            let request = plugin_request(ctx, archive, path, &entries);
            connection.archive(&request).map_err(|source| UnitError::Plugin {
                id: plugin.id.clone(),
                source,
            })?
        }
        None => encode::encode(archive.format, &entries)?,
    };

    for name in path.file_names() {
        let output = out_dir.join(name);
        write_file(&output, &bytes)?;
        tracing::info!(output = %ctx.layout.display(&output), bytes = bytes.len(), "Archived");
    }
    Ok(())
}

/// Binary first, then the extra files in configuration order
fn entries(ctx: &StageContext, archive: &CompiledArchive, path: &ArchivePath) -> Vec<ArchiveEntry> {
    let mut entries = Vec::with_capacity(1 + archive.extra_files.len());
    entries.push(ArchiveEntry {
        source: ctx.layout.archive_source(path),
        target: archive_path(&archive.binary_dir, &path.binary),
        mode: BINARY_MODE,
    });
    for extra in &archive.extra_files {
        let target = if extra.target_path.is_empty() {
            file_name(&extra.source_path)
        } else {
            extra.target_path.clone()
        };
        entries.push(ArchiveEntry {
            source: resolve(&ctx.project_dir, &extra.source_path),
            target,
            mode: extra.mode.unwrap_or(DEFAULT_FILE_MODE),
        });
    }
    entries
}

fn plugin_request(
    ctx: &StageContext,
    archive: &CompiledArchive,
    path: &ArchivePath,
    entries: &[ArchiveEntry],
) -> ArchiveRequest {
    ArchiveRequest {
        build_info: path.arch.build_info(&ctx.plan.project, &ctx.plan.tag),
        settings: ArchiveSettings {
            format: archive.format.to_string(),
            extension: archive.extension.clone(),
            custom_settings: archive.custom_settings.clone(),
        },
        files: entries
            .iter()
            .map(|entry| ArchiveFile {
                source_path: entry.source.to_string_lossy().to_string(),
                target_path: entry.target.clone(),
                mode: entry.mode,
            })
            .collect(),
        out_name: path.name.clone(),
    }
}

fn archive_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

fn resolve(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_path() {
        assert_eq!(archive_path("", "hugo"), "hugo");
        assert_eq!(archive_path("bin/", "hugo"), "bin/hugo");
        assert_eq!(archive_path("/usr/bin", "hugo"), "usr/bin/hugo");
    }

    #[test]
    fn test_file_name_and_resolve() {
        assert_eq!(file_name("docs/README.md"), "README.md");
        assert_eq!(resolve(Path::new("/proj"), "LICENSE"), PathBuf::from("/proj/LICENSE"));
        assert_eq!(resolve(Path::new("/proj"), "/etc/motd"), PathBuf::from("/etc/motd"));
    }
}
