//! Release stage
//!
//! One unit per release definition: copy the selected archives into
//! `releases/<dir>/` and write a SHA-256 checksums file next to them.

use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use super::{write_file, StageContext, UnitError};
use crate::pool::{BatchReport, WorkerPool};

pub(super) fn run(ctx: &Arc<StageContext>, pool: &WorkerPool) -> BatchReport<UnitError> {
    let mut batch = pool.batch();
    for (index, release) in ctx.plan.releases.iter().enumerate() {
        let ctx = Arc::clone(ctx);
        batch.submit(release.label.clone(), move || release_unit(&ctx, index));
    }
    batch.wait()
}

fn release_unit(ctx: &StageContext, index: usize) -> Result<(), UnitError> {
    let release = &ctx.plan.releases[index];
    let files = ctx.plan.release_files(release);
    let dir = ctx.layout.release_dir(release);

    if files.is_empty() {
        tracing::warn!(release = %release.label, "No archives matched");
    }

    // name -> archive path, rejecting two archives that would land on the same file
    let mut selected = BTreeMap::new();
    for file in &files {
        if selected.insert(file.name.clone(), file.path.clone()).is_some() {
            return Err(UnitError::NameCollision {
                name: file.name.clone(),
            });
        }
    }

    if ctx.trial {
        for name in selected.keys() {
            tracing::info!(release = %release.label, output = %ctx.layout.display(&dir.join(name)), "Would release");
        }
        if let Some(checksums) = &release.checksums_name {
            tracing::info!(release = %release.label, output = %ctx.layout.display(&dir.join(checksums)), "Would write checksums");
        }
        return Ok(());
    }

    let mut checksums = String::new();
    for (name, path) in &selected {
        let source = ctx.layout.archives_dir().join(path).join(name);
        let bytes = fs::read(&source).map_err(|e| UnitError::Read {
            path: source.clone(),
            source: e,
        })?;

        let digest = hex::encode(Sha256::digest(&bytes));
        checksums.push_str(&format!("{}  {}\n", digest, name));

        write_file(&dir.join(name), &bytes)?;
    }

    if let Some(checksums_name) = &release.checksums_name {
        let output = dir.join(checksums_name);
        write_file(&output, checksums.as_bytes())?;
        tracing::info!(output = %ctx.layout.display(&output), files = selected.len(), "Wrote checksums");
    }

    tracing::info!(release = %release.label, dir = %ctx.layout.display(&dir), files = selected.len(), "Released");
    Ok(())
}
