//! Build stage
//!
//! One unit per target of the matrix. The actual compilation is delegated
//! to a [`Builder`]; the default runs the configured command.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use super::{StageContext, UnitError};
use crate::plan::BuildTarget;
use crate::pool::{BatchReport, WorkerPool};

/// Target operating system passed to the build command
pub const ENV_OS: &str = "RELFORGE_OS";
/// Target architecture passed to the build command
pub const ENV_ARCH: &str = "RELFORGE_ARCH";
/// Absolute path the build command must write the binary to
pub const ENV_OUTPUT: &str = "RELFORGE_OUTPUT";

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("target {target} has no build command")]
    NoCommand { target: String },

    #[error("failed to run {command:?}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("build command for {target} exited with {status}: {stderr}")]
    Failed {
        target: String,
        status: String,
        stderr: String,
    },
}

/// Produces the binary of one build target
pub trait Builder: Send + Sync {
    fn build(&self, target: &BuildTarget, output: &Path) -> Result<(), BuildError>;
}

/// Runs the configured build command in the project directory
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    project_dir: PathBuf,
}

impl CommandBuilder {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
        }
    }
}

impl Builder for CommandBuilder {
    fn build(&self, target: &BuildTarget, output: &Path) -> Result<(), BuildError> {
        let (program, args) = target.command.split_first().ok_or_else(|| BuildError::NoCommand {
            target: target.arch.path(),
        })?;

        let result = Command::new(program)
            .args(args)
            .envs(&target.env)
            .env(ENV_OS, &target.arch.os)
            .env(ENV_ARCH, &target.arch.arch)
            .env(ENV_OUTPUT, output)
            .current_dir(&self.project_dir)
            .output()
            .map_err(|source| BuildError::Spawn {
                command: program.clone(),
                source,
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(BuildError::Failed {
                target: target.arch.path(),
                status: result.status.to_string(),
                stderr: last_line(&stderr).to_string(),
            });
        }
        Ok(())
    }
}

fn last_line(output: &str) -> &str {
    output.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("").trim()
}

pub(super) fn run(ctx: &Arc<StageContext>, pool: &WorkerPool) -> BatchReport<UnitError> {
    let mut batch = pool.batch();
    for (index, target) in ctx.plan.builds.iter().enumerate() {
        let ctx = Arc::clone(ctx);
        batch.submit(target.arch.path(), move || build_unit(&ctx, index));
    }
    batch.wait()
}

fn build_unit(ctx: &StageContext, index: usize) -> Result<(), UnitError> {
    let target = &ctx.plan.builds[index];
    let output = ctx.layout.build_output(target);

    if ctx.trial {
        tracing::info!(unit = %target.arch.path(), output = %ctx.layout.display(&output), "Would build");
        return Ok(());
    }

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).map_err(|source| UnitError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    tracing::debug!(unit = %target.arch.path(), output = %ctx.layout.display(&output), "Building");
    ctx.builder.build(target, &output)?;

    if !output.is_file() {
        return Err(UnitError::MissingOutput(output));
    }
    tracing::info!(unit = %target.arch.path(), output = %ctx.layout.display(&output), "Built");
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::plan::BuildArch;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn target(command: &[&str]) -> BuildTarget {
        BuildTarget {
            arch: BuildArch::new("unix", "linux", "amd64"),
            binary: "hugo".to_string(),
            command: command.iter().map(|s| s.to_string()).collect(),
            env: BTreeMap::from([("GREETING".to_string(), "hi".to_string())]),
        }
    }

    #[test]
    fn test_command_builder_sets_env() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("hugo");
        let builder = CommandBuilder::new(dir.path());
        let script = r#"printf '%s-%s-%s' "$GREETING" "$RELFORGE_OS" "$RELFORGE_ARCH" > "$RELFORGE_OUTPUT""#;

        builder.build(&target(&["sh", "-c", script]), &output).unwrap();
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "hi-linux-amd64");
    }

    #[test]
    fn test_command_builder_failure() {
        let dir = TempDir::new().unwrap();
        let builder = CommandBuilder::new(dir.path());
        let err = builder
            .build(&target(&["sh", "-c", "echo 'compile error' >&2; exit 2"]), &dir.path().join("x"))
            .unwrap_err();
        match err {
            BuildError::Failed { stderr, .. } => assert_eq!(stderr, "compile error"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_missing_command() {
        let builder = CommandBuilder::new(".");
        assert!(matches!(
            builder.build(&target(&[]), Path::new("x")),
            Err(BuildError::NoCommand { .. })
        ));
        assert!(matches!(
            builder.build(&target(&["/no/such/compiler"]), Path::new("x")),
            Err(BuildError::Spawn { .. })
        ));
    }

    #[test]
    fn test_last_line() {
        assert_eq!(last_line("a\nb\n\n"), "b");
        assert_eq!(last_line(""), "");
    }
}
