//! Run-level errors and exit codes

use std::io;
use std::path::PathBuf;

use crate::config::LoadError;
use crate::plan::PlanError;
use crate::plugin::PluginStartError;
use crate::pool::PoolError;
use crate::stage::Stage;
use crate::summary::RunSummary;

/// Stable process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    /// I/O outside of a unit, e.g. writing the run summary
    Io = 1,
    /// Config file missing or undecodable
    Config = 2,
    /// Config decoded but structurally invalid
    Plan = 3,
    /// Worker pool could not be created
    Pool = 4,
    /// A plugin failed to start or answer its heartbeat
    PluginStart = 5,
    BuildFailed = 10,
    ArchiveFailed = 11,
    ReleaseFailed = 12,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::Build => ExitCode::BuildFailed,
            Stage::Archive => ExitCode::ArchiveFailed,
            Stage::Release => ExitCode::ReleaseFailed,
        }
    }
}

/// Errors that end a run
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] LoadError),

    #[error("invalid configuration: {0}")]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    PluginStart(#[from] PluginStartError),

    #[error("{stage} stage failed: {}", .summary.human_summary)]
    StageFailed {
        stage: Stage,
        summary: Box<RunSummary>,
    },

    #[error("failed to write {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

impl RunError {
    pub fn exit_code(&self) -> i32 {
        let code = match self {
            RunError::Config(_) => ExitCode::Config,
            RunError::Plan(_) => ExitCode::Plan,
            RunError::Pool(_) => ExitCode::Pool,
            RunError::PluginStart(_) => ExitCode::PluginStart,
            RunError::StageFailed { stage, .. } => ExitCode::for_stage(*stage),
            RunError::Io { .. } => ExitCode::Io,
        };
        code.as_i32()
    }

    /// Summary of the run, when stages were executed
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            RunError::StageFailed { summary, .. } => Some(summary),
            _ => None,
        }
    }
}
