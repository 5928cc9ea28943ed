//! Pipeline stages
//!
//! Each stage turns part of the execution plan into independent units and
//! runs them on the worker pool. Units only read the shared context and
//! write paths no other unit writes.

mod archive;
mod build;
mod release;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::encode::EncodeError;
use crate::layout::DistLayout;
use crate::plan::ExecutionPlan;
use crate::plugin::{PluginError, PluginRegistry};
use crate::pool::{BatchReport, WorkerPool};

pub use build::{BuildError, Builder, CommandBuilder, ENV_ARCH, ENV_OS, ENV_OUTPUT};

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Build,
    Archive,
    Release,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Build, Stage::Archive, Stage::Release];

    /// Run this stage's units and wait for all of them
    pub fn run(self, ctx: &Arc<StageContext>, pool: &WorkerPool) -> BatchReport<UnitError> {
        match self {
            Stage::Build => build::run(ctx, pool),
            Stage::Archive => archive::run(ctx, pool),
            Stage::Release => release::run(ctx, pool),
        }
    }

    /// Number of units this stage has in the plan
    pub fn unit_count(self, plan: &ExecutionPlan) -> usize {
        match self {
            Stage::Build => plan.builds.len(),
            Stage::Archive => plan.archive_count(),
            Stage::Release => plan.releases.len(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Build => write!(f, "build"),
            Stage::Archive => write!(f, "archive"),
            Stage::Release => write!(f, "release"),
        }
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "build" => Ok(Stage::Build),
            "archive" => Ok(Stage::Archive),
            "release" => Ok(Stage::Release),
            _ => Err(format!("unknown stage {:?}", s)),
        }
    }
}

/// Why a single unit failed
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("build did not produce {0:?}")]
    MissingOutput(PathBuf),

    #[error("source binary {0:?} not found (has the build stage run?)")]
    MissingBinary(PathBuf),

    #[error("failed to write {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to read {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("encoding failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("plugin {id:?} is not running")]
    PluginNotStarted { id: String },

    #[error("plugin {id:?}: {source}")]
    Plugin { id: String, source: PluginError },

    #[error("release file name {name:?} is selected twice")]
    NameCollision { name: String },
}

/// Read-only state shared by every unit of a run
pub struct StageContext {
    pub plan: ExecutionPlan,
    pub layout: DistLayout,
    pub registry: Arc<PluginRegistry>,
    pub builder: Arc<dyn Builder>,
    /// Base for relative paths in the configuration
    pub project_dir: PathBuf,
    /// Plan and log only; no writes, builds or plugin calls
    pub trial: bool,
}

impl fmt::Debug for StageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageContext")
            .field("project", &self.plan.project)
            .field("tag", &self.plan.tag)
            .field("layout", &self.layout)
            .field("trial", &self.trial)
            .finish()
    }
}

/// Write a file through a temporary sibling so readers never see a
/// partial file
pub(crate) fn write_file(path: &Path, contents: &[u8]) -> Result<(), UnitError> {
    let write_err = |source: io::Error| UnitError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, contents).map_err(write_err)?;
    fs::rename(&tmp, path).map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stage_order_and_names() {
        let mut stages = vec![Stage::Release, Stage::Build, Stage::Archive];
        stages.sort();
        assert_eq!(stages, Stage::ALL.to_vec());
        for stage in Stage::ALL {
            assert_eq!(stage.to_string().parse::<Stage>().unwrap(), stage);
        }
        assert!("deploy".parse::<Stage>().is_err());
    }

    #[test]
    fn test_write_file_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c.txt");
        write_file(&path, b"hello").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"hello");
        assert!(!dir.path().join("a/b/c.txt.tmp").exists());
    }
}
