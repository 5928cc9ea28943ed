//! relforge - parallel build, archive and release orchestration
//!
//! Reads `relforge.toml`, compiles it into an execution plan for one
//! release tag and runs the build, archive and release stages on a bounded
//! worker pool. Archive formats relforge does not build itself are
//! delegated to plugin processes speaking the `relforge-plugin` protocol.

pub mod config;
pub mod encode;
pub mod error;
pub mod layout;
pub mod logging;
pub mod matcher;
pub mod pipeline;
pub mod plan;
pub mod plugin;
pub mod pool;
pub mod stage;
pub mod summary;
pub mod template;

pub use config::{load_file, Config, LoadError};
pub use error::{ExitCode, RunError};
pub use layout::DistLayout;
pub use pipeline::{Orchestrator, RunOptions};
pub use plan::{compile, ExecutionPlan, PlanError};
pub use stage::Stage;
pub use summary::RunSummary;
