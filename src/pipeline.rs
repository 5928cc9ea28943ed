//! Pipeline orchestration
//!
//! Compiles the configuration, starts the referenced plugins and runs the
//! requested stages in order (build, archive, release) with a barrier
//! between them. A failed unit lets its siblings finish, then the stage
//! fails and later stages are skipped. Plugins are closed on every path.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::error::RunError;
use crate::layout::DistLayout;
use crate::plan::compile;
use crate::plugin::{PluginLauncher, PluginRegistry, ProcessLauncher};
use crate::pool::WorkerPool;
use crate::stage::{Builder, CommandBuilder, Stage, StageContext};
use crate::summary::{RunSummary, StageReport};

/// Default dist directory, relative to the project directory
pub const DEFAULT_DIST_DIR: &str = "dist";

/// What to run and where
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Base for the config's relative paths and the build command's cwd
    pub project_dir: PathBuf,
    /// Output root, relative paths resolve against `project_dir`
    pub dist: PathBuf,
    pub tag: String,
    /// Worker pool size, non-positive means one per CPU
    pub workers: i64,
    /// Log what would happen without doing it
    pub trial: bool,
    pub stages: Vec<Stage>,
}

impl RunOptions {
    pub fn new(project_dir: impl Into<PathBuf>, tag: impl Into<String>) -> Self {
        Self {
            project_dir: project_dir.into(),
            dist: PathBuf::from(DEFAULT_DIST_DIR),
            tag: tag.into(),
            workers: 0,
            trial: false,
            stages: Stage::ALL.to_vec(),
        }
    }

    fn dist_dir(&self) -> PathBuf {
        if self.dist.is_absolute() {
            self.dist.clone()
        } else {
            self.project_dir.join(&self.dist)
        }
    }
}

/// Runs one release
pub struct Orchestrator {
    options: RunOptions,
    builder: Arc<dyn Builder>,
    launcher: Box<dyn PluginLauncher>,
}

impl Orchestrator {
    /// Orchestrator running build commands and plugin processes for real
    pub fn new(options: RunOptions) -> Self {
        let builder = Arc::new(CommandBuilder::new(options.project_dir.clone()));
        let launcher = Box::new(ProcessLauncher::new(options.project_dir.clone()));
        Self {
            options,
            builder,
            launcher,
        }
    }

    pub fn with_builder(mut self, builder: Arc<dyn Builder>) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_launcher(mut self, launcher: Box<dyn PluginLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Execute the requested stages for a configuration
    pub fn run(self, config: &Config) -> Result<RunSummary, RunError> {
        let Orchestrator {
            options,
            builder,
            launcher,
        } = self;
        let started = Instant::now();
        let run_id = RunSummary::new_run_id();

        let plan = compile(config, &options.tag)?;
        let layout = DistLayout::new(options.dist_dir(), &plan.project, &plan.tag);

        let mut stages = options.stages.clone();
        stages.sort();
        stages.dedup();

        tracing::info!(
            run_id = %run_id,
            project = %plan.project,
            tag = %plan.tag,
            dist = %layout.display(layout.base()),
            trial = options.trial,
            "Starting run"
        );

        let pool = WorkerPool::new(options.workers)?;
        tracing::debug!(workers = pool.capacity(), "Created worker pool");

        // Dropping the registry on an early return closes what was started
        let mut registry = PluginRegistry::new(launcher);
        if stages.contains(&Stage::Archive) {
            for plugin in plan.plugins() {
                if options.trial {
                    tracing::info!(plugin = %plugin.id, command = %plugin.command, "Would start plugin");
                    continue;
                }
                registry.start(plugin)?;
            }
        }
        let registry = Arc::new(registry);

        let ctx = Arc::new(StageContext {
            plan,
            layout,
            registry: Arc::clone(&registry),
            builder,
            project_dir: options.project_dir.clone(),
            trial: options.trial,
        });

        let mut reports = Vec::new();
        let mut skipped = Vec::new();
        let mut failed = None;
        for stage in stages {
            if failed.is_some() {
                skipped.push(stage);
                continue;
            }

            let stage_started = Instant::now();
            tracing::info!(stage = %stage, units = stage.unit_count(&ctx.plan), "Starting stage");
            let batch = stage.run(&ctx, &pool);
            let report = StageReport::from_batch(stage, &batch, stage_started.elapsed().as_millis() as u64);

            for unit in report.failures() {
                tracing::error!(
                    stage = %stage,
                    unit = %unit.label,
                    error = unit.error.as_deref().unwrap_or(""),
                    "Unit failed"
                );
            }
            if report.is_success() {
                tracing::info!(stage = %stage, units = report.unit_count, duration_ms = report.duration_ms, "Finished stage");
            } else {
                tracing::error!(
                    stage = %stage,
                    failed = report.units_failed,
                    units = report.unit_count,
                    "Stage failed, skipping remaining stages"
                );
                failed = Some(stage);
            }
            reports.push(report);
        }

        if let Err(err) = registry.close() {
            tracing::warn!(error = %err, "Plugin teardown failed");
        }

        let summary = RunSummary::new(
            run_id,
            &ctx.plan.project,
            &ctx.plan.tag,
            options.trial,
            reports,
            skipped,
            started.elapsed().as_millis() as u64,
        );

        if !options.trial {
            let path = ctx.layout.run_summary();
            summary
                .write_to_file(&path)
                .map_err(|source| RunError::Io {
                    path: path.clone(),
                    source,
                })?;
            tracing::debug!(path = %ctx.layout.display(&path), "Wrote run summary");
        }

        match failed {
            Some(stage) => Err(RunError::StageFailed {
                stage,
                summary: Box::new(summary),
            }),
            None => {
                tracing::info!("{}", summary.human_summary);
                Ok(summary)
            }
        }
    }
}
