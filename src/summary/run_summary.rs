//! Run summary (run_summary.json)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

use super::stage_summary::{StageReport, Status};
use crate::stage::Stage;

/// Schema version for run_summary.json
pub const RUN_SUMMARY_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for run_summary.json
pub const RUN_SUMMARY_SCHEMA_ID: &str = "relforge/run_summary@1";

/// Run summary (run_summary.json)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// Run identifier
    pub run_id: String,

    /// When the summary was created
    pub created_at: DateTime<Utc>,

    pub project: String,

    pub tag: String,

    /// Trial run: nothing was written or executed
    pub trial: bool,

    /// Aggregated status
    pub status: Status,

    /// Stages that ran, in order
    pub stages: Vec<StageReport>,

    /// Requested stages that never started because an earlier one failed
    pub stages_skipped: Vec<Stage>,

    /// Wall-clock duration of the entire run in milliseconds
    pub duration_ms: u64,

    /// Human-readable summary
    pub human_summary: String,
}

impl RunSummary {
    /// Aggregate stage reports into a run summary
    pub fn new(
        run_id: String,
        project: &str,
        tag: &str,
        trial: bool,
        stages: Vec<StageReport>,
        stages_skipped: Vec<Stage>,
        duration_ms: u64,
    ) -> Self {
        let status = if stages.iter().all(StageReport::is_success) {
            Status::Success
        } else {
            Status::Failed
        };
        let human_summary = Self::generate_human_summary(status, &stages, trial);

        Self {
            schema_version: RUN_SUMMARY_SCHEMA_VERSION,
            schema_id: RUN_SUMMARY_SCHEMA_ID.to_string(),
            run_id,
            created_at: Utc::now(),
            project: project.to_string(),
            tag: tag.to_string(),
            trial,
            status,
            stages,
            stages_skipped,
            duration_ms,
            human_summary,
        }
    }

    /// New random run identifier
    pub fn new_run_id() -> String {
        format!("run-{}", uuid::Uuid::new_v4().simple())
    }

    fn generate_human_summary(status: Status, stages: &[StageReport], trial: bool) -> String {
        let units: usize = stages.iter().map(|s| s.unit_count).sum();
        let prefix = if trial { "Trial run" } else { "Run" };

        match status {
            Status::Success => {
                let names: Vec<String> = stages.iter().map(|s| s.stage.to_string()).collect();
                if names.is_empty() {
                    format!("{} succeeded: no stages executed", prefix)
                } else {
                    format!("{} succeeded: {} ({} units)", prefix, names.join(", "), units)
                }
            }
            Status::Failed => {
                let failed = stages.iter().find(|s| !s.is_success());
                match failed {
                    Some(stage) => format!(
                        "{} failed in {} stage: {} of {} units succeeded, {} failed",
                        prefix, stage.stage, stage.units_succeeded, stage.unit_count, stage.units_failed
                    ),
                    None => format!("{} failed", prefix),
                }
            }
        }
    }

    /// The stage that failed, if any
    pub fn failed_stage(&self) -> Option<&StageReport> {
        self.stages.iter().find(|s| !s.is_success())
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Write to file
    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let json = self.to_json().map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {}", e))
        })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json)
    }

    /// Load from file
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {}", e)))
    }
}
