//! Per-stage and per-unit reports

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::pool::BatchReport;
use crate::stage::Stage;

/// Unit or stage status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failed,
}

/// Outcome of one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitReport {
    pub label: String,
    pub status: Status,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub duration_ms: u64,
}

/// Outcome of one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub status: Status,
    pub unit_count: usize,
    pub units_succeeded: usize,
    pub units_failed: usize,
    /// Wall-clock stage duration in milliseconds
    pub duration_ms: u64,
    pub units: Vec<UnitReport>,
}

impl StageReport {
    /// Build a report from the pool's batch outcomes
    pub fn from_batch<E: fmt::Display>(stage: Stage, report: &BatchReport<E>, duration_ms: u64) -> Self {
        let units: Vec<UnitReport> = report
            .outcomes
            .iter()
            .map(|outcome| UnitReport {
                label: outcome.label.clone(),
                status: if outcome.is_success() {
                    Status::Success
                } else {
                    Status::Failed
                },
                error: outcome.result.as_ref().err().map(|e| e.to_string()),
                duration_ms: outcome.duration.as_millis() as u64,
            })
            .collect();

        let units_failed = units.iter().filter(|u| u.status == Status::Failed).count();
        Self {
            stage,
            status: if units_failed == 0 {
                Status::Success
            } else {
                Status::Failed
            },
            unit_count: units.len(),
            units_succeeded: units.len() - units_failed,
            units_failed,
            duration_ms,
            units,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Failed units in submission order
    pub fn failures(&self) -> impl Iterator<Item = &UnitReport> {
        self.units.iter().filter(|u| u.status == Status::Failed)
    }
}
