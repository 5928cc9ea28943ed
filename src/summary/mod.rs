//! Run and stage summaries
//!
//! Written as run_summary.json after every non-trial run.

mod run_summary;
mod stage_summary;

pub use run_summary::{RunSummary, RUN_SUMMARY_SCHEMA_ID, RUN_SUMMARY_SCHEMA_VERSION};
pub use stage_summary::{StageReport, Status, UnitReport};
