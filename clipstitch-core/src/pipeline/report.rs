//! Summary of one pipeline run.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::assembly::AssemblyStrategy;
use crate::segment::MaterializeStage;

/// An item that produced a segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SucceededItem {
    pub index: usize,
    /// 1-based position in the output
    pub sequence: usize,
    pub source_id: String,
    /// Segment path at assembly time; gone once the run cleaned up
    pub path: PathBuf,
    pub labeled: bool,
}

/// An item that was skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedItem {
    pub index: usize,
    pub raw: String,
    /// `None` for references that could not be resolved
    pub stage: Option<MaterializeStage>,
    pub reason: String,
}

/// A label that could not be burned in. `index` is `None` for the whole run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayDegradation {
    pub index: Option<usize>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Assembled {
        output: PathBuf,
        size_bytes: u64,
        clip_count: usize,
        strategy: AssemblyStrategy,
    },
    NoSegments,
    AssemblyFailed {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Local start time, RFC 3339
    pub started_at: String,
    pub total_items: usize,
    pub succeeded: Vec<SucceededItem>,
    pub failed: Vec<FailedItem>,
    pub overlay_degradations: Vec<OverlayDegradation>,
    /// Why blending was abandoned, when the output was concatenated plainly instead
    pub blend_failure: Option<String>,
    pub cleanup_warnings: Vec<String>,
    pub outcome: RunOutcome,
    pub elapsed: Duration,
}

impl RunReport {
    /// Whether an output file was produced.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Assembled { .. })
    }

    /// Input indices of the failed items, in order.
    pub fn failed_indices(&self) -> Vec<usize> {
        self.failed.iter().map(|f| f.index).collect()
    }

    /// Approximate output duration from the requested clip duration.
    pub fn approximate_duration(&self, clip_duration: Duration) -> Option<Duration> {
        match &self.outcome {
            RunOutcome::Assembled { clip_count, .. } => u32::try_from(*clip_count)
                .ok()
                .and_then(|n| clip_duration.checked_mul(n)),
            _ => None,
        }
    }
}
