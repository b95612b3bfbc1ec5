//! Event handler turning run events into log lines.

use super::{EventHandler, RunEvent};
use crate::pipeline::RunOutcome;
use crate::utils::format_bytes;
use log::{debug, error, info, warn};

/// Logs every event through the `log` facade.
#[derive(Debug, Default)]
pub struct LogEventHandler;

impl LogEventHandler {
    pub fn new() -> Self {
        Self
    }
}

impl EventHandler for LogEventHandler {
    fn handle(&self, event: &RunEvent) {
        match event {
            RunEvent::RunStarted {
                total_items,
                workers,
                transitions,
                overlay,
                work_dir,
            } => {
                info!("Starting run over {} reference(s)", total_items);
                info!(
                    "Workers: {}, transitions: {}, overlay: {}",
                    workers, transitions, overlay
                );
                debug!("Working directory: {}", work_dir.display());
            }

            RunEvent::ItemStarted {
                index,
                total_items,
                raw,
            } => {
                info!("[{}/{}] {}", index + 1, total_items, raw);
            }

            RunEvent::FetchRetry {
                index,
                source_id,
                attempt,
                max_attempts,
                delay_secs,
                reason,
            } => {
                warn!(
                    "[{}] fetch of {} failed (attempt {}/{}), retrying in {:.1}s: {}",
                    index + 1,
                    source_id,
                    attempt,
                    max_attempts,
                    delay_secs,
                    reason
                );
            }

            RunEvent::ItemSucceeded {
                index,
                sequence,
                source_id,
                labeled,
                ..
            } => {
                info!(
                    "[{}] {} ready as clip {}{}",
                    index + 1,
                    source_id,
                    sequence,
                    if *labeled { " (labeled)" } else { "" }
                );
            }

            RunEvent::ItemFailed {
                index, raw, reason, ..
            } => {
                error!("[{}] skipped {}: {}", index + 1, raw, reason);
            }

            RunEvent::SegmentReencoded {
                index,
                sequence,
                encoder,
            } => {
                warn!("[{}] clip {} re-encoded with {}", index + 1, sequence, encoder);
            }

            RunEvent::OverlaySkipped { index, reason } => match index {
                Some(i) => warn!("[{}] clip label skipped: {}", i + 1, reason),
                None => warn!("Clip labels disabled for this run: {}", reason),
            },

            RunEvent::AssemblyStarted { clip_count, blended } => {
                info!(
                    "Assembling {} clip(s){}",
                    clip_count,
                    if *blended { " with transitions" } else { "" }
                );
            }

            RunEvent::BlendFallback { reason } => {
                warn!("Transitions failed, used plain concatenation: {}", reason);
            }

            RunEvent::AssemblyFinished {
                output,
                strategy,
                size_bytes,
            } => {
                info!(
                    "Wrote {} ({}, {})",
                    output.display(),
                    format_bytes(*size_bytes),
                    strategy
                );
            }

            RunEvent::AssemblyFailed { reason } => {
                error!("Assembly failed: {}", reason);
            }

            RunEvent::CleanupWarning { message } => {
                warn!("Cleanup: {}", message);
            }

            RunEvent::RunFinished { report } => {
                info!(
                    "Run finished in {:.1}s: {} succeeded, {} failed",
                    report.elapsed.as_secs_f64(),
                    report.succeeded.len(),
                    report.failed.len()
                );
                if let RunOutcome::NoSegments = report.outcome {
                    error!("No clips could be produced; nothing was written");
                }
            }
        }
    }
}
