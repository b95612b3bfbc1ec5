//! Implementation of the 'stitch' subcommand.
//!
//! This module maps the command-line arguments onto the core configuration,
//! runs the one-time environment check, drives the lazy event stream of a run
//! and renders it either as styled terminal output or as JSON lines.

use crate::cli::StitchArgs;
use crate::error::{CliErrorContext, CliResult};
use crate::terminal::{self, ClipProgress};

use clipstitch_core::config::OffsetPolicy;
use clipstitch_core::{
    CoreConfig, CoreConfigBuilder, EventHandler, JsonEventHandler, RunEvent, RunOutcome, RunReport,
    format_bytes, format_duration,
};

use log::debug;

/// Creates and validates the core configuration from CLI arguments.
pub fn build_config(args: &StitchArgs) -> CliResult<CoreConfig> {
    let offset_policy = if args.require_timestamp {
        OffsetPolicy::Require
    } else {
        OffsetPolicy::DefaultZero
    };

    let mut builder = CoreConfigBuilder::new()
        .output_file(args.output_file.clone())
        .clip_duration(args.clip_duration)
        .use_transitions(!args.no_transitions)
        .transition_duration(args.transition)
        .enable_overlay(!args.no_overlay)
        .fonts_dir(args.fonts_dir.clone())
        .workers(args.workers)
        .max_attempts(args.retries.saturating_add(1))
        .fetch_timeout(args.fetch_timeout)
        .windowed_fetch(args.windowed_fetch)
        .offset_policy(offset_policy);

    if args.software_only {
        builder = builder.hardware_encoder(None);
    }
    if let Some(dir) = &args.temp_dir {
        builder = builder.temp_dir(dir.clone());
    }

    builder.build_validated()
}

// ============================================================================
// TERMINAL RENDERING
// ============================================================================

/// Renders run events as styled terminal lines plus a clip progress bar.
pub struct TerminalRenderer {
    progress: ClipProgress,
}

impl TerminalRenderer {
    pub fn new(total_items: usize) -> Self {
        Self {
            progress: ClipProgress::new(total_items),
        }
    }

    /// Renderer whose progress bar never draws.
    pub fn without_progress() -> Self {
        Self {
            progress: ClipProgress::hidden(),
        }
    }
}

impl EventHandler for TerminalRenderer {
    fn handle(&self, event: &RunEvent) {
        match event {
            RunEvent::RunStarted {
                total_items,
                workers,
                transitions,
                overlay,
                ..
            } => {
                self.progress.suspend(|| {
                    terminal::print_section("Clips");
                    terminal::print_status("References", &total_items.to_string(), false);
                    terminal::print_status("Workers", &workers.to_string(), false);
                    terminal::print_status("Transitions", on_off(*transitions), false);
                    terminal::print_status("Labels", on_off(*overlay), false);
                    terminal::print_empty_line();
                });
            }

            RunEvent::ItemStarted { raw, .. } => {
                self.progress.set_message(raw.clone());
            }

            RunEvent::FetchRetry {
                index,
                attempt,
                max_attempts,
                delay_secs,
                reason,
                ..
            } => {
                self.progress.suspend(|| {
                    terminal::print_warning(&format!(
                        "Reference {}: download attempt {}/{} failed, retrying in {:.1}s",
                        index + 1,
                        attempt,
                        max_attempts,
                        delay_secs
                    ));
                    terminal::print_sub_item(reason);
                });
            }

            RunEvent::ItemSucceeded {
                sequence,
                source_id,
                labeled,
                ..
            } => {
                let label = if *labeled { ", labeled" } else { "" };
                self.progress.suspend(|| {
                    terminal::print_success(&format!("Clip {sequence} ready ({source_id}{label})"));
                });
                self.progress.clip_done();
            }

            RunEvent::ItemFailed {
                index,
                raw,
                stage,
                reason,
            } => {
                let stage = stage.map_or_else(|| "resolve".to_string(), |s| s.to_string());
                self.progress.suspend(|| {
                    terminal::print_warning(&format!(
                        "Skipped reference {} ({} failed): {}",
                        index + 1,
                        stage,
                        raw
                    ));
                    terminal::print_sub_item(reason);
                });
                self.progress.clip_done();
            }

            RunEvent::SegmentReencoded {
                index,
                sequence,
                encoder,
            } => {
                self.progress.suspend(|| {
                    terminal::print_warning(&format!(
                        "Reference {} re-encoded with {} to match the other clips (clip {})",
                        index + 1,
                        encoder,
                        sequence
                    ));
                });
            }

            RunEvent::OverlaySkipped { index, reason } => {
                let message = match index {
                    Some(i) => format!("Reference {} kept without its label: {}", i + 1, reason),
                    None => format!("Clip labels disabled: {reason}"),
                };
                self.progress.suspend(|| terminal::print_warning(&message));
            }

            RunEvent::AssemblyStarted {
                clip_count,
                blended,
            } => {
                self.progress.finish();
                terminal::print_section("Assembly");
                let how = if *blended {
                    "with cross-fades"
                } else {
                    "back to back"
                };
                terminal::print_processing(&format!("Joining {clip_count} clip(s) {how}"));
            }

            RunEvent::BlendFallback { reason } => {
                terminal::print_warning("Cross-fades failed, joining clips without transitions");
                terminal::print_sub_item(reason);
            }

            RunEvent::AssemblyFinished {
                output, strategy, ..
            } => {
                terminal::print_success(&format!("Wrote {} ({})", output.display(), strategy));
            }

            RunEvent::AssemblyFailed { reason } => {
                terminal::print_error("Assembly failed", reason, None);
            }

            RunEvent::CleanupWarning { message } => {
                self.progress.suspend(|| terminal::print_warning(message));
            }

            RunEvent::RunFinished { .. } => {
                self.progress.finish();
            }
        }
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

// ============================================================================
// SUMMARY
// ============================================================================

/// Prints the end-of-run summary.
pub fn print_summary(report: &RunReport, clip_duration: std::time::Duration) {
    terminal::print_section("Summary");

    match &report.outcome {
        RunOutcome::Assembled {
            output,
            size_bytes,
            clip_count,
            ..
        } => {
            terminal::print_status("Output", &output.display().to_string(), true);
            terminal::print_status("Size", &format_bytes(*size_bytes), false);
            terminal::print_status(
                "Clips",
                &format!("{} of {}", clip_count, report.total_items),
                false,
            );
            if let Some(duration) = report.approximate_duration(clip_duration) {
                terminal::print_status(
                    "Duration",
                    &format!("~{}", format_duration(duration.as_secs_f64())),
                    false,
                );
            }
        }
        RunOutcome::NoSegments => {
            terminal::print_error(
                "No clips produced",
                "Every reference was invalid or failed to download, cut or encode",
                Some("Run `clipstitch inspect -i <LIST_FILE>` to check the references"),
            );
        }
        RunOutcome::AssemblyFailed { reason } => {
            terminal::print_error(
                "No output produced",
                reason,
                Some("Re-run with --verbose and check the run log for the ffmpeg error"),
            );
        }
    }

    if !report.failed.is_empty() {
        let skipped: Vec<String> = report
            .failed_indices()
            .iter()
            .map(|i| (i + 1).to_string())
            .collect();
        terminal::print_status("Skipped", &skipped.join(", "), false);
    }
    if let Some(reason) = &report.blend_failure {
        terminal::print_status("Transitions", "dropped after blend failure", false);
        debug!("Blend failure: {reason}");
    }
    terminal::print_status(
        "Total time",
        &format_duration(report.elapsed.as_secs_f64()),
        true,
    );
}

// ============================================================================
// ENTRY POINT
// ============================================================================

/// Runs a stitch and returns its report.
///
/// Errors only for problems before the run could start (bad list, bad
/// configuration, missing tools). A run that produced nothing still returns
/// its report; callers decide the exit status from [`RunReport::is_success`].
pub fn run_stitch(args: StitchArgs) -> CliResult<RunReport> {
    let references = clipstitch_core::read_reference_list(&args.input_list).cli_with_context(|| {
        format!("Failed to read reference list '{}'", args.input_list.display())
    })?;
    let config = build_config(&args)?;

    let preflight = clipstitch_core::preflight(&config)?;
    debug!("Tools found: {}", preflight.tools.join(", "));

    if !args.json {
        terminal::print_section("Initialization");
        terminal::print_status("Input list", &args.input_list.display().to_string(), false);
        terminal::print_status("Output file", &config.output_file.display().to_string(), false);
        terminal::print_status(
            "Clip length",
            &format!("{:.1}s", config.clip_duration.as_secs_f64()),
            false,
        );
        terminal::print_status("Encoder", &preflight.encoder, false);
    }

    let clip_duration = config.clip_duration;
    let orchestrator = clipstitch_core::default_orchestrator(config);

    let handler: Box<dyn EventHandler> = if args.json {
        Box::new(JsonEventHandler::new())
    } else {
        Box::new(TerminalRenderer::new(references.len()))
    };

    let mut report = None;
    for event in orchestrator.events(references) {
        let event = event?;
        handler.handle(&event);
        if let RunEvent::RunFinished { report: finished } = event {
            report = Some(finished);
        }
    }
    let report = report.cli_context("Run ended without a report")?;

    if !args.json {
        print_summary(&report, clip_duration);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use clipstitch_core::{AssemblyStrategy, FailedItem, MaterializeStage};
    use std::path::PathBuf;
    use std::time::Duration;

    fn stitch_args(extra: &[&str]) -> StitchArgs {
        let mut argv = vec!["clipstitch", "stitch", "-i", "clips.txt"];
        argv.extend_from_slice(extra);
        match crate::cli::Cli::parse_from(argv).command {
            crate::cli::Commands::Stitch(args) => args,
            other => panic!("expected stitch, got {other:?}"),
        }
    }

    #[test]
    fn defaults_map_onto_core_defaults() {
        let config = build_config(&stitch_args(&[])).unwrap();
        let defaults = CoreConfig::default();
        assert_eq!(config.output_file, defaults.output_file);
        assert_eq!(config.clip_duration, defaults.clip_duration);
        assert_eq!(config.transition_duration, defaults.transition_duration);
        assert!(config.use_transitions);
        assert!(config.enable_overlay);
        assert_eq!(config.retry.max_attempts, defaults.retry.max_attempts);
        assert_eq!(config.offset_policy, OffsetPolicy::DefaultZero);
        assert_eq!(config.workers, 1);
    }

    #[test]
    fn flags_map_onto_config() {
        let args = stitch_args(&[
            "-o",
            "out/highlights.mp4",
            "--clip-duration",
            "12.5",
            "--no-transitions",
            "--no-overlay",
            "--workers",
            "3",
            "--retries",
            "0",
            "--fetch-timeout",
            "90",
            "--windowed-fetch",
            "--require-timestamp",
            "--software-only",
            "--temp-dir",
            "/tmp/scratch",
        ]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.output_file, PathBuf::from("out/highlights.mp4"));
        assert_eq!(config.clip_duration, Duration::from_millis(12_500));
        assert!(!config.use_transitions);
        assert!(!config.enable_overlay);
        assert_eq!(config.workers, 3);
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.fetch_timeout, Some(Duration::from_secs(90)));
        assert!(config.windowed_fetch);
        assert_eq!(config.offset_policy, OffsetPolicy::Require);
        assert_eq!(config.hardware_encoder, None);
        assert_eq!(config.temp_dir, Some(PathBuf::from("/tmp/scratch")));
    }

    #[test]
    fn transition_longer_than_clip_is_rejected() {
        let args = stitch_args(&["--clip-duration", "1", "--transition", "2"]);
        assert!(build_config(&args).is_err());

        let args = stitch_args(&["--clip-duration", "1", "--transition", "2", "--no-transitions"]);
        assert!(build_config(&args).is_ok());
    }

    #[test]
    fn renderer_counts_finished_items() {
        let renderer = TerminalRenderer::without_progress();
        renderer.handle(&RunEvent::ItemSucceeded {
            index: 0,
            sequence: 1,
            source_id: "abc123".into(),
            path: PathBuf::from("clip_001_abc123.mp4"),
            labeled: true,
        });
        renderer.handle(&RunEvent::ItemFailed {
            index: 1,
            raw: "not a link".into(),
            stage: None,
            reason: "unsupported host".into(),
        });
        renderer.handle(&RunEvent::ItemFailed {
            index: 2,
            raw: "https://youtu.be/def456".into(),
            stage: Some(MaterializeStage::Fetching),
            reason: "HTTP Error 403".into(),
        });
        renderer.handle(&RunEvent::SegmentReencoded {
            index: 0,
            sequence: 1,
            encoder: "libx264".into(),
        });
        assert_eq!(renderer.progress.position(), 3);
    }

    #[test]
    fn summary_handles_every_outcome() {
        let mut report = RunReport {
            started_at: "2026-10-19T12:00:00+00:00".into(),
            total_items: 2,
            succeeded: Vec::new(),
            failed: vec![FailedItem {
                index: 1,
                raw: "bad".into(),
                stage: None,
                reason: "unsupported host".into(),
            }],
            overlay_degradations: Vec::new(),
            blend_failure: Some("filter graph rejected".into()),
            cleanup_warnings: Vec::new(),
            outcome: RunOutcome::Assembled {
                output: PathBuf::from("final_output.mp4"),
                size_bytes: 2048,
                clip_count: 1,
                strategy: AssemblyStrategy::Plain,
            },
            elapsed: Duration::from_secs(42),
        };
        print_summary(&report, Duration::from_secs(30));

        report.outcome = RunOutcome::NoSegments;
        print_summary(&report, Duration::from_secs(30));

        report.outcome = RunOutcome::AssemblyFailed {
            reason: "concat failed".into(),
        };
        print_summary(&report, Duration::from_secs(30));
    }
}
