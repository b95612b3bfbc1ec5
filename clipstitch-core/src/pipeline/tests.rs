// End-to-end runs with mocked collaborators.

use super::*;
use crate::assembly::AssemblyStrategy;
use crate::config::{CoreConfigBuilder, RetryPolicy};
use crate::external::mocks::{MockFetcher, MockFfmpegSpawner, MockFfprobeExecutor};
use crate::segment::MaterializeStage;
use crate::temp_files::WORK_DIR_PREFIX;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::tempdir;

const ABC: &str = "https://youtu.be/abc123?t=10";
const DEF: &str = "https://www.youtube.com/watch?v=def456&t=1m";
const GHI: &str = "youtu.be/ghi789";
const JKL: &str = "https://m.youtube.com/embed/jkl012?start=5";

fn config(base: &Path) -> CoreConfig {
    CoreConfigBuilder::new()
        .output_file(base.join("out").join("final.mp4"))
        .temp_dir(base.join("scratch"))
        .use_transitions(false)
        .enable_overlay(false)
        .hardware_encoder(None)
        .retry(RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
            max_backoff: Duration::ZERO,
        })
        .build()
}

fn refs(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Working directories left under the scratch base.
fn leftover_work_dirs(base: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(base.join("scratch")) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(WORK_DIR_PREFIX))
            .map(|e| e.path())
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn font_dir(base: &Path) -> PathBuf {
    let fonts = base.join("fonts");
    std::fs::create_dir_all(&fonts).unwrap();
    std::fs::write(fonts.join("Label.ttf"), b"font").unwrap();
    fonts
}

#[test]
fn three_references_assemble_plainly() -> Result<(), Box<dyn std::error::Error>> {
    let base = tempdir()?;
    let spawner = MockFfmpegSpawner::succeeding();
    let orchestrator = Orchestrator::new(
        config(base.path()),
        spawner.clone(),
        MockFfprobeExecutor::new(),
        MockFetcher::new(),
    );

    let report = orchestrator.run(refs(&[ABC, DEF, GHI]))?;

    assert!(report.is_success());
    match &report.outcome {
        RunOutcome::Assembled {
            output,
            clip_count,
            strategy,
            ..
        } => {
            assert_eq!(*clip_count, 3);
            assert_eq!(*strategy, AssemblyStrategy::Plain);
            assert_eq!(output, &base.path().join("out").join("final.mp4"));
            assert!(output.exists());
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(report.failed.is_empty());
    let ids: Vec<&str> = report.succeeded.iter().map(|s| s.source_id.as_str()).collect();
    assert_eq!(ids, vec!["abc123", "def456", "ghi789"]);
    assert_eq!(spawner.calls_matching("concat_list.txt").len(), 1);
    assert!(leftover_work_dirs(base.path()).is_empty());
    Ok(())
}

#[test]
fn invalid_reference_is_skipped_and_order_kept() -> Result<(), Box<dyn std::error::Error>> {
    let base = tempdir()?;
    let orchestrator = Orchestrator::new(
        config(base.path()),
        MockFfmpegSpawner::succeeding(),
        MockFfprobeExecutor::new(),
        MockFetcher::new(),
    );

    let report = orchestrator.run(refs(&[ABC, "https://vimeo.com/12345", GHI]))?;

    assert!(report.is_success());
    assert_eq!(report.failed_indices(), vec![1]);
    assert_eq!(report.failed[0].stage, None);
    let order: Vec<(usize, usize)> = report.succeeded.iter().map(|s| (s.index, s.sequence)).collect();
    assert_eq!(order, vec![(0, 1), (2, 2)]);
    assert!(leftover_work_dirs(base.path()).is_empty());
    Ok(())
}

#[test]
fn blend_failure_falls_back_to_plain_and_succeeds() -> Result<(), Box<dyn std::error::Error>> {
    let base = tempdir()?;
    let spawner = MockFfmpegSpawner::succeeding();
    spawner.add_exit_error_expectation("-filter_complex", "Error reinitializing filters!", 1);
    let cfg = CoreConfig {
        use_transitions: true,
        ..config(base.path())
    };
    let orchestrator = Orchestrator::new(cfg, spawner, MockFfprobeExecutor::new(), MockFetcher::new());

    let events: Vec<RunEvent> = orchestrator
        .events(refs(&[ABC, DEF]))
        .collect::<CoreResult<_>>()?;

    assert!(
        events
            .iter()
            .any(|e| matches!(e, RunEvent::BlendFallback { reason } if reason.contains("reinitializing")))
    );
    let Some(RunEvent::RunFinished { report }) = events.last() else {
        panic!("last event should carry the report");
    };
    assert!(report.is_success());
    assert!(matches!(
        report.outcome,
        RunOutcome::Assembled {
            strategy: AssemblyStrategy::Plain,
            ..
        }
    ));
    assert!(report.blend_failure.is_some());
    Ok(())
}

#[test]
fn total_failure_reports_no_segments_and_cleans_up() -> Result<(), Box<dyn std::error::Error>> {
    let base = tempdir()?;
    let fetcher = MockFetcher::new();
    fetcher.fail_times("abc123", 2, "HTTP Error 403: Forbidden");
    fetcher.fail_times("def456", 2, "HTTP Error 403: Forbidden");
    let spawner = MockFfmpegSpawner::new();
    let orchestrator = Orchestrator::new(config(base.path()), spawner.clone(), MockFfprobeExecutor::new(), fetcher);

    let report = orchestrator.run(refs(&[ABC, DEF]))?;

    assert!(!report.is_success());
    assert_eq!(report.outcome, RunOutcome::NoSegments);
    assert_eq!(report.failed_indices(), vec![0, 1]);
    assert!(
        report
            .failed
            .iter()
            .all(|f| f.stage == Some(MaterializeStage::Fetching))
    );
    assert!(spawner.get_received_calls().is_empty());
    assert!(!base.path().join("out").join("final.mp4").exists());
    assert!(leftover_work_dirs(base.path()).is_empty());
    Ok(())
}

#[test]
fn encode_failure_skips_item_and_cleans_up() -> Result<(), Box<dyn std::error::Error>> {
    let base = tempdir()?;
    let spawner = MockFfmpegSpawner::succeeding();
    spawner.add_exit_error_expectation("clip_001_def456.mp4", "Conversion failed!", 1);
    let orchestrator = Orchestrator::new(
        config(base.path()),
        spawner,
        MockFfprobeExecutor::new(),
        MockFetcher::new(),
    );

    let report = orchestrator.run(refs(&[ABC, DEF, GHI]))?;

    assert!(report.is_success());
    assert_eq!(report.failed_indices(), vec![1]);
    assert_eq!(report.failed[0].stage, Some(MaterializeStage::Normalizing));
    assert!(report.failed[0].reason.contains("Conversion failed!"));
    assert!(leftover_work_dirs(base.path()).is_empty());
    Ok(())
}

#[test]
fn dropping_the_event_sequence_removes_the_work_dir() -> Result<(), Box<dyn std::error::Error>> {
    let base = tempdir()?;
    let orchestrator = Orchestrator::new(
        config(base.path()),
        MockFfmpegSpawner::succeeding(),
        MockFfprobeExecutor::new(),
        MockFetcher::new(),
    );

    let mut events = orchestrator.events(refs(&[ABC, DEF, GHI]));
    assert!(matches!(events.next(), Some(Ok(RunEvent::RunStarted { total_items: 3, .. }))));
    assert!(matches!(events.next(), Some(Ok(RunEvent::ItemStarted { index: 0, .. }))));
    assert_eq!(leftover_work_dirs(base.path()).len(), 1);

    drop(events);
    assert!(leftover_work_dirs(base.path()).is_empty());
    Ok(())
}

#[test]
fn events_are_lazy_and_bracketed() -> Result<(), Box<dyn std::error::Error>> {
    let base = tempdir()?;
    let fetcher = MockFetcher::new();
    let orchestrator = Orchestrator::new(
        config(base.path()),
        MockFfmpegSpawner::succeeding(),
        MockFfprobeExecutor::new(),
        fetcher.clone(),
    );

    let events = orchestrator.events(refs(&[ABC, DEF]));
    assert!(fetcher.requests().is_empty());
    assert!(leftover_work_dirs(base.path()).is_empty());

    let events: Vec<RunEvent> = events.collect::<CoreResult<_>>()?;
    assert!(matches!(events.first(), Some(RunEvent::RunStarted { .. })));
    assert!(matches!(events.last(), Some(RunEvent::RunFinished { .. })));
    let started: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::ItemStarted { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec![0, 1]);
    Ok(())
}

#[test]
fn fetch_retries_surface_as_events() -> Result<(), Box<dyn std::error::Error>> {
    let base = tempdir()?;
    let fetcher = MockFetcher::new();
    fetcher.fail_times("abc123", 1, "Read timed out");
    let orchestrator = Orchestrator::new(
        config(base.path()),
        MockFfmpegSpawner::succeeding(),
        MockFfprobeExecutor::new(),
        fetcher,
    );

    let events: Vec<RunEvent> = orchestrator.events(refs(&[ABC])).collect::<CoreResult<_>>()?;
    let retry = events
        .iter()
        .find(|e| matches!(e, RunEvent::FetchRetry { .. }))
        .expect("retry event");
    assert!(matches!(retry, RunEvent::FetchRetry { index: 0, attempt: 1, max_attempts: 2, .. }));
    Ok(())
}

#[test]
fn invalid_configuration_fails_before_any_work() {
    let base = tempdir().unwrap();
    let cfg = CoreConfig {
        clip_duration: Duration::ZERO,
        ..config(base.path())
    };
    let fetcher = MockFetcher::new();
    let orchestrator = Orchestrator::new(cfg, MockFfmpegSpawner::new(), MockFfprobeExecutor::new(), fetcher.clone());

    let mut events = orchestrator.events(refs(&[ABC]));
    assert!(matches!(events.next(), Some(Err(CoreError::Config(_)))));
    assert!(events.next().is_none());
    assert!(fetcher.requests().is_empty());
    assert!(orchestrator.run(refs(&[ABC])).is_err());
}

#[test]
fn labels_follow_output_positions() -> Result<(), Box<dyn std::error::Error>> {
    let base = tempdir()?;
    let spawner = MockFfmpegSpawner::succeeding();
    let cfg = CoreConfig {
        enable_overlay: true,
        fonts_dir: font_dir(base.path()),
        ..config(base.path())
    };
    let orchestrator = Orchestrator::new(cfg, spawner.clone(), MockFfprobeExecutor::new(), MockFetcher::new());

    let report = orchestrator.run(refs(&[ABC, "not a url at all", GHI]))?;

    assert!(report.succeeded.iter().all(|s| s.labeled));
    assert!(report.overlay_degradations.is_empty());
    let texts: Vec<bool> = ["text=1", "text=2", "text=3"]
        .iter()
        .map(|t| !spawner.calls_matching(t).is_empty())
        .collect();
    assert_eq!(texts, vec![true, true, false]);
    Ok(())
}

#[test]
fn missing_font_disables_labels_once() -> Result<(), Box<dyn std::error::Error>> {
    let base = tempdir()?;
    let spawner = MockFfmpegSpawner::succeeding();
    let cfg = CoreConfig {
        enable_overlay: true,
        fonts_dir: base.path().join("no-fonts-here"),
        ..config(base.path())
    };
    let orchestrator = Orchestrator::new(cfg, spawner.clone(), MockFfprobeExecutor::new(), MockFetcher::new());

    let report = orchestrator.run(refs(&[ABC, DEF]))?;

    assert!(report.is_success());
    assert_eq!(report.overlay_degradations.len(), 1);
    assert_eq!(report.overlay_degradations[0].index, None);
    assert!(report.succeeded.iter().all(|s| !s.labeled));
    assert!(spawner.calls_matching("drawtext").is_empty());
    Ok(())
}

#[test]
fn overlay_failure_keeps_the_plain_segment() -> Result<(), Box<dyn std::error::Error>> {
    let base = tempdir()?;
    let spawner = MockFfmpegSpawner::succeeding();
    spawner.add_exit_error_expectation("text=2", "Could not load font", 1);
    let cfg = CoreConfig {
        enable_overlay: true,
        fonts_dir: font_dir(base.path()),
        ..config(base.path())
    };
    let orchestrator = Orchestrator::new(cfg, spawner, MockFfprobeExecutor::new(), MockFetcher::new());

    let report = orchestrator.run(refs(&[ABC, DEF, GHI]))?;

    assert!(report.is_success());
    let labeled: Vec<bool> = report.succeeded.iter().map(|s| s.labeled).collect();
    assert_eq!(labeled, vec![true, false, true]);
    assert_eq!(report.overlay_degradations.len(), 1);
    assert_eq!(report.overlay_degradations[0].index, Some(1));
    Ok(())
}

#[test]
fn worker_pool_keeps_input_order() -> Result<(), Box<dyn std::error::Error>> {
    let base = tempdir()?;
    let spawner = MockFfmpegSpawner::succeeding();
    let cfg = CoreConfig {
        workers: 3,
        enable_overlay: true,
        fonts_dir: font_dir(base.path()),
        ..config(base.path())
    };
    let orchestrator = Orchestrator::new(cfg, spawner.clone(), MockFfprobeExecutor::new(), MockFetcher::new());

    let report = orchestrator.run(refs(&[ABC, "ftp://nowhere", DEF, GHI, JKL]))?;

    assert!(report.is_success());
    assert_eq!(report.failed_indices(), vec![1]);
    let order: Vec<(usize, usize)> = report.succeeded.iter().map(|s| (s.index, s.sequence)).collect();
    assert_eq!(order, vec![(0, 1), (2, 2), (3, 3), (4, 4)]);
    assert!(report.succeeded.iter().all(|s| s.labeled));
    assert!(!spawner.calls_matching("text=4").is_empty());
    assert!(spawner.calls_matching("text=5").is_empty());
    assert!(leftover_work_dirs(base.path()).is_empty());
    Ok(())
}

#[test]
fn empty_reference_list_produces_no_output() -> Result<(), Box<dyn std::error::Error>> {
    let base = tempdir()?;
    let orchestrator = Orchestrator::new(
        config(base.path()),
        MockFfmpegSpawner::new(),
        MockFfprobeExecutor::new(),
        MockFetcher::new(),
    );
    let report = orchestrator.run(Vec::new())?;
    assert_eq!(report.outcome, RunOutcome::NoSegments);
    assert_eq!(report.total_items, 0);
    assert!(leftover_work_dirs(base.path()).is_empty());
    Ok(())
}

#[test]
fn records_survive_a_poisoned_collector() {
    let collected = Mutex::new(Vec::new());
    let _ = std::panic::catch_unwind(|| {
        let _guard = collected.lock().unwrap();
        panic!("worker panicked while holding the lock");
    });
    assert!(collected.is_poisoned());

    push_record(
        &collected,
        ItemRecord {
            index: 2,
            events: Vec::new(),
            result: Err(FailedItem {
                index: 2,
                raw: GHI.to_string(),
                stage: None,
                reason: "unsupported host".into(),
            }),
            degradation: None,
        },
    );

    let records = collected.into_inner().unwrap_or_else(PoisonError::into_inner);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].index, 2);
}

#[test]
fn assembly_failure_reports_and_cleans_up() -> Result<(), Box<dyn std::error::Error>> {
    let base = tempdir()?;
    let spawner = MockFfmpegSpawner::succeeding();
    spawner.add_exit_error_expectation("-filter_complex", "Error reinitializing filters!", 1);
    spawner.add_exit_error_with_output_expectation("concat_list.txt", "Invalid data found", 1);
    let cfg = CoreConfig {
        use_transitions: true,
        ..config(base.path())
    };
    let orchestrator = Orchestrator::new(cfg, spawner, MockFfprobeExecutor::new(), MockFetcher::new());

    let report = orchestrator.run(refs(&[ABC, DEF]))?;

    assert!(!report.is_success());
    match &report.outcome {
        RunOutcome::AssemblyFailed { reason } => assert!(reason.contains("Invalid data found")),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(report.succeeded.len(), 2);
    assert!(report.blend_failure.is_some());
    assert!(!base.path().join("out").join("final.mp4").exists());
    assert!(leftover_work_dirs(base.path()).is_empty());
    Ok(())
}

fn nvenc_config(base: &Path) -> CoreConfig {
    CoreConfig {
        hardware_encoder: Some("h264_nvenc".to_string()),
        ..config(base)
    }
}

#[test]
fn hardware_failure_mid_run_reencodes_earlier_clips() -> Result<(), Box<dyn std::error::Error>> {
    let base = tempdir()?;
    let spawner = MockFfmpegSpawner::succeeding();
    // Only the accelerated attempt for the second clip fails; its software retry succeeds
    spawner.add_exit_error_expectation("clip_001_def456.mp4", "No NVENC capable devices found", 1);
    let orchestrator = Orchestrator::new(
        nvenc_config(base.path()),
        spawner.clone(),
        MockFfprobeExecutor::new(),
        MockFetcher::new(),
    );

    let events: Vec<RunEvent> = orchestrator
        .events(refs(&[ABC, DEF, GHI]))
        .collect::<CoreResult<_>>()?;

    let reencoded: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::SegmentReencoded { index, encoder, .. } => {
                assert_eq!(encoder, "libx264");
                Some(*index)
            }
            _ => None,
        })
        .collect();
    assert_eq!(reencoded, vec![0]);

    let redo = &spawner.calls_writing("clip_000_abc123_sw.mp4")[0];
    assert!(redo.contains(&"libx264".to_string()));
    assert!(!redo.contains(&"h264_nvenc".to_string()));

    let Some(RunEvent::RunFinished { report }) = events.last() else {
        panic!("last event should carry the report");
    };
    assert!(matches!(
        report.outcome,
        RunOutcome::Assembled {
            strategy: AssemblyStrategy::Plain,
            clip_count: 3,
            ..
        }
    ));
    assert!(report.succeeded[0].path.ends_with("clip_000_abc123_sw.mp4"));
    assert_eq!(spawner.calls_matching("concat_list.txt").len(), 1);
    assert!(leftover_work_dirs(base.path()).is_empty());
    Ok(())
}

#[test]
fn failed_reencode_drops_the_clip_and_renumbers() -> Result<(), Box<dyn std::error::Error>> {
    let base = tempdir()?;
    let spawner = MockFfmpegSpawner::succeeding();
    spawner.add_exit_error_expectation("clip_001_def456.mp4", "No NVENC capable devices found", 1);
    spawner.add_exit_error_expectation("clip_000_abc123_sw.mp4", "Conversion failed!", 1);
    let orchestrator = Orchestrator::new(
        nvenc_config(base.path()),
        spawner,
        MockFfprobeExecutor::new(),
        MockFetcher::new(),
    );

    let report = orchestrator.run(refs(&[ABC, DEF, GHI]))?;

    assert!(report.is_success());
    assert_eq!(report.failed_indices(), vec![0]);
    assert_eq!(report.failed[0].stage, Some(MaterializeStage::Normalizing));
    let order: Vec<(usize, usize)> = report.succeeded.iter().map(|s| (s.index, s.sequence)).collect();
    assert_eq!(order, vec![(1, 1), (2, 2)]);
    assert!(leftover_work_dirs(base.path()).is_empty());
    Ok(())
}

#[test]
fn uniform_hardware_run_is_not_reencoded() -> Result<(), Box<dyn std::error::Error>> {
    let base = tempdir()?;
    let spawner = MockFfmpegSpawner::succeeding();
    let orchestrator = Orchestrator::new(
        nvenc_config(base.path()),
        spawner.clone(),
        MockFfprobeExecutor::new(),
        MockFetcher::new(),
    );

    let report = orchestrator.run(refs(&[ABC, DEF]))?;

    assert!(report.is_success());
    assert!(spawner.calls_writing("_sw.mp4").is_empty());
    Ok(())
}
