// ============================================================================
// clipstitch-core/src/pipeline/mod.rs
// ============================================================================
//
// PIPELINE ORCHESTRATOR: References -> Final Video
//
// Drives one run end to end:
//
// 1. Validate the configuration and create the private working directory
// 2. Resolve and materialize every reference in input order, sequentially
//    or on a bounded worker pool, recording per-item failures
// 3. Burn clip labels in when overlay is enabled
// 4. Hand the successes to the assembly engine exactly once
// 5. Remove the working directory and report
//
// The run is exposed as a lazy, finite sequence of `RunEvent`s. Each call to
// `next` performs at most one item's worth of work, so a consumer can render
// progress as it goes. The working directory is owned by the sequence and
// is removed on every exit path, including a sequence dropped mid-run.
//
// AI-ASSISTANT-INFO: Run orchestration, event sequence and run report

pub mod report;

#[cfg(all(test, unix))]
mod tests;

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use rayon::prelude::*;
use tempfile::TempDir;

use crate::assembly::{AssemblyEngine, AssemblyPlan, CompositionMode};
use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::events::{EventDispatcher, EventHandler, RunEvent};
use crate::external::{FfmpegSpawner, FfprobeExecutor, OriginFetcher};
use crate::hardware_encode::EncoderSelection;
use crate::overlay::OverlayCompositor;
use crate::reference::ReferenceResolver;
use crate::segment::{Segment, SegmentMaterializer};
use crate::temp_files::create_work_dir;

pub use report::{FailedItem, OverlayDegradation, RunOutcome, RunReport, SucceededItem};

/// Runs the whole pipeline with one set of collaborators.
pub struct Orchestrator<S, P, F> {
    config: CoreConfig,
    spawner: S,
    prober: P,
    fetcher: F,
    encoders: EncoderSelection,
    resolver: ReferenceResolver,
}

/// Outcome of one item before it is recorded.
struct ItemRecord {
    index: usize,
    events: Vec<RunEvent>,
    result: Result<Segment, FailedItem>,
    degradation: Option<OverlayDegradation>,
}

/// Adds a worker's record, even if another worker panicked holding the lock.
fn push_record(collected: &Mutex<Vec<ItemRecord>>, record: ItemRecord) {
    collected
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(record);
}

impl<S, P, F> Orchestrator<S, P, F>
where
    S: FfmpegSpawner,
    P: FfprobeExecutor,
    F: OriginFetcher,
{
    pub fn new(config: CoreConfig, spawner: S, prober: P, fetcher: F) -> Self {
        let encoders = EncoderSelection::new(
            config.hardware_encoder.clone(),
            &config.software_preset,
            config.crf,
        );
        let resolver = ReferenceResolver::new(config.offset_policy);
        Self {
            config,
            spawner,
            prober,
            fetcher,
            encoders,
            resolver,
        }
    }

    /// Replaces the default resolver, e.g. to accept other hosts.
    pub fn with_resolver(mut self, resolver: ReferenceResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn encoders(&self) -> &EncoderSelection {
        &self.encoders
    }

    /// The run over `references` as a lazy event sequence.
    ///
    /// Nothing happens until the first event is pulled. Setup failures are
    /// yielded as a single `Err`, after which the sequence ends.
    pub fn events(&self, references: Vec<String>) -> RunEvents<'_, S, P, F> {
        RunEvents {
            orchestrator: self,
            references,
            phase: Phase::Setup,
            queue: VecDeque::new(),
            work_dir: None,
            state: RunState::default(),
            started: Instant::now(),
            started_at: Local::now(),
        }
    }

    /// Runs to completion and returns the report.
    pub fn run(&self, references: Vec<String>) -> CoreResult<RunReport> {
        self.run_with_handler(references, &EventDispatcher::new())
    }

    /// Runs to completion, passing every event to `handler`.
    pub fn run_with_handler(
        &self,
        references: Vec<String>,
        handler: &dyn EventHandler,
    ) -> CoreResult<RunReport> {
        let mut report = None;
        for event in self.events(references) {
            let event = event?;
            handler.handle(&event);
            if let RunEvent::RunFinished { report: finished } = event {
                report = Some(finished);
            }
        }
        report.ok_or_else(|| CoreError::OperationFailed("run ended without a report".to_string()))
    }

    // ========================================================================
    // PER-ITEM WORK
    // ========================================================================

    /// Resolves and materializes one reference. Retries are appended to `events`.
    fn materialize_item(
        &self,
        index: usize,
        raw: &str,
        sequence: usize,
        work_dir: &Path,
        events: &mut Vec<RunEvent>,
    ) -> Result<Segment, FailedItem> {
        let reference = self.resolver.resolve(raw).map_err(|e| {
            warn!("Reference {} rejected: {}", index + 1, e);
            FailedItem {
                index,
                raw: raw.to_string(),
                stage: None,
                reason: e.reason,
            }
        })?;
        debug!(
            "Reference {} resolved to {} at {:.3}s ({})",
            index + 1,
            reference.source_id,
            reference.start_offset.as_secs_f64(),
            reference.shape
        );

        let materializer = SegmentMaterializer::new(
            &self.spawner,
            &self.prober,
            &self.fetcher,
            &self.config,
            &self.encoders,
        );
        materializer
            .materialize(
                &reference,
                self.config.clip_duration,
                sequence,
                index,
                work_dir,
                &mut |retry| {
                    events.push(RunEvent::FetchRetry {
                        index,
                        source_id: retry.source_id,
                        attempt: retry.attempt,
                        max_attempts: retry.max_attempts,
                        delay_secs: retry.delay.as_secs_f64(),
                        reason: retry.reason,
                    })
                },
            )
            .map_err(|e| {
                error!("Reference {} ({}) failed: {}", index + 1, reference.source_id, e);
                FailedItem {
                    index,
                    raw: raw.to_string(),
                    stage: Some(e.stage),
                    reason: e.to_string(),
                }
            })
    }

    /// Burns the segment's output position in; failures keep the plain segment.
    fn label(
        &self,
        overlay: &OverlayCompositor,
        segment: Segment,
        index: usize,
    ) -> (Segment, Option<OverlayDegradation>) {
        match overlay.overlay(&self.spawner, &segment, segment.sequence) {
            Ok(labeled) => (labeled, None),
            Err(e) => {
                warn!("Label for clip {} skipped: {}", segment.sequence, e);
                let degradation = OverlayDegradation {
                    index: Some(index),
                    reason: e.to_string(),
                };
                (segment, Some(degradation))
            }
        }
    }

    /// Materializes every reference on a bounded local pool.
    ///
    /// Records come back in input order with output positions assigned, and
    /// labels are burned in after the join so they match those positions.
    fn run_parallel(
        &self,
        references: &[String],
        work_dir: &Path,
        overlay: Option<&OverlayCompositor>,
        workers: usize,
    ) -> CoreResult<Vec<ItemRecord>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("clipstitch-worker-{i}"))
            .build()
            .map_err(|e| CoreError::OperationFailed(format!("failed to start worker pool: {e}")))?;
        info!("Materializing {} reference(s) on {} workers", references.len(), workers);

        let total_items = references.len();
        let collected = Mutex::new(Vec::with_capacity(total_items));
        pool.install(|| {
            references.par_iter().enumerate().for_each(|(index, raw)| {
                let mut events = vec![RunEvent::ItemStarted {
                    index,
                    total_items,
                    raw: raw.clone(),
                }];
                let result = self.materialize_item(index, raw, index + 1, work_dir, &mut events);
                push_record(
                    &collected,
                    ItemRecord {
                        index,
                        events,
                        result,
                        degradation: None,
                    },
                );
            });
        });

        let mut records = collected.into_inner().unwrap_or_else(PoisonError::into_inner);
        records.sort_by_key(|record| record.index);

        let mut sequence = 0;
        for segment in records.iter_mut().filter_map(|r| r.result.as_mut().ok()) {
            sequence += 1;
            segment.sequence = sequence;
        }

        if let Some(overlay) = overlay {
            pool.install(|| {
                records.par_iter_mut().for_each(|record| {
                    if let Ok(segment) = &mut record.result {
                        let (labeled, degradation) = self.label(overlay, segment.clone(), record.index);
                        *segment = labeled;
                        record.degradation = degradation;
                    }
                });
            });
        }
        Ok(records)
    }
}

// ============================================================================
// EVENT SEQUENCE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Setup,
    ItemStart(usize),
    ItemWork(usize),
    Parallel(usize),
    Harmonize,
    AssemblyStart,
    AssemblyWork,
    Cleanup,
    Finish,
    Done,
}

#[derive(Default)]
struct RunState {
    overlay: Option<OverlayCompositor>,
    segments: Vec<Segment>,
    failed: Vec<FailedItem>,
    degradations: Vec<OverlayDegradation>,
    blend_failure: Option<String>,
    cleanup_warnings: Vec<String>,
    outcome: Option<RunOutcome>,
}

/// Lazy event sequence of one run. See [`Orchestrator::events`].
pub struct RunEvents<'a, S, P, F> {
    orchestrator: &'a Orchestrator<S, P, F>,
    references: Vec<String>,
    phase: Phase,
    queue: VecDeque<RunEvent>,
    work_dir: Option<TempDir>,
    state: RunState,
    started: Instant,
    started_at: DateTime<Local>,
}

impl<S, P, F> RunEvents<'_, S, P, F>
where
    S: FfmpegSpawner,
    P: FfprobeExecutor,
    F: OriginFetcher,
{
    /// Advances the run by one phase. Returns `false` once the run is over.
    fn step(&mut self) -> CoreResult<bool> {
        let orchestrator = self.orchestrator;
        let config = &orchestrator.config;

        self.phase = match self.phase {
            Phase::Setup => {
                config.validate()?;
                let work_dir = create_work_dir(config)?;
                let workers = config.effective_workers();
                self.queue.push_back(RunEvent::RunStarted {
                    total_items: self.references.len(),
                    workers,
                    transitions: config.use_transitions,
                    overlay: config.enable_overlay,
                    work_dir: work_dir.path().to_path_buf(),
                });

                if config.enable_overlay {
                    match OverlayCompositor::prepare(&config.fonts_dir, work_dir.path()) {
                        Ok(overlay) => self.state.overlay = Some(overlay),
                        Err(e) => {
                            warn!("Clip labels disabled: {e}");
                            let reason = e.to_string();
                            self.queue.push_back(RunEvent::OverlaySkipped {
                                index: None,
                                reason: reason.clone(),
                            });
                            self.state.degradations.push(OverlayDegradation { index: None, reason });
                        }
                    }
                }
                self.work_dir = Some(work_dir);

                if self.references.is_empty() {
                    Phase::AssemblyStart
                } else if workers > 1 && self.references.len() > 1 {
                    Phase::Parallel(workers)
                } else {
                    Phase::ItemStart(0)
                }
            }

            Phase::ItemStart(index) => {
                self.queue.push_back(RunEvent::ItemStarted {
                    index,
                    total_items: self.references.len(),
                    raw: self.references[index].clone(),
                });
                Phase::ItemWork(index)
            }

            Phase::ItemWork(index) => {
                let work_dir = self.work_dir_path()?;
                let sequence = self.state.segments.len() + 1;
                let mut events = Vec::new();
                let result = orchestrator.materialize_item(
                    index,
                    &self.references[index],
                    sequence,
                    &work_dir,
                    &mut events,
                );
                let mut degradation = None;
                let result = match (result, self.state.overlay.as_ref()) {
                    (Ok(segment), Some(overlay)) => {
                        let (segment, skipped) = orchestrator.label(overlay, segment, index);
                        degradation = skipped;
                        Ok(segment)
                    }
                    (result, _) => result,
                };
                self.record(ItemRecord {
                    index,
                    events,
                    result,
                    degradation,
                });

                if index + 1 < self.references.len() {
                    Phase::ItemStart(index + 1)
                } else {
                    Phase::Harmonize
                }
            }

            Phase::Parallel(workers) => {
                let work_dir = self.work_dir_path()?;
                let records = orchestrator.run_parallel(
                    &self.references,
                    &work_dir,
                    self.state.overlay.as_ref(),
                    workers,
                )?;
                for record in records {
                    self.record(record);
                }
                Phase::Harmonize
            }

            Phase::Harmonize => {
                self.harmonize_encoders()?;
                Phase::AssemblyStart
            }

            Phase::AssemblyStart => {
                if self.state.segments.is_empty() {
                    error!("No clips were produced; skipping assembly");
                    self.state.outcome = Some(RunOutcome::NoSegments);
                    Phase::Cleanup
                } else {
                    self.queue.push_back(RunEvent::AssemblyStarted {
                        clip_count: self.state.segments.len(),
                        blended: config.use_transitions,
                    });
                    Phase::AssemblyWork
                }
            }

            Phase::AssemblyWork => {
                self.assemble()?;
                Phase::Cleanup
            }

            Phase::Cleanup => {
                if let Some(work_dir) = self.work_dir.take() {
                    let path = work_dir.path().to_path_buf();
                    match work_dir.close() {
                        Ok(()) => debug!("Removed working directory {}", path.display()),
                        Err(e) => {
                            let message = format!(
                                "failed to remove working directory {}: {}",
                                path.display(),
                                e
                            );
                            warn!("{message}");
                            self.queue.push_back(RunEvent::CleanupWarning {
                                message: message.clone(),
                            });
                            self.state.cleanup_warnings.push(message);
                        }
                    }
                }
                Phase::Finish
            }

            Phase::Finish => {
                let report = self.build_report();
                self.queue.push_back(RunEvent::RunFinished { report });
                Phase::Done
            }

            Phase::Done => return Ok(false),
        };
        Ok(true)
    }

    fn work_dir_path(&self) -> CoreResult<std::path::PathBuf> {
        self.work_dir
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
            .ok_or_else(|| CoreError::OperationFailed("working directory is gone".to_string()))
    }

    fn record(&mut self, record: ItemRecord) {
        self.queue.extend(record.events);
        if let Some(degradation) = record.degradation {
            self.queue.push_back(RunEvent::OverlaySkipped {
                index: degradation.index,
                reason: degradation.reason.clone(),
            });
            self.state.degradations.push(degradation);
        }
        match record.result {
            Ok(segment) => {
                self.queue.push_back(RunEvent::ItemSucceeded {
                    index: record.index,
                    sequence: segment.sequence,
                    source_id: segment.source_id.clone(),
                    path: segment.path.clone(),
                    labeled: segment.labeled,
                });
                self.state.segments.push(segment);
            }
            Err(failed) => {
                self.queue.push_back(RunEvent::ItemFailed {
                    index: failed.index,
                    raw: failed.raw.clone(),
                    stage: failed.stage,
                    reason: failed.reason.clone(),
                });
                self.state.failed.push(failed);
            }
        }
    }

    /// Re-encodes the segments still on the accelerated encoder once it was
    /// switched off mid-run, so that every segment shares one set of encode
    /// parameters. A segment that cannot be re-encoded becomes a failed item.
    fn harmonize_encoders(&mut self) -> CoreResult<()> {
        let Some(first) = self.state.segments.first() else {
            return Ok(());
        };
        if self.state.segments.iter().all(|s| s.params == first.params) {
            return Ok(());
        }

        let orchestrator = self.orchestrator;
        let stale = self
            .state
            .segments
            .iter()
            .filter(|s| s.params.encoder.is_hardware())
            .count();
        warn!(
            "Accelerated encoder was switched off mid-run; re-encoding {} clip(s) with {}",
            stale,
            orchestrator.encoders.software().codec_name()
        );
        let materializer = SegmentMaterializer::new(
            &orchestrator.spawner,
            &orchestrator.prober,
            &orchestrator.fetcher,
            &orchestrator.config,
            &orchestrator.encoders,
        );

        let segments = std::mem::take(&mut self.state.segments);
        for segment in segments {
            if !segment.params.encoder.is_hardware() {
                self.state.segments.push(segment);
                continue;
            }
            match materializer.renormalize(&segment) {
                Ok(redone) => {
                    self.queue.push_back(RunEvent::SegmentReencoded {
                        index: redone.input_index,
                        sequence: redone.sequence,
                        encoder: redone.params.encoder.codec_name().to_string(),
                    });
                    self.state.segments.push(redone);
                }
                Err(e) => {
                    error!(
                        "Reference {} ({}) failed: {}",
                        segment.input_index + 1,
                        segment.source_id,
                        e
                    );
                    let failed = FailedItem {
                        index: segment.input_index,
                        raw: self.references[segment.input_index].clone(),
                        stage: Some(e.stage),
                        reason: e.to_string(),
                    };
                    self.queue.push_back(RunEvent::ItemFailed {
                        index: failed.index,
                        raw: failed.raw.clone(),
                        stage: failed.stage,
                        reason: failed.reason.clone(),
                    });
                    self.state.failed.push(failed);
                }
            }
        }

        // Output positions stay contiguous; burned-in labels are not redrawn
        for (position, segment) in self.state.segments.iter_mut().enumerate() {
            segment.sequence = position + 1;
        }
        self.state.failed.sort_by_key(|f| f.index);
        Ok(())
    }

    fn assemble(&mut self) -> CoreResult<()> {
        let orchestrator = self.orchestrator;
        let config = &orchestrator.config;
        let work_dir = self.work_dir_path()?;
        let output = config.output_file.as_path();

        let mode = if config.use_transitions {
            CompositionMode::Blended {
                transition: config.transition_duration,
            }
        } else {
            CompositionMode::Plain
        };

        let result = prepare_output_dir(output)
            .and_then(|()| AssemblyPlan::new(self.state.segments.clone(), mode, config.clip_duration))
            .and_then(|plan| {
                AssemblyEngine::new(&orchestrator.spawner, &orchestrator.prober, &work_dir)
                    .assemble(plan, output)
                    .map_err(CoreError::from)
            });

        match result {
            Ok(outcome) => {
                if let Some(reason) = &outcome.blend_failure {
                    self.queue.push_back(RunEvent::BlendFallback {
                        reason: reason.clone(),
                    });
                }
                self.queue.push_back(RunEvent::AssemblyFinished {
                    output: outcome.output.clone(),
                    strategy: outcome.strategy,
                    size_bytes: outcome.size_bytes,
                });
                self.state.blend_failure = outcome.blend_failure;
                self.state.outcome = Some(RunOutcome::Assembled {
                    output: outcome.output,
                    size_bytes: outcome.size_bytes,
                    clip_count: outcome.clip_count,
                    strategy: outcome.strategy,
                });
            }
            Err(e) => {
                let reason = e.to_string();
                error!("{reason}");
                if let CoreError::Assembly(assembly) = &e {
                    self.state.blend_failure = assembly.blend.clone();
                }
                self.queue.push_back(RunEvent::AssemblyFailed {
                    reason: reason.clone(),
                });
                self.state.outcome = Some(RunOutcome::AssemblyFailed { reason });
            }
        }
        Ok(())
    }

    fn build_report(&mut self) -> RunReport {
        let state = std::mem::take(&mut self.state);
        RunReport {
            started_at: self.started_at.to_rfc3339(),
            total_items: self.references.len(),
            succeeded: state
                .segments
                .into_iter()
                .map(|segment| SucceededItem {
                    index: segment.input_index,
                    sequence: segment.sequence,
                    source_id: segment.source_id,
                    path: segment.path,
                    labeled: segment.labeled,
                })
                .collect(),
            failed: state.failed,
            overlay_degradations: state.degradations,
            blend_failure: state.blend_failure,
            cleanup_warnings: state.cleanup_warnings,
            outcome: state.outcome.unwrap_or(RunOutcome::NoSegments),
            elapsed: self.started.elapsed(),
        }
    }
}

fn prepare_output_dir(output: &Path) -> CoreResult<()> {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            std::fs::create_dir_all(parent)?;
            Ok(())
        }
        _ => Ok(()),
    }
}

impl<S, P, F> Iterator for RunEvents<'_, S, P, F>
where
    S: FfmpegSpawner,
    P: FfprobeExecutor,
    F: OriginFetcher,
{
    type Item = CoreResult<RunEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Some(Ok(event));
            }
            match self.step() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => {
                    error!("Run aborted: {e}");
                    self.phase = Phase::Done;
                    self.queue.clear();
                    self.work_dir = None;
                    return Some(Err(e));
                }
            }
        }
    }
}
