// ============================================================================
// clipstitch-core/src/segment/mod.rs
// ============================================================================
//
// SEGMENT MATERIALIZER: Reference -> Normalized Segment
//
// Turns one resolved reference into a normalized local segment. Each call
// walks a small state machine:
//
//   Fetching -> Extracting -> Normalizing -> Done
//
// with an absorbing failure reachable from every step. The failure records
// the stage it happened in. Fetching makes one attempt per retry-policy
// attempt; extraction is a stream copy of the requested window; normalizing
// re-encodes to the run's single target so every segment can later be
// joined by stream copy.
//
// AI-ASSISTANT-INFO: Per-reference fetch/extract/normalize pipeline

mod extract;
mod normalize;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::config::{CoreConfig, NormalizationTarget, RetryPolicy};
use crate::error::CoreError;
use crate::external::{
    AudioPresence, FetchRequest, FetchWindow, FfmpegSpawner, FfprobeExecutor, OriginAsset,
    OriginFetcher,
};
use crate::hardware_encode::{EncoderChoice, EncoderSelection};
use crate::reference::SourceReference;
use crate::temp_files;

pub use extract::build_extract_command;
pub use normalize::build_normalize_command;

/// Step of the materialization state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MaterializeStage {
    Fetching,
    Extracting,
    Normalizing,
}

impl fmt::Display for MaterializeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MaterializeStage::Fetching => "fetch",
            MaterializeStage::Extracting => "extract",
            MaterializeStage::Normalizing => "encode",
        };
        f.write_str(name)
    }
}

/// Failure of one materialization, tagged with the stage that failed.
#[derive(Error, Debug)]
#[error("{stage} failed: {cause}")]
pub struct MaterializationError {
    pub stage: MaterializeStage,
    #[source]
    pub cause: Box<CoreError>,
}

impl MaterializationError {
    pub fn new(stage: MaterializeStage, cause: CoreError) -> Self {
        Self {
            stage,
            cause: Box::new(cause),
        }
    }
}

/// Parameters every segment of a run shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizationParams {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub codec: String,
    pub encoder: EncoderChoice,
}

impl NormalizationParams {
    pub fn new(target: &NormalizationTarget, encoder: EncoderChoice) -> Self {
        Self {
            width: target.width,
            height: target.height,
            frame_rate: target.fps,
            codec: "h264".to_string(),
            encoder,
        }
    }
}

/// A normalized clip ready for assembly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub path: PathBuf,
    /// 1-based position in the output
    pub sequence: usize,
    /// 0-based position in the input list
    pub input_index: usize,
    pub source_id: String,
    pub requested_duration: Duration,
    pub params: NormalizationParams,
    pub audio: AudioPresence,
    /// Whether a label was burned in
    pub labeled: bool,
}

/// A fetch attempt that failed and will be retried.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchRetry {
    pub source_id: String,
    /// 1-based number of the attempt that failed
    pub attempt: u32,
    pub max_attempts: u32,
    pub delay: Duration,
    pub reason: String,
}

enum State {
    Fetching,
    Extracting(OriginAsset),
    Normalizing(PathBuf),
    Done(Segment),
}

/// Borrowed view of everything a materialization needs.
pub struct SegmentMaterializer<'a, S, P, F> {
    spawner: &'a S,
    prober: &'a P,
    fetcher: &'a F,
    config: &'a CoreConfig,
    encoders: &'a EncoderSelection,
}

impl<'a, S, P, F> SegmentMaterializer<'a, S, P, F>
where
    S: FfmpegSpawner,
    P: FfprobeExecutor,
    F: OriginFetcher,
{
    pub fn new(
        spawner: &'a S,
        prober: &'a P,
        fetcher: &'a F,
        config: &'a CoreConfig,
        encoders: &'a EncoderSelection,
    ) -> Self {
        Self {
            spawner,
            prober,
            fetcher,
            config,
            encoders,
        }
    }

    /// Produces the normalized segment for `reference`.
    ///
    /// `sequence` is the 1-based output position and `input_index` the
    /// 0-based input position, which keeps file names unique per item.
    /// `on_retry` is told about every failed fetch attempt that will be retried.
    pub fn materialize(
        &self,
        reference: &SourceReference,
        duration: Duration,
        sequence: usize,
        input_index: usize,
        work_dir: &Path,
        on_retry: &mut dyn FnMut(FetchRetry),
    ) -> Result<Segment, MaterializationError> {
        let mut state = State::Fetching;
        loop {
            state = match state {
                State::Fetching => {
                    log::debug!("[{}] fetching {}", input_index, reference.source_id);
                    let request = self.fetch_request(reference, duration, input_index, work_dir);
                    let asset = fetch_with_retry(self.fetcher, &request, &self.config.retry, on_retry)
                        .map_err(|e| MaterializationError::new(MaterializeStage::Fetching, e))?;
                    State::Extracting(asset)
                }
                State::Extracting(asset) => {
                    log::debug!("[{}] extracting from {}", input_index, asset.path.display());
                    let raw = temp_files::raw_segment_path(work_dir, &reference.source_id, input_index);
                    let seek = reference.start_offset.saturating_sub(asset.starts_at);
                    let result = extract::extract(self.spawner, &asset.path, seek, duration, &raw);
                    release_origin(&asset, &raw);
                    result.map_err(|e| MaterializationError::new(MaterializeStage::Extracting, e))?;
                    State::Normalizing(raw)
                }
                State::Normalizing(raw) => {
                    log::debug!("[{}] normalizing {}", input_index, raw.display());
                    let output = temp_files::segment_path(work_dir, &reference.source_id, input_index);
                    let audio = self.prober.probe(&raw).audio;
                    let result = normalize::normalize(
                        self.spawner,
                        self.encoders,
                        &self.config.target,
                        &raw,
                        audio,
                        &output,
                    );
                    remove_quietly(&raw);
                    let encoder =
                        result.map_err(|e| MaterializationError::new(MaterializeStage::Normalizing, e))?;
                    State::Done(Segment {
                        path: output,
                        sequence,
                        input_index,
                        source_id: reference.source_id.clone(),
                        requested_duration: duration,
                        params: NormalizationParams::new(&self.config.target, encoder),
                        audio,
                        labeled: false,
                    })
                }
                State::Done(segment) => {
                    log::info!(
                        "Materialized clip {} ({}) with {}",
                        segment.sequence,
                        segment.source_id,
                        segment.params.encoder.codec_name()
                    );
                    return Ok(segment);
                }
            };
        }
    }

    /// Re-encodes an already normalized segment with the software encoder.
    ///
    /// Used when the accelerated encoder was switched off after some segments
    /// were made with it. The new file replaces the old one; burned-in labels
    /// survive since they are part of the picture.
    pub fn renormalize(&self, segment: &Segment) -> Result<Segment, MaterializationError> {
        let software = EncoderSelection::new(None, &self.config.software_preset, self.config.crf);
        let output = software_copy_path(&segment.path);
        log::debug!(
            "[{}] re-encoding {} with {}",
            segment.input_index,
            segment.path.display(),
            software.software().codec_name()
        );
        let encoder = normalize::normalize(
            self.spawner,
            &software,
            &self.config.target,
            &segment.path,
            segment.audio,
            &output,
        )
        .map_err(|e| MaterializationError::new(MaterializeStage::Normalizing, e))?;
        remove_quietly(&segment.path);

        Ok(Segment {
            path: output,
            params: NormalizationParams::new(&self.config.target, encoder),
            ..segment.clone()
        })
    }

    fn fetch_request(
        &self,
        reference: &SourceReference,
        duration: Duration,
        input_index: usize,
        work_dir: &Path,
    ) -> FetchRequest {
        FetchRequest {
            source_id: reference.source_id.clone(),
            url: self.config.origin_url(&reference.source_id),
            dest_dir: work_dir.to_path_buf(),
            stem: temp_files::origin_stem(&reference.source_id, input_index),
            window: self.config.windowed_fetch.then_some(FetchWindow {
                start: reference.start_offset,
                duration,
            }),
        }
    }
}

/// Runs one fetch attempt per policy attempt, sleeping the policy's backoff in between.
pub fn fetch_with_retry<F: OriginFetcher + ?Sized>(
    fetcher: &F,
    request: &FetchRequest,
    policy: &RetryPolicy,
    on_retry: &mut dyn FnMut(FetchRetry),
) -> Result<OriginAsset, CoreError> {
    let mut attempt = 1;
    loop {
        match fetcher.fetch(request) {
            Ok(asset) => return Ok(asset),
            Err(e) if attempt < policy.max_attempts => {
                let delay = policy.backoff_for(attempt);
                log::warn!(
                    "Fetch of {} failed (attempt {}/{}), retrying in {:.1}s: {}",
                    request.source_id,
                    attempt,
                    policy.max_attempts,
                    delay.as_secs_f64(),
                    e
                );
                on_retry(FetchRetry {
                    source_id: request.source_id.clone(),
                    attempt,
                    max_attempts: policy.max_attempts,
                    delay,
                    reason: e.to_string(),
                });
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Sibling of `path` for its software re-encode, e.g. `clip_000_a_sw.mp4`.
fn software_copy_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "segment".to_string());
    path.with_file_name(format!("{stem}_sw.mp4"))
}

/// Deletes the origin asset once extraction produced a file, successful or not.
fn release_origin(asset: &OriginAsset, extracted: &Path) {
    if extracted.exists() {
        remove_quietly(&asset.path);
    } else {
        log::debug!(
            "No extraction output; leaving {} for working directory cleanup",
            asset.path.display()
        );
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::CoreConfigBuilder;
    use crate::external::MediaProbe;
    use crate::external::mocks::{MockFetcher, MockFfmpegSpawner, MockFfprobeExecutor};
    use crate::reference::ReferenceShape;
    use tempfile::tempdir;

    fn reference(id: &str, offset: u64) -> SourceReference {
        SourceReference {
            raw: format!("https://youtu.be/{id}?t={offset}"),
            source_id: id.to_string(),
            start_offset: Duration::from_secs(offset),
            shape: ReferenceShape::Short,
        }
    }

    fn test_config() -> CoreConfig {
        CoreConfigBuilder::new()
            .retry(RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::ZERO,
                backoff_multiplier: 1.0,
                max_backoff: Duration::ZERO,
            })
            .hardware_encoder(Some("h264_nvenc"))
            .build()
    }

    fn with_audio() -> MockFfprobeExecutor {
        MockFfprobeExecutor::with_default(MediaProbe {
            audio: AudioPresence::Present,
            ..MediaProbe::default()
        })
    }

    #[test]
    fn materializes_and_cleans_intermediates() -> Result<(), Box<dyn std::error::Error>> {
        let work = tempdir()?;
        let spawner = MockFfmpegSpawner::succeeding();
        let prober = with_audio();
        let fetcher = MockFetcher::new();
        let config = test_config();
        let encoders = EncoderSelection::new(config.hardware_encoder.clone(), "ultrafast", 23);
        let materializer = SegmentMaterializer::new(&spawner, &prober, &fetcher, &config, &encoders);

        let mut retries = Vec::new();
        let segment = materializer.materialize(
            &reference("abc", 90),
            Duration::from_secs(30),
            1,
            0,
            work.path(),
            &mut |r| retries.push(r),
        )?;

        assert_eq!(segment.path, work.path().join("clip_000_abc.mp4"));
        assert!(segment.path.exists());
        assert_eq!(segment.sequence, 1);
        assert_eq!(segment.audio, AudioPresence::Present);
        assert!(segment.params.encoder.is_hardware());
        assert!(retries.is_empty());

        // Origin and raw extraction are gone, only the segment remains
        let remaining: Vec<_> = std::fs::read_dir(work.path())?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(remaining, vec!["clip_000_abc.mp4".to_string()]);

        let extract_calls = spawner.calls_writing("raw_000_abc.mkv");
        assert_eq!(extract_calls.len(), 1);
        let args = &extract_calls[0];
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        assert_eq!(args[ss + 1], "90");
        Ok(())
    }

    #[test]
    fn fetch_failures_are_retried_then_reported() -> Result<(), Box<dyn std::error::Error>> {
        let work = tempdir()?;
        let spawner = MockFfmpegSpawner::succeeding();
        let prober = with_audio();
        let fetcher = MockFetcher::new();
        fetcher.fail_times("flaky", 2, "HTTP Error 503");
        fetcher.fail_times("gone", 5, "ERROR: Video unavailable");
        let config = test_config();
        let encoders = EncoderSelection::new(None, "ultrafast", 23);
        let materializer = SegmentMaterializer::new(&spawner, &prober, &fetcher, &config, &encoders);

        let mut retries = Vec::new();
        let ok = materializer.materialize(
            &reference("flaky", 0),
            Duration::from_secs(5),
            1,
            0,
            work.path(),
            &mut |r| retries.push(r),
        );
        assert!(ok.is_ok());
        assert_eq!(retries.len(), 2);
        assert_eq!(retries[0].attempt, 1);
        assert!(retries[1].reason.contains("503"));

        let err = materializer
            .materialize(
                &reference("gone", 0),
                Duration::from_secs(5),
                2,
                1,
                work.path(),
                &mut |_| {},
            )
            .unwrap_err();
        assert_eq!(err.stage, MaterializeStage::Fetching);
        assert!(err.to_string().contains("Video unavailable"));
        // Three attempts for "flaky", three for "gone"
        assert_eq!(fetcher.requests().len(), 6);
        Ok(())
    }

    #[test]
    fn hardware_failure_falls_back_to_software_for_the_rest_of_the_run()
    -> Result<(), Box<dyn std::error::Error>> {
        let work = tempdir()?;
        let spawner = MockFfmpegSpawner::succeeding();
        spawner.add_exit_error_expectation("h264_nvenc", "Cannot load libcuda.so.1", 1);
        let prober = with_audio();
        let fetcher = MockFetcher::new();
        let config = test_config();
        let encoders = EncoderSelection::new(config.hardware_encoder.clone(), "ultrafast", 23);
        let materializer = SegmentMaterializer::new(&spawner, &prober, &fetcher, &config, &encoders);

        let first = materializer.materialize(
            &reference("one", 0),
            Duration::from_secs(5),
            1,
            0,
            work.path(),
            &mut |_| {},
        )?;
        assert!(!first.params.encoder.is_hardware());

        let second = materializer.materialize(
            &reference("two", 0),
            Duration::from_secs(5),
            2,
            1,
            work.path(),
            &mut |_| {},
        )?;
        assert!(!second.params.encoder.is_hardware());
        assert_eq!(spawner.calls_matching("h264_nvenc").len(), 1);
        Ok(())
    }

    #[test]
    fn extraction_failure_with_output_still_removes_origin() -> Result<(), Box<dyn std::error::Error>> {
        let work = tempdir()?;
        let spawner = MockFfmpegSpawner::succeeding();
        spawner.add_exit_error_with_output_expectation("raw_000_bad.mkv", "Invalid data found", 1);
        let prober = with_audio();
        let fetcher = MockFetcher::new();
        let config = test_config();
        let encoders = EncoderSelection::new(None, "ultrafast", 23);
        let materializer = SegmentMaterializer::new(&spawner, &prober, &fetcher, &config, &encoders);

        let err = materializer
            .materialize(
                &reference("bad", 0),
                Duration::from_secs(5),
                1,
                0,
                work.path(),
                &mut |_| {},
            )
            .unwrap_err();
        assert_eq!(err.stage, MaterializeStage::Extracting);
        assert!(err.to_string().contains("Invalid data found"));
        assert!(!work.path().join("bad_000_full.mp4").exists());
        Ok(())
    }

    #[test]
    fn windowed_fetch_seeks_relative_to_the_window() -> Result<(), Box<dyn std::error::Error>> {
        let work = tempdir()?;
        let spawner = MockFfmpegSpawner::succeeding();
        let prober = with_audio();
        let fetcher = MockFetcher::new();
        let config = CoreConfig {
            windowed_fetch: true,
            ..test_config()
        };
        let encoders = EncoderSelection::new(None, "ultrafast", 23);
        let materializer = SegmentMaterializer::new(&spawner, &prober, &fetcher, &config, &encoders);

        materializer.materialize(
            &reference("win", 120),
            Duration::from_secs(10),
            1,
            0,
            work.path(),
            &mut |_| {},
        )?;

        let request = &fetcher.requests()[0];
        assert_eq!(
            request.window,
            Some(FetchWindow {
                start: Duration::from_secs(120),
                duration: Duration::from_secs(10)
            })
        );
        let args = &spawner.calls_writing("raw_000_win.mkv")[0];
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        assert_eq!(args[ss + 1], "0");
        Ok(())
    }

    #[test]
    fn renormalize_replaces_hardware_segment_with_software() -> Result<(), Box<dyn std::error::Error>> {
        let work = tempdir()?;
        let spawner = MockFfmpegSpawner::succeeding();
        let prober = with_audio();
        let fetcher = MockFetcher::new();
        let config = test_config();
        let encoders = EncoderSelection::new(config.hardware_encoder.clone(), "ultrafast", 23);
        let materializer = SegmentMaterializer::new(&spawner, &prober, &fetcher, &config, &encoders);

        let original = materializer.materialize(
            &reference("abc", 0),
            Duration::from_secs(30),
            1,
            0,
            work.path(),
            &mut |_| {},
        )?;
        assert!(original.params.encoder.is_hardware());

        let redone = materializer.renormalize(&original)?;

        assert_eq!(redone.path, work.path().join("clip_000_abc_sw.mp4"));
        assert!(redone.path.exists());
        assert!(!original.path.exists());
        assert!(!redone.params.encoder.is_hardware());
        assert_eq!(redone.sequence, original.sequence);
        assert_eq!(redone.audio, original.audio);
        let args = &spawner.calls_writing("clip_000_abc_sw.mp4")[0];
        assert!(args.contains(&"libx264".to_string()));
        assert!(!args.contains(&"h264_nvenc".to_string()));
        Ok(())
    }
}
