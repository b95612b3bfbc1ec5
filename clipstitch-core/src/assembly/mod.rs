// ============================================================================
// clipstitch-core/src/assembly/mod.rs
// ============================================================================
//
// ASSEMBLY ENGINE: Ordered Segments -> Final Output
//
// Joins the normalized segments of a run into one file. Two strategies:
//
// - Plain: concat demuxer over a manifest, stream copy, no re-encode
// - Blended: one filter graph fading each segment in and out, re-encoded
//
// A failed blend is not fatal. The engine falls back to plain concatenation
// and the outcome records both the strategy that produced the file and the
// blend failure. Only when plain concatenation fails too does assembly fail.
//
// AI-ASSISTANT-INFO: Final concatenation with optional cross-fades and fallback

pub mod blend;
pub mod concat;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::error::{CoreError, CoreResult};
use crate::external::{FfmpegCommandBuilder, FfmpegSpawner, FfprobeExecutor, run_ffmpeg};
use crate::segment::Segment;

pub use blend::{FadeWindow, build_blend_command, build_blend_graph, fade_windows};
pub use concat::{CONCAT_MANIFEST, build_concat_command, write_concat_manifest};

/// How segments are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompositionMode {
    Plain,
    Blended { transition: Duration },
}

/// Which strategy produced the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssemblyStrategy {
    Plain,
    Blended,
    /// Single segment copied as-is
    SingleCopy,
}

impl fmt::Display for AssemblyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssemblyStrategy::Plain => "plain concatenation",
            AssemblyStrategy::Blended => "blended transitions",
            AssemblyStrategy::SingleCopy => "single clip copy",
        };
        f.write_str(name)
    }
}

/// Validated input to one assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyPlan {
    segments: Vec<Segment>,
    mode: CompositionMode,
    segment_duration: Duration,
}

impl AssemblyPlan {
    /// Checks that there is something to join, that every segment shares the
    /// same normalization parameters, and that any transition is strictly
    /// shorter than the requested segment duration.
    pub fn new(
        segments: Vec<Segment>,
        mode: CompositionMode,
        segment_duration: Duration,
    ) -> CoreResult<Self> {
        let Some(first) = segments.first() else {
            return Err(CoreError::InvalidPlan("no segments to assemble".to_string()));
        };
        if let Some(odd) = segments.iter().find(|s| s.params != first.params) {
            return Err(CoreError::InvalidPlan(format!(
                "clip {} was encoded with {} but clip {} with {}; segments must share encode parameters",
                odd.sequence,
                odd.params.encoder.codec_name(),
                first.sequence,
                first.params.encoder.codec_name()
            )));
        }
        if let CompositionMode::Blended { transition } = mode {
            if transition.is_zero() {
                return Err(CoreError::InvalidPlan(
                    "transition duration must be greater than zero".to_string(),
                ));
            }
            if transition >= segment_duration {
                return Err(CoreError::InvalidPlan(format!(
                    "transition of {:.3}s must be shorter than the {:.3}s segment duration",
                    transition.as_secs_f64(),
                    segment_duration.as_secs_f64()
                )));
            }
        }
        Ok(Self {
            segments,
            mode,
            segment_duration,
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn mode(&self) -> CompositionMode {
        self.mode
    }

    pub fn segment_duration(&self) -> Duration {
        self.segment_duration
    }
}

/// Result of a successful assembly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssemblyOutcome {
    pub output: PathBuf,
    pub strategy: AssemblyStrategy,
    pub clip_count: usize,
    pub size_bytes: u64,
    /// Why blending was abandoned, when the plain fallback produced the output
    pub blend_failure: Option<String>,
}

/// Every strategy failed.
#[derive(Error, Debug)]
#[error("assembly failed: {plain}{}", blend_suffix(.blend))]
pub struct AssemblyError {
    /// Failure of the plain concatenation
    #[source]
    pub plain: Box<CoreError>,
    /// Failure of the blended attempt that preceded it, if any
    pub blend: Option<String>,
}

fn blend_suffix(blend: &Option<String>) -> String {
    blend
        .as_ref()
        .map(|b| format!(" (after blend failure: {b})"))
        .unwrap_or_default()
}

/// Joins segments inside a run's working directory.
pub struct AssemblyEngine<'a, S, P> {
    spawner: &'a S,
    prober: &'a P,
    work_dir: &'a Path,
}

impl<'a, S, P> AssemblyEngine<'a, S, P>
where
    S: FfmpegSpawner,
    P: FfprobeExecutor,
{
    pub fn new(spawner: &'a S, prober: &'a P, work_dir: &'a Path) -> Self {
        Self {
            spawner,
            prober,
            work_dir,
        }
    }

    /// Writes the joined segments of `plan` to `output`, in plan order.
    pub fn assemble(&self, plan: AssemblyPlan, output: &Path) -> Result<AssemblyOutcome, AssemblyError> {
        let clip_count = plan.segments.len();
        log::info!("Assembling {} clip(s) into {}", clip_count, output.display());

        let mut blend_failure = None;
        if let CompositionMode::Blended { transition } = plan.mode {
            let attempt = if clip_count == 1 {
                self.copy_single(&plan.segments[0], output)
                    .map(|()| AssemblyStrategy::SingleCopy)
            } else {
                self.blend(&plan.segments, transition, output)
                    .map(|()| AssemblyStrategy::Blended)
            };
            match attempt {
                Ok(strategy) => return Ok(self.outcome(output, strategy, clip_count, None)),
                Err(e) => {
                    log::warn!("Blended assembly failed, falling back to plain concatenation: {e}");
                    remove_partial(output);
                    blend_failure = Some(e.to_string());
                }
            }
        }

        match self.concat(&plan.segments, output) {
            Ok(()) => Ok(self.outcome(output, AssemblyStrategy::Plain, clip_count, blend_failure)),
            Err(e) => {
                log::error!("Plain concatenation failed: {e}");
                remove_partial(output);
                Err(AssemblyError {
                    plain: Box::new(e),
                    blend: blend_failure,
                })
            }
        }
    }

    fn concat(&self, segments: &[Segment], output: &Path) -> CoreResult<()> {
        let manifest = write_concat_manifest(self.work_dir, segments)?;
        run_ffmpeg(self.spawner, build_concat_command(&manifest, output), "ffmpeg (concat)")
    }

    fn blend(&self, segments: &[Segment], transition: Duration, output: &Path) -> CoreResult<()> {
        let probes: Vec<_> = segments.iter().map(|s| self.prober.probe(&s.path)).collect();
        let durations: Vec<Duration> = segments
            .iter()
            .zip(&probes)
            .map(|(segment, probe)| probe.duration.unwrap_or(segment.requested_duration))
            .collect();
        let with_audio = segments
            .iter()
            .zip(&probes)
            .all(|(segment, probe)| segment.audio.is_present() || probe.audio.is_present());
        if !with_audio {
            log::info!("Not every clip has audio; transitions are video-only");
        }

        let windows = fade_windows(&durations, transition);
        let paths: Vec<&Path> = segments.iter().map(|s| s.path.as_path()).collect();
        let cmd = build_blend_command(&paths, &windows, with_audio, output);
        run_ffmpeg(self.spawner, cmd, "ffmpeg (blend)")
    }

    fn copy_single(&self, segment: &Segment, output: &Path) -> CoreResult<()> {
        let mut cmd = FfmpegCommandBuilder::new().build();
        cmd.input(segment.path.to_string_lossy().as_ref());
        cmd.args(["-c", "copy", "-movflags", "+faststart"]);
        cmd.output(output.to_string_lossy().as_ref());
        run_ffmpeg(self.spawner, cmd, "ffmpeg (copy)")
    }

    fn outcome(
        &self,
        output: &Path,
        strategy: AssemblyStrategy,
        clip_count: usize,
        blend_failure: Option<String>,
    ) -> AssemblyOutcome {
        let size_bytes = std::fs::metadata(output).map(|m| m.len()).unwrap_or(0);
        log::info!("Assembled {} clip(s) using {}", clip_count, strategy);
        AssemblyOutcome {
            output: output.to_path_buf(),
            strategy,
            clip_count,
            size_bytes,
            blend_failure,
        }
    }
}

fn remove_partial(output: &Path) {
    if let Err(e) = std::fs::remove_file(output) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Failed to remove partial output {}: {}", output.display(), e);
        }
    }
}
