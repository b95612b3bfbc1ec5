//! FFprobe integration for segment inspection.
//!
//! The pipeline only needs a handful of facts about a media file: whether it
//! carries audio, its resolution, frame rate and duration. Probing never
//! fails the pipeline; anything ffprobe cannot tell us is reported as
//! unknown and the caller picks a safe default.

use crate::utils::parse_seconds;
use ffprobe::ffprobe;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// Whether a file has an audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum AudioPresence {
    Present,
    Absent,
    #[default]
    Unknown,
}

impl AudioPresence {
    pub fn is_present(self) -> bool {
        self == AudioPresence::Present
    }
}

/// Best-effort facts about a media file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MediaProbe {
    pub audio: AudioPresence,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Average frame rate as reported by the video stream
    pub frame_rate: Option<f64>,
    pub duration: Option<Duration>,
}

impl MediaProbe {
    /// Probe result when the file could not be inspected at all.
    pub fn unknown() -> Self {
        Self::default()
    }
}

/// Trait for probing media files.
pub trait FfprobeExecutor: Send + Sync {
    fn probe(&self, input_path: &Path) -> MediaProbe;
}

/// Concrete implementation using the `ffprobe` crate.
#[derive(Debug, Clone, Default)]
pub struct CrateFfprobeExecutor;

impl CrateFfprobeExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl FfprobeExecutor for CrateFfprobeExecutor {
    fn probe(&self, input_path: &Path) -> MediaProbe {
        log::debug!(
            "Running ffprobe (via crate) on: {}",
            input_path.display()
        );
        match ffprobe(input_path) {
            Ok(metadata) => {
                let has_audio = metadata
                    .streams
                    .iter()
                    .any(|s| s.codec_type.as_deref() == Some("audio"));
                let video = metadata
                    .streams
                    .iter()
                    .find(|s| s.codec_type.as_deref() == Some("video"));

                MediaProbe {
                    audio: if has_audio {
                        AudioPresence::Present
                    } else {
                        AudioPresence::Absent
                    },
                    width: video
                        .and_then(|v| v.width)
                        .and_then(|w| u32::try_from(w).ok()),
                    height: video
                        .and_then(|v| v.height)
                        .and_then(|h| u32::try_from(h).ok()),
                    frame_rate: video.and_then(|v| parse_frame_rate(&v.avg_frame_rate)),
                    duration: metadata.format.duration.as_deref().and_then(parse_seconds),
                }
            }
            Err(err) => {
                log::warn!(
                    "ffprobe failed for {}, treating stream layout as unknown: {:?}",
                    input_path.display(),
                    err
                );
                MediaProbe::unknown()
            }
        }
    }
}

/// Parses ffprobe rational frame rates ("30000/1001", "30/1", "25").
pub fn parse_frame_rate(value: &str) -> Option<f64> {
    let rate = match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => value.trim().parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}
