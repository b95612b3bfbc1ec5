//! Stream-copy extraction of the requested window from an origin asset.
//!
//! Seeking happens on the input side, so the cut snaps to the nearest
//! preceding keyframe. Origins shorter than the window simply yield a
//! shorter clip.

use std::path::Path;
use std::time::Duration;

use ffmpeg_sidecar::command::FfmpegCommand;

use crate::error::CoreResult;
use crate::external::{FfmpegCommandBuilder, FfmpegSpawner, run_ffmpeg};
use crate::utils::ffmpeg_seconds;

/// Builds `ffmpeg -ss <seek> -i <origin> -t <duration> -c copy ... <output>`.
pub fn build_extract_command(
    origin: &Path,
    seek: Duration,
    duration: Duration,
    output: &Path,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommandBuilder::new().build();
    cmd.args(["-ss", &ffmpeg_seconds(seek)]);
    cmd.input(origin.to_string_lossy().as_ref());
    cmd.args(["-t", &ffmpeg_seconds(duration)]);
    cmd.args(["-map", "0:v:0", "-map", "0:a:0?"]);
    cmd.args(["-c", "copy"]);
    cmd.args(["-avoid_negative_ts", "make_zero"]);
    cmd.output(output.to_string_lossy().as_ref());
    cmd
}

pub(super) fn extract<S: FfmpegSpawner>(
    spawner: &S,
    origin: &Path,
    seek: Duration,
    duration: Duration,
    output: &Path,
) -> CoreResult<()> {
    let cmd = build_extract_command(origin, seek, duration, output);
    run_ffmpeg(spawner, cmd, "ffmpeg (extract)")
}
