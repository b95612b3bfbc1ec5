//! Re-encoding of an extracted clip to the run's normalization target.
//!
//! Every segment leaves here with the same resolution, padding, SAR, frame
//! rate, pixel format and video codec, which is what lets the assembly
//! stage join segments by stream copy.

use std::path::Path;

use ffmpeg_sidecar::command::FfmpegCommand;

use crate::config::NormalizationTarget;
use crate::error::{CoreError, CoreResult};
use crate::external::{AudioPresence, FfmpegCommandBuilder, FfmpegSpawner, VideoFilterChain, run_ffmpeg};
use crate::hardware_encode::{EncoderChoice, EncoderSelection};

/// Builds the normalization command for one encoder.
///
/// Audio is stream-copied when present, dropped when the probe found none,
/// and mapped optionally when the probe could not tell.
pub fn build_normalize_command(
    input: &Path,
    target: &NormalizationTarget,
    encoder: &EncoderChoice,
    audio: AudioPresence,
    output: &Path,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommandBuilder::new().build();
    cmd.input(input.to_string_lossy().as_ref());
    cmd.args(["-map", "0:v:0"]);
    match audio {
        AudioPresence::Present => {
            cmd.args(["-map", "0:a:0", "-c:a", "copy"]);
        }
        AudioPresence::Unknown => {
            cmd.args(["-map", "0:a:0?", "-c:a", "copy"]);
        }
        AudioPresence::Absent => {
            cmd.arg("-an");
        }
    }

    if let Some(filters) = VideoFilterChain::new().add_normalization(target).build() {
        cmd.args(["-vf", &filters]);
    }
    encoder.apply_to(&mut cmd);
    cmd.args(["-pix_fmt", "yuv420p"]);
    cmd.args(["-avoid_negative_ts", "make_zero"]);
    cmd.args(["-movflags", "+faststart"]);
    cmd.output(output.to_string_lossy().as_ref());
    cmd
}

/// Normalizes `input` into `output`, trying each candidate encoder in turn.
///
/// Returns the encoder that succeeded. A failing accelerated encoder is
/// disabled for the rest of the run.
pub(super) fn normalize<S: FfmpegSpawner>(
    spawner: &S,
    encoders: &EncoderSelection,
    target: &NormalizationTarget,
    input: &Path,
    audio: AudioPresence,
    output: &Path,
) -> CoreResult<EncoderChoice> {
    let mut last_error: Option<CoreError> = None;

    for encoder in encoders.candidates() {
        let cmd = build_normalize_command(input, target, &encoder, audio, output);
        match run_ffmpeg(spawner, cmd, "ffmpeg (normalize)") {
            Ok(()) => return Ok(encoder),
            Err(e) => {
                if encoder.is_hardware() {
                    if encoders.disable_hardware() {
                        log::warn!(
                            "Accelerated encoder {} failed, using {} from now on: {}",
                            encoder.codec_name(),
                            encoders.software().codec_name(),
                            e
                        );
                    }
                } else {
                    log::error!("Software encode of {} failed: {}", input.display(), e);
                }
                let _ = std::fs::remove_file(output);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| CoreError::OperationFailed("no encoder available".into())))
}
