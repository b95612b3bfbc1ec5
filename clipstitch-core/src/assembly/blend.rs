//! Cross-fade assembly.
//!
//! Every segment fades out at its tail and the next fades in at its head;
//! the first segment only fades out and the last only fades in. Faded
//! streams are joined with the graph-level `concat` filter and re-encoded.
//! Fade lengths are clamped per segment so the windows of one segment never
//! overlap and never reach before its start.

use std::path::Path;
use std::time::Duration;

use ffmpeg_sidecar::command::FfmpegCommand;

use crate::external::FfmpegCommandBuilder;
use crate::utils::ffmpeg_seconds;

/// Encoder settings of the blended output.
pub const BLEND_VIDEO_CODEC: &str = "libx264";
pub const BLEND_PRESET: &str = "medium";
pub const BLEND_CRF: &str = "23";
pub const BLEND_AUDIO_CODEC: &str = "aac";
pub const BLEND_AUDIO_BITRATE: &str = "128k";

/// Fades applied to one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeWindow {
    /// Effective duration of the segment
    pub duration: Duration,
    /// Length of the fade-in at the head
    pub fade_in: Option<Duration>,
    /// Length of the fade-out at the tail
    pub fade_out: Option<Duration>,
}

impl FadeWindow {
    fn fade_out_start(&self, length: Duration) -> Duration {
        self.duration.saturating_sub(length)
    }
}

/// Computes the fades for segments of the given effective durations.
///
/// Edge segments get `min(transition, d)`, interior ones `min(transition, d/2)`
/// on each side. A single segment gets no fades.
pub fn fade_windows(durations: &[Duration], transition: Duration) -> Vec<FadeWindow> {
    let count = durations.len();
    durations
        .iter()
        .enumerate()
        .map(|(i, &duration)| {
            let first = i == 0;
            let last = i + 1 == count;
            let length = if first || last {
                transition.min(duration)
            } else {
                transition.min(duration / 2)
            };
            FadeWindow {
                duration,
                fade_in: (!first && count > 1).then_some(length),
                fade_out: (!last && count > 1).then_some(length),
            }
        })
        .collect()
}

fn fade_chain(window: &FadeWindow, filter: &str, passthrough: &str) -> String {
    let mut steps = Vec::new();
    if let Some(length) = window.fade_in.filter(|l| !l.is_zero()) {
        steps.push(format!("{filter}=t=in:st=0:d={}", ffmpeg_seconds(length)));
    }
    if let Some(length) = window.fade_out.filter(|l| !l.is_zero()) {
        steps.push(format!(
            "{filter}=t=out:st={}:d={}",
            ffmpeg_seconds(window.fade_out_start(length)),
            ffmpeg_seconds(length)
        ));
    }
    if steps.is_empty() {
        passthrough.to_string()
    } else {
        steps.join(",")
    }
}

/// Builds the `-filter_complex` graph producing `[vout]` and, with audio, `[aout]`.
pub fn build_blend_graph(windows: &[FadeWindow], with_audio: bool) -> String {
    let mut chains = Vec::with_capacity(windows.len() * 2 + 1);
    let mut concat_inputs = String::new();

    for (i, window) in windows.iter().enumerate() {
        chains.push(format!("[{i}:v]{}[v{i}]", fade_chain(window, "fade", "null")));
        concat_inputs.push_str(&format!("[v{i}]"));
        if with_audio {
            chains.push(format!("[{i}:a]{}[a{i}]", fade_chain(window, "afade", "anull")));
            concat_inputs.push_str(&format!("[a{i}]"));
        }
    }

    let n = windows.len();
    if with_audio {
        chains.push(format!("{concat_inputs}concat=n={n}:v=1:a=1[vout][aout]"));
    } else {
        chains.push(format!("{concat_inputs}concat=n={n}:v=1:a=0[vout]"));
    }
    chains.join("; ")
}

/// Builds the full re-encoding command for a blended assembly.
pub fn build_blend_command(
    inputs: &[&Path],
    windows: &[FadeWindow],
    with_audio: bool,
    output: &Path,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommandBuilder::new().build();
    for input in inputs {
        cmd.input(input.to_string_lossy().as_ref());
    }
    cmd.args(["-filter_complex", &build_blend_graph(windows, with_audio)]);
    cmd.args(["-map", "[vout]"]);
    if with_audio {
        cmd.args(["-map", "[aout]"]);
    }
    cmd.args(["-c:v", BLEND_VIDEO_CODEC, "-preset", BLEND_PRESET, "-crf", BLEND_CRF]);
    cmd.args(["-pix_fmt", "yuv420p"]);
    if with_audio {
        cmd.args(["-c:a", BLEND_AUDIO_CODEC, "-b:a", BLEND_AUDIO_BITRATE]);
    }
    cmd.args(["-movflags", "+faststart"]);
    cmd.output(output.to_string_lossy().as_ref());
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::ffmpeg_builder::command_args;

    fn secs(values: &[f64]) -> Vec<Duration> {
        values.iter().map(|&v| Duration::from_secs_f64(v)).collect()
    }

    #[test]
    fn edge_and_interior_fades() {
        let windows = fade_windows(&secs(&[30.0, 30.0, 30.0]), Duration::from_secs(1));
        assert_eq!(windows[0].fade_in, None);
        assert_eq!(windows[0].fade_out, Some(Duration::from_secs(1)));
        assert_eq!(windows[1].fade_in, Some(Duration::from_secs(1)));
        assert_eq!(windows[1].fade_out, Some(Duration::from_secs(1)));
        assert_eq!(windows[2].fade_in, Some(Duration::from_secs(1)));
        assert_eq!(windows[2].fade_out, None);
    }

    #[test]
    fn short_segments_clamp_their_fades() {
        let windows = fade_windows(&secs(&[0.4, 1.0, 30.0]), Duration::from_secs(1));
        assert_eq!(windows[0].fade_out, Some(Duration::from_millis(400)));
        assert_eq!(windows[1].fade_in, Some(Duration::from_millis(500)));
        assert_eq!(windows[1].fade_out, Some(Duration::from_millis(500)));
        for w in &windows {
            let total = w.fade_in.unwrap_or_default() + w.fade_out.unwrap_or_default();
            assert!(total <= w.duration);
        }
    }

    #[test]
    fn single_segment_has_no_fades() {
        let windows = fade_windows(&secs(&[30.0]), Duration::from_secs(1));
        assert_eq!(windows[0].fade_in, None);
        assert_eq!(windows[0].fade_out, None);
    }

    #[test]
    fn graph_with_audio() {
        let windows = fade_windows(&secs(&[30.0, 30.0]), Duration::from_secs(1));
        assert_eq!(
            build_blend_graph(&windows, true),
            "[0:v]fade=t=out:st=29:d=1[v0]; [0:a]afade=t=out:st=29:d=1[a0]; \
             [1:v]fade=t=in:st=0:d=1[v1]; [1:a]afade=t=in:st=0:d=1[a1]; \
             [v0][a0][v1][a1]concat=n=2:v=1:a=1[vout][aout]"
        );
    }

    #[test]
    fn graph_without_audio_is_video_only() {
        let windows = fade_windows(&secs(&[10.0, 10.0, 10.0]), Duration::from_millis(1500));
        let graph = build_blend_graph(&windows, false);
        assert!(!graph.contains("afade"));
        assert!(graph.contains("[1:v]fade=t=in:st=0:d=1.5,fade=t=out:st=8.5:d=1.5[v1]"));
        assert!(graph.ends_with("[v0][v1][v2]concat=n=3:v=1:a=0[vout]"));
    }

    #[test]
    fn command_maps_graph_outputs() {
        let windows = fade_windows(&secs(&[5.0, 5.0]), Duration::from_secs(1));
        let inputs = [Path::new("/w/a.mp4"), Path::new("/w/b.mp4")];
        let args = command_args(&build_blend_command(&inputs, &windows, true, Path::new("/o.mp4")));
        let joined = args.join(" ");
        assert!(joined.contains("-i /w/a.mp4 -i /w/b.mp4 -filter_complex"));
        assert!(joined.contains("-map [vout] -map [aout]"));
        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("-c:a aac -b:a 128k"));

        let video_only = command_args(&build_blend_command(&inputs, &windows, false, Path::new("/o.mp4")));
        assert!(!video_only.contains(&"[aout]".to_string()));
    }
}
