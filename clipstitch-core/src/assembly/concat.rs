//! Plain concatenation through ffmpeg's concat demuxer.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use ffmpeg_sidecar::command::FfmpegCommand;

use crate::error::CoreResult;
use crate::external::FfmpegCommandBuilder;
use crate::segment::Segment;

/// File name of the manifest inside the working directory.
pub const CONCAT_MANIFEST: &str = "concat_list.txt";

/// Quotes a path for a concat manifest line.
fn quote(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', "'\\''"))
}

/// Manifest text listing `segments` in order.
pub fn manifest_contents(segments: &[Segment]) -> String {
    segments.iter().fold(String::new(), |mut out, segment| {
        let _ = writeln!(out, "file {}", quote(&segment.path));
        out
    })
}

/// Writes the manifest for `segments` into `work_dir` and returns its path.
pub fn write_concat_manifest(work_dir: &Path, segments: &[Segment]) -> CoreResult<PathBuf> {
    let path = work_dir.join(CONCAT_MANIFEST);
    std::fs::write(&path, manifest_contents(segments))?;
    log::debug!("Wrote concat manifest with {} entries to {}", segments.len(), path.display());
    Ok(path)
}

/// `ffmpeg -f concat -safe 0 -i <manifest> -c copy ... <output>`
pub fn build_concat_command(manifest: &Path, output: &Path) -> FfmpegCommand {
    let mut cmd = FfmpegCommandBuilder::new().build();
    cmd.args(["-f", "concat", "-safe", "0"]);
    cmd.input(manifest.to_string_lossy().as_ref());
    cmd.args(["-c", "copy"]);
    cmd.args(["-avoid_negative_ts", "make_zero"]);
    cmd.args(["-movflags", "+faststart"]);
    cmd.output(output.to_string_lossy().as_ref());
    cmd
}
