//! Clip number overlay.
//!
//! Burns a 1-based label into the top-left corner of a segment with
//! ffmpeg's `drawtext` filter. The font is copied into the working directory
//! and referenced by bare file name, with ffmpeg started from that
//! directory, which keeps font paths out of the filter string.
//!
//! Overlay is decoration: every failure leaves the segment exactly as the
//! materializer produced it.

use std::path::{Path, PathBuf};

use ffmpeg_sidecar::command::FfmpegCommand;

use crate::discovery::find_font_file;
use crate::error::{CoreError, CoreResult};
use crate::external::{FfmpegCommandBuilder, FfmpegSpawner, FilterOptionsBuilder, run_ffmpeg};
use crate::segment::Segment;
use crate::temp_files::create_temp_file_path;

/// Label position and style.
pub const LABEL_X: u32 = 24;
pub const LABEL_Y: u32 = 24;
pub const LABEL_FONT_SIZE: u32 = 96;

/// Burns labels into segments using one font for the whole run.
#[derive(Debug, Clone)]
pub struct OverlayCompositor {
    work_dir: PathBuf,
    font_name: String,
}

impl OverlayCompositor {
    /// Locates a font under `fonts_dir` and copies it into `work_dir`.
    ///
    /// An error here means overlay is skipped for the whole run.
    pub fn prepare(fonts_dir: &Path, work_dir: &Path) -> CoreResult<Self> {
        let font = find_font_file(fonts_dir)?.ok_or_else(|| {
            CoreError::Overlay(format!(
                "no .ttf, .otf or .ttc font found under {}",
                fonts_dir.display()
            ))
        })?;

        let extension = font
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("ttf")
            .to_ascii_lowercase();
        let font_name = format!("overlay_font.{extension}");
        std::fs::copy(&font, work_dir.join(&font_name)).map_err(|e| {
            CoreError::Overlay(format!("failed to copy font {}: {}", font.display(), e))
        })?;

        log::info!("Clip labels use font {}", font.display());
        Ok(Self {
            work_dir: work_dir.to_path_buf(),
            font_name,
        })
    }

    /// The `drawtext` filter for `label`.
    pub fn drawtext_filter(&self, label: usize) -> String {
        FilterOptionsBuilder::new("drawtext")
            .add_param("fontfile", &self.font_name)
            .add_param("text", &label.to_string())
            .add_param("x", &LABEL_X.to_string())
            .add_param("y", &LABEL_Y.to_string())
            .add_param("fontsize", &LABEL_FONT_SIZE.to_string())
            .add_param("fontcolor", "white")
            .add_param("box", "1")
            .add_param("boxcolor", "black@0.5")
            .add_param("boxborderw", "10")
            .build()
    }

    /// Builds the re-encode command writing the labeled copy of `segment` to `output`.
    pub fn build_command(&self, segment: &Segment, label: usize, output: &Path) -> FfmpegCommand {
        let mut cmd = FfmpegCommandBuilder::new()
            .with_working_dir(&self.work_dir)
            .build();
        cmd.input(segment.path.to_string_lossy().as_ref());
        cmd.args(["-map", "0:v:0", "-map", "0:a:0?"]);
        cmd.args(["-vf", &self.drawtext_filter(label)]);
        segment.params.encoder.apply_to(&mut cmd);
        cmd.args(["-pix_fmt", "yuv420p"]);
        cmd.args(["-c:a", "copy"]);
        cmd.args(["-movflags", "+faststart"]);
        cmd.output(output.to_string_lossy().as_ref());
        cmd
    }

    /// Burns `label` into `segment`, replacing its file on success.
    ///
    /// On failure the temporary output is removed and the segment file is untouched.
    pub fn overlay<S: FfmpegSpawner>(
        &self,
        spawner: &S,
        segment: &Segment,
        label: usize,
    ) -> CoreResult<Segment> {
        let temp_output = create_temp_file_path(&self.work_dir, "overlay", "mp4");
        let cmd = self.build_command(segment, label, &temp_output);

        let result = run_ffmpeg(spawner, cmd, "ffmpeg (overlay)")
            .and_then(|()| std::fs::rename(&temp_output, &segment.path).map_err(CoreError::from));

        match result {
            Ok(()) => {
                log::debug!("Labeled {} as {}", segment.path.display(), label);
                Ok(Segment {
                    labeled: true,
                    ..segment.clone()
                })
            }
            Err(e) => {
                let _ = std::fs::remove_file(&temp_output);
                Err(CoreError::Overlay(e.to_string()))
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::NormalizationTarget;
    use crate::external::AudioPresence;
    use crate::external::ffmpeg_builder::command_args;
    use crate::external::mocks::MockFfmpegSpawner;
    use crate::hardware_encode::EncoderChoice;
    use crate::segment::NormalizationParams;
    use std::time::Duration;
    use tempfile::tempdir;

    fn segment_in(dir: &Path) -> Segment {
        let path = dir.join("clip_000_abc.mp4");
        std::fs::write(&path, b"original").unwrap();
        Segment {
            path,
            sequence: 1,
            input_index: 0,
            source_id: "abc".into(),
            requested_duration: Duration::from_secs(30),
            params: NormalizationParams::new(
                &NormalizationTarget::default(),
                EncoderChoice::Software {
                    preset: "ultrafast".into(),
                    crf: 23,
                },
            ),
            audio: AudioPresence::Present,
            labeled: false,
        }
    }

    fn fonts_dir() -> tempfile::TempDir {
        let fonts = tempdir().unwrap();
        std::fs::create_dir_all(fonts.path().join("nested")).unwrap();
        std::fs::write(fonts.path().join("nested/Label.TTF"), b"font").unwrap();
        fonts
    }

    #[test]
    fn missing_font_skips_overlay() {
        let fonts = tempdir().unwrap();
        let work = tempdir().unwrap();
        let err = OverlayCompositor::prepare(fonts.path(), work.path()).unwrap_err();
        assert!(matches!(err, CoreError::Overlay(_)));
    }

    #[test]
    fn drawtext_filter_uses_copied_font() {
        let fonts = fonts_dir();
        let work = tempdir().unwrap();
        let compositor = OverlayCompositor::prepare(fonts.path(), work.path()).unwrap();
        assert!(work.path().join("overlay_font.ttf").exists());
        assert_eq!(
            compositor.drawtext_filter(3),
            "drawtext=fontfile=overlay_font.ttf:text=3:x=24:y=24:fontsize=96:fontcolor=white:\
             box=1:boxcolor=black@0.5:boxborderw=10"
        );
    }

    #[test]
    fn overlay_replaces_segment_on_success() {
        let fonts = fonts_dir();
        let work = tempdir().unwrap();
        let compositor = OverlayCompositor::prepare(fonts.path(), work.path()).unwrap();
        let segment = segment_in(work.path());
        let spawner = MockFfmpegSpawner::succeeding();

        let labeled = compositor.overlay(&spawner, &segment, 1).unwrap();
        assert!(labeled.labeled);
        assert_eq!(labeled.path, segment.path);
        assert_eq!(std::fs::read(&segment.path).unwrap(), b"mock media");

        let args = &spawner.get_received_calls()[0];
        assert!(args.iter().any(|a| a.starts_with("drawtext=")));
        assert!(args.join(" ").contains("-c:v libx264"));
    }

    #[test]
    fn overlay_failure_leaves_segment_untouched() {
        let fonts = fonts_dir();
        let work = tempdir().unwrap();
        let compositor = OverlayCompositor::prepare(fonts.path(), work.path()).unwrap();
        let segment = segment_in(work.path());
        let spawner = MockFfmpegSpawner::new();
        spawner.add_exit_error_with_output_expectation("drawtext", "Cannot find a valid font", 1);

        let err = compositor.overlay(&spawner, &segment, 2).unwrap_err();
        assert!(err.to_string().contains("Cannot find a valid font"));
        assert_eq!(std::fs::read(&segment.path).unwrap(), b"original");

        let leftovers: Vec<_> = std::fs::read_dir(work.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("overlay_") && e.file_name() != "overlay_font.ttf")
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn command_runs_from_work_dir() {
        let fonts = fonts_dir();
        let work = tempdir().unwrap();
        let compositor = OverlayCompositor::prepare(fonts.path(), work.path()).unwrap();
        let segment = segment_in(work.path());
        let out = work.path().join("labeled.mp4");
        let args = command_args(&compositor.build_command(&segment, 5, &out));
        assert_eq!(args.last().unwrap(), &out.to_string_lossy().into_owned());
        assert!(args.iter().any(|a| a.contains("text=5")));
    }
}
