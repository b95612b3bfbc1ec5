// ============================================================================
// clipstitch-core/src/external/mod.rs
// ============================================================================
//
// EXTERNAL TOOLS: Interactions with External CLI Tools
//
// Everything the pipeline asks of the outside world goes through a trait in
// this module: spawning ffmpeg (FfmpegSpawner), probing media
// (FfprobeExecutor) and retrieving origin media (OriginFetcher). The default
// implementations use ffmpeg-sidecar, the ffprobe crate and yt-dlp; tests
// substitute the mocks.
//
// AI-ASSISTANT-INFO: External tool interactions and abstractions for ffmpeg/ffprobe/yt-dlp

// ---- Internal crate imports ----
use crate::error::{CoreError, CoreResult};

// ---- Standard library imports ----
use std::io;
use std::process::{Command, Stdio};

// ============================================================================
// SUBMODULES
// ============================================================================

/// Builders for ffmpeg commands and filter strings
pub mod ffmpeg_builder;

/// Traits and implementations for executing ffmpeg commands
pub mod ffmpeg_executor;

/// Traits and implementations for probing media with ffprobe
pub mod ffprobe_executor;

/// Origin media retrieval
pub mod fetcher;

#[cfg(all(unix, any(test, feature = "test-mocks")))]
pub mod mocks;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use fetcher::{FetchRequest, FetchWindow, OriginAsset, OriginFetcher, YtDlpFetcher};
pub use ffmpeg_builder::{FfmpegCommandBuilder, FilterOptionsBuilder, VideoFilterChain};
pub use ffmpeg_executor::{FfmpegProcess, FfmpegSpawner, SidecarProcess, SidecarSpawner, run_ffmpeg};
pub use ffprobe_executor::{AudioPresence, CrateFfprobeExecutor, FfprobeExecutor, MediaProbe};

// ============================================================================
// DEPENDENCY CHECKING
// ============================================================================

/// Checks if a required external command is available and executable.
///
/// Runs `cmd_name version_arg` and only looks at whether the process could
/// be started. ffmpeg and ffprobe take `-version`, yt-dlp takes `--version`.
///
/// # Returns
///
/// * `Ok(())` - If the command could be started
/// * `Err(CoreError::DependencyNotFound)` - If the command is not found
/// * `Err(CoreError::CommandStart)` - If the command exists but fails to start
pub fn check_dependency(cmd_name: &str, version_arg: &str) -> CoreResult<()> {
    let result = Command::new(cmd_name)
        .arg(version_arg)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match result {
        Ok(_) => {
            log::debug!("Found dependency: {cmd_name}");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::warn!("Dependency '{cmd_name}' not found.");
            Err(CoreError::DependencyNotFound(cmd_name.to_string()))
        }
        Err(e) => {
            log::error!("Failed to start dependency check command '{cmd_name}': {e}");
            Err(CoreError::CommandStart(cmd_name.to_string(), e))
        }
    }
}

/// The external tools a full run needs, with their version flags.
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("ffmpeg", "-version"),
    ("ffprobe", "-version"),
    ("yt-dlp", "--version"),
];
