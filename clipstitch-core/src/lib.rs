//! Core library for stitching clips cut from online videos into one video.
//!
//! Each reference in the input list points at a video and a start offset.
//! The pipeline fetches the origin, cuts the requested window, normalizes it
//! to a common format, optionally labels it with its position, and finally
//! joins all clips with or without cross-fades.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use clipstitch_core::{CoreConfigBuilder, default_orchestrator, preflight, read_reference_list};
//! use std::path::{Path, PathBuf};
//! use std::time::Duration;
//!
//! let config = CoreConfigBuilder::new()
//!     .output_file(PathBuf::from("highlights.mp4"))
//!     .clip_duration(Duration::from_secs(20))
//!     .build_validated()
//!     .unwrap();
//!
//! preflight(&config).unwrap();
//! let references = read_reference_list(Path::new("clips.txt")).unwrap();
//! let report = default_orchestrator(config).run(references).unwrap();
//! println!("{} clips, success: {}", report.succeeded.len(), report.is_success());
//! ```

pub mod assembly;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod external;
pub mod hardware_encode;
pub mod overlay;
pub mod pipeline;
pub mod reference;
pub mod segment;
pub mod temp_files;
pub mod util;
pub mod utils;

// Re-exports for public API
pub use assembly::{
    AssemblyEngine, AssemblyError, AssemblyOutcome, AssemblyPlan, AssemblyStrategy, CompositionMode,
};
pub use config::{CoreConfig, CoreConfigBuilder, NormalizationTarget, OffsetPolicy, RetryPolicy};
pub use discovery::{find_font_file, parse_reference_list, read_reference_list};
pub use error::{CoreError, CoreResult};
pub use events::{EventDispatcher, EventHandler, JsonEventHandler, LogEventHandler, RunEvent};
pub use external::{CrateFfprobeExecutor, SidecarSpawner, YtDlpFetcher};
pub use hardware_encode::{EncoderChoice, EncoderSelection};
pub use overlay::OverlayCompositor;
pub use pipeline::{
    FailedItem, Orchestrator, OverlayDegradation, RunEvents, RunOutcome, RunReport, SucceededItem,
};
pub use reference::{InvalidReference, ReferenceResolver, ReferenceShape, SourceReference};
pub use segment::{MaterializationError, MaterializeStage, Segment, SegmentMaterializer};
pub use utils::{format_bytes, format_duration};

use external::{REQUIRED_TOOLS, check_dependency};

/// Orchestrator wired to the real ffmpeg, ffprobe and yt-dlp.
pub type DefaultOrchestrator = Orchestrator<SidecarSpawner, CrateFfprobeExecutor, YtDlpFetcher>;

/// Builds an orchestrator using the real external tools.
pub fn default_orchestrator(config: CoreConfig) -> DefaultOrchestrator {
    let fetcher = YtDlpFetcher::new(config.fetch_timeout);
    Orchestrator::new(config, SidecarSpawner, CrateFfprobeExecutor::new(), fetcher)
}

/// What the one-time environment check found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightInfo {
    /// Tools that were found, in check order
    pub tools: Vec<String>,
    /// Encoders normalization will try
    pub encoder: String,
}

/// Checks that every external tool is installed and reports the encoder setup.
///
/// Meant to be called once per process before the first run.
pub fn preflight(config: &CoreConfig) -> CoreResult<PreflightInfo> {
    let mut tools = Vec::with_capacity(REQUIRED_TOOLS.len());
    for (tool, version_arg) in REQUIRED_TOOLS {
        check_dependency(tool, version_arg)?;
        tools.push((*tool).to_string());
    }

    let encoders = EncoderSelection::new(
        config.hardware_encoder.clone(),
        &config.software_preset,
        config.crf,
    );
    encoders.log_capabilities();
    Ok(PreflightInfo {
        tools,
        encoder: encoders.describe(),
    })
}
