// ============================================================================
// clipstitch-core/src/external/fetcher.rs
// ============================================================================
//
// ORIGIN FETCHER: Retrieval of Origin Media
//
// Downloads the media a reference points at into the run's working
// directory. The default implementation drives yt-dlp. A fetcher makes a
// single attempt per call; retries are the caller's business.
//
// KEY COMPONENTS:
// - FetchRequest / OriginAsset: what to fetch and where it landed
// - OriginFetcher: trait the materializer fetches through
// - YtDlpFetcher: yt-dlp backed implementation

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::error::{CoreError, CoreResult};
use crate::util::run_command_with_timeout;

/// Format ladder: best video up to 1080p with audio, then progressively simpler.
pub const YT_DLP_FORMAT: &str = "bestvideo[height<=1080]+bestaudio/bestvideo[height<=720]+bestaudio/best[height<=1080]/best[height<=720]/best";

/// A time window inside the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: Duration,
    pub duration: Duration,
}

/// What to fetch and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub source_id: String,
    /// Page URL of the origin
    pub url: String,
    /// Directory receiving the asset
    pub dest_dir: PathBuf,
    /// File stem of the asset; the fetcher picks the extension
    pub stem: String,
    /// Only fetch this window when set
    pub window: Option<FetchWindow>,
}

/// A fetched origin file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginAsset {
    pub path: PathBuf,
    /// Offset within the origin at which this file begins
    pub starts_at: Duration,
}

/// Something that can retrieve origin media.
pub trait OriginFetcher: Send + Sync {
    fn fetch(&self, request: &FetchRequest) -> CoreResult<OriginAsset>;
}

/// `OriginFetcher` backed by the yt-dlp command-line tool.
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    binary: String,
    timeout: Option<Duration>,
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self::new(None)
    }
}

impl YtDlpFetcher {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            timeout,
        }
    }

    /// Uses a yt-dlp binary other than the one on `PATH`.
    pub fn with_binary(mut self, binary: &str) -> Self {
        self.binary = binary.to_string();
        self
    }

    /// Arguments for one fetch, without the program name.
    pub fn build_args(request: &FetchRequest) -> Vec<String> {
        let template = request
            .dest_dir
            .join(format!("{}.%(ext)s", request.stem))
            .to_string_lossy()
            .into_owned();

        let mut args = vec![
            "-f".to_string(),
            YT_DLP_FORMAT.to_string(),
            "--merge-output-format".to_string(),
            "mp4".to_string(),
            "--concurrent-fragments".to_string(),
            "4".to_string(),
            "--no-playlist".to_string(),
            "--no-progress".to_string(),
        ];

        if let Some(window) = request.window {
            let start = window.start.as_secs_f64();
            let end = start + window.duration.as_secs_f64();
            args.push("--download-sections".to_string());
            args.push(format!("*{start:.3}-{end:.3}"));
        }

        args.push("-o".to_string());
        args.push(template);
        args.push(request.url.clone());
        args
    }
}

impl OriginFetcher for YtDlpFetcher {
    fn fetch(&self, request: &FetchRequest) -> CoreResult<OriginAsset> {
        log::info!("Fetching {} from {}", request.source_id, request.url);

        let mut cmd = Command::new(&self.binary);
        cmd.args(Self::build_args(request));
        run_command_with_timeout(&mut cmd, "yt-dlp", self.timeout)?;

        let path = find_fetched_file(&request.dest_dir, &request.stem)?
            .ok_or_else(|| CoreError::FetchOutputMissing(request.source_id.clone()))?;

        log::debug!("Fetched {} to {}", request.source_id, path.display());
        Ok(OriginAsset {
            path,
            starts_at: request.window.map_or(Duration::ZERO, |w| w.start),
        })
    }
}

/// Finds `<stem>.<ext>` in `dir`, ignoring yt-dlp's partial downloads.
pub fn find_fetched_file(dir: &Path, stem: &str) -> CoreResult<Option<PathBuf>> {
    let prefix = format!("{stem}.");
    let mut matches: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            let name = path.file_name()?.to_str()?;
            let is_partial = name.ends_with(".part") || name.ends_with(".ytdl");
            (path.is_file() && name.starts_with(&prefix) && !is_partial).then_some(path)
        })
        .collect();
    matches.sort();
    Ok(matches.into_iter().next())
}
