//! FFmpeg command builder utilities
//!
//! Small builders for the pieces every ffmpeg invocation in the pipeline
//! shares: the base command, comma-joined video filter chains and
//! colon-joined filter option lists such as `drawtext` parameters.

use crate::config::NormalizationTarget;
use ffmpeg_sidecar::command::FfmpegCommand;
use std::path::Path;

/// Builder for creating `FFmpeg` commands with common configurations
pub struct FfmpegCommandBuilder {
    cmd: FfmpegCommand,
    hide_banner: bool,
    overwrite: bool,
}

impl Default for FfmpegCommandBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegCommandBuilder {
    /// Creates a new `FFmpeg` command builder with sensible defaults
    #[must_use]
    pub fn new() -> Self {
        Self {
            cmd: FfmpegCommand::new(),
            hide_banner: true,
            overwrite: true,
        }
    }

    /// Sets whether to hide the `FFmpeg` banner
    #[must_use]
    pub fn with_hide_banner(mut self, hide: bool) -> Self {
        self.hide_banner = hide;
        self
    }

    /// Sets whether existing outputs are overwritten (`-y`)
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Runs ffmpeg from `dir`, so relative paths in filter options resolve there
    #[must_use]
    pub fn with_working_dir(mut self, dir: &Path) -> Self {
        self.cmd.as_inner_mut().current_dir(dir);
        self
    }

    /// Builds the `FFmpeg` command with all configured options
    #[must_use]
    pub fn build(mut self) -> FfmpegCommand {
        if self.hide_banner {
            self.cmd.arg("-hide_banner");
        }
        if self.overwrite {
            self.cmd.overwrite();
        }
        self.cmd
    }
}

/// Builder for constructing video filter chains
#[derive(Default)]
pub struct VideoFilterChain {
    filters: Vec<String>,
}

impl VideoFilterChain {
    /// Creates a new empty filter chain
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the scale, pad, SAR and frame rate filters that bring any input to `target`
    #[must_use]
    pub fn add_normalization(self, target: &NormalizationTarget) -> Self {
        let NormalizationTarget { width, height, fps } = *target;
        self.add_filter(format!(
            "scale={width}:{height}:force_original_aspect_ratio=decrease"
        ))
        .add_filter(format!("pad={width}:{height}:(ow-iw)/2:(oh-ih)/2"))
        .add_filter("setsar=1".to_string())
        .add_filter(format!("fps={fps}"))
        .add_filter("format=yuv420p".to_string())
    }

    /// Adds a custom filter to the chain
    #[must_use]
    pub fn add_filter(mut self, filter: String) -> Self {
        if !filter.is_empty() {
            self.filters.push(filter);
        }
        self
    }

    /// Builds the filter chain into a single filter string
    #[must_use]
    pub fn build(self) -> Option<String> {
        if self.filters.is_empty() {
            None
        } else {
            Some(self.filters.join(","))
        }
    }
}

/// Builds colon-separated `key=value` option lists for a single filter
#[derive(Default)]
pub struct FilterOptionsBuilder {
    name: String,
    params: Vec<(String, String)>,
}

impl FilterOptionsBuilder {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            params: Vec::new(),
        }
    }

    /// Adds an option. Values are escaped for use inside a filter graph.
    #[must_use]
    pub fn add_param(mut self, key: &str, value: &str) -> Self {
        self.params.push((key.to_string(), escape_filter_value(value)));
        self
    }

    /// Builds `name=k1=v1:k2=v2`
    #[must_use]
    pub fn build(self) -> String {
        let options = self
            .params
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(":");
        if options.is_empty() {
            self.name
        } else {
            format!("{}={}", self.name, options)
        }
    }
}

/// Escapes characters that would end a filter option value early.
fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | ':' | '\'' | ',' | ';' | '[' | ']') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Collects the arguments of a command, mostly for logging and tests.
pub fn command_args(cmd: &FfmpegCommand) -> Vec<String> {
    cmd.get_args()
        .map(|a| a.to_string_lossy().into_owned())
        .collect()
}
