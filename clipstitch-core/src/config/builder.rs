// ============================================================================
// clipstitch-core/src/config/builder.rs
// ============================================================================
//
// CONFIGURATION BUILDER: Builder Pattern for CoreConfig
//
// Fluent construction of `CoreConfig`. Every setter starts from the library
// defaults, so callers only name what they want to change. `build` does not
// validate; call `CoreConfig::validate` (or `build_validated`) before a run.

use std::path::PathBuf;
use std::time::Duration;

use super::{CoreConfig, NormalizationTarget, OffsetPolicy, RetryPolicy};
use crate::error::CoreResult;

/// Builder for creating CoreConfig instances.
///
/// # Examples
///
/// ```rust
/// use clipstitch_core::config::{CoreConfigBuilder, OffsetPolicy};
/// use std::time::Duration;
///
/// let config = CoreConfigBuilder::new()
///     .clip_duration(Duration::from_secs(12))
///     .transition_duration(Duration::from_millis(500))
///     .offset_policy(OffsetPolicy::Require)
///     .workers(2)
///     .build_validated()
///     .unwrap();
/// assert_eq!(config.workers, 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CoreConfigBuilder {
    config: CoreConfig,
}

impl CoreConfigBuilder {
    /// Creates a new builder holding the library defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the final output file.
    pub fn output_file(mut self, output_file: PathBuf) -> Self {
        self.config.output_file = output_file;
        self
    }

    /// Sets the base directory for the per-run working directory.
    pub fn temp_dir(mut self, temp_dir: PathBuf) -> Self {
        self.config.temp_dir = Some(temp_dir);
        self
    }

    /// Sets the requested length of every clip.
    pub fn clip_duration(mut self, duration: Duration) -> Self {
        self.config.clip_duration = duration;
        self
    }

    /// Enables or disables cross-fade blending.
    pub fn use_transitions(mut self, enable: bool) -> Self {
        self.config.use_transitions = enable;
        self
    }

    /// Sets the fade length at clip boundaries.
    pub fn transition_duration(mut self, duration: Duration) -> Self {
        self.config.transition_duration = duration;
        self
    }

    /// Enables or disables the clip number overlay.
    pub fn enable_overlay(mut self, enable: bool) -> Self {
        self.config.enable_overlay = enable;
        self
    }

    /// Sets the directory searched for the overlay font.
    pub fn fonts_dir(mut self, fonts_dir: PathBuf) -> Self {
        self.config.fonts_dir = fonts_dir;
        self
    }

    /// Sets the normalization target.
    pub fn target(mut self, width: u32, height: u32, fps: u32) -> Self {
        self.config.target = NormalizationTarget { width, height, fps };
        self
    }

    /// Overrides the accelerated encoder. `None` uses software only.
    pub fn hardware_encoder(mut self, encoder: Option<&str>) -> Self {
        self.config.hardware_encoder = encoder.map(str::to_string);
        self
    }

    /// Sets the libx264 preset.
    pub fn software_preset(mut self, preset: &str) -> Self {
        self.config.software_preset = preset.to_string();
        self
    }

    /// Sets the libx264 CRF.
    pub fn crf(mut self, crf: u8) -> Self {
        self.config.crf = crf;
        self
    }

    pub fn offset_policy(mut self, policy: OffsetPolicy) -> Self {
        self.config.offset_policy = policy;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Sets the total number of fetch attempts, keeping the backoff schedule.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.retry.max_attempts = attempts;
        self
    }

    pub fn fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.fetch_timeout = timeout;
        self
    }

    pub fn windowed_fetch(mut self, enable: bool) -> Self {
        self.config.windowed_fetch = enable;
        self
    }

    /// Sets the worker count (1 = sequential, 0 = auto).
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn origin_url_template(mut self, template: &str) -> Self {
        self.config.origin_url_template = template.to_string();
        self
    }

    /// Builds the CoreConfig instance.
    pub fn build(self) -> CoreConfig {
        self.config
    }

    /// Builds and validates the CoreConfig instance.
    pub fn build_validated(self) -> CoreResult<CoreConfig> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_only_named_fields() {
        let config = CoreConfigBuilder::new()
            .output_file(PathBuf::from("/tmp/out.mp4"))
            .use_transitions(false)
            .crf(28)
            .build();

        assert_eq!(config.output_file, PathBuf::from("/tmp/out.mp4"));
        assert!(!config.use_transitions);
        assert_eq!(config.crf, 28);
        assert_eq!(config.clip_duration, Duration::from_secs(30));
        assert_eq!(config.software_preset, "ultrafast");
    }

    #[test]
    fn build_validated_reports_errors() {
        let result = CoreConfigBuilder::new()
            .clip_duration(Duration::from_secs(1))
            .transition_duration(Duration::from_secs(5))
            .build_validated();
        assert!(result.is_err());
    }
}
