//! Configuration structures and constants for the clipstitch-core library.
//!
//! `CoreConfig` carries every knob the pipeline reads: where the output goes,
//! how long each clip is, whether clips are blended, the normalization
//! target, retry behaviour for fetching and the worker count.

mod builder;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::hardware_encode;

pub use builder::CoreConfigBuilder;

// Default constants

/// Default output file name.
pub const DEFAULT_OUTPUT_FILE: &str = "final_output.mp4";

/// Default length of every clip, in seconds.
pub const DEFAULT_CLIP_DURATION_SECS: u64 = 30;

/// Default cross-fade length, in milliseconds.
pub const DEFAULT_TRANSITION_MS: u64 = 1000;

/// Default directory searched (recursively) for the overlay font.
pub const DEFAULT_FONTS_DIR: &str = "assets/fonts";

/// Normalization target.
pub const DEFAULT_TARGET_WIDTH: u32 = 1920;
pub const DEFAULT_TARGET_HEIGHT: u32 = 1080;
pub const DEFAULT_TARGET_FPS: u32 = 30;

/// Software encoder settings used for normalization.
pub const DEFAULT_SOFTWARE_PRESET: &str = "ultrafast";
pub const DEFAULT_CRF: u8 = 23;

/// Origin page for a source id. `{id}` is replaced with the id.
pub const DEFAULT_ORIGIN_URL_TEMPLATE: &str = "https://www.youtube.com/watch?v={id}";

/// Upper bound for `workers = 0` (auto).
pub const MAX_AUTO_WORKERS: usize = 4;

/// What to do when a reference carries no start offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OffsetPolicy {
    /// Start at the beginning of the origin.
    #[default]
    DefaultZero,
    /// Reject the reference.
    Require,
}

/// Backoff schedule wrapped around the fetch step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Must be at least 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: f64,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes a single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` is 1-based.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = secs.min(self.max_backoff.as_secs_f64());
        if capped.is_finite() && capped > 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            Duration::ZERO
        }
    }
}

/// Resolution, frame rate and codec every segment is normalized to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationTarget {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for NormalizationTarget {
    fn default() -> Self {
        Self {
            width: DEFAULT_TARGET_WIDTH,
            height: DEFAULT_TARGET_HEIGHT,
            fps: DEFAULT_TARGET_FPS,
        }
    }
}

/// Main configuration structure for the clipstitch-core library.
///
/// Usually built by the CLI through [`CoreConfigBuilder`] and validated once
/// before a run starts.
///
/// # Examples
///
/// ```rust
/// use clipstitch_core::config::CoreConfigBuilder;
/// use std::path::PathBuf;
/// use std::time::Duration;
///
/// let config = CoreConfigBuilder::new()
///     .output_file(PathBuf::from("out.mp4"))
///     .clip_duration(Duration::from_secs(10))
///     .use_transitions(false)
///     .build();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Final assembled video
    pub output_file: PathBuf,

    /// Base directory for the per-run working directory (system temp dir if unset)
    pub temp_dir: Option<PathBuf>,

    /// Requested length of every clip
    pub clip_duration: Duration,

    /// Blend clips with fades instead of stream-copy concatenation
    pub use_transitions: bool,

    /// Fade length at every clip boundary
    pub transition_duration: Duration,

    /// Burn a 1-based clip number into every clip
    pub enable_overlay: bool,

    /// Directory searched for a .ttf/.otf/.ttc font
    pub fonts_dir: PathBuf,

    pub target: NormalizationTarget,

    /// Accelerated encoder tried before the software one. `None` disables it.
    pub hardware_encoder: Option<String>,

    pub software_preset: String,

    pub crf: u8,

    pub offset_policy: OffsetPolicy,

    pub retry: RetryPolicy,

    /// Kill a fetch that runs longer than this
    pub fetch_timeout: Option<Duration>,

    /// Fetch only the requested window instead of the whole origin
    pub windowed_fetch: bool,

    /// Concurrent materializations. 1 is sequential, 0 picks a value.
    pub workers: usize,

    pub origin_url_template: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            output_file: PathBuf::from(DEFAULT_OUTPUT_FILE),
            temp_dir: None,
            clip_duration: Duration::from_secs(DEFAULT_CLIP_DURATION_SECS),
            use_transitions: true,
            transition_duration: Duration::from_millis(DEFAULT_TRANSITION_MS),
            enable_overlay: true,
            fonts_dir: PathBuf::from(DEFAULT_FONTS_DIR),
            target: NormalizationTarget::default(),
            hardware_encoder: hardware_encode::default_hardware_encoder().map(str::to_string),
            software_preset: DEFAULT_SOFTWARE_PRESET.to_string(),
            crf: DEFAULT_CRF,
            offset_policy: OffsetPolicy::default(),
            retry: RetryPolicy::default(),
            fetch_timeout: None,
            windowed_fetch: false,
            workers: 1,
            origin_url_template: DEFAULT_ORIGIN_URL_TEMPLATE.to_string(),
        }
    }
}

impl CoreConfig {
    /// Checks the configuration for values the pipeline cannot work with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.clip_duration.is_zero() {
            return Err(CoreError::Config("clip duration must be greater than zero".into()));
        }

        if self.use_transitions {
            if self.transition_duration.is_zero() {
                return Err(CoreError::Config(
                    "transition duration must be greater than zero".into(),
                ));
            }
            if self.transition_duration >= self.clip_duration {
                return Err(CoreError::Config(format!(
                    "transition duration ({:.2}s) must be shorter than the clip duration ({:.2}s)",
                    self.transition_duration.as_secs_f64(),
                    self.clip_duration.as_secs_f64()
                )));
            }
        }

        let NormalizationTarget { width, height, fps } = self.target;
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(CoreError::Config(format!(
                "target resolution {width}x{height} must be non-zero and even"
            )));
        }
        if fps == 0 {
            return Err(CoreError::Config("target frame rate must be greater than zero".into()));
        }

        if self.crf > 51 {
            return Err(CoreError::Config(format!(
                "CRF {} is out of range (0-51)",
                self.crf
            )));
        }

        if self.retry.max_attempts == 0 {
            return Err(CoreError::Config("retry policy needs at least one attempt".into()));
        }
        if self.retry.backoff_multiplier.is_nan() || self.retry.backoff_multiplier < 1.0 {
            return Err(CoreError::Config(
                "backoff multiplier must be at least 1.0".into(),
            ));
        }

        if !self.origin_url_template.contains("{id}") {
            return Err(CoreError::Config(format!(
                "origin URL template '{}' has no {{id}} placeholder",
                self.origin_url_template
            )));
        }

        Ok(())
    }

    /// Number of workers actually used for materialization.
    pub fn effective_workers(&self) -> usize {
        match self.workers {
            0 => num_cpus::get().clamp(1, MAX_AUTO_WORKERS),
            n => n,
        }
    }

    /// Origin page URL for a source id.
    pub fn origin_url(&self, source_id: &str) -> String {
        self.origin_url_template.replace("{id}", source_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.clip_duration, Duration::from_secs(30));
        assert_eq!(config.transition_duration, Duration::from_secs(1));
        assert!(config.use_transitions);
        assert_eq!(config.workers, 1);
    }

    #[test]
    fn transition_not_shorter_than_clip_is_rejected() {
        let config = CoreConfig {
            clip_duration: Duration::from_secs(2),
            transition_duration: Duration::from_secs(2),
            ..CoreConfig::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));

        // Only checked when blending
        let plain = CoreConfig {
            use_transitions: false,
            ..config
        };
        assert!(plain.validate().is_ok());
    }

    #[test]
    fn odd_resolution_is_rejected() {
        let config = CoreConfig {
            target: NormalizationTarget {
                width: 1279,
                height: 720,
                fps: 30,
            },
            ..CoreConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(3),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(3));
        assert_eq!(policy.backoff_for(4), Duration::from_secs(3));
    }

    #[test]
    fn origin_url_substitutes_id() {
        let config = CoreConfig::default();
        assert_eq!(
            config.origin_url("abc123"),
            "https://www.youtube.com/watch?v=abc123"
        );
    }
}
