//! Hardware encoder selection for segment normalization.
//!
//! Normalization tries an accelerated H.264 encoder first and falls back to
//! libx264. `VideoToolbox` is the accelerated encoder on macOS and NVENC
//! everywhere else. Once the accelerated encoder fails, it is switched off
//! for the remainder of the run so later segments go straight to software.
//! The orchestrator re-encodes any earlier accelerated segments before
//! assembly.

use ffmpeg_sidecar::command::FfmpegCommand;
use serde::Serialize;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};

/// Software encoder used when no accelerated encoder is usable.
pub const SOFTWARE_ENCODER: &str = "libx264";

/// Checks if the current platform is macOS.
#[must_use]
pub fn is_macos() -> bool {
    env::consts::OS == "macos"
}

/// The accelerated encoder for the current platform.
#[must_use]
pub fn default_hardware_encoder() -> Option<&'static str> {
    if is_macos() {
        Some("h264_videotoolbox")
    } else {
        Some("h264_nvenc")
    }
}

/// Encoder that produced (or will produce) a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EncoderChoice {
    Hardware(String),
    Software { preset: String, crf: u8 },
}

impl EncoderChoice {
    pub fn codec_name(&self) -> &str {
        match self {
            EncoderChoice::Hardware(name) => name,
            EncoderChoice::Software { .. } => SOFTWARE_ENCODER,
        }
    }

    pub fn is_hardware(&self) -> bool {
        matches!(self, EncoderChoice::Hardware(_))
    }

    /// Adds the video codec arguments for this encoder.
    pub fn apply_to(&self, cmd: &mut FfmpegCommand) {
        match self {
            EncoderChoice::Hardware(name) => {
                cmd.args(["-c:v", name.as_str()]);
                if name.ends_with("_nvenc") {
                    cmd.args(["-preset", "fast"]);
                }
                // Accelerated encoders do not read -crf; ask for a comparable quality level
                if name.ends_with("_videotoolbox") {
                    cmd.args(["-q:v", "65"]);
                } else {
                    cmd.args(["-cq", "23"]);
                }
            }
            EncoderChoice::Software { preset, crf } => {
                cmd.args(["-c:v", SOFTWARE_ENCODER]);
                cmd.args(["-preset", preset.as_str()]);
                cmd.args(["-crf", &crf.to_string()]);
            }
        }
    }
}

/// Run-wide encoder selection with a sticky hardware failure flag.
#[derive(Debug)]
pub struct EncoderSelection {
    hardware: Option<String>,
    hardware_disabled: AtomicBool,
    software_preset: String,
    crf: u8,
}

impl EncoderSelection {
    pub fn new(hardware: Option<String>, software_preset: &str, crf: u8) -> Self {
        Self {
            hardware,
            hardware_disabled: AtomicBool::new(false),
            software_preset: software_preset.to_string(),
            crf,
        }
    }

    /// Encoders to try in order for the next normalization.
    pub fn candidates(&self) -> Vec<EncoderChoice> {
        let mut choices = Vec::with_capacity(2);
        if let Some(name) = self.hardware.as_ref() {
            if !self.hardware_disabled.load(Ordering::Relaxed) {
                choices.push(EncoderChoice::Hardware(name.clone()));
            }
        }
        choices.push(self.software());
        choices
    }

    pub fn software(&self) -> EncoderChoice {
        EncoderChoice::Software {
            preset: self.software_preset.clone(),
            crf: self.crf,
        }
    }

    /// Stops offering the accelerated encoder. Returns true the first time.
    pub fn disable_hardware(&self) -> bool {
        !self.hardware_disabled.swap(true, Ordering::Relaxed)
    }

    /// Human-readable description for status output.
    pub fn describe(&self) -> String {
        match self.hardware.as_ref() {
            Some(name) if !self.hardware_disabled.load(Ordering::Relaxed) => {
                format!("{name} (fallback {SOFTWARE_ENCODER})")
            }
            _ => SOFTWARE_ENCODER.to_string(),
        }
    }

    /// Logs which encoders will be tried.
    pub fn log_capabilities(&self) {
        log::info!("Normalization encoder: {}", self.describe());
    }
}
