// ============================================================================
// clipstitch-cli/src/cli.rs
// ============================================================================
//
// COMMAND-LINE INTERFACE: Argument Definitions
//
// This file defines the command-line interface structure using clap. It
// declares the available subcommands and their arguments, including
// environment variable fallbacks for the options users tend to pin.
//
// KEY COMPONENTS:
// - Cli: Top-level parser with the global verbosity and color flags
// - Commands: Enum of available subcommands (stitch, inspect, check)
// - StitchArgs / InspectArgs: Per-command arguments
//
// AI-ASSISTANT-INFO: Command-line argument definitions using clap

// ---- External crate imports ----
use clap::{Args, Parser, Subcommand};

// ---- Internal crate imports ----
use clipstitch_core::config::{DEFAULT_FONTS_DIR, DEFAULT_OUTPUT_FILE};

// ---- Standard library imports ----
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// CLI STRUCTURE
// ============================================================================

/// Main CLI structure.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Clipstitch: joins timestamped video clips into one video",
    long_about = "Fetches each referenced video, cuts a clip at its timestamp, normalizes \
                  the clips to one format and joins them, optionally with cross-fades and \
                  burned-in clip numbers."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output for troubleshooting
    #[arg(short, long, global = true, env = "CLIPSTITCH_VERBOSE")]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Builds one video from a list of timestamped references
    Stitch(StitchArgs),

    /// Resolves a reference list without fetching anything
    Inspect(InspectArgs),

    /// Checks that ffmpeg, ffprobe and yt-dlp are installed
    Check,
}

// ============================================================================
// STITCH ARGUMENTS
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct StitchArgs {
    /// Text file with one reference per line
    #[arg(short = 'i', long = "input", value_name = "LIST_FILE", env = "CLIPSTITCH_INPUT")]
    pub input_list: PathBuf,

    /// Output video file
    #[arg(
        short = 'o',
        long = "output",
        value_name = "OUTPUT_FILE",
        default_value = DEFAULT_OUTPUT_FILE,
        env = "CLIPSTITCH_OUTPUT"
    )]
    pub output_file: PathBuf,

    /// Length of each clip in seconds
    #[arg(
        long,
        value_name = "SECONDS",
        value_parser = parse_seconds_arg,
        default_value = "30",
        env = "CLIPSTITCH_CLIP_DURATION"
    )]
    pub clip_duration: Duration,

    /// Join clips back to back instead of cross-fading
    #[arg(long)]
    pub no_transitions: bool,

    /// Cross-fade length in seconds
    #[arg(
        long = "transition",
        value_name = "SECONDS",
        value_parser = parse_seconds_arg,
        default_value = "1"
    )]
    pub transition: Duration,

    /// Do not burn clip numbers into the clips
    #[arg(long)]
    pub no_overlay: bool,

    /// Directory holding the label font
    #[arg(
        long,
        value_name = "DIR",
        default_value = DEFAULT_FONTS_DIR,
        env = "CLIPSTITCH_FONTS_DIR"
    )]
    pub fonts_dir: PathBuf,

    /// Clips materialized at once (0 picks a value from the CPU count)
    #[arg(long, value_name = "N", default_value_t = 1, env = "CLIPSTITCH_WORKERS")]
    pub workers: usize,

    /// Extra fetch attempts after the first failure
    #[arg(long, value_name = "N", default_value_t = 2)]
    pub retries: u32,

    /// Give up on a single fetch after this many seconds
    #[arg(long, value_name = "SECONDS", value_parser = parse_seconds_arg)]
    pub fetch_timeout: Option<Duration>,

    /// Download only the clip window instead of the whole video
    #[arg(long)]
    pub windowed_fetch: bool,

    /// Reject references without an explicit timestamp
    #[arg(long)]
    pub require_timestamp: bool,

    /// Never try the hardware encoder
    #[arg(long)]
    pub software_only: bool,

    /// Scratch space for the run (defaults to the system temp directory)
    #[arg(long, value_name = "DIR", env = "CLIPSTITCH_TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Print run events as JSON lines instead of the styled progress view
    #[arg(long)]
    pub json: bool,

    /// Directory for the run log file
    #[arg(long, value_name = "DIR", env = "CLIPSTITCH_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

// ============================================================================
// INSPECT ARGUMENTS
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    /// Text file with one reference per line
    #[arg(short = 'i', long = "input", value_name = "LIST_FILE", env = "CLIPSTITCH_INPUT")]
    pub input_list: PathBuf,

    /// Reject references without an explicit timestamp
    #[arg(long)]
    pub require_timestamp: bool,
}

/// Parses a non-negative number of seconds, fractions allowed.
pub fn parse_seconds_arg(value: &str) -> Result<Duration, String> {
    let secs: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{value}' is not a number of seconds"))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("'{value}' must be a non-negative number of seconds"));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| format!("'{value}' is out of range: {e}"))
}
