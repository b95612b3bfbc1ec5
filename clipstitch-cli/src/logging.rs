// ============================================================================
// clipstitch-cli/src/logging.rs
// ============================================================================
//
// LOGGING SETUP: Console and run log file dispatch
//
// Everything the CLI shows goes through the `log` facade, including the
// styled terminal lines. A fern dispatcher sends records to the console at
// the chosen level and, when a log directory is given, to a timestamped run
// log with ANSI codes stripped.
//
// AI-ASSISTANT-INFO: Logging utilities and fern dispatcher setup

// ---- External crate imports ----
use log::{Level, LevelFilter};

// ---- Internal crate imports ----
use crate::error::{CliErrorContext, CliResult};

// ---- Standard library imports ----
use std::fs;
use std::path::{Path, PathBuf};

/// Where console records are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleTarget {
    Stdout,
    /// Keeps stdout free for machine-readable output
    Stderr,
}

/// Returns the current local timestamp formatted as "YYYYMMDD_HHMMSS".
///
/// # Example
/// ```
/// let log_filename = format!("clipstitch_run_{}.log", clipstitch_cli::logging::get_timestamp());
/// assert!(log_filename.starts_with("clipstitch_run_"));
/// ```
pub fn get_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Path of the run log inside `log_dir`.
pub fn run_log_path(log_dir: &Path) -> PathBuf {
    log_dir.join(format!("clipstitch_run_{}.log", get_timestamp()))
}

/// Console level for the given verbosity.
pub fn console_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Console level for records from the core library.
///
/// The terminal view already renders run events, so core milestones only
/// reach the console in verbose mode. The run log always has them.
pub fn core_console_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    }
}

/// Installs the global logger. Returns the run log path when one was opened.
///
/// Fails if a logger is already installed or the log file cannot be created.
pub fn init_logging(
    verbose: bool,
    console: ConsoleTarget,
    log_dir: Option<&Path>,
) -> CliResult<Option<PathBuf>> {
    let console_dispatch = fern::Dispatch::new()
        .level(console_level(verbose))
        .level_for("clipstitch_core", core_console_level(verbose))
        .format(|out, message, record| match record.level() {
            Level::Info => out.finish(format_args!("{message}")),
            level => out.finish(format_args!(
                "{}: {}",
                level.as_str().to_lowercase(),
                message
            )),
        });
    let console_dispatch = match console {
        ConsoleTarget::Stdout => console_dispatch.chain(std::io::stdout()),
        ConsoleTarget::Stderr => console_dispatch.chain(std::io::stderr()),
    };

    let mut dispatch = fern::Dispatch::new()
        .level(LevelFilter::Debug)
        // ffmpeg-sidecar logs every parsed progress line at debug
        .level_for("ffmpeg_sidecar", LevelFilter::Warn)
        .chain(console_dispatch);

    let mut log_path = None;
    if let Some(dir) = log_dir {
        fs::create_dir_all(dir)
            .cli_with_context(|| format!("Failed to create log directory '{}'", dir.display()))?;
        let path = run_log_path(dir);
        let file = fern::log_file(&path)
            .cli_with_context(|| format!("Failed to create log file '{}'", path.display()))?;
        dispatch = dispatch.chain(
            fern::Dispatch::new()
                .format(|out, message, record| {
                    let plain = strip_ansi_escapes::strip_str(message.to_string());
                    out.finish(format_args!(
                        "{} [{}] {}: {}",
                        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                        record.level(),
                        record.target(),
                        plain
                    ))
                })
                .chain(file),
        );
        log_path = Some(path);
    }

    dispatch
        .apply()
        .map_err(|e| crate::cli_error!("Failed to install logger: {}", e))?;
    Ok(log_path)
}
