// ============================================================================
// clipstitch-cli/src/main.rs
// ============================================================================
//
// CLIPSTITCH CLI: Main Entry Point
//
// This file contains the entry point for the Clipstitch CLI application. It
// parses command-line arguments, sets up color handling and logging, and
// dispatches to the appropriate command handler.
//
// KEY COMPONENTS:
// - Command-line argument parsing using clap
// - Logging setup (console plus optional run log file)
// - Command dispatch to specialized handlers
// - Error handling and exit codes
//
// AI-ASSISTANT-INFO: Entry point for the CLI application, handles arguments and dispatches commands

// ---- Internal crate imports ----
use clipstitch_cli::logging::{self, ConsoleTarget};
use clipstitch_cli::{Cli, CliResult, Commands, run_check, run_inspect, run_stitch, terminal};
use clipstitch_core::CoreError;

// ---- External crate imports ----
use clap::Parser;
use log::debug;

// ---- Standard library imports ----
use std::process;

// ============================================================================
// MAIN ENTRY POINT
// ============================================================================

fn main() {
    let cli = Cli::parse();
    terminal::init_color(cli.no_color);

    let (console, log_dir) = match &cli.command {
        Commands::Stitch(args) if args.json => (ConsoleTarget::Stderr, args.log_dir.clone()),
        Commands::Stitch(args) => (ConsoleTarget::Stdout, args.log_dir.clone()),
        _ => (ConsoleTarget::Stdout, None),
    };
    if console == ConsoleTarget::Stderr {
        terminal::set_color(false);
    }

    match logging::init_logging(cli.verbose, console, log_dir.as_deref()) {
        Ok(Some(path)) => debug!("Run log: {}", path.display()),
        Ok(None) => {}
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }

    let exit_code = match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            terminal::print_error("Error", &e.to_string(), suggestion_for(&e));
            1
        }
    };
    process::exit(exit_code);
}

/// Runs the selected command and returns the process exit code.
///
/// A stitch that produced no output file exits with 1 even though the run
/// itself completed.
fn run(command: Commands) -> CliResult<i32> {
    match command {
        Commands::Stitch(args) => {
            let report = run_stitch(args)?;
            Ok(if report.is_success() { 0 } else { 1 })
        }
        Commands::Inspect(args) => {
            run_inspect(args)?;
            Ok(0)
        }
        Commands::Check => {
            run_check()?;
            Ok(0)
        }
    }
}

fn suggestion_for(error: &CoreError) -> Option<&'static str> {
    match error {
        CoreError::DependencyNotFound(_) => {
            Some("Install ffmpeg and yt-dlp and make sure they are on your PATH")
        }
        CoreError::Config(_) => Some("Run `clipstitch stitch --help` for valid values"),
        _ => None,
    }
}
