// ============================================================================
// clipstitch-cli/src/terminal.rs
// ============================================================================
//
// TERMINAL OUTPUT: UI Components and Styling
//
// Consistent terminal styling for the CLI: section headers, status lines,
// success/warning/error lines and the clip progress bar. Every line goes
// through the `info!` macro so the run log file receives the same text as
// the console.
//
// KEY COMPONENTS:
// - styling: Constants for symbols and formatting
// - Color control: NO_COLOR / --no-color / terminal detection
// - UI component functions: print_section, print_status, print_success, etc.
// - ClipProgress: indicatif bar tracking materialized clips
//
// AI-ASSISTANT-INFO: Terminal UI components and styling for the CLI

// ---- External crate imports ----
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::info;
use owo_colors::OwoColorize;
use unicode_width::UnicodeWidthStr;

// ---- Standard library imports ----
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

// ============================================================================
// STYLING CONSTANTS
// ============================================================================

/// Styling constants for terminal output
pub mod styling {
    pub const SUCCESS_SYMBOL: &str = "✓";
    pub const PROCESSING_SYMBOL: &str = "»";
    pub const WARNING_SYMBOL: &str = "!";
    pub const ERROR_SYMBOL: &str = "✗";

    pub const SECTION_PREFIX: &str = "===== ";
    pub const SECTION_SUFFIX: &str = " =====";

    pub const STATUS_INDENT: &str = "  ";
    pub const SUB_ITEM_INDENT: &str = "    ";
    pub const STATUS_LABEL_WIDTH: usize = 15;

    pub const PROGRESS_TEMPLATE: &str = "  {spinner} [{bar:30}] {pos}/{len} clips {wide_msg}";
    pub const PROGRESS_CHARS: &str = "#>.";

    pub const EMPTY_LINE: &str = "";
}

// ============================================================================
// COLOR CONTROL
// ============================================================================

static USE_COLOR: AtomicBool = AtomicBool::new(true);

/// Set whether to use color in terminal output
pub fn set_color(enable: bool) {
    USE_COLOR.store(enable, Ordering::Relaxed);
}

/// Check if color should be used
pub fn should_use_color() -> bool {
    USE_COLOR.load(Ordering::Relaxed)
}

/// Turns color on only when the flag allows it and stdout supports it.
///
/// `supports-color` already honors `NO_COLOR` and `FORCE_COLOR`.
pub fn init_color(no_color_flag: bool) {
    let supported = supports_color::on(supports_color::Stream::Stdout).is_some();
    set_color(!no_color_flag && supported);
}

// ============================================================================
// TERMINAL COMPONENTS
// ============================================================================
//
// Visual hierarchy:
//
// 1. Sections (===== SECTION =====)
// 2. Processing steps (» Step description)
// 3. Sub-items (    Description)
// 4. Status items (  Label:          Value)
// 5. Outcome lines (✓ / ! / ✗ message)

/// Print a section header for major workflow phases
pub fn print_section(title: &str) {
    info!("{}", styling::EMPTY_LINE);
    let title = title.to_uppercase();
    if should_use_color() {
        info!(
            "{}{}{}",
            styling::SECTION_PREFIX,
            title.cyan().bold(),
            styling::SECTION_SUFFIX
        );
    } else {
        info!("{}{}{}", styling::SECTION_PREFIX, title, styling::SECTION_SUFFIX);
    }
    info!("{}", styling::EMPTY_LINE);
}

/// Pads a status label to the common column, measuring display width.
pub fn format_status_label(label: &str) -> String {
    let width = UnicodeWidthStr::width(label);
    let padding = styling::STATUS_LABEL_WIDTH.saturating_sub(width).max(1);
    format!("{}:{}", label, " ".repeat(padding))
}

/// Print a status line (key-value pair). `highlight` makes the value bold.
pub fn print_status(label: &str, value: &str, highlight: bool) {
    let label = format_status_label(label);
    if should_use_color() && highlight {
        info!("{}{}{}", styling::STATUS_INDENT, label, value.bold());
    } else {
        info!("{}{}{}", styling::STATUS_INDENT, label, value);
    }
}

/// Print a processing step message
pub fn print_processing(message: &str) {
    if should_use_color() {
        info!(
            "{}{} {}",
            styling::STATUS_INDENT,
            styling::PROCESSING_SYMBOL,
            message.bold()
        );
    } else {
        info!("{}{} {}", styling::STATUS_INDENT, styling::PROCESSING_SYMBOL, message);
    }
}

/// Print a sub-item under a processing step
pub fn print_sub_item(message: &str) {
    info!("{}{}", styling::SUB_ITEM_INDENT, message);
}

/// Print a success message
pub fn print_success(message: &str) {
    if should_use_color() {
        info!(
            "{}{} {}",
            styling::STATUS_INDENT,
            styling::SUCCESS_SYMBOL.green(),
            message
        );
    } else {
        info!("{}{} {}", styling::STATUS_INDENT, styling::SUCCESS_SYMBOL, message);
    }
}

/// Print a warning for something that degraded but did not stop the run
pub fn print_warning(message: &str) {
    if should_use_color() {
        info!(
            "{}{} {}",
            styling::STATUS_INDENT,
            styling::WARNING_SYMBOL.yellow().bold(),
            message.yellow()
        );
    } else {
        info!("{}{} {}", styling::STATUS_INDENT, styling::WARNING_SYMBOL, message);
    }
}

/// Print an error message with context
///
/// # Arguments
///
/// * `title` - The error title
/// * `message` - The error message
/// * `suggestion` - Optional suggestion for fixing the error
pub fn print_error(title: &str, message: &str, suggestion: Option<&str>) {
    if should_use_color() {
        info!("{} {}", styling::ERROR_SYMBOL, title.red().bold());
    } else {
        info!("{} {}", styling::ERROR_SYMBOL, title);
    }

    info!("{}", styling::EMPTY_LINE);
    info!("  Message:  {}", message);

    if let Some(suggestion_text) = suggestion {
        info!("{}", styling::EMPTY_LINE);
        info!("  Suggestion: {}", suggestion_text);
    }

    info!("{}", styling::EMPTY_LINE);
}

/// Print an empty line for vertical spacing
pub fn print_empty_line() {
    info!("{}", styling::EMPTY_LINE);
}

// ============================================================================
// CLIP PROGRESS
// ============================================================================

/// Progress bar counting finished clips (successful or not).
///
/// Drawn on stderr only when it is a terminal; log lines printed through
/// [`ClipProgress::suspend`] do not tear the bar.
pub struct ClipProgress {
    bar: ProgressBar,
}

impl ClipProgress {
    pub fn new(total: usize) -> Self {
        let bar = if console::Term::stderr().is_term() {
            ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr())
        } else {
            ProgressBar::hidden()
        };
        let style = ProgressStyle::with_template(styling::PROGRESS_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars(styling::PROGRESS_CHARS);
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    /// A bar that never draws.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.bar.set_message(message.into());
    }

    /// Marks one clip as done.
    pub fn clip_done(&self) {
        self.bar.inc(1);
    }

    /// Runs `f` with the bar cleared from the screen.
    pub fn suspend<F: FnOnce() -> R, R>(&self, f: F) -> R {
        self.bar.suspend(f)
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}
