//! Implementation of the 'check' subcommand: reports whether each external
//! tool a run needs is installed.

use crate::error::CliResult;
use crate::terminal;

use clipstitch_core::external::{REQUIRED_TOOLS, check_dependency};
use clipstitch_core::{CoreConfig, EncoderSelection};

/// Checks every tool and fails listing the missing ones.
pub fn run_check() -> CliResult<()> {
    terminal::print_section("Dependencies");

    let mut missing = Vec::new();
    for (tool, version_arg) in REQUIRED_TOOLS {
        match check_dependency(tool, version_arg) {
            Ok(()) => terminal::print_success(&format!("{tool} found")),
            Err(e) => {
                terminal::print_warning(&format!("{tool} unavailable"));
                terminal::print_sub_item(&e.to_string());
                missing.push(*tool);
            }
        }
    }

    let config = CoreConfig::default();
    let encoders = EncoderSelection::new(
        config.hardware_encoder.clone(),
        &config.software_preset,
        config.crf,
    );
    terminal::print_empty_line();
    terminal::print_status("Encoder", &encoders.describe(), false);

    if missing.is_empty() {
        Ok(())
    } else {
        Err(crate::cli_error!(
            "Missing required tools: {}",
            missing.join(", ")
        ))
    }
}
