//! Implementation of the 'inspect' subcommand.
//!
//! Resolves every line of a reference list and shows what a run would fetch,
//! without touching the network or any external tool.

use crate::cli::InspectArgs;
use crate::error::{CliErrorContext, CliResult};
use crate::terminal;

use clipstitch_core::config::OffsetPolicy;
use clipstitch_core::{ReferenceResolver, format_duration};

/// Counts from an inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InspectSummary {
    pub valid: usize,
    pub rejected: usize,
}

/// Resolves each reference and prints its id and offset or why it was rejected.
pub fn inspect_references(references: &[String], policy: OffsetPolicy) -> InspectSummary {
    let resolver = ReferenceResolver::new(policy);
    let mut summary = InspectSummary::default();

    for (index, raw) in references.iter().enumerate() {
        match resolver.resolve(raw) {
            Ok(reference) => {
                summary.valid += 1;
                terminal::print_success(&format!(
                    "{:>3}. {} at {} ({} link)",
                    index + 1,
                    reference.source_id,
                    format_duration(reference.start_offset.as_secs_f64()),
                    reference.shape
                ));
            }
            Err(rejection) => {
                summary.rejected += 1;
                terminal::print_warning(&format!("{:>3}. {}", index + 1, rejection.raw));
                terminal::print_sub_item(&rejection.reason);
            }
        }
    }
    summary
}

pub fn run_inspect(args: InspectArgs) -> CliResult<InspectSummary> {
    let references = clipstitch_core::read_reference_list(&args.input_list).cli_with_context(|| {
        format!("Failed to read reference list '{}'", args.input_list.display())
    })?;
    let policy = if args.require_timestamp {
        OffsetPolicy::Require
    } else {
        OffsetPolicy::DefaultZero
    };

    terminal::print_section("References");
    let summary = inspect_references(&references, policy);

    terminal::print_empty_line();
    terminal::print_status("Valid", &summary.valid.to_string(), true);
    terminal::print_status("Rejected", &summary.rejected.to_string(), false);
    Ok(summary)
}
