//! Command implementations for the CLI.
//!
//! Each submodule contains the implementation of a specific command.

/// Module containing the implementation of the `stitch` command.
/// This command runs the full fetch, cut, normalize and join pipeline.
pub mod stitch;

/// Module containing the implementation of the `inspect` command.
pub mod inspect;

/// Module containing the implementation of the `check` command.
pub mod check;
