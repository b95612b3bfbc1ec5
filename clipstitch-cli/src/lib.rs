// clipstitch-cli/src/lib.rs
//
// Library portion of the Clipstitch CLI application.
// Contains argument definitions and command logic.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod terminal;

// Re-export items needed by the binary or integration tests
pub use cli::{Cli, Commands, InspectArgs, StitchArgs};
pub use commands::check::run_check;
pub use commands::inspect::run_inspect;
pub use commands::stitch::run_stitch;
pub use error::{CliErrorContext, CliResult};
