//! Process helpers for tools that are not driven through ffmpeg-sidecar.

pub mod command;

pub use command::{CommandOutput, run_command_with_timeout};
