// ============================================================================
// clipstitch-core/src/error.rs
// ============================================================================
//
// ERROR HANDLING: Error Types for the Clip Assembly Pipeline
//
// Defines the crate-wide `CoreError` enum, the `CoreResult` alias, and small
// constructors for the external-process failures every stage reports.
// Component-specific errors (`InvalidReference`, `MaterializationError`,
// `AssemblyError`) live next to their components and convert into
// `CoreError` through `From`.

use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

use crate::assembly::AssemblyError;
use crate::reference::InvalidReference;
use crate::segment::MaterializationError;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to start {0}: {1}")]
    CommandStart(String, std::io::Error),

    #[error("Failed waiting for {0}: {1}")]
    CommandWait(String, std::io::Error),

    #[error("{0} failed with status {1}: {2}")]
    CommandFailed(String, ExitStatus, String),

    #[error("{0} timed out after {1:?}")]
    CommandTimeout(String, Duration),

    #[error("Required dependency not found: {0}")]
    DependencyNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid assembly plan: {0}")]
    InvalidPlan(String),

    #[error(transparent)]
    InvalidReference(#[from] InvalidReference),

    #[error(transparent)]
    Materialization(#[from] MaterializationError),

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error("Overlay failed: {0}")]
    Overlay(String),

    #[error("Fetch produced no media file for {0}")]
    FetchOutputMissing(String),

    #[error("No segments were produced")]
    NoSegments,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Path error: {0}")]
    PathError(String),

    #[error("{0}")]
    OperationFailed(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

pub fn command_start_error(cmd: impl Into<String>, err: std::io::Error) -> CoreError {
    CoreError::CommandStart(cmd.into(), err)
}

pub fn command_wait_error(cmd: impl Into<String>, err: std::io::Error) -> CoreError {
    CoreError::CommandWait(cmd.into(), err)
}

pub fn command_failed_error(
    cmd: impl Into<String>,
    status: ExitStatus,
    stderr: impl Into<String>,
) -> CoreError {
    CoreError::CommandFailed(cmd.into(), status, stderr.into())
}
