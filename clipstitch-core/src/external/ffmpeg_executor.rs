// ============================================================================
// clipstitch-core/src/external/ffmpeg_executor.rs
// ============================================================================
//
// FFMPEG EXECUTOR: FFmpeg Process Management and Abstraction
//
// Traits for spawning ffmpeg and consuming its event stream, the concrete
// ffmpeg-sidecar implementation, and `run_ffmpeg`, which every pipeline
// stage uses to run one command to completion.
//
// KEY COMPONENTS:
// - FfmpegProcess: Trait representing an active FFmpeg process
// - FfmpegSpawner: Trait for creating new FFmpeg processes
// - SidecarSpawner: Concrete implementation using ffmpeg-sidecar
// - run_ffmpeg: spawn, drain events, wait, map failures to CoreError
//
// AI-ASSISTANT-INFO: FFmpeg process management and execution abstraction

use crate::error::{CoreResult, command_failed_error, command_start_error, command_wait_error};
use crate::external::ffmpeg_builder::command_args;
use ffmpeg_sidecar::child::FfmpegChild as SidecarChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use std::process::ExitStatus;

// --- FFmpeg Execution Abstraction ---

/// Trait representing an active ffmpeg process instance.
pub trait FfmpegProcess {
    /// Processes events from the running command using a provided handler closure.
    fn handle_events<F>(&mut self, handler: F) -> CoreResult<()>
    where
        F: FnMut(FfmpegEvent) -> CoreResult<()>;

    /// Waits for the command to complete and returns its exit status.
    fn wait(&mut self) -> CoreResult<ExitStatus>;
}

/// Trait representing something that can spawn an FfmpegProcess.
///
/// Spawners are shared between worker threads, hence `Send + Sync`.
pub trait FfmpegSpawner: Send + Sync {
    type Process: FfmpegProcess;
    /// Spawns the ffmpeg command, consuming the command object.
    fn spawn(&self, cmd: FfmpegCommand) -> CoreResult<Self::Process>;
}

// --- Concrete Implementation using ffmpeg-sidecar ---

/// Wrapper around `ffmpeg_sidecar::child::FfmpegChild` implementing `FfmpegProcess`.
pub struct SidecarProcess(SidecarChild);

impl FfmpegProcess for SidecarProcess {
    fn handle_events<F>(&mut self, mut handler: F) -> CoreResult<()>
    where
        F: FnMut(FfmpegEvent) -> CoreResult<()>,
    {
        let iterator = self.0.iter().map_err(|e| {
            log::error!("Failed to get ffmpeg event iterator: {e}");
            command_failed_error(
                "ffmpeg (sidecar - get iter)",
                ExitStatus::default(),
                e.to_string(),
            )
        })?;
        for event in iterator {
            handler(event)?;
        }
        Ok(())
    }

    fn wait(&mut self) -> CoreResult<ExitStatus> {
        self.0
            .wait()
            .map_err(|e| command_wait_error("ffmpeg (sidecar)", e))
    }
}

/// Concrete implementation of `FfmpegSpawner` using `ffmpeg-sidecar`.
#[derive(Debug, Clone, Default)]
pub struct SidecarSpawner;

impl FfmpegSpawner for SidecarSpawner {
    type Process = SidecarProcess;

    fn spawn(&self, mut cmd: FfmpegCommand) -> CoreResult<Self::Process> {
        cmd.spawn()
            .map(SidecarProcess)
            .map_err(|e| command_start_error("ffmpeg (sidecar)", e))
    }
}

/// Runs one ffmpeg command to completion.
///
/// Error and fatal log lines are collected while the process runs; on a
/// non-zero exit they become the stderr text of the returned
/// `CoreError::CommandFailed`.
pub fn run_ffmpeg<S: FfmpegSpawner>(spawner: &S, cmd: FfmpegCommand, name: &str) -> CoreResult<()> {
    log::debug!("Running {name}: ffmpeg {}", command_args(&cmd).join(" "));

    let mut process = spawner.spawn(cmd)?;
    let mut diagnostics: Vec<String> = Vec::new();

    let events = process.handle_events(|event| {
        match event {
            FfmpegEvent::Log(LogLevel::Error | LogLevel::Fatal, line) | FfmpegEvent::Error(line) => {
                log::debug!("{name}: {line}");
                diagnostics.push(line);
            }
            _ => {}
        }
        Ok(())
    });
    let status = process.wait()?;

    if let Err(e) = events {
        log::warn!("{name}: event stream ended early: {e}");
        diagnostics.push(e.to_string());
    }

    if !status.success() {
        let stderr = if diagnostics.is_empty() {
            "no diagnostic output".to_string()
        } else {
            diagnostics.join("\n")
        };
        log::error!("{name} failed with {status}: {stderr}");
        return Err(command_failed_error(name, status, stderr));
    }

    Ok(())
}
