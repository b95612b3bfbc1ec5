// clipstitch-core/src/external/mocks.rs

// --- Mocking Infrastructure (for testing) ---

// Compiled for this crate's tests and for downstream crates enabling "test-mocks".
// Everything is `Arc<Mutex<..>>` so the mocks can be shared with worker threads.

use super::*;
use crate::error::{CoreError, CoreResult};
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use std::collections::HashMap;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};

/// Mock implementation of FfmpegProcess.
#[derive(Clone)]
pub struct MockFfmpegProcess {
    /// Events to emit when handle_events is called.
    pub events_to_emit: Vec<FfmpegEvent>,
    /// Exit status to return when wait is called.
    pub exit_status: ExitStatus,
}

impl FfmpegProcess for MockFfmpegProcess {
    fn handle_events<F>(&mut self, mut handler: F) -> CoreResult<()>
    where
        F: FnMut(FfmpegEvent) -> CoreResult<()>,
    {
        for event in self.events_to_emit.clone() {
            handler(event)?;
        }
        Ok(())
    }

    fn wait(&mut self) -> CoreResult<ExitStatus> {
        Ok(self.exit_status)
    }
}

/// Represents an expected ffmpeg command call and its mock result.
pub struct MockFfmpegExpectation {
    pub arg_pattern: String,
    pub result: CoreResult<MockFfmpegProcess>,
    pub create_dummy_output: bool,
}

/// Mock implementation of FfmpegSpawner supporting multiple expectations.
///
/// Each expectation matches the first command with an argument containing
/// its pattern and is consumed by that match. Commands matching no
/// expectation succeed and write a dummy output when `succeed_by_default`
/// is on, and panic otherwise.
#[derive(Clone, Default)]
pub struct MockFfmpegSpawner {
    expectations: Arc<Mutex<Vec<MockFfmpegExpectation>>>,
    received_calls: Arc<Mutex<Vec<Vec<String>>>>,
    succeed_by_default: bool,
}

fn exit_status(code: i32) -> ExitStatus {
    // Wait-status encoding: the exit code lives in the second byte
    ExitStatus::from_raw(code << 8)
}

fn create_dummy_output(args: &[String]) {
    let Some(output_path_str) = args.last() else {
        log::warn!("MockFfmpegSpawner couldn't find output path in args to create dummy file.");
        return;
    };
    let output_path = PathBuf::from(output_path_str);
    if let Some(parent) = output_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            log::error!("MockFfmpegSpawner failed to create parent dir {parent:?}: {e}");
        }
    }
    match std::fs::write(&output_path, b"mock media") {
        Ok(()) => log::debug!("MockFfmpegSpawner created dummy output file: {output_path:?}"),
        Err(e) => log::error!("MockFfmpegSpawner failed to create dummy output file {output_path:?}: {e}"),
    }
}

impl MockFfmpegSpawner {
    pub fn new() -> Self {
        Default::default()
    }

    /// A spawner where every unmatched command succeeds and creates its output.
    pub fn succeeding() -> Self {
        Self {
            succeed_by_default: true,
            ..Default::default()
        }
    }

    pub fn add_expectation(
        &self,
        arg_pattern: &str,
        result: CoreResult<MockFfmpegProcess>,
        create_dummy_output: bool,
    ) {
        if let Ok(mut expectations) = self.expectations.lock() {
            expectations.push(MockFfmpegExpectation {
                arg_pattern: arg_pattern.to_string(),
                result,
                create_dummy_output,
            });
        }
    }

    pub fn add_success_expectation(
        &self,
        arg_pattern: &str,
        events: Vec<FfmpegEvent>,
        create_dummy_output: bool,
    ) {
        let process = MockFfmpegProcess {
            events_to_emit: events,
            exit_status: exit_status(0),
        };
        self.add_expectation(arg_pattern, Ok(process), create_dummy_output);
    }

    pub fn add_spawn_error_expectation(&self, arg_pattern: &str, error: CoreError) {
        self.add_expectation(arg_pattern, Err(error), false);
    }

    /// The matching command exits with `exit_code`, logging `stderr` as an error line.
    pub fn add_exit_error_expectation(&self, arg_pattern: &str, stderr: &str, exit_code: i32) {
        let process = MockFfmpegProcess {
            events_to_emit: vec![FfmpegEvent::Log(LogLevel::Error, stderr.to_string())],
            exit_status: exit_status(exit_code),
        };
        self.add_expectation(arg_pattern, Ok(process), false);
    }

    /// Like `add_exit_error_expectation`, but the failing command still leaves
    /// a partial output file behind.
    pub fn add_exit_error_with_output_expectation(&self, arg_pattern: &str, stderr: &str, exit_code: i32) {
        let process = MockFfmpegProcess {
            events_to_emit: vec![FfmpegEvent::Log(LogLevel::Error, stderr.to_string())],
            exit_status: exit_status(exit_code),
        };
        self.add_expectation(arg_pattern, Ok(process), true);
    }

    pub fn get_received_calls(&self) -> Vec<Vec<String>> {
        self.received_calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Received calls with any argument containing `pattern`.
    pub fn calls_matching(&self, pattern: &str) -> Vec<Vec<String>> {
        self.get_received_calls()
            .into_iter()
            .filter(|args| args.iter().any(|a| a.contains(pattern)))
            .collect()
    }

    /// Received calls whose output (last argument) ends with `suffix`.
    pub fn calls_writing(&self, suffix: &str) -> Vec<Vec<String>> {
        self.get_received_calls()
            .into_iter()
            .filter(|args| args.last().is_some_and(|last| last.ends_with(suffix)))
            .collect()
    }

    pub fn pending_expectations(&self) -> usize {
        self.expectations.lock().map(|e| e.len()).unwrap_or(0)
    }
}

impl FfmpegSpawner for MockFfmpegSpawner {
    type Process = MockFfmpegProcess;

    fn spawn(&self, cmd: FfmpegCommand) -> CoreResult<Self::Process> {
        let args: Vec<String> = cmd
            .get_args()
            .map(|s| s.to_string_lossy().into_owned())
            .collect();
        if let Ok(mut calls) = self.received_calls.lock() {
            calls.push(args.clone());
        }

        let matched = self.expectations.lock().ok().and_then(|mut expectations| {
            expectations
                .iter()
                .position(|exp| args.iter().any(|arg| arg.contains(&exp.arg_pattern)))
                .map(|index| expectations.remove(index))
        });

        match matched {
            Some(expectation) => {
                log::debug!(
                    "MockFfmpegSpawner: Matched expectation with pattern '{}'",
                    expectation.arg_pattern
                );
                if expectation.create_dummy_output {
                    create_dummy_output(&args);
                }
                expectation.result
            }
            None if self.succeed_by_default => {
                create_dummy_output(&args);
                Ok(MockFfmpegProcess {
                    events_to_emit: Vec::new(),
                    exit_status: exit_status(0),
                })
            }
            None => {
                panic!("MockFfmpegSpawner: No expectation found for command args: {args:?}");
            }
        }
    }
}

/// Mock implementation of FfprobeExecutor.
///
/// Probe results are keyed by a substring of the probed path; the first
/// matching key wins, otherwise the default probe is returned.
#[derive(Clone, Default)]
pub struct MockFfprobeExecutor {
    results: Arc<Mutex<Vec<(String, MediaProbe)>>>,
    default_probe: MediaProbe,
}

impl MockFfprobeExecutor {
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns `probe` for paths without a specific expectation.
    pub fn with_default(probe: MediaProbe) -> Self {
        Self {
            default_probe: probe,
            ..Default::default()
        }
    }

    pub fn expect_probe(&self, path_pattern: &str, probe: MediaProbe) {
        if let Ok(mut results) = self.results.lock() {
            results.push((path_pattern.to_string(), probe));
        }
    }
}

impl FfprobeExecutor for MockFfprobeExecutor {
    fn probe(&self, input_path: &Path) -> MediaProbe {
        let path = input_path.to_string_lossy();
        self.results
            .lock()
            .ok()
            .and_then(|results| {
                results
                    .iter()
                    .find(|(pattern, _)| path.contains(pattern.as_str()))
                    .map(|(_, probe)| probe.clone())
            })
            .unwrap_or_else(|| self.default_probe.clone())
    }
}

/// Mock implementation of OriginFetcher.
///
/// Fetches succeed by writing `<stem>.mp4` into the destination unless the
/// source id has queued failures, which are returned one per call first.
#[derive(Clone, Default)]
pub struct MockFetcher {
    failures: Arc<Mutex<HashMap<String, Vec<String>>>>,
    requests: Arc<Mutex<Vec<FetchRequest>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Default::default()
    }

    /// The next `times` fetches of `source_id` fail with `message`.
    pub fn fail_times(&self, source_id: &str, times: usize, message: &str) {
        if let Ok(mut failures) = self.failures.lock() {
            failures
                .entry(source_id.to_string())
                .or_default()
                .extend(std::iter::repeat_n(message.to_string(), times));
        }
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl OriginFetcher for MockFetcher {
    fn fetch(&self, request: &FetchRequest) -> CoreResult<OriginAsset> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let failure = self.failures.lock().ok().and_then(|mut failures| {
            let queue = failures.get_mut(&request.source_id)?;
            (!queue.is_empty()).then(|| queue.remove(0))
        });
        if let Some(message) = failure {
            return Err(crate::error::command_failed_error(
                "yt-dlp",
                exit_status(1),
                message,
            ));
        }

        let path = request.dest_dir.join(format!("{}.mp4", request.stem));
        std::fs::write(&path, b"mock origin")?;
        Ok(OriginAsset {
            path,
            starts_at: request.window.map_or(std::time::Duration::ZERO, |w| w.start),
        })
    }
}
