//! Temporary file management utilities.
//!
//! Every run works inside one private directory created here. The directory
//! is a `tempfile::TempDir`, so dropping it removes everything the run left
//! behind even when the run unwinds early.

use crate::config::CoreConfig;
use crate::error::CoreResult;
use std::path::{Path, PathBuf};
use tempfile::{Builder as TempFileBuilder, TempDir};

/// Prefix of every per-run working directory.
pub const WORK_DIR_PREFIX: &str = "clipstitch_";

/// Creates the per-run working directory. Auto-cleaned when dropped.
pub fn create_work_dir(config: &CoreConfig) -> CoreResult<TempDir> {
    let dir = match config.temp_dir.as_ref() {
        Some(base) => {
            std::fs::create_dir_all(base)?;
            // Absolute, so commands run from inside the directory still resolve paths
            let base = base.canonicalize()?;
            TempFileBuilder::new().prefix(WORK_DIR_PREFIX).tempdir_in(base)?
        }
        None => TempFileBuilder::new().prefix(WORK_DIR_PREFIX).tempdir()?,
    };
    log::debug!("Created working directory {}", dir.path().display());
    Ok(dir)
}

/// Returns a temporary file path with random suffix. Does not create the file.
pub fn create_temp_file_path(dir: &Path, prefix: &str, extension: &str) -> PathBuf {
    use rand::distributions::Alphanumeric;
    use rand::{Rng, thread_rng};

    let random_suffix: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();

    dir.join(format!("{prefix}_{random_suffix}.{extension}"))
}

/// Name of the origin asset stem for one item.
pub fn origin_stem(source_id: &str, input_index: usize) -> String {
    format!("{source_id}_{input_index:03}_full")
}

/// Path of the stream-copied extraction for one item.
pub fn raw_segment_path(dir: &Path, source_id: &str, input_index: usize) -> PathBuf {
    dir.join(format!("raw_{input_index:03}_{source_id}.mkv"))
}

/// Path of the normalized segment for one item.
pub fn segment_path(dir: &Path, source_id: &str, input_index: usize) -> PathBuf {
    dir.join(format!("clip_{input_index:03}_{source_id}.mp4"))
}
