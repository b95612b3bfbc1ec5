//! File discovery: the reference list and the overlay font.

use crate::error::{CoreError, CoreResult};

use std::path::{Path, PathBuf};

/// Font file extensions drawtext can load.
pub const FONT_EXTENSIONS: &[&str] = &["ttf", "otf", "ttc"];

/// Reads a newline-delimited reference list.
///
/// Blank lines and lines starting with `#` are skipped; every other line is
/// trimmed and kept in order.
pub fn read_reference_list(path: &Path) -> CoreResult<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        CoreError::PathError(format!(
            "Failed to read reference list '{}': {}",
            path.display(),
            e
        ))
    })?;
    Ok(parse_reference_list(&content))
}

/// Parses the content of a reference list.
pub fn parse_reference_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn is_font_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| FONT_EXTENSIONS.iter().any(|f| ext.eq_ignore_ascii_case(f)))
}

/// Finds the first font file under `fonts_dir`, searching subdirectories.
///
/// Entries are visited in sorted order so the choice is stable between runs.
/// Returns `Ok(None)` when the directory is missing or holds no font.
pub fn find_font_file(fonts_dir: &Path) -> CoreResult<Option<PathBuf>> {
    if !fonts_dir.is_dir() {
        log::debug!("Fonts directory {} does not exist", fonts_dir.display());
        return Ok(None);
    }

    let mut entries: Vec<PathBuf> = std::fs::read_dir(fonts_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    if let Some(font) = entries.iter().find(|p| is_font_file(p)) {
        return Ok(Some(font.clone()));
    }
    for dir in entries.iter().filter(|p| p.is_dir()) {
        if let Some(font) = find_font_file(dir)? {
            return Ok(Some(font));
        }
    }
    Ok(None)
}
