use chrono::{DateTime, Local};
use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// Most recent modification time of any regular file below `path`.
///
/// Unreadable entries are skipped. When the tree holds no files at all, the
/// folder's own modification time is used instead.
pub fn last_modified(path: &Path) -> io::Result<DateTime<Local>> {
    let latest = WalkDir::new(path)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok()?.modified().ok())
        .max();

    let latest = match latest {
        Some(time) => time,
        None => fs::metadata(path)?.modified()?,
    };

    Ok(latest.into())
}

/// Sum of regular-file lengths below `path`; zero for a missing folder.
#[must_use]
pub fn folder_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| entry.metadata().ok())
        .filter(std::fs::Metadata::is_file)
        .map(|m| m.len())
        .sum()
}
