//! Filesystem primitives shared by the dedup locks and the session state files.
//!
//! Everything lives in one flat directory (the OS temp dir by default), with
//! file names derived deterministically from the session id.

use fs_err as fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::error::{NotifyError, Result};

/// Replaces anything outside `[A-Za-z0-9_-]` so ids can't escape the directory.
pub(crate) fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Creates `path` only if it does not exist yet.
///
/// Returns `Ok(false)` when another process got there first. This is the
/// sole mutual-exclusion primitive for dedup locks.
pub(crate) fn atomic_create_file(path: &Path) -> std::io::Result<bool> {
    match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}

/// Age of a file from its mtime. `None` when the metadata can't be read.
///
/// An mtime in the future (clock skew) counts as age zero.
pub(crate) fn file_age(path: &Path) -> Option<Duration> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    Some(
        SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO),
    )
}

/// Removes a file, treating "already gone" as success.
pub(crate) fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Removes files in `dir` named `{prefix}*{suffix}` whose age exceeds `max_age`.
///
/// Returns the number of files removed. Individual removal failures are logged
/// and skipped; failing to list the directory is an error.
pub(crate) fn cleanup_old_files(
    dir: &Path,
    prefix: &str,
    suffix: &str,
    max_age: Duration,
) -> Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(NotifyError::io("Failed to list cleanup directory", e)),
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.starts_with(prefix) || !name.ends_with(suffix) {
            continue;
        }

        let path = entry.path();
        match file_age(&path) {
            Some(age) if age > max_age => match remove_if_exists(&path) {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove old file");
                }
            },
            _ => {}
        }
    }

    Ok(removed)
}

/// Current Unix time in whole seconds.
pub(crate) fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}
