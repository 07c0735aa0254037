//! Cross-process duplicate suppression with lock files.
//!
//! Claude Code can fire the same hook more than once for one underlying
//! trigger, and every firing runs as its own short-lived process. The only
//! shared medium is the filesystem, so deduplication uses zero-byte marker
//! files in the temp directory.
//!
//! # Two-Phase Protocol
//!
//! 1. **Early check** ([`DedupManager::check_early_duplicate`]): a lock that
//!    exists and is younger than the TTL (or whose age can't be read) means
//!    another process is handling this trigger. Cheap, no writes.
//! 2. **Acquire** ([`DedupManager::acquire_lock`]): `create_new` on the lock
//!    file. Exactly one process wins. A lock older than the TTL belonged to a
//!    crashed or finished holder and is replaced once.
//!
//! # Lock Files
//!
//! ```text
//! claude-notification-{session}.lock            global per-session lock
//! claude-notification-{session}-{event}.lock    per hook event
//! claude-notification-{session}.content.lock    content lock (5s TTL)
//! ```
//!
//! The content lock keeps two different hook events carrying the same message
//! from both notifying. A fresh content lock means "try again shortly".

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{NotifyError, Result};
use crate::files::{
    atomic_create_file, cleanup_old_files, file_age, remove_if_exists, sanitize_component,
};

/// Trigger locks younger than this mark a duplicate.
pub const LOCK_TTL: Duration = Duration::from_secs(2);

/// Content locks younger than this are considered held.
pub const CONTENT_LOCK_TTL: Duration = Duration::from_secs(5);

const LOCK_PREFIX: &str = "claude-notification-";
const LOCK_SUFFIX: &str = ".lock";

/// Lock-file based deduplication rooted at one directory.
#[derive(Debug, Clone)]
pub struct DedupManager {
    dir: PathBuf,
    lock_ttl: Duration,
    content_lock_ttl: Duration,
}

impl Default for DedupManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DedupManager {
    /// Manager rooted at the OS temp directory.
    pub fn new() -> Self {
        Self::with_dir(std::env::temp_dir())
    }

    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        DedupManager {
            dir: dir.into(),
            lock_ttl: LOCK_TTL,
            content_lock_ttl: CONTENT_LOCK_TTL,
        }
    }

    #[must_use]
    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_content_lock_ttl(mut self, ttl: Duration) -> Self {
        self.content_lock_ttl = ttl;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn content_lock_ttl(&self) -> Duration {
        self.content_lock_ttl
    }

    /// Path of the trigger lock. No event means the global per-session lock.
    pub fn lock_path(&self, session_id: &str, event: Option<&str>) -> PathBuf {
        let session = sanitize_component(session_id);
        let name = match event.filter(|e| !e.is_empty()) {
            Some(event) => format!(
                "{LOCK_PREFIX}{session}-{}{LOCK_SUFFIX}",
                sanitize_component(event)
            ),
            None => format!("{LOCK_PREFIX}{session}{LOCK_SUFFIX}"),
        };
        self.dir.join(name)
    }

    pub fn content_lock_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!(
            "{LOCK_PREFIX}{}.content{LOCK_SUFFIX}",
            sanitize_component(session_id)
        ))
    }

    /// Phase 1: returns true if this call duplicates one already in flight.
    ///
    /// An unreadable lock age is treated as fresh.
    pub fn check_early_duplicate(&self, session_id: &str, event: Option<&str>) -> bool {
        let path = self.lock_path(session_id, event);
        if !path.exists() {
            return false;
        }

        match file_age(&path) {
            None => true,
            Some(age) => age < self.lock_ttl,
        }
    }

    /// Phase 2: atomically acquires the trigger lock.
    ///
    /// `Ok(false)` means another process holds a fresh lock (duplicate).
    pub fn acquire_lock(&self, session_id: &str, event: Option<&str>) -> Result<bool> {
        let path = self.lock_path(session_id, event);
        self.acquire(&path, self.lock_ttl, "lock")
    }

    /// Acquires the content lock with its longer TTL.
    ///
    /// `Ok(false)` means another process is delivering right now; callers
    /// should retry shortly instead of giving up.
    pub fn acquire_content_lock(&self, session_id: &str) -> Result<bool> {
        let path = self.content_lock_path(session_id);
        self.acquire(&path, self.content_lock_ttl, "content lock")
    }

    fn acquire(&self, path: &Path, ttl: Duration, kind: &str) -> Result<bool> {
        let created = atomic_create_file(path)
            .map_err(|e| NotifyError::io(format!("Failed to create {kind} file"), e))?;
        if created {
            return Ok(true);
        }

        if let Some(age) = file_age(path) {
            if age < ttl {
                return Ok(false);
            }
            tracing::debug!(
                path = %path.display(),
                age_ms = age.as_millis() as u64,
                "Replacing stale {kind}"
            );
        }

        // Someone else may have removed it already; the create below decides.
        let _ = remove_if_exists(path);

        atomic_create_file(path).map_err(|e| {
            NotifyError::io(format!("Failed to create {kind} file after cleanup"), e)
        })
    }

    pub fn release_lock(&self, session_id: &str, event: Option<&str>) -> Result<()> {
        remove_if_exists(&self.lock_path(session_id, event))
            .map_err(|e| NotifyError::io("Failed to release lock", e))
    }

    pub fn release_content_lock(&self, session_id: &str) -> Result<()> {
        remove_if_exists(&self.content_lock_path(session_id))
            .map_err(|e| NotifyError::io("Failed to release content lock", e))
    }

    /// Removes the global and content locks of one session.
    pub fn cleanup_for_session(&self, session_id: &str) -> Result<()> {
        self.release_lock(session_id, None)?;
        self.release_content_lock(session_id)
    }

    /// Removes every dedup lock older than `max_age`. Returns the count removed.
    pub fn cleanup(&self, max_age: Duration) -> Result<usize> {
        cleanup_old_files(&self.dir, LOCK_PREFIX, LOCK_SUFFIX, max_age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fs_err as fs;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn test_lock_paths_are_deterministic_and_keyed_by_event() {
        let manager = DedupManager::with_dir("/tmp/x");
        assert_eq!(
            manager.lock_path("s1", None),
            PathBuf::from("/tmp/x/claude-notification-s1.lock")
        );
        assert_eq!(
            manager.lock_path("s1", Some("")),
            manager.lock_path("s1", None)
        );
        assert_eq!(
            manager.lock_path("s1", Some("Stop")),
            PathBuf::from("/tmp/x/claude-notification-s1-Stop.lock")
        );
        assert_eq!(
            manager.content_lock_path("s1"),
            PathBuf::from("/tmp/x/claude-notification-s1.content.lock")
        );
    }

    #[test]
    fn test_event_named_content_does_not_share_content_lock() {
        let temp = tempdir().unwrap();
        let manager = DedupManager::with_dir(temp.path());
        assert_ne!(
            manager.lock_path("s1", Some("content")),
            manager.content_lock_path("s1")
        );

        assert!(manager.acquire_lock("s1", Some("content")).unwrap());
        assert!(manager.acquire_content_lock("s1").unwrap());
    }

    #[test]
    fn test_no_lock_is_not_duplicate() {
        let temp = tempdir().unwrap();
        let manager = DedupManager::with_dir(temp.path());
        assert!(!manager.check_early_duplicate("s1", Some("Stop")));
    }

    #[test]
    fn test_fresh_lock_is_early_duplicate() {
        let temp = tempdir().unwrap();
        let manager = DedupManager::with_dir(temp.path());
        assert!(manager.acquire_lock("s1", Some("Stop")).unwrap());
        assert!(manager.check_early_duplicate("s1", Some("Stop")));
        // Different event kinds don't collide.
        assert!(!manager.check_early_duplicate("s1", Some("Notification")));
    }

    #[test]
    fn test_stale_lock_is_not_early_duplicate() {
        let temp = tempdir().unwrap();
        let manager = DedupManager::with_dir(temp.path()).with_lock_ttl(Duration::from_millis(50));
        assert!(manager.acquire_lock("s1", None).unwrap());
        thread::sleep(Duration::from_millis(80));
        assert!(!manager.check_early_duplicate("s1", None));
    }

    #[test]
    fn test_second_acquire_of_fresh_lock_fails() {
        let temp = tempdir().unwrap();
        let manager = DedupManager::with_dir(temp.path());
        assert!(manager.acquire_lock("s1", Some("Stop")).unwrap());
        assert!(!manager.acquire_lock("s1", Some("Stop")).unwrap());
    }

    #[test]
    fn test_stale_lock_is_reclaimed() {
        let temp = tempdir().unwrap();
        let manager = DedupManager::with_dir(temp.path()).with_lock_ttl(Duration::from_millis(50));
        assert!(manager.acquire_lock("s1", Some("Stop")).unwrap());
        thread::sleep(Duration::from_millis(80));
        assert!(manager.acquire_lock("s1", Some("Stop")).unwrap());
        // The replacement is fresh again.
        assert!(!manager.acquire_lock("s1", Some("Stop")).unwrap());
    }

    #[test]
    fn test_concurrent_acquire_has_exactly_one_winner() {
        let temp = tempdir().unwrap();
        let dir = temp.path().to_path_buf();
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dir = dir.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let manager = DedupManager::with_dir(dir);
                    barrier.wait();
                    manager.acquire_lock("race", Some("Stop")).unwrap()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|acquired| *acquired)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_acquire_in_missing_dir_propagates_error() {
        let temp = tempdir().unwrap();
        let manager = DedupManager::with_dir(temp.path().join("missing"));
        assert!(matches!(
            manager.acquire_lock("s1", None),
            Err(NotifyError::Io { .. })
        ));
    }

    #[test]
    fn test_content_lock_uses_its_own_ttl() {
        let temp = tempdir().unwrap();
        let manager = DedupManager::with_dir(temp.path())
            .with_lock_ttl(Duration::from_millis(10))
            .with_content_lock_ttl(Duration::from_millis(200));

        assert!(manager.acquire_content_lock("s1").unwrap());
        thread::sleep(Duration::from_millis(40));
        // Past the trigger TTL but within the content TTL: still held.
        assert!(!manager.acquire_content_lock("s1").unwrap());
        thread::sleep(Duration::from_millis(200));
        assert!(manager.acquire_content_lock("s1").unwrap());
    }

    #[test]
    fn test_content_lock_is_independent_of_trigger_lock() {
        let temp = tempdir().unwrap();
        let manager = DedupManager::with_dir(temp.path());
        assert!(manager.acquire_lock("s1", None).unwrap());
        assert!(manager.acquire_content_lock("s1").unwrap());
    }

    #[test]
    fn test_release_allows_immediate_reacquire() {
        let temp = tempdir().unwrap();
        let manager = DedupManager::with_dir(temp.path());
        assert!(manager.acquire_lock("s1", Some("Stop")).unwrap());
        manager.release_lock("s1", Some("Stop")).unwrap();
        assert!(manager.acquire_lock("s1", Some("Stop")).unwrap());

        assert!(manager.acquire_content_lock("s1").unwrap());
        manager.release_content_lock("s1").unwrap();
        assert!(manager.acquire_content_lock("s1").unwrap());
    }

    #[test]
    fn test_release_of_missing_lock_is_ok() {
        let temp = tempdir().unwrap();
        let manager = DedupManager::with_dir(temp.path());
        manager.release_lock("never", None).unwrap();
        manager.cleanup_for_session("never").unwrap();
    }

    #[test]
    fn test_cleanup_for_session_removes_global_and_content_locks() {
        let temp = tempdir().unwrap();
        let manager = DedupManager::with_dir(temp.path());
        manager.acquire_lock("s1", None).unwrap();
        manager.acquire_content_lock("s1").unwrap();
        manager.acquire_lock("s2", None).unwrap();

        manager.cleanup_for_session("s1").unwrap();

        assert!(!manager.lock_path("s1", None).exists());
        assert!(!manager.content_lock_path("s1").exists());
        assert!(manager.lock_path("s2", None).exists());
    }

    #[test]
    fn test_cleanup_removes_only_old_locks() {
        let temp = tempdir().unwrap();
        let manager = DedupManager::with_dir(temp.path());
        manager.acquire_lock("old", Some("Stop")).unwrap();
        fs::write(temp.path().join("claude-session-state-old.json"), "{}").unwrap();
        thread::sleep(Duration::from_millis(60));
        manager.acquire_lock("new", Some("Stop")).unwrap();

        let removed = manager.cleanup(Duration::from_millis(40)).unwrap();

        assert_eq!(removed, 1);
        assert!(!manager.lock_path("old", Some("Stop")).exists());
        assert!(manager.lock_path("new", Some("Stop")).exists());
        assert!(temp.path().join("claude-session-state-old.json").exists());
    }
}
