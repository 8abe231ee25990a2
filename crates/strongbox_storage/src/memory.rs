//! In-memory storage backend for testing.

use crate::backend::{settle_replace, validate_blob_name, StorageBackend};
use crate::error::StorageResult;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// An in-memory storage backend.
///
/// This backend stores all blobs in memory and is suitable for:
/// - Unit tests
/// - Integration tests that need to observe or sabotage writes
/// - Ephemeral stores that don't need persistence
///
/// Every successful `write_atomic` increments a counter, and writes can be
/// made to fail on demand to exercise error paths.
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use strongbox_storage::{InMemoryBackend, StorageBackend};
///
/// let backend = InMemoryBackend::new();
/// backend.write_atomic("User.json", b"[]").unwrap();
/// assert_eq!(backend.write_count(), 1);
///
/// backend.fail_writes(true);
/// assert!(backend.write_atomic("User.json", b"[{}]").is_err());
/// assert_eq!(backend.read("User.json").unwrap(), Some(b"[]".to_vec()));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
    fail_syncs: AtomicBool,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend with pre-existing blobs.
    ///
    /// Useful for testing recovery scenarios. Seeding does not count as a
    /// write.
    #[must_use]
    pub fn with_blobs(blobs: impl IntoIterator<Item = (String, Vec<u8>)>) -> Self {
        Self {
            blobs: RwLock::new(blobs.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Returns a copy of one blob, bypassing name validation.
    #[must_use]
    pub fn blob(&self, name: &str) -> Option<Vec<u8>> {
        self.blobs.read().get(name).cloned()
    }

    /// Overwrites a blob directly, without counting a write.
    ///
    /// Used by tests to simulate external tampering.
    pub fn set_blob(&self, name: &str, data: Vec<u8>) {
        self.blobs.write().insert(name.to_string(), data);
    }

    /// Returns the names of all stored blobs, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.blobs.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns how many writes have succeeded.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Makes every subsequent write fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes the sync after each replace fail (or succeed again). The
    /// replace itself still happens.
    pub fn fail_syncs(&self, fail: bool) {
        self.fail_syncs.store(fail, Ordering::SeqCst);
    }
}

impl StorageBackend for InMemoryBackend {
    fn read(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_blob_name(name)?;
        Ok(self.blobs.read().get(name).cloned())
    }

    fn write_atomic(&self, name: &str, data: &[u8]) -> StorageResult<()> {
        validate_blob_name(name)?;

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected write failure").into());
        }

        self.blobs.write().insert(name.to_string(), data.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);

        let synced = if self.fail_syncs.load(Ordering::SeqCst) {
            Err(io::Error::new(io::ErrorKind::Other, "injected sync failure"))
        } else {
            Ok(())
        };
        settle_replace(name, synced);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;

    #[test]
    fn memory_new_is_empty() {
        let backend = InMemoryBackend::new();
        assert!(backend.names().is_empty());
        assert_eq!(backend.write_count(), 0);
        assert_eq!(backend.read("User.json").unwrap(), None);
    }

    #[test]
    fn memory_write_replaces() {
        let backend = InMemoryBackend::new();
        backend.write_atomic("User.json", b"one").unwrap();
        backend.write_atomic("User.json", b"two").unwrap();

        assert_eq!(backend.read("User.json").unwrap().unwrap(), b"two");
        assert_eq!(backend.write_count(), 2);
    }

    #[test]
    fn memory_with_blobs() {
        let backend =
            InMemoryBackend::with_blobs([("Post.json".to_string(), b"preloaded".to_vec())]);
        assert_eq!(backend.blob("Post.json").unwrap(), b"preloaded");
        assert_eq!(backend.write_count(), 0);
    }

    #[test]
    fn memory_injected_failure_keeps_old_blob() {
        let backend = InMemoryBackend::new();
        backend.write_atomic("User.json", b"old").unwrap();

        backend.fail_writes(true);
        let result = backend.write_atomic("User.json", b"new");
        assert!(matches!(result, Err(StorageError::Io(_))));
        assert_eq!(backend.blob("User.json").unwrap(), b"old");
        assert_eq!(backend.write_count(), 1);

        backend.fail_writes(false);
        backend.write_atomic("User.json", b"new").unwrap();
        assert_eq!(backend.blob("User.json").unwrap(), b"new");
    }

    #[test]
    fn memory_sync_failure_after_replace_is_not_an_error() {
        let backend = InMemoryBackend::new();
        backend.write_atomic("User.json", b"old").unwrap();

        backend.fail_syncs(true);
        backend.write_atomic("User.json", b"new").unwrap();
        assert_eq!(backend.blob("User.json").unwrap(), b"new");
        assert_eq!(backend.write_count(), 2);
    }

    #[test]
    fn memory_set_blob_is_not_a_write() {
        let backend = InMemoryBackend::new();
        backend.set_blob("User.sbx", vec![0xde, 0xad]);
        assert_eq!(backend.write_count(), 0);
        assert_eq!(backend.names(), vec!["User.sbx".to_string()]);
    }
}
