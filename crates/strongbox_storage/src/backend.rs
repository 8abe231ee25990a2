//! Storage backend trait definition.

use crate::error::{StorageError, StorageResult};
use std::io;

/// A low-level storage backend for Strongbox.
///
/// Storage backends are **opaque named-blob stores**. Strongbox owns the
/// blob format (serialization, encryption, headers); backends only keep
/// bytes under a name.
///
/// # Invariants
///
/// - `read` returns exactly the bytes of the last successful `write_atomic`
///   for that name, or `None` if none ever succeeded
/// - `write_atomic` either fully replaces the blob or leaves the previous
///   bytes untouched
/// - Backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::FileBackend`] - For persistent storage
/// - [`super::InMemoryBackend`] - For testing
pub trait StorageBackend: Send + Sync {
    /// Reads the full contents of the named blob.
    ///
    /// Returns `None` if the blob has never been written.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or an I/O error occurs.
    fn read(&self, name: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Replaces the named blob with `data`.
    ///
    /// After this returns successfully the new contents are durable. If it
    /// fails, the previous contents (if any) are still readable. Once the
    /// new contents sit under the name, the write counts as done: a later
    /// sync failure is logged, not returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or an I/O error occurs.
    fn write_atomic(&self, name: &str, data: &[u8]) -> StorageResult<()>;
}

/// Checks that a blob name is a plain file name.
///
/// Names must be non-empty, contain only ASCII alphanumerics, `_`, `-` and
/// `.`, and must not start with `.`.
///
/// # Errors
///
/// Returns [`StorageError::InvalidName`] for anything else.
pub fn validate_blob_name(name: &str) -> StorageResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName {
            name: name.to_string(),
        })
    }
}

/// Settles the sync that follows a completed replace.
///
/// The new blob is already visible under `name`, so a sync failure cannot
/// be reported as a failed write.
pub(crate) fn settle_replace(name: &str, synced: io::Result<()>) {
    if let Err(err) = synced {
        tracing::warn!(name, error = %err, "blob replaced but sync failed");
    }
}
