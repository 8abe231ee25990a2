//! File-based storage backend for persistent storage.

use crate::backend::{settle_replace, validate_blob_name, StorageBackend};
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Suffix for the temporary sibling written before the atomic rename.
const TEMP_SUFFIX: &str = ".tmp";

/// A file-based storage backend.
///
/// Each blob is one file directly inside the data directory. Data survives
/// process restarts.
///
/// # Durability
///
/// `write_atomic` follows the write-then-rename pattern:
/// 1. Write to `<name>.tmp`
/// 2. Sync the temporary file to disk
/// 3. Rename it over `<name>`
/// 4. Fsync the directory so the rename itself is durable
///
/// A crash at any point leaves either the old or the new file under
/// `<name>`. A stray `.tmp` file may remain and is overwritten by the
/// next write.
///
/// # Thread Safety
///
/// Writes are serialized by an internal lock; reads are lock-free and rely
/// on rename atomicity.
///
/// # Example
///
/// ```no_run
/// use strongbox_storage::{FileBackend, StorageBackend};
/// use std::path::Path;
///
/// let backend = FileBackend::open(Path::new("data"), true).unwrap();
/// backend.write_atomic("User.json", b"[]").unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileBackend {
    /// Opens a data directory.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the data directory
    /// * `create_if_missing` - If true, creates the directory (and parents)
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is missing and may not be created,
    /// if the path is not a directory, or if an I/O error occurs.
    pub fn open(path: &Path, create_if_missing: bool) -> StorageResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(StorageError::MissingDirectory {
                    path: path.to_path_buf(),
                });
            }
        }

        if !path.is_dir() {
            return Err(StorageError::NotADirectory {
                path: path.to_path_buf(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the path to the data directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the file backing a blob.
    #[must_use]
    pub fn blob_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    fn write_temp(temp_path: &Path, data: &[u8]) -> io::Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        Ok(())
    }

    /// Syncs the data directory so renames are durable.
    #[cfg(unix)]
    fn sync_directory(&self) -> io::Result<()> {
        File::open(&self.path)?.sync_all()
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> io::Result<()> {
        // NTFS journals metadata; directory handles cannot be fsynced.
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn read(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_blob_name(name)?;

        match fs::read(self.blob_path(name)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_atomic(&self, name: &str, data: &[u8]) -> StorageResult<()> {
        validate_blob_name(name)?;

        let _guard = self.write_lock.lock();
        let final_path = self.blob_path(name);
        let temp_path = self.path.join(format!("{name}{TEMP_SUFFIX}"));

        let result = Self::write_temp(&temp_path, data)
            .and_then(|()| fs::rename(&temp_path, &final_path));

        if let Err(err) = result {
            if let Err(cleanup) = fs::remove_file(&temp_path) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(
                        path = %temp_path.display(),
                        error = %cleanup,
                        "failed to remove temporary file"
                    );
                }
            }
            return Err(err.into());
        }

        settle_replace(name, self.sync_directory());
        Ok(())
    }
}
