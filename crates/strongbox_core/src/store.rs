//! Encrypted persistence of model collections.
//!
//! Each model's collection is one blob in the storage backend:
//!
//! - encrypted: `<Model>.sbx` = `SBX1 || nonce (12) || ciphertext || tag (16)`,
//!   with the model name as AEAD associated data
//! - plaintext: `<Model>.json`, a pretty-printed JSON array
//!
//! Key material lives next to the data: `KEYFILE` holds a generated key,
//! `KEYSALT` the salt for passphrase derivation. A caller-supplied key is
//! never written anywhere. Losing the key makes the data unreadable.

use crate::config::EncryptionMode;
use crate::crypto::{generate_salt, CryptoManager, EncryptionKey, KEY_SIZE, SALT_SIZE};
use crate::error::{CoreError, CoreResult};
use crate::types::Record;
use std::sync::Arc;
use strongbox_storage::StorageBackend;

/// Magic prefix of encrypted model files.
pub const ENCRYPTED_MAGIC: &[u8; 4] = b"SBX1";

/// Blob holding a generated key.
pub const KEY_ARTIFACT: &str = "KEYFILE";

/// Blob holding the passphrase salt.
pub const SALT_ARTIFACT: &str = "KEYSALT";

const ENCRYPTED_EXTENSION: &str = "sbx";
const PLAIN_EXTENSION: &str = "json";

/// Loads and saves whole collections, encrypting them at rest.
///
/// The store holds no records itself; it converts between a collection
/// snapshot and its persisted bytes. Writes go through
/// [`StorageBackend::write_atomic`], so a failed save leaves the previous
/// file readable.
pub struct EncryptedStore {
    backend: Arc<dyn StorageBackend>,
    cipher: Option<CryptoManager>,
}

impl EncryptedStore {
    /// Opens a store, resolving key material for the given mode.
    ///
    /// # Errors
    ///
    /// Returns a storage error if key material cannot be read or written,
    /// or a corruption error if a stored key or salt has the wrong size.
    pub fn open(backend: Arc<dyn StorageBackend>, mode: &EncryptionMode) -> CoreResult<Self> {
        let key = match mode {
            EncryptionMode::Disabled => None,
            EncryptionMode::Key(key) => Some(key.clone()),
            EncryptionMode::Generated => Some(load_or_generate_key(backend.as_ref())?),
            EncryptionMode::Passphrase(passphrase) => {
                let salt = load_or_generate_salt(backend.as_ref())?;
                Some(EncryptionKey::derive_from_passphrase(
                    passphrase.as_bytes(),
                    &salt,
                )?)
            }
        };

        Ok(Self {
            backend,
            cipher: key.map(CryptoManager::new),
        })
    }

    /// Returns whether model files are encrypted.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    /// Returns the blob name used for a model.
    #[must_use]
    pub fn blob_name(&self, model: &str) -> String {
        blob_name(model, self.is_encrypted())
    }

    /// Returns the underlying backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Loads a model's collection. A model never saved loads as empty.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Corruption`] if the bytes cannot be decrypted or
    /// deserialized, or if the model was saved under the other encryption
    /// setting, and a storage error on I/O failure.
    pub fn load(&self, model: &str) -> CoreResult<Vec<Record>> {
        let name = self.blob_name(model);
        let Some(bytes) = self.backend.read(&name)? else {
            let other = blob_name(model, !self.is_encrypted());
            if self.backend.read(&other)?.is_some() {
                let message = if self.is_encrypted() {
                    "found a plaintext file but encryption is enabled"
                } else {
                    "found an encrypted file but encryption is disabled"
                };
                return Err(CoreError::corruption(model, message));
            }
            tracing::debug!(model, "no data file, starting empty");
            return Ok(Vec::new());
        };

        let plaintext = match &self.cipher {
            Some(cipher) => {
                let Some(sealed) = bytes.strip_prefix(ENCRYPTED_MAGIC.as_slice()) else {
                    return Err(CoreError::corruption(model, "missing file header"));
                };
                cipher
                    .decrypt_with_aad(sealed, model.as_bytes())
                    .map_err(|e| CoreError::corruption(model, e.to_string()))?
            }
            None => bytes,
        };

        let records: Vec<Record> = serde_json::from_slice(&plaintext)
            .map_err(|e| CoreError::corruption(model, format!("invalid collection: {e}")))?;

        tracing::debug!(model, records = records.len(), "loaded collection");
        Ok(records)
    }

    /// Persists a model's collection, replacing the previous file atomically.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the write fails; the previous file is
    /// left intact.
    pub fn save(&self, model: &str, records: &[Record]) -> CoreResult<()> {
        let bytes = match &self.cipher {
            Some(cipher) => {
                let json = serde_json::to_vec(records)
                    .map_err(|e| CoreError::internal(format!("serialize {model}: {e}")))?;
                let sealed = cipher.encrypt_with_aad(&json, model.as_bytes())?;
                let mut bytes = Vec::with_capacity(ENCRYPTED_MAGIC.len() + sealed.len());
                bytes.extend_from_slice(ENCRYPTED_MAGIC);
                bytes.extend(sealed);
                bytes
            }
            None => serde_json::to_vec_pretty(records)
                .map_err(|e| CoreError::internal(format!("serialize {model}: {e}")))?,
        };

        self.backend.write_atomic(&self.blob_name(model), &bytes)?;
        tracing::debug!(model, records = records.len(), bytes = bytes.len(), "saved collection");
        Ok(())
    }
}

impl std::fmt::Debug for EncryptedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedStore")
            .field("encrypted", &self.is_encrypted())
            .finish_non_exhaustive()
    }
}

fn blob_name(model: &str, encrypted: bool) -> String {
    let extension = if encrypted {
        ENCRYPTED_EXTENSION
    } else {
        PLAIN_EXTENSION
    };
    format!("{model}.{extension}")
}

fn load_or_generate_key(backend: &dyn StorageBackend) -> CoreResult<EncryptionKey> {
    if let Some(bytes) = backend.read(KEY_ARTIFACT)? {
        return EncryptionKey::from_bytes(&bytes).map_err(|_| {
            CoreError::corruption(
                KEY_ARTIFACT,
                format!("expected {KEY_SIZE} key bytes, found {}", bytes.len()),
            )
        });
    }

    let key = EncryptionKey::generate();
    backend.write_atomic(KEY_ARTIFACT, key.as_bytes())?;
    tracing::info!(artifact = KEY_ARTIFACT, "generated new encryption key");
    Ok(key)
}

fn load_or_generate_salt(backend: &dyn StorageBackend) -> CoreResult<Vec<u8>> {
    if let Some(salt) = backend.read(SALT_ARTIFACT)? {
        if salt.len() != SALT_SIZE {
            return Err(CoreError::corruption(
                SALT_ARTIFACT,
                format!("expected {SALT_SIZE} salt bytes, found {}", salt.len()),
            ));
        }
        return Ok(salt);
    }

    let salt = generate_salt();
    backend.write_atomic(SALT_ARTIFACT, &salt)?;
    tracing::info!(artifact = SALT_ARTIFACT, "generated new passphrase salt");
    Ok(salt.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::record;
    use serde_json::json;
    use strongbox_storage::{FileBackend, InMemoryBackend};
    use tempfile::tempdir;

    fn users() -> Vec<Record> {
        vec![
            record(json!({"id": "u1", "email": "a@x.com", "age": 20})),
            record(json!({"id": "u2", "email": "b@x.com", "age": 40})),
        ]
    }

    fn memory_store(mode: &EncryptionMode) -> (Arc<InMemoryBackend>, EncryptedStore) {
        let backend = Arc::new(InMemoryBackend::new());
        let store = EncryptedStore::open(backend.clone(), mode).unwrap();
        (backend, store)
    }

    #[test]
    fn missing_model_loads_empty() {
        let (_, store) = memory_store(&EncryptionMode::Generated);
        assert!(store.load("User").unwrap().is_empty());
    }

    #[test]
    fn roundtrip_preserves_content_and_order() {
        let (_, store) = memory_store(&EncryptionMode::Generated);
        store.save("User", &users()).unwrap();
        assert_eq!(store.load("User").unwrap(), users());
    }

    #[test]
    fn encrypted_file_layout() {
        let (backend, store) = memory_store(&EncryptionMode::Generated);
        store.save("User", &users()).unwrap();

        let bytes = backend.blob("User.sbx").unwrap();
        assert!(bytes.starts_with(ENCRYPTED_MAGIC));
        let text = String::from_utf8_lossy(&bytes);
        assert!(!text.contains("a@x.com"));
        assert!(backend.blob("User.json").is_none());
    }

    #[test]
    fn plaintext_mode_writes_pretty_json() {
        let (backend, store) = memory_store(&EncryptionMode::Disabled);
        assert!(!store.is_encrypted());
        store.save("User", &users()).unwrap();

        let text = String::from_utf8(backend.blob("User.json").unwrap()).unwrap();
        assert!(text.contains("\"email\": \"a@x.com\""));
        assert_eq!(store.load("User").unwrap(), users());
    }

    #[test]
    fn generated_key_is_persisted_and_reused() {
        let backend = Arc::new(InMemoryBackend::new());
        let first = EncryptedStore::open(backend.clone(), &EncryptionMode::Generated).unwrap();
        first.save("User", &users()).unwrap();

        let key = backend.blob(KEY_ARTIFACT).unwrap();
        assert_eq!(key.len(), KEY_SIZE);

        let second = EncryptedStore::open(backend.clone(), &EncryptionMode::Generated).unwrap();
        assert_eq!(second.load("User").unwrap(), users());
        assert_eq!(backend.blob(KEY_ARTIFACT).unwrap(), key);
    }

    #[test]
    fn supplied_key_is_not_written() {
        let key = EncryptionKey::generate();
        let (backend, store) = memory_store(&EncryptionMode::Key(key.clone()));
        store.save("User", &users()).unwrap();
        assert_eq!(backend.names(), vec!["User.sbx".to_string()]);

        let reopened = EncryptedStore::open(backend.clone(), &EncryptionMode::Key(key)).unwrap();
        assert_eq!(reopened.load("User").unwrap(), users());
    }

    #[test]
    fn passphrase_reopens_with_stored_salt() {
        let mode = EncryptionMode::Passphrase("correct horse battery staple".into());
        let (backend, store) = memory_store(&mode);
        store.save("User", &users()).unwrap();
        assert_eq!(backend.blob(SALT_ARTIFACT).unwrap().len(), SALT_SIZE);

        let reopened = EncryptedStore::open(backend.clone(), &mode).unwrap();
        assert_eq!(reopened.load("User").unwrap(), users());

        let wrong = EncryptionMode::Passphrase("wrong".into());
        let other = EncryptedStore::open(backend.clone(), &wrong).unwrap();
        assert_eq!(other.load("User").unwrap_err().kind(), ErrorKind::Corruption);
    }

    #[test]
    fn wrong_key_is_corruption() {
        let (backend, store) = memory_store(&EncryptionMode::Generated);
        store.save("User", &users()).unwrap();

        let mode = EncryptionMode::Key(EncryptionKey::generate());
        let other = EncryptedStore::open(backend.clone(), &mode).unwrap();
        let err = other.load("User").unwrap_err();
        assert!(matches!(err, CoreError::Corruption { ref model, .. } if model == "User"));
    }

    #[test]
    fn tampered_bytes_are_corruption() {
        let (backend, store) = memory_store(&EncryptionMode::Generated);
        store.save("User", &users()).unwrap();

        let mut bytes = backend.blob("User.sbx").unwrap();
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0x01;
        backend.set_blob("User.sbx", bytes);
        assert_eq!(store.load("User").unwrap_err().kind(), ErrorKind::Corruption);

        backend.set_blob("User.sbx", b"SBX1".to_vec());
        assert_eq!(store.load("User").unwrap_err().kind(), ErrorKind::Corruption);

        backend.set_blob("User.sbx", b"garbage".to_vec());
        assert_eq!(store.load("User").unwrap_err().kind(), ErrorKind::Corruption);
    }

    #[test]
    fn file_renamed_to_other_model_fails() {
        let (backend, store) = memory_store(&EncryptionMode::Generated);
        store.save("User", &users()).unwrap();

        backend.set_blob("Post.sbx", backend.blob("User.sbx").unwrap());
        assert_eq!(store.load("Post").unwrap_err().kind(), ErrorKind::Corruption);
    }

    #[test]
    fn invalid_plaintext_is_corruption() {
        let (backend, store) = memory_store(&EncryptionMode::Disabled);
        backend.set_blob("User.json", b"{\"not\": \"an array\"}".to_vec());
        assert_eq!(store.load("User").unwrap_err().kind(), ErrorKind::Corruption);

        backend.set_blob("User.json", b"[1, 2]".to_vec());
        assert_eq!(store.load("User").unwrap_err().kind(), ErrorKind::Corruption);
    }

    #[test]
    fn mode_mismatch_is_corruption() {
        let backend = Arc::new(InMemoryBackend::new());
        let plain = EncryptedStore::open(backend.clone(), &EncryptionMode::Disabled).unwrap();
        plain.save("User", &users()).unwrap();

        let encrypted = EncryptedStore::open(backend.clone(), &EncryptionMode::Generated).unwrap();
        assert_eq!(encrypted.load("User").unwrap_err().kind(), ErrorKind::Corruption);
    }

    #[test]
    fn truncated_key_artifact_is_corruption() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.set_blob(KEY_ARTIFACT, vec![0u8; 7]);
        let err = EncryptedStore::open(backend, &EncryptionMode::Generated).unwrap_err();
        assert!(matches!(err, CoreError::Corruption { ref model, .. } if model == KEY_ARTIFACT));
    }

    #[test]
    fn failed_save_keeps_previous_file() {
        let (backend, store) = memory_store(&EncryptionMode::Generated);
        store.save("User", &users()).unwrap();

        backend.fail_writes(true);
        let err = store.save("User", &users()[..1]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);

        backend.fail_writes(false);
        assert_eq!(store.load("User").unwrap(), users());
    }

    #[test]
    fn file_backend_roundtrip_across_reopen() {
        let dir = tempdir().unwrap();
        {
            let backend = Arc::new(FileBackend::open(dir.path(), true).unwrap());
            let store = EncryptedStore::open(backend, &EncryptionMode::Generated).unwrap();
            store.save("User", &users()).unwrap();
        }

        assert!(dir.path().join("User.sbx").exists());
        assert!(dir.path().join(KEY_ARTIFACT).exists());
        assert!(!dir.path().join("User.sbx.tmp").exists());

        let backend = Arc::new(FileBackend::open(dir.path(), false).unwrap());
        let store = EncryptedStore::open(backend, &EncryptionMode::Generated).unwrap();
        assert_eq!(store.load("User").unwrap(), users());
    }
}
