//! Test fixtures and client helpers.
//!
//! Provides a sample schema and ready-made clients over in-memory or
//! temporary on-disk storage.

use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use strongbox_core::{record, Client, Config, EncryptionMode, Record, SchemaDefinition};
use strongbox_storage::InMemoryBackend;
use tempfile::TempDir;

/// JSON form of the sample schema used across the testkit.
pub const SAMPLE_SCHEMA: &str = r#"{
    "User": {
        "id": {"type": "string", "isId": true, "default": "uuid()"},
        "email": {"type": "string", "isUnique": true, "isRequired": true},
        "name": {"type": "string"},
        "age": {"type": "number"},
        "role": {"type": "string", "default": "member"},
        "createdAt": {"type": "date", "default": "now()"},
        "managerId": {"type": "string", "ref": "User"}
    },
    "Post": {
        "id": {"type": "number", "isId": true, "default": "autoincrement()"},
        "title": {"type": "string", "isRequired": true},
        "authorId": {"type": "string", "ref": "User"},
        "tags": {"type": "array", "items": {"type": "string"}},
        "published": {"type": "boolean", "default": false}
    }
}"#;

/// Parses [`SAMPLE_SCHEMA`].
#[must_use]
pub fn sample_schema() -> SchemaDefinition {
    SAMPLE_SCHEMA
        .parse()
        .expect("sample schema should be valid")
}

/// Builds a `User` create payload.
#[must_use]
pub fn user(email: &str, age: i64) -> Record {
    record(json!({"email": email, "age": age}))
}

/// Builds a `Post` create payload.
#[must_use]
pub fn post(title: &str, author_id: &Value) -> Record {
    record(json!({"title": title, "authorId": author_id}))
}

enum Storage {
    Memory(Arc<InMemoryBackend>),
    Dir(TempDir),
}

/// A client over throwaway storage.
///
/// Dereferences to [`Client`]. The in-memory variant exposes its backend so
/// tests can count writes, inject failures or corrupt blobs.
pub struct TestClient {
    /// The client instance.
    pub client: Client,
    storage: Storage,
    encryption: EncryptionMode,
}

impl TestClient {
    /// Creates a client over an in-memory backend with a generated key.
    #[must_use]
    pub fn memory() -> Self {
        Self::memory_with(sample_schema(), EncryptionMode::Generated)
    }

    /// Creates a client over an in-memory backend.
    #[must_use]
    pub fn memory_with(schema: SchemaDefinition, encryption: EncryptionMode) -> Self {
        let backend = Arc::new(InMemoryBackend::new());
        let client = Client::with_backend(schema, backend.clone(), &encryption)
            .expect("Failed to open in-memory client");
        Self {
            client,
            storage: Storage::Memory(backend),
            encryption,
        }
    }

    /// Creates a client over a temporary data directory.
    #[must_use]
    pub fn file() -> Self {
        Self::file_with(EncryptionMode::Generated)
    }

    /// Creates a client over a temporary data directory.
    #[must_use]
    pub fn file_with(encryption: EncryptionMode) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let client = Client::open(Self::config(temp_dir.path(), &encryption))
            .expect("Failed to open file client");
        Self {
            client,
            storage: Storage::Dir(temp_dir),
            encryption,
        }
    }

    fn config(dir: &Path, encryption: &EncryptionMode) -> Config {
        let mut config = Config::from_schema(sample_schema()).data_dir(dir);
        config.encryption = encryption.clone();
        config
    }

    /// Returns the in-memory backend, if this client has one.
    #[must_use]
    pub fn backend(&self) -> Option<&Arc<InMemoryBackend>> {
        match &self.storage {
            Storage::Memory(backend) => Some(backend),
            Storage::Dir(_) => None,
        }
    }

    /// Returns the data directory, if this client is file-based.
    #[must_use]
    pub fn data_dir(&self) -> Option<&Path> {
        match &self.storage {
            Storage::Memory(_) => None,
            Storage::Dir(dir) => Some(dir.path()),
        }
    }

    /// Opens a second, independent client over the same storage.
    #[must_use]
    pub fn reopen(&self) -> Client {
        match &self.storage {
            Storage::Memory(backend) => Client::with_backend(
                self.client.schema().clone(),
                backend.clone(),
                &self.encryption,
            )
            .expect("Failed to reopen in-memory client"),
            Storage::Dir(dir) => Client::open(Self::config(dir.path(), &self.encryption))
                .expect("Failed to reopen file client"),
        }
    }
}

impl std::ops::Deref for TestClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

/// Installs a `tracing` subscriber filtered by `RUST_LOG` (default `warn`).
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
