//! Client configuration.

use crate::crypto::EncryptionKey;
use crate::schema::SchemaDefinition;
use std::path::PathBuf;

/// Directory name used under the platform data directory.
const DEFAULT_DIR_NAME: &str = "strongbox";

/// Where the schema comes from.
#[derive(Debug, Clone)]
pub enum SchemaSource {
    /// A JSON schema file, read when the client opens.
    File(PathBuf),
    /// An already parsed schema.
    Inline(SchemaDefinition),
}

/// How model files are protected at rest.
#[derive(Clone, Default)]
pub enum EncryptionMode {
    /// Generate a key on first open and keep it in the data directory.
    #[default]
    Generated,
    /// Use a caller-supplied key. Nothing key-related is written to disk.
    Key(EncryptionKey),
    /// Derive the key from a passphrase and a salt kept in the data directory.
    Passphrase(String),
    /// Store plain JSON.
    Disabled,
}

impl EncryptionMode {
    /// Returns whether model files are encrypted in this mode.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

impl std::fmt::Debug for EncryptionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generated => f.write_str("Generated"),
            Self::Key(_) => f.write_str("Key([REDACTED])"),
            Self::Passphrase(_) => f.write_str("Passphrase([REDACTED])"),
            Self::Disabled => f.write_str("Disabled"),
        }
    }
}

/// Configuration for opening a client.
#[derive(Debug, Clone)]
pub struct Config {
    /// The schema to enforce.
    pub schema: SchemaSource,

    /// Directory holding one file per model plus key artifacts.
    pub data_dir: PathBuf,

    /// Encryption at rest.
    pub encryption: EncryptionMode,

    /// Whether to create the data directory if it doesn't exist.
    pub create_if_missing: bool,
}

impl Config {
    /// Creates a configuration that reads the schema from a file.
    #[must_use]
    pub fn from_schema_file(path: impl Into<PathBuf>) -> Self {
        Self::with_source(SchemaSource::File(path.into()))
    }

    /// Creates a configuration around an already parsed schema.
    #[must_use]
    pub fn from_schema(schema: SchemaDefinition) -> Self {
        Self::with_source(SchemaSource::Inline(schema))
    }

    fn with_source(schema: SchemaSource) -> Self {
        Self {
            schema,
            data_dir: default_data_dir(),
            encryption: EncryptionMode::default(),
            create_if_missing: true,
        }
    }

    /// Sets the data directory.
    #[must_use]
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Uses a caller-supplied key instead of a generated one.
    #[must_use]
    pub fn encryption_key(mut self, key: EncryptionKey) -> Self {
        self.encryption = EncryptionMode::Key(key);
        self
    }

    /// Derives the key from a passphrase.
    #[must_use]
    pub fn passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.encryption = EncryptionMode::Passphrase(passphrase.into());
        self
    }

    /// Stores model files as plain JSON.
    #[must_use]
    pub fn disable_encryption(mut self) -> Self {
        self.encryption = EncryptionMode::Disabled;
        self
    }

    /// Sets whether to create the data directory if missing.
    #[must_use]
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Resolves the schema source.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the file cannot be read or is invalid.
    pub fn load_schema(&self) -> crate::CoreResult<SchemaDefinition> {
        match &self.schema {
            SchemaSource::File(path) => SchemaDefinition::from_file(path),
            SchemaSource::Inline(schema) => Ok(schema.clone()),
        }
    }
}

/// Returns `<platform data dir>/strongbox`, or `./.strongbox` when the
/// platform has no data directory.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join(DEFAULT_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(format!(".{DEFAULT_DIR_NAME}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> SchemaDefinition {
        SchemaDefinition::from_value(&json!({
            "User": {"id": {"type": "string", "isId": true}}
        }))
        .unwrap()
    }

    #[test]
    fn default_config() {
        let config = Config::from_schema(schema());
        assert!(config.create_if_missing);
        assert!(config.encryption.is_enabled());
        assert!(matches!(config.encryption, EncryptionMode::Generated));
        assert!(
            config.data_dir.ends_with(DEFAULT_DIR_NAME) || config.data_dir.ends_with(".strongbox")
        );
    }

    #[test]
    fn builder_pattern() {
        let config = Config::from_schema_file("schema.json")
            .data_dir("/tmp/app")
            .passphrase("open sesame")
            .create_if_missing(false);

        assert!(!config.create_if_missing);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/app"));
        assert!(matches!(config.encryption, EncryptionMode::Passphrase(_)));
        assert!(matches!(config.schema, SchemaSource::File(_)));
    }

    #[test]
    fn disable_encryption() {
        let config = Config::from_schema(schema()).disable_encryption();
        assert!(!config.encryption.is_enabled());
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = Config::from_schema(schema()).passphrase("hunter2");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn missing_schema_file_is_schema_error() {
        let config = Config::from_schema_file("/definitely/not/here.json");
        assert!(matches!(
            config.load_schema(),
            Err(crate::CoreError::Schema { .. })
        ));
    }
}
