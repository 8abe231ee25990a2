//! Error types for Strongbox core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Strongbox core operations.
///
/// Every failed operation surfaces one of these to the caller; nothing is
/// retried or swallowed internally.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error (I/O failure during load or save).
    #[error("storage error: {0}")]
    Storage(#[from] strongbox_storage::StorageError),

    /// The schema is missing or structurally invalid.
    #[error("schema error: {message}")]
    Schema {
        /// Description of the problem.
        message: String,
    },

    /// A mutation violated a field rule (missing required field, type
    /// mismatch, unknown field, dangling reference).
    #[error("validation failed on {model}{}: {message}", field_suffix(.field))]
    Validation {
        /// The model being mutated.
        model: String,
        /// The offending field, if one can be named.
        field: Option<String>,
        /// Description of the violation.
        message: String,
    },

    /// A query argument (`where`, `orderBy`, `select`, ...) is malformed.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Description of the problem.
        message: String,
    },

    /// A value on a unique field already exists.
    #[error("unique constraint failed on {model}.{field}: {value} already exists")]
    UniqueConstraint {
        /// The model being mutated.
        model: String,
        /// The unique field.
        field: String,
        /// The duplicated value, rendered as JSON.
        value: String,
    },

    /// An id-keyed operation matched no record.
    #[error("record not found in {model}: {message}")]
    NotFound {
        /// The model searched.
        model: String,
        /// Description of what was looked up.
        message: String,
    },

    /// Persisted data could not be decrypted or deserialized.
    #[error("corrupted data for {model}: {message}")]
    Corruption {
        /// The model (or key artifact) whose data is unreadable.
        model: String,
        /// Description of the failure.
        message: String,
    },

    /// An operation named a model the schema does not define.
    #[error("unknown model: {name}")]
    UnknownModel {
        /// The requested model name.
        name: String,
    },

    /// Invalid key size.
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Expected size in bytes.
        expected: usize,
        /// Actual size in bytes.
        actual: usize,
    },

    /// Encryption failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Decryption failed.
    #[error("decryption failed: {message}")]
    DecryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// A background task failed unexpectedly.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

fn field_suffix(field: &Option<String>) -> String {
    field.as_ref().map(|f| format!(".{f}")).unwrap_or_default()
}

/// Flat classification of [`CoreError`] for hosts that map errors onto
/// their own channel (exit codes, IPC error names).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or missing schema.
    Schema,
    /// Bad input: field rules, query shape, model name, key size.
    Validation,
    /// Duplicate value on a unique field.
    UniqueConstraint,
    /// Keyed operation on a nonexistent record.
    NotFound,
    /// I/O failure.
    Storage,
    /// Undecryptable or undeserializable data.
    Corruption,
    /// Unexpected internal failure.
    Internal,
}

impl CoreError {
    /// Creates a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Creates a validation error attributed to a field.
    pub fn validation(
        model: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            model: model.into(),
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Creates a validation error concerning the record as a whole.
    pub fn record_validation(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            model: model.into(),
            field: None,
            message: message.into(),
        }
    }

    /// Creates an invalid query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Creates a unique constraint error.
    pub fn unique_constraint(
        model: impl Into<String>,
        field: impl Into<String>,
        value: &serde_json::Value,
    ) -> Self {
        Self::UniqueConstraint {
            model: model.into(),
            field: field.into(),
            value: value.to_string(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFound {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corruption(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corruption {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Creates an unknown model error.
    pub fn unknown_model(name: impl Into<String>) -> Self {
        Self::UnknownModel { name: name.into() }
    }

    /// Creates an invalid key size error.
    pub fn invalid_key_size(actual: usize, expected: usize) -> Self {
        Self::InvalidKeySize { expected, actual }
    }

    /// Creates an encryption failed error.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }

    /// Creates a decryption failed error.
    pub fn decryption_failed(message: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the flat classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Storage(_) | Self::EncryptionFailed { .. } => ErrorKind::Storage,
            Self::Schema { .. } => ErrorKind::Schema,
            Self::Validation { .. }
            | Self::InvalidQuery { .. }
            | Self::UnknownModel { .. }
            | Self::InvalidKeySize { .. } => ErrorKind::Validation,
            Self::UniqueConstraint { .. } => ErrorKind::UniqueConstraint,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Corruption { .. } | Self::DecryptionFailed { .. } => ErrorKind::Corruption,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Returns the model the error concerns, when there is one.
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        match self {
            Self::Validation { model, .. }
            | Self::UniqueConstraint { model, .. }
            | Self::NotFound { model, .. }
            | Self::Corruption { model, .. } => Some(model),
            Self::UnknownModel { name } => Some(name),
            _ => None,
        }
    }

    /// Returns the field the error concerns, when there is one.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => field.as_deref(),
            Self::UniqueConstraint { field, .. } => Some(field),
            _ => None,
        }
    }
}
