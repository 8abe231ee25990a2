//! # Strongbox Core
//!
//! Embedded, schema-validated, encrypted document store.
//!
//! This crate provides:
//! - Schema loading and validation of model definitions
//! - Filter, ordering and pagination evaluation over JSON records
//! - A mutation pipeline enforcing types, defaults, uniqueness and references
//! - Per-model encrypted persistence (AES-256-GCM) with atomic file replacement
//! - A per-model cache that serializes writers and serves reads from snapshots
//! - [`Client`], the Prisma-style CRUD surface tying it all together
//!
//! ## Example
//!
//! ```rust
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> strongbox_core::CoreResult<()> {
//! use serde_json::json;
//! use std::sync::Arc;
//! use strongbox_core::query::{CreateArgs, FindManyArgs, OperationArgs};
//! use strongbox_core::{record, Client, EncryptionMode, SchemaDefinition};
//! use strongbox_storage::InMemoryBackend;
//!
//! let schema = SchemaDefinition::from_value(&json!({
//!     "User": {
//!         "id": {"type": "string", "isId": true, "default": "uuid()"},
//!         "email": {"type": "string", "isUnique": true, "isRequired": true},
//!         "age": {"type": "number"}
//!     }
//! }))?;
//! let client = Client::with_backend(
//!     schema,
//!     Arc::new(InMemoryBackend::new()),
//!     &EncryptionMode::Generated,
//! )?;
//!
//! client
//!     .create("User", CreateArgs::new(record(json!({"email": "a@x.com", "age": 30}))))
//!     .await?;
//! let found = client
//!     .find_many("User", FindManyArgs::from_json(json!({"where": {"age": {"gte": 18}}}))?)
//!     .await?;
//! assert_eq!(found.len(), 1);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
mod client;
pub mod config;
pub mod crypto;
mod error;
pub mod pipeline;
pub mod query;
pub mod schema;
pub mod store;
mod types;

pub use client::Client;
pub use config::{default_data_dir, Config, EncryptionMode, SchemaSource};
pub use crypto::{CryptoManager, EncryptionKey};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use schema::{FieldSpec, FieldType, ModelSchema, SchemaDefinition};
pub use store::EncryptedStore;
pub use types::{record, Mutation, Record};
