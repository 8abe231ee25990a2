//! # Strongbox Storage
//!
//! Storage backend trait and implementations for Strongbox.
//!
//! This crate provides the lowest-level storage abstraction. Backends are
//! **opaque named-blob stores**: each model's collection, and the key
//! material, is one blob addressed by a flat name. Backends do not interpret
//! the bytes they hold; encryption and serialization happen above them.
//!
//! ## Design Principles
//!
//! - Writes replace a blob atomically: a reader sees the old bytes or the
//!   new bytes, never a mix
//! - A failed write leaves the previous blob intact
//! - Must be `Send + Sync` so one backend can be shared by every model
//!
//! ## Available Backends
//!
//! - [`FileBackend`] - One file per blob inside a data directory
//! - [`InMemoryBackend`] - For testing, with write counting and fault injection
//!
//! ## Example
//!
//! ```rust
//! use strongbox_storage::{InMemoryBackend, StorageBackend};
//!
//! let backend = InMemoryBackend::new();
//! backend.write_atomic("User.json", b"[]").unwrap();
//! assert_eq!(backend.read("User.json").unwrap(), Some(b"[]".to_vec()));
//! assert_eq!(backend.read("Post.json").unwrap(), None);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{validate_blob_name, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
