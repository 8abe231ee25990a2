//! # Strongbox Testkit
//!
//! Test utilities for Strongbox.
//!
//! This crate provides:
//! - Test fixtures: a sample schema and clients over throwaway storage
//! - Property-based test generators using proptest
//! - Stress helpers that drive a client from many tasks
//!
//! Cross-crate property and scenario tests live in this crate's `tests/`
//! directory.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use strongbox_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn test_with_client() {
//!     let client = TestClient::memory();
//!     client.create("User", CreateArgs::new(user("a@x.com", 30))).await.unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use strongbox_core::query::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
