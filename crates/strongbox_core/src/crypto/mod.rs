//! Cryptographic operations for Strongbox.
//!
//! This module provides encryption at rest using AES-256-GCM.
//!
//! ## Security Model
//!
//! - Uses AES-256-GCM for authenticated encryption
//! - Unique random nonce per encryption operation
//! - The model name is bound to each ciphertext as associated data
//! - Keys are zeroized on drop
//! - Passphrase keys are derived with HKDF-SHA256 and a stored random salt
//!
//! ## Usage
//!
//! ```rust
//! use strongbox_core::crypto::{CryptoManager, EncryptionKey};
//!
//! let manager = CryptoManager::new(EncryptionKey::generate());
//! let ciphertext = manager.encrypt_with_aad(b"[]", b"User").unwrap();
//! let plaintext = manager.decrypt_with_aad(&ciphertext, b"User").unwrap();
//! assert_eq!(plaintext, b"[]");
//! ```

mod encrypted;

pub use encrypted::*;
