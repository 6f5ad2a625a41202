//! Encrypted File Vault
//!
//! Stores uploaded files encrypted at rest with AES-256-CBC, under a key
//! derived from a shared secret, and decrypts them on demand.
//!
//! # Features
//!
//! - **Streaming AES-256-CBC**: bounded memory for arbitrarily large files
//! - **Fresh IV per file**: stored as the first 16 bytes of each envelope
//! - **Atomic writes**: readers never observe a half-written file
//! - **HTTP API**: upload, download, batch decrypt, list and purge
//!
//! # Envelope format
//!
//! ```text
//! IV (16 bytes) || AES-256-CBC(SHA-256(secret), IV, PKCS#7(plaintext))
//! ```
//!
//! The format carries no authentication tag. A wrong key or corrupted
//! envelope is usually reported as a padding failure, but may also decrypt
//! to garbage.
//!
//! # Example
//!
//! ```rust,no_run
//! use file_vault::{VaultConfig, VaultStore};
//! use std::path::Path;
//!
//! let config = VaultConfig::under(Path::new("./vault")).with_secret("shared secret");
//! let store = VaultStore::open(&config).unwrap();
//!
//! // Encrypt a file
//! store.store_encrypted("notes.txt", &b"Hidden data"[..]).unwrap();
//!
//! // Decrypt it back
//! let data = store.retrieve_decrypted("notes.txt").unwrap();
//! assert_eq!(data, b"Hidden data");
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod server;
pub mod store;

pub use config::VaultConfig;
pub use error::{Error, Result};
pub use store::{StoreKind, VaultStore};
