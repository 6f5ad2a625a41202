//! Vault store: directory I/O around the cipher engine.
//!
//! This module handles:
//! - Storing uploads as encrypted envelopes
//! - Recovering plaintext into the decrypted directory
//! - Listing and purging the store directories

mod locks;
mod name;
mod vault;

pub use locks::NameLocks;
pub use name::StorageName;
pub use vault::{
    BatchFailure, BatchReport, DecryptedFile, StagedFile, StoreKind, StoredFile, VaultStore,
};
