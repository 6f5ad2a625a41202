//! Cryptographic operations for the file vault.
//!
//! This module provides:
//! - SHA-256 key derivation from the shared secret
//! - The `IV || ciphertext` envelope format
//! - Streaming AES-256-CBC encryption and decryption

mod cipher;
mod envelope;
mod kdf;

pub use cipher::{
    ciphertext_len, decrypt, decrypt_stream, encrypt, encrypt_stream, StreamDecryptor,
    StreamEncryptor,
};
pub use envelope::{frame, read_iv, unframe, EnvelopeInfo, Iv};
pub use kdf::{derive_key, DerivedKey, Secret};
