//! Configuration constants and types for the file vault.

use crate::crypto::Secret;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default directory for encrypted envelopes.
pub const DEFAULT_ENCRYPTED_DIR: &str = "encrypted-files";

/// Default directory for recovered plaintext.
pub const DEFAULT_DECRYPTED_DIR: &str = "decrypted-files";

/// Default HTTP listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3333";

/// Environment variable holding the encryption secret.
pub const SECRET_ENV: &str = "ENCRYPTION_KEY";

/// Suffix stripped from encrypted names when choosing the decrypted name.
pub const ENCRYPTED_SUFFIX: &str = ".enc";

/// Prefix of temp files that exist only while a write is in progress.
pub const PARTIAL_PREFIX: &str = ".partial-";

/// Temp files older than this are left over from an interrupted process and
/// are removed when a store is opened (1 hour).
pub const STALE_PARTIAL_AGE: Duration = Duration::from_secs(60 * 60);

/// AES-256-CBC parameters.
pub mod cipher_params {
    /// Key length in bytes (256 bits).
    pub const KEY_LENGTH: usize = 32;

    /// Cipher block size in bytes.
    pub const BLOCK_SIZE: usize = 16;

    /// IV length in bytes (one block).
    pub const IV_LENGTH: usize = 16;

    /// Read size used by the streaming pipeline (64 KiB).
    pub const CHUNK_SIZE: usize = 64 * 1024;
}

/// Configuration for opening a vault store.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Directory holding envelopes.
    pub encrypted_dir: PathBuf,

    /// Directory holding recovered plaintext.
    pub decrypted_dir: PathBuf,

    /// Shared secret the key is derived from.
    /// `None` leaves the store usable for listing and purging only.
    pub secret: Option<Secret>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            encrypted_dir: PathBuf::from(DEFAULT_ENCRYPTED_DIR),
            decrypted_dir: PathBuf::from(DEFAULT_DECRYPTED_DIR),
            secret: None,
        }
    }
}

impl VaultConfig {
    /// Create a configuration with custom directories.
    pub fn new(encrypted_dir: impl Into<PathBuf>, decrypted_dir: impl Into<PathBuf>) -> Self {
        Self {
            encrypted_dir: encrypted_dir.into(),
            decrypted_dir: decrypted_dir.into(),
            secret: None,
        }
    }

    /// Place both store directories under a common root.
    pub fn under(root: &Path) -> Self {
        Self::new(
            root.join(DEFAULT_ENCRYPTED_DIR),
            root.join(DEFAULT_DECRYPTED_DIR),
        )
    }

    /// Attach the shared secret.
    pub fn with_secret(mut self, secret: impl Into<Secret>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.encrypted_dir.as_os_str().is_empty() || self.decrypted_dir.as_os_str().is_empty()
        {
            return Err("Store directories must not be empty paths".to_string());
        }
        if self.encrypted_dir == self.decrypted_dir {
            return Err(format!(
                "Encrypted and decrypted directories must differ: {}",
                self.encrypted_dir.display()
            ));
        }
        Ok(())
    }
}
