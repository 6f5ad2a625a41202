//! Storage name handling.

use crate::config::{ENCRYPTED_SUFFIX, PARTIAL_PREFIX};
use crate::error::{Error, Result};
use std::fmt;

/// A validated file name usable as a key in both store directories.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageName(String);

impl StorageName {
    /// Sanitize a client-supplied file name.
    ///
    /// Every whitespace character becomes `_`. Names that could escape the
    /// store directory or collide with in-progress writes are rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        let name: String = raw
            .chars()
            .map(|c| if is_name_space(c) { '_' } else { c })
            .collect();

        if name.is_empty() || name == "." || name == ".." {
            return Err(Error::InvalidName(format!("{:?}", raw)));
        }

        if name.contains(['/', '\\', '\0']) {
            return Err(Error::InvalidName(format!(
                "{:?} contains a path separator",
                raw
            )));
        }

        if name.starts_with(PARTIAL_PREFIX) {
            return Err(Error::InvalidName(format!(
                "{:?} uses the reserved prefix {}",
                raw, PARTIAL_PREFIX
            )));
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// This name with one trailing `.enc` stripped, when something remains.
    ///
    /// The store only uses it for the plaintext artifact when no other
    /// envelope already carries the stripped name.
    pub fn decrypted(&self) -> StorageName {
        match self.0.strip_suffix(ENCRYPTED_SUFFIX) {
            Some(stem) if !stem.is_empty() && stem != "." && stem != ".." => {
                StorageName(stem.to_string())
            }
            _ => self.clone(),
        }
    }
}

/// Whitespace as ECMAScript `\s` defines it: Unicode `White_Space` without
/// U+0085, plus the byte order mark U+FEFF. Names stored by earlier
/// deployments were sanitized with that class.
fn is_name_space(c: char) -> bool {
    c == '\u{feff}' || (c != '\u{85}' && c.is_whitespace())
}

impl fmt::Display for StorageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
