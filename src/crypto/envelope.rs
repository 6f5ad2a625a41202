//! On-disk envelope format: `IV (16 bytes) || CBC ciphertext`.
//!
//! There is no header, version byte or authentication tag. The only check
//! possible without the key is that the envelope can hold a full IV.

use crate::config::cipher_params::{BLOCK_SIZE, IV_LENGTH};
use crate::error::{Error, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use std::io::{ErrorKind, Read};

/// A CBC initialization vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iv([u8; IV_LENGTH]);

impl Iv {
    /// Draw a fresh IV from the operating system random source.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; IV_LENGTH];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| Error::EntropyUnavailable(e.to_string()))?;
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: [u8; IV_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; IV_LENGTH] {
        &self.0
    }
}

/// Concatenate an IV and ciphertext into an envelope.
pub fn frame(iv: &Iv, ciphertext: &[u8]) -> Vec<u8> {
    let mut envelope = Vec::with_capacity(IV_LENGTH + ciphertext.len());
    envelope.extend_from_slice(iv.as_bytes());
    envelope.extend_from_slice(ciphertext);
    envelope
}

/// Split an envelope into its IV and ciphertext.
pub fn unframe(envelope: &[u8]) -> Result<(Iv, &[u8])> {
    if envelope.len() < IV_LENGTH {
        return Err(Error::MalformedEnvelope {
            len: envelope.len(),
        });
    }

    let (iv_bytes, ciphertext) = envelope.split_at(IV_LENGTH);
    let mut iv = [0u8; IV_LENGTH];
    iv.copy_from_slice(iv_bytes);

    Ok((Iv(iv), ciphertext))
}

/// Read the IV from the start of an envelope stream.
pub fn read_iv<R: Read>(reader: &mut R) -> Result<Iv> {
    let mut iv = [0u8; IV_LENGTH];
    let mut filled = 0;

    while filled < IV_LENGTH {
        match reader.read(&mut iv[filled..]) {
            Ok(0) => return Err(Error::MalformedEnvelope { len: filled }),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(Iv(iv))
}

/// Key-independent facts about a stored envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeInfo {
    pub iv: Iv,
    pub ciphertext_len: usize,
    /// Whether the ciphertext is a non-empty whole number of blocks.
    /// Envelopes failing this can never decrypt.
    pub block_aligned: bool,
}

impl EnvelopeInfo {
    pub fn new(iv: Iv, ciphertext_len: usize) -> Self {
        Self {
            iv,
            ciphertext_len,
            block_aligned: ciphertext_len > 0 && ciphertext_len % BLOCK_SIZE == 0,
        }
    }
}
