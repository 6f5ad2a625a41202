//! AES-256-CBC streaming encryption with PKCS#7 padding.
//!
//! Both directions are incremental: input may arrive in chunks of any size
//! and only whole blocks are pushed through the cipher. The encryptor carries
//! a partial block between calls; the decryptor always holds back the last
//! full block, since padding can only be checked once the input has ended.

use crate::config::cipher_params::{BLOCK_SIZE, CHUNK_SIZE, IV_LENGTH};
use crate::crypto::envelope::{self, Iv};
use crate::crypto::kdf::DerivedKey;
use crate::error::{Error, Result};
use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use std::io::{ErrorKind, Read, Write};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Ciphertext length produced for a plaintext of `plaintext_len` bytes.
///
/// PKCS#7 always pads, so a block-aligned plaintext gains a full block.
pub fn ciphertext_len(plaintext_len: usize) -> usize {
    (plaintext_len / BLOCK_SIZE + 1) * BLOCK_SIZE
}

/// Incremental CBC encryptor.
pub struct StreamEncryptor {
    cipher: Aes256CbcEnc,
    pending: Vec<u8>,
}

impl StreamEncryptor {
    pub fn new(key: &DerivedKey, iv: &Iv) -> Result<Self> {
        let cipher = Aes256CbcEnc::new_from_slices(key.as_bytes(), iv.as_bytes())
            .map_err(|e| Error::Encryption(e.to_string()))?;
        Ok(Self {
            cipher,
            pending: Vec::with_capacity(BLOCK_SIZE),
        })
    }

    /// Encrypt every complete block available and append it to `output`.
    pub fn update(&mut self, input: &[u8], output: &mut Vec<u8>) {
        self.pending.extend_from_slice(input);
        let ready = self.pending.len() - self.pending.len() % BLOCK_SIZE;

        for block in self.pending[..ready].chunks_exact_mut(BLOCK_SIZE) {
            self.cipher
                .encrypt_block_mut(GenericArray::from_mut_slice(block));
        }

        output.extend_from_slice(&self.pending[..ready]);
        self.pending.drain(..ready);
    }

    /// Pad and encrypt the remaining partial block.
    pub fn finalize(self, output: &mut Vec<u8>) {
        let Self { cipher, pending } = self;
        output.extend_from_slice(&cipher.encrypt_padded_vec_mut::<Pkcs7>(&pending));
    }
}

/// Incremental CBC decryptor.
pub struct StreamDecryptor {
    cipher: Aes256CbcDec,
    pending: Vec<u8>,
}

impl StreamDecryptor {
    pub fn new(key: &DerivedKey, iv: &Iv) -> Result<Self> {
        let cipher = Aes256CbcDec::new_from_slices(key.as_bytes(), iv.as_bytes())
            .map_err(|e| Error::Encryption(e.to_string()))?;
        Ok(Self {
            cipher,
            pending: Vec::with_capacity(BLOCK_SIZE),
        })
    }

    /// Decrypt every complete block except the last one seen so far.
    pub fn update(&mut self, input: &[u8], output: &mut Vec<u8>) {
        self.pending.extend_from_slice(input);
        if self.pending.is_empty() {
            return;
        }

        let ready = (self.pending.len() - 1) / BLOCK_SIZE * BLOCK_SIZE;

        for block in self.pending[..ready].chunks_exact_mut(BLOCK_SIZE) {
            self.cipher
                .decrypt_block_mut(GenericArray::from_mut_slice(block));
        }

        output.extend_from_slice(&self.pending[..ready]);
        self.pending.drain(..ready);
    }

    /// Decrypt the held-back block and strip its padding.
    ///
    /// Fails with [`Error::Decryption`] if the ciphertext was empty, not
    /// block aligned, or the padding is invalid. Without authentication a
    /// wrong key or corrupted data can still pass this check.
    pub fn finalize(self, output: &mut Vec<u8>) -> Result<()> {
        let Self { cipher, pending } = self;
        if pending.len() != BLOCK_SIZE {
            return Err(Error::Decryption);
        }

        let tail = cipher
            .decrypt_padded_vec_mut::<Pkcs7>(&pending)
            .map_err(|_| Error::Decryption)?;
        output.extend_from_slice(&tail);

        Ok(())
    }
}

fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<Option<usize>> {
    loop {
        match reader.read(buf) {
            Ok(0) => return Ok(None),
            Ok(n) => return Ok(Some(n)),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Encrypt `reader` into an envelope written to `writer`.
///
/// A fresh IV is generated and written before any ciphertext.
/// Returns the number of envelope bytes written.
pub fn encrypt_stream<R: Read, W: Write>(
    key: &DerivedKey,
    mut reader: R,
    mut writer: W,
) -> Result<u64> {
    let iv = Iv::generate()?;
    let mut encryptor = StreamEncryptor::new(key, &iv)?;

    writer.write_all(iv.as_bytes())?;
    let mut written = IV_LENGTH as u64;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut out = Vec::with_capacity(CHUNK_SIZE + BLOCK_SIZE);

    while let Some(n) = read_chunk(&mut reader, &mut buf)? {
        out.clear();
        encryptor.update(&buf[..n], &mut out);
        writer.write_all(&out)?;
        written += out.len() as u64;
    }

    out.clear();
    encryptor.finalize(&mut out);
    writer.write_all(&out)?;
    written += out.len() as u64;
    writer.flush()?;

    Ok(written)
}

/// Decrypt an envelope from `reader`, writing plaintext to `writer`.
///
/// On error some plaintext may already have been written; callers that
/// persist the output must discard it.
/// Returns the number of plaintext bytes written.
pub fn decrypt_stream<R: Read, W: Write>(
    key: &DerivedKey,
    mut reader: R,
    mut writer: W,
) -> Result<u64> {
    let iv = envelope::read_iv(&mut reader)?;
    let mut decryptor = StreamDecryptor::new(key, &iv)?;
    let mut written = 0u64;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut out = Vec::with_capacity(CHUNK_SIZE + BLOCK_SIZE);

    while let Some(n) = read_chunk(&mut reader, &mut buf)? {
        out.clear();
        decryptor.update(&buf[..n], &mut out);
        writer.write_all(&out)?;
        written += out.len() as u64;
    }

    out.clear();
    decryptor.finalize(&mut out)?;
    writer.write_all(&out)?;
    written += out.len() as u64;
    writer.flush()?;

    Ok(written)
}

/// Encrypt an in-memory plaintext into an envelope.
pub fn encrypt(key: &DerivedKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let iv = Iv::generate()?;
    let mut encryptor = StreamEncryptor::new(key, &iv)?;

    let mut ciphertext = Vec::with_capacity(ciphertext_len(plaintext.len()));
    encryptor.update(plaintext, &mut ciphertext);
    encryptor.finalize(&mut ciphertext);

    Ok(envelope::frame(&iv, &ciphertext))
}

/// Decrypt an in-memory envelope.
pub fn decrypt(key: &DerivedKey, envelope: &[u8]) -> Result<Vec<u8>> {
    let (iv, ciphertext) = envelope::unframe(envelope)?;
    let mut decryptor = StreamDecryptor::new(key, &iv)?;

    let mut plaintext = Vec::with_capacity(ciphertext.len());
    decryptor.update(ciphertext, &mut plaintext);
    decryptor.finalize(&mut plaintext)?;

    Ok(plaintext)
}
