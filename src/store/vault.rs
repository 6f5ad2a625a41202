//! Vault store - the main interface.

use crate::config::cipher_params::IV_LENGTH;
use crate::config::{VaultConfig, PARTIAL_PREFIX, SECRET_ENV, STALE_PARTIAL_AGE};
use crate::crypto::{
    decrypt_stream, derive_key, encrypt_stream, read_iv, DerivedKey, EnvelopeInfo,
};
use crate::error::{Error, Result};
use crate::store::locks::NameLocks;
use crate::store::name::StorageName;
use serde::Serialize;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use walkdir::WalkDir;

/// Which store directory to operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Encrypted,
    Decrypted,
}

/// A file written to the encrypted store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFile {
    /// Sanitized storage name.
    pub name: String,
    /// Envelope size in bytes, IV included.
    pub size: u64,
}

/// One file that could not be decrypted during a batch.
#[derive(Debug)]
pub struct BatchFailure {
    pub name: String,
    pub error: Error,
}

/// Outcome of [`VaultStore::decrypt_all`].
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Names of envelopes decrypted successfully.
    pub decrypted: Vec<String>,
    /// Envelopes that failed, each with its own error.
    pub failed: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.decrypted.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// An encrypted upload written to a temp file in the encrypted directory
/// but not yet visible under its name. Dropping it discards the envelope.
#[derive(Debug)]
pub struct StagedFile {
    name: StorageName,
    temp: NamedTempFile,
    size: u64,
}

impl StagedFile {
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Envelope size in bytes, IV included.
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Plaintext recovered into the decrypted directory, opened for reading.
#[derive(Debug)]
pub struct DecryptedFile {
    /// Name of the plaintext artifact.
    pub name: String,
    pub file: File,
    pub size: u64,
}

/// Encrypted file store backed by two directories.
///
/// Envelopes live in the encrypted directory under their sanitized name,
/// recovered plaintext in the decrypted directory. Every write goes to a
/// temp file in the destination directory and is renamed into place only
/// once complete.
pub struct VaultStore {
    /// Directory of envelopes.
    encrypted_dir: PathBuf,
    /// Directory of recovered plaintext.
    decrypted_dir: PathBuf,
    /// Key derived from the configured secret, if any.
    key: Option<DerivedKey>,
    /// Serializes read-then-write sequences on the same envelope.
    locks: NameLocks,
    /// Serializes writes and deletes of the same plaintext artifact.
    /// Always taken after the envelope lock, never before.
    plain_locks: NameLocks,
}

impl VaultStore {
    /// Open a store, creating both directories if needed and removing temp
    /// files left behind by an interrupted process.
    ///
    /// A missing secret does not fail here; operations that need the key
    /// return [`Error::Configuration`] instead.
    pub fn open(config: &VaultConfig) -> Result<Self> {
        config.validate().map_err(Error::Configuration)?;

        fs::create_dir_all(&config.encrypted_dir)?;
        fs::create_dir_all(&config.decrypted_dir)?;

        let key = match &config.secret {
            Some(secret) if !secret.is_empty() => Some(derive_key(secret.as_bytes())?),
            _ => None,
        };

        let store = Self {
            encrypted_dir: config.encrypted_dir.clone(),
            decrypted_dir: config.decrypted_dir.clone(),
            key,
            locks: NameLocks::new(),
            plain_locks: NameLocks::new(),
        };
        store.remove_stale_partials(STALE_PARTIAL_AGE)?;

        Ok(store)
    }

    /// Whether a key is configured.
    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    pub fn encrypted_dir(&self) -> &Path {
        &self.encrypted_dir
    }

    pub fn decrypted_dir(&self) -> &Path {
        &self.decrypted_dir
    }

    /// Path of the envelope for `name`.
    pub fn encrypted_path(&self, name: &StorageName) -> PathBuf {
        self.encrypted_dir.join(name.as_str())
    }

    /// Path of the plaintext recovered from the envelope `name`.
    pub fn decrypted_path(&self, name: &StorageName) -> PathBuf {
        self.decrypted_dir.join(self.decrypted_name(name).as_str())
    }

    /// Plaintext name for the envelope `name`.
    ///
    /// A trailing `.enc` is stripped unless an envelope with the stripped
    /// name exists, so two envelopes never share a plaintext artifact.
    fn decrypted_name(&self, name: &StorageName) -> StorageName {
        let stripped = name.decrypted();
        if stripped != *name && self.encrypted_path(&stripped).is_file() {
            return name.clone();
        }
        stripped
    }

    fn key(&self) -> Result<&DerivedKey> {
        self.key.as_ref().ok_or_else(|| {
            Error::Configuration(format!("encryption key not configured (set {})", SECRET_ENV))
        })
    }

    /// Encrypt `reader` and store the envelope under the sanitized `name`.
    ///
    /// An existing envelope with the same name is replaced.
    pub fn store_encrypted<R: Read>(&self, name: &str, reader: R) -> Result<StoredFile> {
        let staged = self.stage_encrypted(name, reader)?;
        self.commit(staged)
    }

    /// Encrypt `reader` into a temp file without publishing it.
    ///
    /// Nothing becomes visible under `name` until [`VaultStore::commit`].
    pub fn stage_encrypted<R: Read>(&self, name: &str, reader: R) -> Result<StagedFile> {
        let name = StorageName::parse(name)?;
        let key = self.key()?;

        let (temp, size) = write_temp(&self.encrypted_dir, |writer| {
            encrypt_stream(key, reader, writer)
        })?;

        Ok(StagedFile { name, temp, size })
    }

    /// Publish a staged envelope under its name, replacing any previous one.
    pub fn commit(&self, staged: StagedFile) -> Result<StoredFile> {
        let StagedFile { name, temp, size } = staged;

        let slot = self.locks.slot(name.as_str());
        let _guard = slot.lock();

        temp.persist(self.encrypted_path(&name))
            .map_err(|e| Error::Io(e.error))?;

        Ok(StoredFile {
            name: name.to_string(),
            size,
        })
    }

    /// Decrypt the envelope `name` into the decrypted directory and return
    /// the recovered bytes.
    pub fn retrieve_decrypted(&self, name: &str) -> Result<Vec<u8>> {
        let mut decrypted = self.open_decrypted(name)?;

        let mut plaintext = Vec::with_capacity(decrypted.size as usize);
        decrypted.file.read_to_end(&mut plaintext)?;

        Ok(plaintext)
    }

    /// Decrypt the envelope `name` into the decrypted directory and open the
    /// result for reading.
    pub fn open_decrypted(&self, name: &str) -> Result<DecryptedFile> {
        self.decrypt_into_store(name, |plain, dest| {
            let file = File::open(dest)?;
            let size = file.metadata()?.len();
            Ok(DecryptedFile {
                name: plain.to_string(),
                file,
                size,
            })
        })
    }

    /// Decrypt the envelope `name` into the decrypted directory without
    /// holding the plaintext in memory. Returns the written path.
    pub fn decrypt_to_store(&self, name: &str) -> Result<PathBuf> {
        self.decrypt_into_store(name, |_, dest| Ok(dest.to_path_buf()))
    }

    /// Decrypt every stored envelope.
    ///
    /// Each file is handled independently: a failure is recorded in the
    /// report and the batch continues.
    pub fn decrypt_all(&self) -> Result<BatchReport> {
        self.key()?;

        let mut report = BatchReport::default();
        for name in self.list(StoreKind::Encrypted)? {
            match self.decrypt_to_store(&name) {
                Ok(_) => report.decrypted.push(name),
                Err(error) => report.failed.push(BatchFailure { name, error }),
            }
        }

        Ok(report)
    }

    /// Read the IV and ciphertext length of a stored envelope. Needs no key.
    pub fn inspect(&self, name: &str) -> Result<EnvelopeInfo> {
        let name = StorageName::parse(name)?;
        let mut envelope = self.open_envelope(&name)?;
        let len = envelope.metadata()?.len() as usize;
        let iv = read_iv(&mut envelope)?;
        Ok(EnvelopeInfo::new(iv, len - IV_LENGTH))
    }

    /// List stored file names, sorted. In-progress writes are not listed.
    pub fn list(&self, which: StoreKind) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for path in self.files_in(which)? {
            if let Some(name) = path.file_name() {
                names.push(name.to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    /// Delete every file in the decrypted directory.
    ///
    /// Returns the number of files removed.
    pub fn purge_decrypted(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.files_in(StoreKind::Decrypted)? {
            let slot = path
                .file_name()
                .map(|name| self.plain_locks.slot(&name.to_string_lossy()));
            let _guard = slot.as_ref().map(|slot| slot.lock());

            if remove_if_present(&path)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Delete temp files in both directories whose last write is at least
    /// `older_than` ago. Returns the number of files removed.
    pub fn remove_stale_partials(&self, older_than: Duration) -> Result<usize> {
        let mut removed = 0;

        for dir in [&self.encrypted_dir, &self.decrypted_dir] {
            for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
                let entry = entry?;
                if !entry.file_type().is_file() || !is_partial(entry.file_name()) {
                    continue;
                }

                // A timestamp in the future counts as fresh
                let age = entry
                    .metadata()?
                    .modified()?
                    .elapsed()
                    .unwrap_or_default();
                if age < older_than {
                    continue;
                }

                if remove_if_present(entry.path())? {
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }

    fn dir(&self, which: StoreKind) -> &Path {
        match which {
            StoreKind::Encrypted => &self.encrypted_dir,
            StoreKind::Decrypted => &self.decrypted_dir,
        }
    }

    fn files_in(&self, which: StoreKind) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(self.dir(which))
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            // Skip temp files of writes still in progress
            if is_partial(entry.file_name()) {
                continue;
            }

            files.push(entry.into_path());
        }

        Ok(files)
    }

    fn prepare_decrypt(&self, name: &str) -> Result<(StorageName, &DerivedKey)> {
        let name = StorageName::parse(name)?;
        if !self.encrypted_path(&name).is_file() {
            return Err(Error::NotFound(name.to_string()));
        }
        let key = self.key()?;
        Ok((name, key))
    }

    /// Decrypt `name` into the decrypted directory and hand the plaintext
    /// name and path to `then` while both locks are still held.
    fn decrypt_into_store<T, F>(&self, name: &str, then: F) -> Result<T>
    where
        F: FnOnce(&StorageName, &Path) -> Result<T>,
    {
        let (name, key) = self.prepare_decrypt(name)?;

        let slot = self.locks.slot(name.as_str());
        let _guard = slot.lock();

        let plain = self.decrypted_name(&name);
        let plain_slot = self.plain_locks.slot(plain.as_str());
        let _plain_guard = plain_slot.lock();

        let envelope = self.open_envelope(&name)?;
        let dest = self.decrypted_dir.join(plain.as_str());
        write_atomically(&self.decrypted_dir, &dest, |writer| {
            decrypt_stream(key, BufReader::new(envelope), writer)
        })?;

        then(&plain, &dest)
    }

    fn open_envelope(&self, name: &StorageName) -> Result<File> {
        File::open(self.encrypted_path(name)).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::NotFound(name.to_string()),
            _ => Error::Io(e),
        })
    }
}

fn is_partial(file_name: &OsStr) -> bool {
    file_name
        .to_str()
        .is_some_and(|name| name.starts_with(PARTIAL_PREFIX))
}

/// Remove `path`, treating an already missing file as not removed.
fn remove_if_present(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Run `write` against a fresh temp file in `dir` and sync it. On error the
/// temp file is removed.
fn write_temp<F>(dir: &Path, write: F) -> Result<(NamedTempFile, u64)>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> Result<u64>,
{
    let mut temp = tempfile::Builder::new()
        .prefix(PARTIAL_PREFIX)
        .tempfile_in(dir)?;

    let written = {
        let mut writer = BufWriter::new(temp.as_file_mut());
        let written = write(&mut writer)?;
        writer.flush()?;
        written
    };

    temp.as_file().sync_all()?;
    Ok((temp, written))
}

/// Write `dest` through a temp file in `dir`, renaming it into place only
/// after `write` succeeds and the data is synced. On error `dest` is
/// untouched.
fn write_atomically<F>(dir: &Path, dest: &Path, write: F) -> Result<u64>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> Result<u64>,
{
    let (temp, written) = write_temp(dir, write)?;
    temp.persist(dest).map_err(|e| Error::Io(e.error))?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> VaultStore {
        VaultStore::open(&VaultConfig::under(dir.path()).with_secret("test-key")).unwrap()
    }

    #[test]
    fn test_open_creates_dirs() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        assert!(store.encrypted_dir().is_dir());
        assert!(store.decrypted_dir().is_dir());
        assert!(store.has_key());
    }

    #[test]
    fn test_store_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.store_encrypted("doc.txt", &b"first version"[..]).unwrap();
        store.store_encrypted("doc.txt", &b"second"[..]).unwrap();

        assert_eq!(store.list(StoreKind::Encrypted).unwrap(), vec!["doc.txt"]);
        assert_eq!(store.retrieve_decrypted("doc.txt").unwrap(), b"second");
    }

    #[test]
    fn test_failed_write_leaves_no_file() {
        struct FailingReader;
        impl Read for FailingReader {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(ErrorKind::BrokenPipe, "client went away"))
            }
        }

        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let result = store.store_encrypted("aborted.bin", FailingReader);
        assert!(matches!(result, Err(Error::Io(_))));

        assert!(store.list(StoreKind::Encrypted).unwrap().is_empty());
        assert_eq!(fs::read_dir(store.encrypted_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_failed_decrypt_keeps_previous_plaintext() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.store_encrypted("keep.txt", &b"good"[..]).unwrap();
        store.retrieve_decrypted("keep.txt").unwrap();

        // Corrupt the envelope so it is no longer block aligned.
        let name = StorageName::parse("keep.txt").unwrap();
        let path = store.encrypted_path(&name);
        let mut envelope = fs::read(&path).unwrap();
        envelope.pop();
        fs::write(&path, envelope).unwrap();

        assert!(matches!(
            store.decrypt_to_store("keep.txt"),
            Err(Error::Decryption)
        ));
        assert_eq!(fs::read(store.decrypted_path(&name)).unwrap(), b"good");
        assert_eq!(store.list(StoreKind::Decrypted).unwrap(), vec!["keep.txt"]);
    }

    #[test]
    fn test_partial_files_hidden() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        fs::write(store.encrypted_dir().join(".partial-abc123"), b"half").unwrap();
        fs::create_dir(store.encrypted_dir().join("subdir")).unwrap();
        store.store_encrypted("visible.txt", &b"data"[..]).unwrap();

        assert_eq!(
            store.list(StoreKind::Encrypted).unwrap(),
            vec!["visible.txt"]
        );
    }

    #[test]
    fn test_enc_suffix_stripped_on_decrypt() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.store_encrypted("photo.jpg.enc", &b"pixels"[..]).unwrap();
        let path = store.decrypt_to_store("photo.jpg.enc").unwrap();

        assert_eq!(path, store.decrypted_dir().join("photo.jpg"));
        assert_eq!(fs::read(path).unwrap(), b"pixels");
    }

    #[test]
    fn test_missing_key_reported() {
        let dir = TempDir::new().unwrap();
        let store = VaultStore::open(&VaultConfig::under(dir.path())).unwrap();
        assert!(!store.has_key());

        let result = store.store_encrypted("a.txt", &b"data"[..]);
        assert!(matches!(result, Err(Error::Configuration(_))));
        assert!(matches!(store.decrypt_all(), Err(Error::Configuration(_))));

        // Listing and purging need no key.
        assert!(store.list(StoreKind::Encrypted).unwrap().is_empty());
        assert_eq!(store.purge_decrypted().unwrap(), 0);
    }

    #[test]
    fn test_inspect_without_key() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.store_encrypted("a.txt", &b"hello world"[..]).unwrap();

        let keyless = VaultStore::open(&VaultConfig::under(dir.path())).unwrap();
        let info = keyless.inspect("a.txt").unwrap();

        assert_eq!(info.ciphertext_len, 16);
        assert!(info.block_aligned);
        assert!(matches!(keyless.inspect("missing"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_empty_secret_treated_as_missing() {
        let dir = TempDir::new().unwrap();
        let store = VaultStore::open(&VaultConfig::under(dir.path()).with_secret("")).unwrap();

        assert!(!store.has_key());
    }

    #[test]
    fn test_enc_suffix_kept_when_stripped_name_is_stored() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.store_encrypted("x", &b"plain upload"[..]).unwrap();
        store.store_encrypted("x.enc", &b"other upload"[..]).unwrap();

        let report = store.decrypt_all().unwrap();
        assert_eq!(report.decrypted, vec!["x", "x.enc"]);

        assert_eq!(store.list(StoreKind::Decrypted).unwrap(), vec!["x", "x.enc"]);
        assert_eq!(
            fs::read(store.decrypted_dir().join("x")).unwrap(),
            b"plain upload"
        );
        assert_eq!(
            fs::read(store.decrypted_dir().join("x.enc")).unwrap(),
            b"other upload"
        );
    }

    #[test]
    fn test_staged_file_invisible_until_commit() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let staged = store.stage_encrypted("later.txt", &b"data"[..]).unwrap();
        assert_eq!(staged.name(), "later.txt");
        assert_eq!(staged.size(), 32);
        assert!(store.list(StoreKind::Encrypted).unwrap().is_empty());

        let stored = store.commit(staged).unwrap();
        assert_eq!(stored.name, "later.txt");
        assert_eq!(store.retrieve_decrypted("later.txt").unwrap(), b"data");

        // Dropping a staged file leaves nothing behind
        drop(store.stage_encrypted("discarded.txt", &b"data"[..]).unwrap());
        assert_eq!(store.list(StoreKind::Encrypted).unwrap(), vec!["later.txt"]);
        assert_eq!(fs::read_dir(store.encrypted_dir()).unwrap().count(), 1);
    }

    #[test]
    fn test_open_decrypted_reports_name_and_size() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.store_encrypted("clip.mp4.enc", &b"frames"[..]).unwrap();

        let mut decrypted = store.open_decrypted("clip.mp4.enc").unwrap();
        assert_eq!(decrypted.name, "clip.mp4");
        assert_eq!(decrypted.size, 6);

        let mut data = Vec::new();
        decrypted.file.read_to_end(&mut data).unwrap();
        assert_eq!(data, b"frames");
    }

    #[test]
    fn test_stale_partials_removed_on_open() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let stale = store.encrypted_dir().join(".partial-stale");
        let fresh = store.decrypted_dir().join(".partial-fresh");
        fs::write(&stale, b"left over").unwrap();
        fs::write(&fresh, b"in progress").unwrap();
        fs::File::options()
            .write(true)
            .open(&stale)
            .unwrap()
            .set_modified(SystemTime::now() - STALE_PARTIAL_AGE * 2)
            .unwrap();
        store.store_encrypted("kept.txt", &b"data"[..]).unwrap();

        let reopened = open_store(&dir);
        assert!(!stale.exists());
        assert!(fresh.exists());
        assert_eq!(reopened.list(StoreKind::Encrypted).unwrap(), vec!["kept.txt"]);

        assert_eq!(reopened.remove_stale_partials(Duration::ZERO).unwrap(), 1);
        assert!(!fresh.exists());
    }
}
