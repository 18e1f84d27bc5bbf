// src/raddb.rs

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RadDbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Decryption error: {0}")]
    Decryption(String),
    #[error("Encryption error: {0}")]
    Encryption(String),
    #[error("Store lock poisoned")]
    Poisoned,
}

/// Encryption key (32 bytes = 256 bits)
pub type MasterKey = [u8; 32];

type Table = HashMap<String, Vec<u8>>;

/// Read access shared by views and transactions.
pub trait KvRead {
    fn get_raw(&self, key: &str) -> Option<Vec<u8>>;
}

/// Read-only view held under the shared lock.
pub struct View<'a> {
    data: &'a Table,
}

impl KvRead for View<'_> {
    fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        self.data.get(key).cloned()
    }
}

/// Staged writes over the committed table. Nothing is visible to other
/// readers until the enclosing [`RadDB::transaction`] commits.
pub struct Transaction<'a> {
    base: &'a Table,
    staged: Table,
}

impl Transaction<'_> {
    pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.staged.insert(key.into(), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get_raw(key).is_some()
    }
}

impl KvRead for Transaction<'_> {
    fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        self.staged.get(key).or_else(|| self.base.get(key)).cloned()
    }
}

/// RadDB: encrypted embedded key/value store
pub struct RadDB {
    path: Option<PathBuf>,
    cipher: Aes256Gcm,
    data: RwLock<Table>,
}

impl RadDB {
    /// Open the store at `path`, decrypting it with `key`. A missing file is an empty store.
    pub fn open<P: AsRef<Path>>(path: P, key: &MasterKey) -> Result<Self, RadDbError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        let path = path.as_ref().to_path_buf();
        let data = Self::load(&path, &cipher)?;
        Ok(Self {
            path: Some(path),
            cipher,
            data: RwLock::new(data),
        })
    }

    /// Store that is never written to disk.
    pub fn in_memory() -> Self {
        let key = Self::generate_key();
        Self {
            path: None,
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Create a new master key (it must be saved by the caller)
    pub fn generate_key() -> MasterKey {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        key
    }

    fn load(path: &Path, cipher: &Aes256Gcm) -> Result<Table, RadDbError> {
        if !path.exists() {
            return Ok(HashMap::new());
        }

        let mut file = OpenOptions::new().read(true).open(path)?;
        let mut encrypted = Vec::new();
        file.read_to_end(&mut encrypted)?;

        if encrypted.is_empty() {
            return Ok(HashMap::new());
        }

        if encrypted.len() < 12 {
            return Err(RadDbError::Decryption("File too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = encrypted.split_at(12);
        let payload = Payload {
            msg: ciphertext,
            aad: &[],
        };

        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), payload)
            .map_err(|_| RadDbError::Decryption("AES-GCM decryption failed".to_string()))?;

        bincode::deserialize(&plaintext).map_err(|e| RadDbError::Serialization(e.to_string()))
    }

    fn flush(&self, data: &Table) -> Result<(), RadDbError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let plaintext =
            bincode::serialize(data).map_err(|e| RadDbError::Serialization(e.to_string()))?;

        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let payload = Payload {
            msg: &plaintext,
            aad: &[],
        };

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), payload)
            .map_err(|_| RadDbError::Encryption("AES-GCM encryption failed".to_string()))?;

        // Replace the file atomically so a crash never leaves half a store behind.
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp)?;
            file.write_all(&nonce_bytes)?;
            file.write_all(&ciphertext)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Run a read-only closure against a consistent snapshot.
    pub fn view<T>(&self, f: impl FnOnce(&View<'_>) -> T) -> Result<T, RadDbError> {
        let data = self.data.read().map_err(|_| RadDbError::Poisoned)?;
        Ok(f(&View { data: &*data }))
    }

    /// Run `f` as one atomic unit. Writers are serialized; staged writes are
    /// applied and persisted only when `f` returns `Ok`.
    pub fn transaction<T, E>(
        &self,
        f: impl FnOnce(&mut Transaction<'_>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<RadDbError>,
    {
        let mut data = self.data.write().map_err(|_| RadDbError::Poisoned)?;

        let (out, staged) = {
            let mut tx = Transaction {
                base: &*data,
                staged: HashMap::new(),
            };
            let out = f(&mut tx)?;
            (out, tx.staged)
        };

        if staged.is_empty() {
            return Ok(out);
        }

        let mut undo = Vec::with_capacity(staged.len());
        for (key, value) in staged {
            let previous = data.insert(key.clone(), value);
            undo.push((key, previous));
        }

        if let Err(e) = self.flush(&data) {
            for (key, previous) in undo.into_iter().rev() {
                match previous {
                    Some(value) => data.insert(key, value),
                    None => data.remove(&key),
                };
            }
            return Err(e.into());
        }

        Ok(out)
    }
}
