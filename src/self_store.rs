//! Facelock Vault - Self-Encrypting Backing Store
//!
//! The record store's own database file is only plaintext while the process
//! runs. At rest it sits next to the open artifact as `vault.locked`, sealed
//! with a key held by the platform secret store. Losing that key makes every
//! vault record untrustworthy, so secret-store failures are fatal.

use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use keyring::Entry;
use log::info;

use crate::crypto::{self, VaultKey, KEY_LEN};
use crate::error::{VaultError, VaultResult};

/// Secret store service identifier
const SERVICE_NAME: &str = "facelock-vault";
/// Secret store entry holding the backing store key
const STORE_KEY_NAME: &str = "store-key";

/// Backing store artifact while the process runs
pub const DB_OPEN_NAME: &str = "vault.db";
/// Backing store artifact while the vault is idle
pub const DB_LOCKED_NAME: &str = "vault.locked";

/// Fetch the backing store key from the platform secret store, generating
/// and persisting a fresh one on first run.
pub fn fetch_or_create_store_key() -> VaultResult<VaultKey> {
    let entry = Entry::new(SERVICE_NAME, STORE_KEY_NAME)
        .map_err(|e| VaultError::SecretStoreUnavailable(format!("keyring init: {e}")))?;

    match entry.get_password() {
        Ok(encoded) => {
            let bytes = general_purpose::STANDARD.decode(encoded).map_err(|e| {
                VaultError::SecretStoreUnavailable(format!("stored key corrupt: {e}"))
            })?;
            let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
                VaultError::SecretStoreUnavailable("stored key has wrong length".into())
            })?;
            Ok(VaultKey::new(key))
        }
        Err(keyring::Error::NoEntry) => {
            info!("no backing store key found, generating one");
            let key = VaultKey::generate();
            let encoded = general_purpose::STANDARD.encode(key.expose());
            entry.set_password(&encoded).map_err(|e| {
                VaultError::SecretStoreUnavailable(format!("store key: {e}"))
            })?;
            Ok(key)
        }
        Err(e) => Err(VaultError::SecretStoreUnavailable(format!("load key: {e}"))),
    }
}

/// Seals and unseals the record store's backing file
pub struct SelfEncryptingStore {
    open_path: PathBuf,
    locked_path: PathBuf,
    key: VaultKey,
}

impl SelfEncryptingStore {
    pub fn new<P: AsRef<Path>>(dir: P, key: VaultKey) -> Self {
        let dir = dir.as_ref();
        Self {
            open_path: dir.join(DB_OPEN_NAME),
            locked_path: dir.join(DB_LOCKED_NAME),
            key,
        }
    }

    /// Plaintext database path for the connection to open
    pub fn open_path(&self) -> &Path {
        &self.open_path
    }

    /// Startup: if an encrypted snapshot exists, decrypt it in place before
    /// the store is opened. A missing snapshot means a fresh vault (or a
    /// process that died with the database open) - either way the open
    /// artifact is used as-is.
    pub fn unseal(&self) -> VaultResult<()> {
        if !self.locked_path.exists() {
            return Ok(());
        }
        let sealed = fs::read(&self.locked_path)?;
        let plaintext = crypto::open(&self.key, &sealed)?;
        fs::write(&self.open_path, plaintext)?;
        fs::remove_file(&self.locked_path)?;
        info!("backing store unsealed");
        Ok(())
    }

    /// Shutdown: encrypt the backing file and remove the plaintext artifact.
    /// Called after the connection is closed.
    pub fn seal(&self) -> VaultResult<()> {
        let plaintext = fs::read(&self.open_path)?;
        let sealed = crypto::seal(&self.key, &plaintext)?;
        fs::write(&self.locked_path, sealed)?;
        fs::remove_file(&self.open_path)?;
        info!("backing store sealed");
        Ok(())
    }
}
