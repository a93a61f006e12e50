//! Facelock Vault - Encryption Engine
//!
//! Transforms one file on disk between its open form (`base.suffix`,
//! plaintext) and its locked form (`base.locked`, ciphertext). The engine is
//! stateless per call and owns no records; the vault keeps an independent
//! backup because a crash between the overwrite and the rename leaves the
//! file recoverable but suffix-inconsistent.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::debug;

use crate::crypto::{self, VaultKey};
use crate::error::VaultResult;
use crate::paths;

/// Open/locked transform for a single tracked file
pub struct EncryptionEngine {
    open_path: PathBuf,
    locked_path: PathBuf,
}

impl EncryptionEngine {
    /// Build the path pair from a canonical base path and stored suffix
    pub fn new(base: &str, suffix: &str) -> Self {
        Self {
            open_path: PathBuf::from(paths::join_suffix(base, suffix)),
            locked_path: PathBuf::from(paths::locked_path(base)),
        }
    }

    /// The plaintext location (`base.suffix`)
    pub fn open_path(&self) -> &Path {
        &self.open_path
    }

    /// The ciphertext location (`base.locked`)
    pub fn locked_path(&self) -> &Path {
        &self.locked_path
    }

    /// Read the live file's plaintext from the open path
    pub fn read_plaintext(&self) -> VaultResult<Vec<u8>> {
        Ok(fs::read(&self.open_path)?)
    }

    /// Encrypt the live file: seal the plaintext, overwrite the open path
    /// with ciphertext, rename it to the locked path. Returns the ciphertext
    /// so the caller can persist it as the backup.
    pub fn encrypt_file(&self, key: &VaultKey) -> VaultResult<Vec<u8>> {
        let plaintext = self.read_plaintext()?;
        let ciphertext = crypto::seal(key, &plaintext)?;
        self.commit_ciphertext(&ciphertext)?;
        Ok(ciphertext)
    }

    /// Decrypt the live file: open the ciphertext from the locked path,
    /// overwrite it with plaintext, rename it back to the open path.
    /// Returns the recovered plaintext.
    pub fn decrypt_file(&self, key: &VaultKey) -> VaultResult<Vec<u8>> {
        let ciphertext = fs::read(&self.locked_path)?;
        let plaintext = crypto::open(key, &ciphertext)?;
        self.commit_plaintext(&plaintext)?;
        Ok(plaintext)
    }

    /// Phase two of a lock: overwrite the open path and rename it locked.
    /// Called only after the new backup has been persisted.
    pub fn commit_ciphertext(&self, ciphertext: &[u8]) -> VaultResult<()> {
        write_synced(&self.open_path, ciphertext)?;
        fs::rename(&self.open_path, &self.locked_path)?;
        debug!("locked {}", self.locked_path.display());
        Ok(())
    }

    /// Phase two of an unlock: overwrite the locked path and rename it open.
    pub fn commit_plaintext(&self, plaintext: &[u8]) -> VaultResult<()> {
        write_synced(&self.locked_path, plaintext)?;
        fs::rename(&self.locked_path, &self.open_path)?;
        debug!("unlocked {}", self.open_path.display());
        Ok(())
    }

    /// Recovery write: put the plaintext back at the open path and drop any
    /// stray `.locked` artifact a failed transition left behind.
    pub fn restore_plaintext(&self, plaintext: &[u8]) -> VaultResult<()> {
        write_synced(&self.open_path, plaintext)?;
        if self.locked_path.exists() {
            fs::remove_file(&self.locked_path)?;
        }
        Ok(())
    }
}

fn write_synced(path: &Path, data: &[u8]) -> VaultResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(data)?;
    file.sync_all()?;
    Ok(())
}
