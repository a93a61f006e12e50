//! Facelock Vault - Core Vault Implementation
//!
//! Orchestrates the record store and the encryption engine: enrollment and
//! identification, the file lock/unlock state machine, bulk transitions, and
//! the recovery procedure for interrupted transitions.
//!
//! The vault assumes exclusive ownership of its backing store and of every
//! tracked path for the lifetime of one process. Opening the same vault from
//! two processes at once is unsupported.

use std::path::Path;

use log::{info, warn};

use crate::crypto::{self, derive_embedding_key, VaultKey, EMBEDDING_LEN};
use crate::engine::EncryptionEngine;
use crate::error::{VaultError, VaultResult};
use crate::paths;
use crate::recognition::{embedding_distance, DISTANCE_THRESHOLD};
use crate::self_store::{self, SelfEncryptingStore};
use crate::store::{EnrollmentImage, FileRecord, FileState, RecordStore, User};

/// Outcome of a bulk lock/unlock pass. Failures are isolated per file; every
/// failed file has already been through recovery by the time it is reported.
#[derive(Debug, Default)]
pub struct BulkReport {
    /// Files transitioned to the target state
    pub processed: usize,
    /// Files already in the target state
    pub skipped: usize,
    /// Per-file failures (canonical base path, error)
    pub failures: Vec<(String, VaultError)>,
}

impl BulkReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The vault: persistent records plus the set of files they track
pub struct Vault {
    store: RecordStore,
    self_store: Option<SelfEncryptingStore>,
}

impl Vault {
    // ═══════════════════════════════════════════════════════════════════════
    // LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════

    /// Open the vault in `dir`, fetching the backing store key from the
    /// platform secret store (created on first run). Decrypts the idle
    /// snapshot of the backing store if one exists.
    pub fn open<P: AsRef<Path>>(dir: P) -> VaultResult<Self> {
        let key = self_store::fetch_or_create_store_key()?;
        Self::open_with_key(dir, key)
    }

    /// Open the vault with an explicitly supplied backing store key.
    pub fn open_with_key<P: AsRef<Path>>(dir: P, key: VaultKey) -> VaultResult<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        let self_store = SelfEncryptingStore::new(dir, key);
        self_store.unseal()?;
        let store = RecordStore::open(self_store.open_path())?;
        Ok(Self {
            store,
            self_store: Some(self_store),
        })
    }

    /// Ephemeral vault for tests: in-memory records, no self-encryption.
    pub fn open_in_memory() -> VaultResult<Self> {
        Ok(Self {
            store: RecordStore::open_in_memory()?,
            self_store: None,
        })
    }

    /// Shut the vault down: force every tracked file to LOCKED, close the
    /// store and seal its backing file. This is the supported termination
    /// path; a killed process leaves the backing file in its open form,
    /// which the next startup uses as-is.
    pub fn close(self) -> VaultResult<BulkReport> {
        let report = self.lock_all_files(None)?;
        if !report.is_clean() {
            warn!(
                "{} file(s) could not be locked during shutdown",
                report.failures.len()
            );
        }
        let Vault { store, self_store } = self;
        drop(store);
        if let Some(self_store) = self_store {
            self_store.seal()?;
        }
        Ok(report)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // USERS
    // ═══════════════════════════════════════════════════════════════════════

    /// Enroll a new user from a chosen embedding and their enrollment image.
    /// The embedding doubles as key material, so its length is validated here
    /// rather than at first use.
    pub fn enroll_user(
        &self,
        embedding: Vec<f32>,
        image: EnrollmentImage,
    ) -> VaultResult<User> {
        if embedding.len() != EMBEDDING_LEN {
            return Err(VaultError::InsufficientEmbeddingLength {
                expected: EMBEDDING_LEN,
                actual: embedding.len(),
            });
        }
        let uid = self.store.insert_user(&embedding, &image)?;
        info!("enrolled new user - ID: {uid}");
        Ok(User {
            uid,
            embedding,
            image,
        })
    }

    /// Match a fresh embedding against every enrolled user. Returns the
    /// nearest user within the distance threshold, or None for an unknown
    /// face. Fuzzy matching lives here; key derivation stays exact.
    pub fn identify(&self, embedding: &[f32]) -> VaultResult<Option<User>> {
        let mut best: Option<(f32, User)> = None;
        for user in self.store.fetch_users()? {
            let dist = embedding_distance(embedding, &user.embedding);
            if best.as_ref().map_or(true, |(d, _)| dist < *d) {
                best = Some((dist, user));
            }
        }
        Ok(best
            .filter(|(dist, _)| *dist <= DISTANCE_THRESHOLD)
            .map(|(_, user)| user))
    }

    /// All enrolled users
    pub fn users(&self) -> VaultResult<Vec<User>> {
        self.store.fetch_users()
    }

    /// A user's enrollment image, for display
    pub fn user_image(&self, uid: i64) -> VaultResult<EnrollmentImage> {
        Ok(self.store.fetch_user(uid)?.image)
    }

    /// Delete a user. Aborts with no effect unless `confirmed`; otherwise
    /// unlocks all of their files (restoring plaintext on disk), then removes
    /// their file records and the user record. Returns whether the deletion
    /// happened.
    pub fn delete_user(&self, uid: i64, confirmed: bool) -> VaultResult<bool> {
        self.store.fetch_user(uid)?;
        if !confirmed {
            info!("user deletion aborted - ID: {uid}");
            return Ok(false);
        }

        let report = self.unlock_all_files(Some(uid))?;
        if let Some((path, err)) = report
            .failures
            .into_iter()
            .find(|(_, e)| e.is_fatal())
        {
            // A file whose recovery failed must keep its record: the backup
            // blob is the only remaining copy. Non-fatal unlock failures have
            // already been resolved to plaintext by recovery.
            warn!("aborting deletion of user {uid}, {path} not restored");
            return Err(err);
        }

        self.store.delete_files_for(uid)?;
        self.store.delete_user(uid)?;
        warn!("user deleted - ID: {uid}");
        Ok(true)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // FILE OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════

    /// Track a new file. The live file stays plaintext; a sealed + compressed
    /// backup of its current contents is stored immediately, so the file is
    /// protected against a botched first lock from the moment it is added.
    pub fn add_file(&self, path: &str, user: &User) -> VaultResult<()> {
        let norm = paths::normalize(path);
        let (base, suffix) = paths::split_suffix(&norm);

        if suffix == paths::LOCKED_SUFFIX {
            return Err(VaultError::UnsupportedSuffix(suffix));
        }
        if let Some(existing) = self.store.fetch_file(&base)? {
            return Err(VaultError::DuplicateFile {
                owner: existing.uid,
            });
        }

        let engine = EncryptionEngine::new(&base, &suffix);
        if !engine.open_path().is_file() {
            return Err(VaultError::NotAFile(norm));
        }

        let plaintext = engine.read_plaintext()?;
        let key = self.user_key(user.uid)?;
        let backup = crypto::compress(&crypto::seal(&key, &plaintext)?)?;

        self.store.insert_file(&FileRecord {
            path: base.clone(),
            suffix,
            uid: user.uid,
            backup,
            state: FileState::Open,
        })?;
        info!("file added {base}");
        Ok(())
    }

    /// Stop tracking a file. A locked file is decrypted back to plaintext
    /// first so the user is not left with unreadable bytes and no record.
    pub fn remove_file(&self, path: &str, user: &User) -> VaultResult<()> {
        let record = self.authorize(path, user)?;

        if record.state == FileState::Locked {
            let key = self.user_key(record.uid)?;
            let engine = EncryptionEngine::new(&record.path, &record.suffix);
            if let Err(e) = engine.decrypt_file(&key) {
                warn!("decrypt before removal failed for {}: {e}", record.path);
                self.recover(&record.path, &key)?;
            } else {
                self.store.update_state(&record.path, FileState::Open)?;
            }
        }

        self.store.delete_file(&record.path)?;
        info!("file removed {}", record.path);
        Ok(())
    }

    /// Encrypt a tracked file on disk and refresh its backup. A no-op on an
    /// already-locked file. On failure the file is recovered to plaintext
    /// and the error is returned.
    pub fn lock_file(&self, path: &str, user: &User) -> VaultResult<()> {
        let record = self.authorize(path, user)?;
        if record.state == FileState::Locked {
            return Ok(());
        }
        self.lock_record(&record)
    }

    /// Decrypt a tracked file on disk. A no-op on an already-open file. The
    /// backup is left at the last successfully locked version.
    pub fn unlock_file(&self, path: &str, user: &User) -> VaultResult<()> {
        let record = self.authorize(path, user)?;
        if record.state == FileState::Open {
            return Ok(());
        }
        self.unlock_record(&record)
    }

    /// Lock every tracked file, optionally scoped to one owner. Each file
    /// commits independently; one file's failure does not stop the pass.
    pub fn lock_all_files(&self, uid: Option<i64>) -> VaultResult<BulkReport> {
        let mut report = BulkReport::default();
        for record in self.store.fetch_files(uid)? {
            if record.state == FileState::Locked {
                report.skipped += 1;
                continue;
            }
            match self.lock_record(&record) {
                Ok(()) => report.processed += 1,
                Err(e) => {
                    warn!("lock failed for {}: {e}", record.path);
                    report.failures.push((record.path, e));
                }
            }
        }
        Ok(report)
    }

    /// Unlock every tracked file, optionally scoped to one owner.
    pub fn unlock_all_files(&self, uid: Option<i64>) -> VaultResult<BulkReport> {
        let mut report = BulkReport::default();
        for record in self.store.fetch_files(uid)? {
            if record.state == FileState::Open {
                report.skipped += 1;
                continue;
            }
            match self.unlock_record(&record) {
                Ok(()) => report.processed += 1,
                Err(e) => {
                    warn!("unlock failed for {}: {e}", record.path);
                    report.failures.push((record.path, e));
                }
            }
        }
        Ok(report)
    }

    /// Operator-invoked restore of the live file from its backup blob,
    /// independent of any failed transition.
    pub fn recover_file(&self, path: &str, user: &User) -> VaultResult<()> {
        let record = self.authorize(path, user)?;
        let key = self.user_key(record.uid)?;
        self.recover(&record.path, &key)
    }

    /// Tracked file records, optionally scoped to one owner
    pub fn files(&self, uid: Option<i64>) -> VaultResult<Vec<FileRecord>> {
        self.store.fetch_files(uid)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // INTERNALS
    // ═══════════════════════════════════════════════════════════════════════

    /// Ownership gate: resolve the record for a caller-supplied path and
    /// verify the acting user owns it.
    fn authorize(&self, path: &str, user: &User) -> VaultResult<FileRecord> {
        let norm = paths::normalize(path);
        let (base, _) = paths::split_suffix(&norm);
        let record = self
            .store
            .fetch_file(&base)?
            .ok_or(VaultError::NotFound(base))?;
        if record.uid != user.uid {
            return Err(VaultError::AccessDenied {
                path: record.path,
                owner: record.uid,
            });
        }
        Ok(record)
    }

    /// Re-derive the owner's key from their stored embedding.
    fn user_key(&self, uid: i64) -> VaultResult<VaultKey> {
        let embedding = self.store.user_embedding(uid)?;
        derive_embedding_key(&embedding)
    }

    /// Two-phase lock of one record: seal the plaintext in memory, persist
    /// the new backup, only then mutate the live file, and finally commit
    /// the state. A failure after the backup write triggers recovery, which
    /// restores exactly the plaintext that was just read.
    fn lock_record(&self, record: &FileRecord) -> VaultResult<()> {
        let key = self.user_key(record.uid)?;
        let engine = EncryptionEngine::new(&record.path, &record.suffix);

        let plaintext = engine.read_plaintext()?;
        let ciphertext = crypto::seal(&key, &plaintext)?;
        let backup = crypto::compress(&ciphertext)?;
        self.store.update_backup(&record.path, &backup)?;

        if let Err(e) = engine.commit_ciphertext(&ciphertext) {
            self.recover(&record.path, &key)?;
            return Err(e);
        }
        self.store.update_state(&record.path, FileState::Locked)?;
        info!("file locked {}", record.path);
        Ok(())
    }

    /// Unlock one record; the backup is not touched.
    fn unlock_record(&self, record: &FileRecord) -> VaultResult<()> {
        let key = self.user_key(record.uid)?;
        let engine = EncryptionEngine::new(&record.path, &record.suffix);

        if let Err(e) = engine.decrypt_file(&key) {
            self.recover(&record.path, &key)?;
            return Err(e);
        }
        self.store.update_state(&record.path, FileState::Open)?;
        info!("file unlocked {}", record.path);
        Ok(())
    }

    /// Recovery procedure: decompress and open the stored backup, write the
    /// plaintext back to the open path, drop any stray `.locked` artifact,
    /// and reset the record to OPEN. An unreadable backup, or a restore that
    /// cannot be written to disk, surfaces as `RecoveryFailed`: the backup
    /// blob is the only remaining copy and its record must not be dropped.
    fn recover(&self, base: &str, key: &VaultKey) -> VaultResult<()> {
        let record = self
            .store
            .fetch_file(base)?
            .ok_or_else(|| VaultError::NotFound(base.to_string()))?;

        let plaintext = crypto::decompress(&record.backup)
            .and_then(|ciphertext| crypto::open(key, &ciphertext))
            .map_err(|e| VaultError::RecoveryFailed {
                path: base.to_string(),
                reason: e.to_string(),
            })?;

        let engine = EncryptionEngine::new(&record.path, &record.suffix);
        engine
            .restore_plaintext(&plaintext)
            .map_err(|e| VaultError::RecoveryFailed {
                path: base.to_string(),
                reason: e.to_string(),
            })?;
        self.store.update_state(base, FileState::Open)?;
        info!("file recovered {base}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn embedding(seed: f32) -> Vec<f32> {
        (0..EMBEDDING_LEN)
            .map(|i| seed + (i as f32) * if i % 2 == 0 { 1.0 } else { -0.3 })
            .collect()
    }

    fn image() -> EnrollmentImage {
        EnrollmentImage {
            width: 1,
            height: 1,
            pixels: vec![7, 7, 7],
        }
    }

    fn vault_with_user(seed: f32) -> (Vault, User) {
        let vault = Vault::open_in_memory().unwrap();
        let user = vault.enroll_user(embedding(seed), image()).unwrap();
        (vault, user)
    }

    fn tracked_file(vault: &Vault, user: &User, dir: &TempDir, content: &[u8]) -> String {
        let path = paths::normalize(&dir.path().join("report.txt").display().to_string());
        fs::write(&path, content).unwrap();
        vault.add_file(&path, user).unwrap();
        path
    }

    #[test]
    fn test_lock_unlock_cycle() {
        let (vault, user) = vault_with_user(0.5);
        let dir = tempdir().unwrap();
        let path = tracked_file(&vault, &user, &dir, b"hello");
        let base = path.trim_end_matches(".txt").to_string();

        vault.lock_file(&path, &user).unwrap();
        assert!(!Path::new(&path).exists());
        let locked = format!("{base}.locked");
        assert!(Path::new(&locked).exists());
        assert_ne!(fs::read(&locked).unwrap(), b"hello");

        vault.unlock_file(&path, &user).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"hello");
        assert!(!Path::new(&locked).exists());
    }

    #[test]
    fn test_lock_unlock_are_idempotent() {
        let (vault, user) = vault_with_user(0.5);
        let dir = tempdir().unwrap();
        let path = tracked_file(&vault, &user, &dir, b"hello");

        // Already open: unlock is a no-op success
        vault.unlock_file(&path, &user).unwrap();

        vault.lock_file(&path, &user).unwrap();
        vault.lock_file(&path, &user).unwrap();
        assert_eq!(vault.files(None).unwrap()[0].state, FileState::Locked);
    }

    #[test]
    fn test_ownership_enforced() {
        let (vault, owner) = vault_with_user(0.5);
        let intruder = vault.enroll_user(embedding(40.0), image()).unwrap();
        let dir = tempdir().unwrap();
        let path = tracked_file(&vault, &owner, &dir, b"hello");

        for result in [
            vault.lock_file(&path, &intruder),
            vault.unlock_file(&path, &intruder),
            vault.remove_file(&path, &intruder),
        ] {
            assert!(matches!(
                result,
                Err(VaultError::AccessDenied { owner: o, .. }) if o == owner.uid
            ));
        }
        // No state change
        assert_eq!(vault.files(None).unwrap()[0].state, FileState::Open);
        assert_eq!(fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn test_duplicate_add_reports_owner() {
        let (vault, user) = vault_with_user(0.5);
        let dir = tempdir().unwrap();
        let path = tracked_file(&vault, &user, &dir, b"hello");

        assert!(matches!(
            vault.add_file(&path, &user),
            Err(VaultError::DuplicateFile { owner }) if owner == user.uid
        ));
        assert_eq!(vault.files(None).unwrap().len(), 1);
    }

    #[test]
    fn test_add_rejects_locked_suffix_and_missing_file() {
        let (vault, user) = vault_with_user(0.5);
        let dir = tempdir().unwrap();

        let locked = dir.path().join("x.locked");
        fs::write(&locked, b"data").unwrap();
        assert!(matches!(
            vault.add_file(&locked.display().to_string(), &user),
            Err(VaultError::UnsupportedSuffix(_))
        ));

        let missing = dir.path().join("ghost.txt");
        assert!(matches!(
            vault.add_file(&missing.display().to_string(), &user),
            Err(VaultError::NotAFile(_))
        ));
    }

    #[test]
    fn test_unlock_failure_triggers_recovery() {
        let (vault, user) = vault_with_user(0.5);
        let dir = tempdir().unwrap();
        let path = tracked_file(&vault, &user, &dir, b"hello");
        let locked = path.replace(".txt", ".locked");

        vault.lock_file(&path, &user).unwrap();

        // Corrupt the live ciphertext; the unlock fails authentication and
        // recovery rebuilds the plaintext from the backup blob.
        fs::write(&locked, b"tampered ciphertext").unwrap();
        assert!(matches!(
            vault.unlock_file(&path, &user),
            Err(VaultError::AuthenticationFailure)
        ));

        assert_eq!(fs::read(&path).unwrap(), b"hello");
        assert!(!Path::new(&locked).exists());
        assert_eq!(vault.files(None).unwrap()[0].state, FileState::Open);
    }

    #[test]
    fn test_recover_file_after_interrupted_lock() {
        let (vault, user) = vault_with_user(0.5);
        let dir = tempdir().unwrap();
        let path = tracked_file(&vault, &user, &dir, b"precious bytes");
        let locked = path.replace(".txt", ".locked");

        // Simulate a transition killed between the overwrite and the state
        // commit: live plaintext gone, stray garbage at the locked path.
        fs::remove_file(&path).unwrap();
        fs::write(&locked, b"half-written").unwrap();

        vault.recover_file(&path, &user).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"precious bytes");
        assert!(!Path::new(&locked).exists());
    }

    #[test]
    fn test_recovery_failed_on_unreadable_backup() {
        let (vault, user) = vault_with_user(0.5);
        let dir = tempdir().unwrap();
        let path = tracked_file(&vault, &user, &dir, b"hello");
        let (base, _) = paths::split_suffix(&path);

        vault.store.update_backup(&base, b"garbage blob").unwrap();
        assert!(matches!(
            vault.recover_file(&path, &user),
            Err(VaultError::RecoveryFailed { .. })
        ));
    }

    #[test]
    fn test_remove_locked_file_restores_plaintext() {
        let (vault, user) = vault_with_user(0.5);
        let dir = tempdir().unwrap();
        let path = tracked_file(&vault, &user, &dir, b"hello");

        vault.lock_file(&path, &user).unwrap();
        vault.remove_file(&path, &user).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"hello");
        assert!(vault.files(None).unwrap().is_empty());
    }

    #[test]
    fn test_bulk_lock_isolates_failures() {
        let (vault, user) = vault_with_user(0.5);
        let dir = tempdir().unwrap();

        let good = paths::normalize(&dir.path().join("good.txt").display().to_string());
        let doomed = paths::normalize(&dir.path().join("doomed.txt").display().to_string());
        fs::write(&good, b"good").unwrap();
        fs::write(&doomed, b"doomed").unwrap();
        vault.add_file(&good, &user).unwrap();
        vault.add_file(&doomed, &user).unwrap();

        // Deleting the live file makes its lock fail before any mutation
        fs::remove_file(&doomed).unwrap();

        let report = vault.lock_all_files(None).unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, doomed.trim_end_matches(".txt"));

        // The healthy file still transitioned
        let records = vault.files(None).unwrap();
        let good_rec = records.iter().find(|r| good.starts_with(&r.path)).unwrap();
        assert_eq!(good_rec.state, FileState::Locked);
    }

    #[test]
    fn test_bulk_scoped_to_owner() {
        let (vault, a) = vault_with_user(0.5);
        let b = vault.enroll_user(embedding(40.0), image()).unwrap();
        let dir = tempdir().unwrap();

        let fa = paths::normalize(&dir.path().join("a.txt").display().to_string());
        let fb = paths::normalize(&dir.path().join("b.txt").display().to_string());
        fs::write(&fa, b"a").unwrap();
        fs::write(&fb, b"b").unwrap();
        vault.add_file(&fa, &a).unwrap();
        vault.add_file(&fb, &b).unwrap();

        let report = vault.lock_all_files(Some(a.uid)).unwrap();
        assert_eq!(report.processed, 1);

        let records = vault.files(Some(b.uid)).unwrap();
        assert_eq!(records[0].state, FileState::Open);
    }

    #[test]
    fn test_delete_user_requires_confirmation() {
        let (vault, user) = vault_with_user(0.5);
        let dir = tempdir().unwrap();
        let path = tracked_file(&vault, &user, &dir, b"hello");
        vault.lock_file(&path, &user).unwrap();

        assert!(!vault.delete_user(user.uid, false).unwrap());
        assert_eq!(vault.users().unwrap().len(), 1);
        assert_eq!(vault.files(None).unwrap().len(), 1);

        assert!(vault.delete_user(user.uid, true).unwrap());
        assert!(vault.users().unwrap().is_empty());
        assert!(vault.files(None).unwrap().is_empty());
        // Locked file was restored to plaintext before the records went away
        assert_eq!(fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn test_delete_user_aborts_when_restore_write_fails() {
        let (vault, user) = vault_with_user(0.5);
        let dir = tempdir().unwrap();
        let path = tracked_file(&vault, &user, &dir, b"hello");
        let locked = path.replace(".txt", ".locked");

        vault.lock_file(&path, &user).unwrap();

        // Make the restore write fail: the ciphertext is gone and a
        // directory occupies the open path, so recovery cannot put the
        // plaintext back on disk.
        fs::remove_file(&locked).unwrap();
        fs::create_dir(&path).unwrap();

        assert!(matches!(
            vault.delete_user(user.uid, true),
            Err(VaultError::RecoveryFailed { .. })
        ));

        // The user and the file record survive: the backup blob in that
        // record is the only remaining copy of the plaintext.
        assert_eq!(vault.users().unwrap().len(), 1);
        assert_eq!(vault.files(None).unwrap().len(), 1);
    }

    #[test]
    fn test_identify_matches_within_threshold() {
        let (vault, user) = vault_with_user(0.5);
        vault.enroll_user(embedding(100.0), image()).unwrap();

        // Slight jitter stays within the 0.7 distance threshold
        let mut probe = user.embedding.clone();
        probe[0] += 0.3;
        let found = vault.identify(&probe).unwrap().unwrap();
        assert_eq!(found.uid, user.uid);

        let stranger = embedding(-500.0);
        assert!(vault.identify(&stranger).unwrap().is_none());
    }

    #[test]
    fn test_enroll_rejects_bad_embedding() {
        let vault = Vault::open_in_memory().unwrap();
        assert!(matches!(
            vault.enroll_user(vec![0.1; 10], image()),
            Err(VaultError::InsufficientEmbeddingLength { .. })
        ));
    }
}
