//! Facelock Vault - Record Store
//!
//! Typed rows over the two persistent tables: `users` (identity, embedding,
//! enrollment image) and `files` (tracked path, owner, backup blob, state).
//! Primary-key and ownership invariants are enforced here, at the storage
//! boundary, not by caller convention.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{VaultError, VaultResult};

/// Lock state of a tracked file. The integer values are the persisted form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Locked = 0,
    Open = 1,
}

impl FileState {
    fn from_i64(v: i64) -> VaultResult<Self> {
        match v {
            0 => Ok(FileState::Locked),
            1 => Ok(FileState::Open),
            other => Err(VaultError::Database(format!("invalid file state {other}"))),
        }
    }
}

/// Raw enrollment image, kept for display only
#[derive(Debug, Clone)]
pub struct EnrollmentImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// An enrolled user. Created once at enrollment, never mutated.
#[derive(Clone)]
pub struct User {
    pub uid: i64,
    pub embedding: Vec<f32>,
    pub image: EnrollmentImage,
}

/// One tracked file
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Canonical base path, suffix stripped (primary key)
    pub path: String,
    /// The file's suffix, or the "no suffix" sentinel
    pub suffix: String,
    /// Owner uid
    pub uid: i64,
    /// Compressed + sealed snapshot of the latest successfully encrypted
    /// plaintext - the sole recovery source
    pub backup: Vec<u8>,
    pub state: FileState,
}

/// Persistent store for users and files
pub struct RecordStore {
    conn: Connection,
}

impl RecordStore {
    /// Open (or create) the backing database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> VaultResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_tables()?;
        Ok(store)
    }

    /// In-memory store for tests
    pub fn open_in_memory() -> VaultResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_tables()?;
        Ok(store)
    }

    fn init_tables(&self) -> VaultResult<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                uid INTEGER PRIMARY KEY,
                embedding BLOB NOT NULL,
                image BLOB NOT NULL,
                image_width INTEGER NOT NULL,
                image_height INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS files (
                path TEXT PRIMARY KEY,
                suffix TEXT NOT NULL,
                uid INTEGER NOT NULL REFERENCES users(uid),
                backup BLOB NOT NULL,
                state INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // USERS
    // ═══════════════════════════════════════════════════════════════════════

    /// Insert a new user; the uid is assigned as max(existing)+1, starting at 1
    pub fn insert_user(
        &self,
        embedding: &[f32],
        image: &EnrollmentImage,
    ) -> VaultResult<i64> {
        let max_uid: i64 = self
            .conn
            .query_row("SELECT COALESCE(MAX(uid), 0) FROM users", [], |row| {
                row.get(0)
            })?;
        let uid = max_uid + 1;

        self.conn.execute(
            "INSERT INTO users (uid, embedding, image, image_width, image_height)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                uid,
                embedding_to_bytes(embedding),
                image.pixels,
                image.width,
                image.height
            ],
        )?;
        Ok(uid)
    }

    /// Fetch one user by uid
    pub fn fetch_user(&self, uid: i64) -> VaultResult<User> {
        self.conn
            .query_row(
                "SELECT uid, embedding, image, image_width, image_height
                 FROM users WHERE uid = ?1",
                params![uid],
                row_to_user,
            )
            .optional()?
            .ok_or(VaultError::UnknownUser(uid))
    }

    /// Fetch all enrolled users
    pub fn fetch_users(&self) -> VaultResult<Vec<User>> {
        let mut stmt = self.conn.prepare(
            "SELECT uid, embedding, image, image_width, image_height
             FROM users ORDER BY uid",
        )?;
        let rows = stmt.query_map([], row_to_user)?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    /// Fetch a user's stored embedding
    pub fn user_embedding(&self, uid: i64) -> VaultResult<Vec<f32>> {
        let blob: Vec<u8> = self
            .conn
            .query_row(
                "SELECT embedding FROM users WHERE uid = ?1",
                params![uid],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(VaultError::UnknownUser(uid))?;
        bytes_to_embedding(&blob)
    }

    /// Delete a user row (the caller removes the file records first)
    pub fn delete_user(&self, uid: i64) -> VaultResult<()> {
        self.conn
            .execute("DELETE FROM users WHERE uid = ?1", params![uid])?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // FILES
    // ═══════════════════════════════════════════════════════════════════════

    /// Insert a new file record
    pub fn insert_file(&self, record: &FileRecord) -> VaultResult<()> {
        self.conn.execute(
            "INSERT INTO files (path, suffix, uid, backup, state)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.path,
                record.suffix,
                record.uid,
                record.backup,
                record.state as i64
            ],
        )?;
        Ok(())
    }

    /// Look up a record by canonical base path
    pub fn fetch_file(&self, path: &str) -> VaultResult<Option<FileRecord>> {
        Ok(self
            .conn
            .query_row(
                "SELECT path, suffix, uid, backup, state FROM files WHERE path = ?1",
                params![path],
                row_to_file,
            )
            .optional()?
            .transpose()?)
    }

    /// All tracked files, optionally scoped to one owner
    pub fn fetch_files(&self, uid: Option<i64>) -> VaultResult<Vec<FileRecord>> {
        let mut records = Vec::new();
        match uid {
            Some(uid) => {
                let mut stmt = self.conn.prepare(
                    "SELECT path, suffix, uid, backup, state FROM files
                     WHERE uid = ?1 ORDER BY path",
                )?;
                let rows = stmt.query_map(params![uid], row_to_file)?;
                for row in rows {
                    records.push(row??);
                }
            }
            None => {
                let mut stmt = self.conn.prepare(
                    "SELECT path, suffix, uid, backup, state FROM files ORDER BY path",
                )?;
                let rows = stmt.query_map([], row_to_file)?;
                for row in rows {
                    records.push(row??);
                }
            }
        }
        Ok(records)
    }

    /// Replace the backup blob for a tracked path
    pub fn update_backup(&self, path: &str, backup: &[u8]) -> VaultResult<()> {
        let changed = self.conn.execute(
            "UPDATE files SET backup = ?1 WHERE path = ?2",
            params![backup, path],
        )?;
        if changed == 0 {
            return Err(VaultError::NotFound(path.to_string()));
        }
        Ok(())
    }

    /// Commit a state transition for a tracked path
    pub fn update_state(&self, path: &str, state: FileState) -> VaultResult<()> {
        let changed = self.conn.execute(
            "UPDATE files SET state = ?1 WHERE path = ?2",
            params![state as i64, path],
        )?;
        if changed == 0 {
            return Err(VaultError::NotFound(path.to_string()));
        }
        Ok(())
    }

    /// Remove one file record
    pub fn delete_file(&self, path: &str) -> VaultResult<()> {
        self.conn
            .execute("DELETE FROM files WHERE path = ?1", params![path])?;
        Ok(())
    }

    /// Remove all file records owned by a user
    pub fn delete_files_for(&self, uid: i64) -> VaultResult<()> {
        self.conn
            .execute("DELETE FROM files WHERE uid = ?1", params![uid])?;
        Ok(())
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let blob: Vec<u8> = row.get(1)?;
    // A corrupt embedding column surfaces as an empty vector here and is
    // rejected by the KDF's length check downstream.
    let embedding = bytes_to_embedding(&blob).unwrap_or_default();
    Ok(User {
        uid: row.get(0)?,
        embedding,
        image: EnrollmentImage {
            pixels: row.get(2)?,
            width: row.get(3)?,
            height: row.get(4)?,
        },
    })
}

fn row_to_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<VaultResult<FileRecord>> {
    let path: String = row.get(0)?;
    let suffix: String = row.get(1)?;
    let uid: i64 = row.get(2)?;
    let backup: Vec<u8> = row.get(3)?;
    let state_raw: i64 = row.get(4)?;
    Ok(FileState::from_i64(state_raw).map(|state| FileRecord {
        path,
        suffix,
        uid,
        backup,
        state,
    }))
}

/// Serialize an embedding as little-endian f32 bytes
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for v in embedding {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Deserialize little-endian f32 bytes back into an embedding
pub fn bytes_to_embedding(bytes: &[u8]) -> VaultResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(VaultError::Database(format!(
            "embedding blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
