//! Facelock Vault - Error Types

use thiserror::Error;

/// Result type for vault operations
pub type VaultResult<T> = Result<T, VaultError>;

/// Vault error types
#[derive(Error, Debug)]
pub enum VaultError {
    // ═══════════════════════════════════════════════════════════════
    // RECORD / ACCESS ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("file already tracked - owner ID: {owner}")]
    DuplicateFile { owner: i64 },

    #[error("not a regular file: {0}")]
    NotAFile(String),

    #[error("file is not tracked: {0}")]
    NotFound(String),

    #[error("access denied to file {path} - owner ID: {owner}")]
    AccessDenied { path: String, owner: i64 },

    #[error("unsupported file type (.{0})")]
    UnsupportedSuffix(String),

    #[error("no user with ID: {0}")]
    UnknownUser(i64),

    // ═══════════════════════════════════════════════════════════════
    // CRYPTO ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed - wrong key or tampered ciphertext")]
    AuthenticationFailure,

    #[error("embedding length {actual} does not match the model output ({expected})")]
    InsufficientEmbeddingLength { expected: usize, actual: usize },

    // ═══════════════════════════════════════════════════════════════
    // TRUST ROOT ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("recovery failed for {path}: {reason}")]
    RecoveryFailed { path: String, reason: String },

    #[error("platform secret store unavailable: {0}")]
    SecretStoreUnavailable(String),

    // ═══════════════════════════════════════════════════════════════
    // AMBIENT ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(String),

    #[error("compression error: {0}")]
    Compression(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl VaultError {
    /// Errors that indicate the vault's trust root is broken. These abort the
    /// whole operation instead of degrading to a per-file failure.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VaultError::SecretStoreUnavailable(_) | VaultError::RecoveryFailed { .. }
        )
    }
}

impl From<rusqlite::Error> for VaultError {
    fn from(e: rusqlite::Error) -> Self {
        VaultError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::Serialization(e.to_string())
    }
}
