//! # Facelock Vault
//!
//! Encrypted file vault keyed by a face: the symmetric key protecting each
//! user's files is never stored, it is re-derived on every operation from the
//! face embedding recorded at enrollment.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       FACELOCK VAULT                          │
//! │                                                               │
//! │  recognition ──▶ embedding ──▶ derive_embedding_key ──▶ key   │
//! │   (external)                                           │      │
//! │                                                        ▼      │
//! │  ┌───────────────┐    ┌──────────────────┐   ┌─────────────┐  │
//! │  │  RecordStore  │◀──▶│      Vault       │──▶│ Encryption  │  │
//! │  │ users / files │    │ lock state mach. │   │   Engine    │  │
//! │  │   (SQLite)    │    │ recovery proc.   │   │ open⇄locked │  │
//! │  └───────┬───────┘    └──────────────────┘   └─────────────┘  │
//! │          │                                                    │
//! │  ┌───────▼──────────────┐                                     │
//! │  │ SelfEncryptingStore  │  vault.db ⇄ vault.locked            │
//! │  │ (key in OS keyring)  │                                     │
//! │  └──────────────────────┘                                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Model
//!
//! - Files encrypted at rest with XChaCha20-Poly1305
//! - Key material derived deterministically from the owner's embedding
//! - Every tracked file has a sealed, compressed backup blob in the store;
//!   the live file is a cache rebuildable from it
//! - The store's own database is sealed while the process is not running,
//!   keyed from the platform secret store
//!
//! Single-process, single-threaded by design: opening the same vault from
//! two processes concurrently is unsupported.

pub mod crypto;
pub mod engine;
pub mod error;
pub mod paths;
pub mod recognition;
pub mod self_store;
pub mod store;
pub mod vault;

pub use error::{VaultError, VaultResult};
pub use store::{EnrollmentImage, FileRecord, FileState, User};
pub use vault::{BulkReport, Vault};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
