//! Facelock Vault - Cryptographic Core
//!
//! Key derivation from face embeddings, AEAD sealing, backup compression.

pub mod aead;
pub mod compress;
pub mod keys;

pub use aead::*;
pub use compress::*;
pub use keys::*;
