//! Facelock Vault - AEAD Encryption
//!
//! XChaCha20-Poly1305 for file contents, backup blobs and the vault's own
//! backing store.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};

use super::keys::{VaultKey, NONCE_LEN};
use crate::error::{VaultError, VaultResult};

/// Encrypted data with nonce prepended
pub struct EncryptedData {
    /// Nonce (24 bytes)
    pub nonce: Vec<u8>,
    /// Ciphertext with authentication tag
    pub ciphertext: Vec<u8>,
}

impl EncryptedData {
    /// Serialize to bytes (nonce || ciphertext)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(self.nonce.len() + self.ciphertext.len());
        result.extend_from_slice(&self.nonce);
        result.extend_from_slice(&self.ciphertext);
        result
    }

    /// Deserialize from bytes
    pub fn from_bytes(data: &[u8]) -> VaultResult<Self> {
        if data.len() < NONCE_LEN + 16 {
            return Err(VaultError::AuthenticationFailure);
        }

        Ok(Self {
            nonce: data[..NONCE_LEN].to_vec(),
            ciphertext: data[NONCE_LEN..].to_vec(),
        })
    }
}

/// Generate a random nonce
fn generate_nonce() -> [u8; NONCE_LEN] {
    use rand::RngCore;
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Encrypt data with XChaCha20-Poly1305 and return the wire form
/// (nonce || ciphertext). The fresh random nonce doubles as the scheme's
/// freshness token.
pub fn seal(key: &VaultKey, plaintext: &[u8]) -> VaultResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new_from_slice(key.expose())
        .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;

    let nonce_bytes = generate_nonce();
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;

    Ok(EncryptedData {
        nonce: nonce_bytes.to_vec(),
        ciphertext,
    }
    .to_bytes())
}

/// Decrypt nonce-prefixed data with XChaCha20-Poly1305. A wrong key or
/// tampered ciphertext fails the Poly1305 tag check.
pub fn open(key: &VaultKey, data: &[u8]) -> VaultResult<Vec<u8>> {
    let encrypted = EncryptedData::from_bytes(data)?;

    let cipher = XChaCha20Poly1305::new_from_slice(key.expose())
        .map_err(|_| VaultError::AuthenticationFailure)?;

    let nonce = XNonce::from_slice(&encrypted.nonce);

    cipher
        .decrypt(nonce, encrypted.ciphertext.as_slice())
        .map_err(|_| VaultError::AuthenticationFailure)
}
