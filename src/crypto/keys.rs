//! Facelock Vault - Key Material
//!
//! The vault never stores a file key: it is re-derived on every operation from
//! the owner's face embedding.

use secrecy::{ExposeSecret, Secret};
use zeroize::ZeroizeOnDrop;

use crate::error::{VaultError, VaultResult};

/// Key length for XChaCha20-Poly1305
pub const KEY_LEN: usize = 32;

/// Nonce length for XChaCha20-Poly1305
pub const NONCE_LEN: usize = 24;

/// Embedding length produced by the recognition model. Exactly this many
/// floats are required; shorter or longer vectors are rejected rather than
/// truncated, so a model swap cannot silently change derived keys.
pub const EMBEDDING_LEN: usize = 512;

/// Secure key wrapper with automatic zeroization
#[derive(Clone, ZeroizeOnDrop)]
pub struct VaultKey {
    #[zeroize(skip)]
    inner: Secret<[u8; KEY_LEN]>,
}

impl VaultKey {
    /// Create a new vault key from bytes
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            inner: Secret::new(bytes),
        }
    }

    /// Expose the key bytes (use with caution)
    pub fn expose(&self) -> &[u8; KEY_LEN] {
        self.inner.expose_secret()
    }

    /// Generate a random key
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::new(bytes)
    }
}

/// Derive a symmetric key from a face embedding.
///
/// Adjacent elements are pairwise-summed (256 sums), each sum is thresholded
/// at zero to a single bit, and the 256 bits are packed big-endian (first bit
/// is the MSB of byte 0) into 32 bytes of raw key material.
///
/// Deterministic: the same embedding always derives the same key. Tolerance to
/// near-duplicate embeddings is the recognition collaborator's job - any vector
/// whose pairwise sums keep their signs derives the identical key.
pub fn derive_embedding_key(embedding: &[f32]) -> VaultResult<VaultKey> {
    if embedding.len() != EMBEDDING_LEN {
        return Err(VaultError::InsufficientEmbeddingLength {
            expected: EMBEDDING_LEN,
            actual: embedding.len(),
        });
    }

    let mut key = [0u8; KEY_LEN];
    for (i, pair) in embedding.chunks_exact(2).enumerate() {
        if pair[0] + pair[1] > 0.0 {
            key[i / 8] |= 1 << (7 - (i % 8));
        }
    }
    Ok(VaultKey::new(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_embedding() -> Vec<f32> {
        (0..EMBEDDING_LEN)
            .map(|i| if i % 3 == 0 { -1.5 } else { 0.25 * i as f32 })
            .collect()
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let e = sample_embedding();
        let k1 = derive_embedding_key(&e).unwrap();
        let k2 = derive_embedding_key(&e).unwrap();
        assert_eq!(k1.expose(), k2.expose());
    }

    #[test]
    fn test_sign_flip_changes_key() {
        let e = sample_embedding();
        let k1 = derive_embedding_key(&e).unwrap();

        // Flip the sign of one pairwise sum
        let mut flipped = e.clone();
        flipped[0] = -(e[0] + e[1]) - 1.0;
        let k2 = derive_embedding_key(&flipped).unwrap();
        assert_ne!(k1.expose(), k2.expose());
    }

    #[test]
    fn test_jitter_within_sign_keeps_key() {
        let e = sample_embedding();
        let k1 = derive_embedding_key(&e).unwrap();

        // Small perturbation that preserves every pairwise sign
        let jittered: Vec<f32> = e.iter().map(|v| v * 1.001).collect();
        let k2 = derive_embedding_key(&jittered).unwrap();
        assert_eq!(k1.expose(), k2.expose());
    }

    #[test]
    fn test_bit_packing_is_big_endian() {
        // First pair positive, everything else negative: only the MSB of
        // byte 0 should be set.
        let mut e = vec![-1.0f32; EMBEDDING_LEN];
        e[0] = 2.0;
        e[1] = 2.0;
        let key = derive_embedding_key(&e).unwrap();
        assert_eq!(key.expose()[0], 0b1000_0000);
        assert!(key.expose()[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_wrong_length_rejected() {
        let short = vec![0.5f32; EMBEDDING_LEN - 1];
        assert!(matches!(
            derive_embedding_key(&short),
            Err(VaultError::InsufficientEmbeddingLength { expected: 512, actual: 511 })
        ));

        let long = vec![0.5f32; EMBEDDING_LEN + 4];
        assert!(derive_embedding_key(&long).is_err());
    }
}
