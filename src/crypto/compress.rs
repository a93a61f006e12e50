//! Facelock Vault - Backup Compression
//!
//! Backup blobs are gzip-compressed after sealing so large files don't bloat
//! the record store.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{VaultError, VaultResult};

/// Compress data with gzip
pub fn compress(data: &[u8]) -> VaultResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| VaultError::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| VaultError::Compression(e.to_string()))
}

/// Decompress gzip data
pub fn decompress(data: &[u8]) -> VaultResult<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| VaultError::Compression(e.to_string()))?;
    Ok(out)
}
