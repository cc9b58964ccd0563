//! Opaque identifier generation.

use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::error::StoreError;

/// Length of every generated identifier (hex-encoded SHA-256).
pub const IDENTIFIER_LEN: usize = 64;

/// SHA-256 over fresh randomness, the wall clock and an optional seed
/// (the owning client id for tokens), hex encoded.
pub fn generate_identifier(seed: Option<&str>) -> Result<String, StoreError> {
    let mut random = [0u8; 32];
    getrandom::fill(&mut random).map_err(|e| StoreError::Entropy(e.to_string()))?;

    let mut hasher = Sha256::new();
    hasher.update(random);
    hasher.update(
        OffsetDateTime::now_utc()
            .unix_timestamp_nanos()
            .to_be_bytes(),
    );
    if let Some(seed) = seed {
        hasher.update(seed.as_bytes());
    }
    Ok(hex::encode(hasher.finalize()))
}
