//! Secret hashing and verification.
//!
//! Client secrets and resource-owner passwords are stored as Argon2id PHC
//! strings. Verification re-derives with the salt and parameters embedded in
//! the stored string and compares the derived bytes in constant time.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, SaltString},
};
use subtle::ConstantTimeEq;

use crate::config::KdfConfig;
use crate::error::StoreError;

const SALT_LEN: usize = 16;

/// Argon2id hasher configured with the process-wide KDF parameters.
#[derive(Clone)]
pub struct SecretHasher {
    params: Params,
}

impl std::fmt::Debug for SecretHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretHasher")
            .field("m_cost", &self.params.m_cost())
            .field("t_cost", &self.params.t_cost())
            .field("p_cost", &self.params.p_cost())
            .finish()
    }
}

impl SecretHasher {
    pub fn new(kdf: &KdfConfig) -> Result<Self, StoreError> {
        let params = Params::new(
            kdf.memory_cost,
            kdf.time_cost,
            kdf.parallelism,
            Some(kdf.output_len),
        )
        .map_err(|e| StoreError::Kdf(e.to_string()))?;
        Ok(Self { params })
    }

    /// Derive a PHC string for `secret` under a fresh random salt.
    pub fn derive(&self, secret: &str) -> Result<String, StoreError> {
        let mut salt = [0u8; SALT_LEN];
        getrandom::fill(&mut salt).map_err(|e| StoreError::Entropy(e.to_string()))?;
        let salt = SaltString::encode_b64(&salt).map_err(|e| StoreError::Kdf(e.to_string()))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone());
        let hash = argon2
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| StoreError::Kdf(e.to_string()))?;
        Ok(hash.to_string())
    }

    /// Check `candidate` against a stored PHC string.
    ///
    /// Unparseable stored values never verify.
    pub fn verify(candidate: &str, stored: &str) -> bool {
        rederive_and_compare(candidate, stored).unwrap_or(false)
    }

    /// [`SecretHasher::derive`] on the blocking pool.
    pub async fn derive_blocking(&self, secret: String) -> Result<String, StoreError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.derive(&secret))
            .await
            .map_err(|e| StoreError::Kdf(e.to_string()))?
    }

    /// [`SecretHasher::verify`] on the blocking pool.
    pub async fn verify_blocking(candidate: String, stored: String) -> bool {
        tokio::task::spawn_blocking(move || Self::verify(&candidate, &stored))
            .await
            .unwrap_or(false)
    }
}

fn rederive_and_compare(candidate: &str, stored: &str) -> Option<bool> {
    let parsed = PasswordHash::new(stored).ok()?;
    let params = Params::try_from(&parsed).ok()?;
    let algorithm = Algorithm::try_from(parsed.algorithm).ok()?;
    let version = match parsed.version {
        Some(v) => Version::try_from(v).ok()?,
        None => Version::default(),
    };
    let expected = parsed.hash?;

    let mut salt_buf = [0u8; 64];
    let salt = parsed.salt?.decode_b64(&mut salt_buf).ok()?;

    let mut derived = vec![0u8; expected.len()];
    Argon2::new(algorithm, version, params)
        .hash_password_into(candidate.as_bytes(), salt, &mut derived)
        .ok()?;

    Some(derived.as_slice().ct_eq(expected.as_bytes()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Cheap parameters keep the tests fast.
    fn hasher() -> SecretHasher {
        SecretHasher::new(&KdfConfig {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
            output_len: 32,
        })
        .unwrap()
    }

    #[test]
    fn test_derive_and_verify() {
        let secret = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";
        let hash = hasher().derive(secret).expect("Failed to derive");

        assert!(hash.starts_with("$argon2id$v=19$m=1024,t=1,p=1$"));
        assert!(SecretHasher::verify(secret, &hash));
        assert!(!SecretHasher::verify("wrong-secret", &hash));
    }

    #[test]
    fn test_stored_hash_is_not_a_valid_secret() {
        let hash = hasher().derive("plaintext").unwrap();
        assert!(!SecretHasher::verify(&hash, &hash));
    }

    #[test]
    fn test_same_secret_different_salts() {
        let h = hasher();
        let hash1 = h.derive("same-secret").unwrap();
        let hash2 = h.derive("same-secret").unwrap();

        assert_ne!(hash1, hash2);
        assert!(SecretHasher::verify("same-secret", &hash1));
        assert!(SecretHasher::verify("same-secret", &hash2));
    }

    #[test]
    fn test_verify_uses_embedded_parameters() {
        let hash = hasher().derive("portable").unwrap();
        assert_ne!(KdfConfig::default().memory_cost, 1024);
        assert!(SecretHasher::verify("portable", &hash));
    }

    #[test]
    fn test_verify_invalid_hash_format() {
        assert!(!SecretHasher::verify("password", "not-a-valid-hash"));
        assert!(!SecretHasher::verify("password", ""));
        assert!(!SecretHasher::verify("password", "$invalid$hash$format"));
    }

    #[test]
    fn test_rejects_unusable_parameters() {
        let err = SecretHasher::new(&KdfConfig {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 0,
            output_len: 32,
        })
        .unwrap_err();
        assert!(matches!(err, StoreError::Kdf(_)));
    }

    #[tokio::test]
    async fn test_blocking_wrappers() {
        let hash = hasher().derive_blocking("async".into()).await.unwrap();
        assert!(SecretHasher::verify_blocking("async".into(), hash.clone()).await);
        assert!(!SecretHasher::verify_blocking("sync".into(), hash).await);
    }
}
