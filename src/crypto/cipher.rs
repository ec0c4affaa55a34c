//! AES-256-GCM sealing with ring
//!
//! Sealed values are stored as base64 of `nonce || ciphertext || tag`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};

use crate::error::{ClinicGateError, Result};

/// Length of a raw data key in bytes
pub const DATA_KEY_LEN: usize = 32;

/// Symmetric cipher bound to one 256-bit key
pub struct AeadCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl AeadCipher {
    pub fn new(key_bytes: &[u8]) -> Result<Self> {
        let unbound = UnboundKey::new(&AES_256_GCM, key_bytes)
            .map_err(|_| ClinicGateError::unavailable("cipher init", "key must be 32 bytes"))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Encrypt `plaintext`, binding it to `aad`
    pub fn seal(&self, plaintext: &[u8], aad: &[u8]) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| ClinicGateError::unavailable("cipher", "nonce generation failed"))?;

        let mut in_out = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce_bytes), Aad::from(aad), &mut in_out)
            .map_err(|_| ClinicGateError::unavailable("cipher", "seal failed"))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend_from_slice(&in_out);
        Ok(BASE64.encode(combined))
    }

    /// Decrypt a value produced by [`AeadCipher::seal`] with the same `aad`
    pub fn open(&self, sealed: &str, aad: &[u8]) -> Result<Vec<u8>> {
        let mut combined = BASE64
            .decode(sealed)
            .map_err(|e| ClinicGateError::unavailable("cipher decode", e))?;

        if combined.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(ClinicGateError::unavailable("cipher", "sealed value too short"));
        }

        let mut in_out = combined.split_off(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(&combined)
            .map_err(|_| ClinicGateError::unavailable("cipher", "bad nonce"))?;

        let plaintext = self
            .key
            .open_in_place(nonce, Aad::from(aad), &mut in_out)
            .map_err(|_| ClinicGateError::unavailable("cipher", "authentication failed"))?;
        Ok(plaintext.to_vec())
    }
}

/// Fresh random data key
pub fn generate_data_key() -> Result<[u8; DATA_KEY_LEN]> {
    let mut key = [0u8; DATA_KEY_LEN];
    SystemRandom::new()
        .fill(&mut key)
        .map_err(|_| ClinicGateError::unavailable("key generation", "system randomness unavailable"))?;
    Ok(key)
}

/// Wraps tenant data keys under a master key derived from the
/// key encryption secret
pub struct MasterKey {
    cipher: AeadCipher,
}

impl MasterKey {
    /// Strength rules live in config, which enforces them in production.
    /// Any non-empty secret is stretched to a full key by SHA-256.
    pub fn from_secret(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(ClinicGateError::ConfigError(
                "Key encryption secret must not be empty".to_string(),
            ));
        }

        let digest = Sha256::digest(secret.as_bytes());
        Ok(Self {
            cipher: AeadCipher::new(&digest)?,
        })
    }

    /// Wrap a data key; the tenant id is bound as associated data
    pub fn wrap(&self, tenant_id: &str, data_key: &[u8]) -> Result<String> {
        self.cipher.seal(data_key, tenant_id.as_bytes())
    }

    pub fn unwrap_key(&self, tenant_id: &str, wrapped: &str) -> Result<Vec<u8>> {
        let key = self.cipher.open(wrapped, tenant_id.as_bytes())?;
        if key.len() != DATA_KEY_LEN {
            return Err(ClinicGateError::unavailable(
                "key unwrap",
                format!("unwrapped key has {} bytes", key.len()),
            ));
        }
        Ok(key)
    }
}
