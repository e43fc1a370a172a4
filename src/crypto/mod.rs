pub mod rsa;
pub mod totp;

use rand::rngs::OsRng;
use rand::RngCore;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const AES_KEY_LEN: usize = 32;
pub const GCM_NONCE_LEN: usize = 12;
pub const GCM_TAG_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed")]
    DecryptionFailed,
    #[error("Invalid key length")]
    InvalidKeyLength,
    #[error("RSA error: {0}")]
    Rsa(String),
    #[error("Invalid OTP secret")]
    InvalidOtpSecret,
}

pub type Result<T> = std::result::Result<T, CryptoError>;

/// Generate cryptographically secure random bytes
pub fn secure_random(bytes: &mut [u8]) {
    OsRng.fill_bytes(bytes);
}

pub fn sha256_digest(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// A 256-bit AES-GCM session key, set exactly once for a session's life.
#[derive(Clone)]
pub struct AesKey([u8; AES_KEY_LEN]);

impl AesKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key: [u8; AES_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength)?;
        Ok(Self(key))
    }

    pub fn generate() -> Self {
        let mut key = [0u8; AES_KEY_LEN];
        secure_random(&mut key);
        Self(key)
    }

    pub fn as_bytes(&self) -> &[u8; AES_KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for AesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AesKey(..)")
    }
}

/// Seal with AES-256-GCM; output is nonce || ciphertext || tag. A fresh
/// nonce is generated per message; replay defense is the session's job.
pub fn gcm_seal(key: &AesKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut nonce_bytes = [0u8; GCM_NONCE_LEN];
    secure_random(&mut nonce_bytes);

    let unbound =
        UnboundKey::new(&AES_256_GCM, &key.0).map_err(|_| CryptoError::EncryptionFailed)?;
    let sealing = LessSafeKey::new(unbound);

    let mut in_out = plaintext.to_vec();
    sealing
        .seal_in_place_append_tag(
            Nonce::assume_unique_for_key(nonce_bytes),
            Aad::empty(),
            &mut in_out,
        )
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut blob = Vec::with_capacity(GCM_NONCE_LEN + in_out.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&in_out);
    Ok(blob)
}

/// Open an AES-256-GCM blob produced by `gcm_seal`.
pub fn gcm_open(key: &AesKey, blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < GCM_NONCE_LEN + GCM_TAG_LEN {
        return Err(CryptoError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = blob.split_at(GCM_NONCE_LEN);
    let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
        .map_err(|_| CryptoError::DecryptionFailed)?;

    let unbound =
        UnboundKey::new(&AES_256_GCM, &key.0).map_err(|_| CryptoError::DecryptionFailed)?;
    let opening = LessSafeKey::new(unbound);

    let mut in_out = ciphertext.to_vec();
    let plaintext = opening
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::DecryptionFailed)?;

    Ok(plaintext.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gcm_roundtrip() {
        let key = AesKey::generate();
        let plaintext = b"attack at dawn";
        let blob = gcm_seal(&key, plaintext).unwrap();
        assert_eq!(blob.len(), GCM_NONCE_LEN + plaintext.len() + GCM_TAG_LEN);
        let opened = gcm_open(&key, &blob).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_gcm_fresh_nonces() {
        let key = AesKey::generate();
        let a = gcm_seal(&key, b"same message").unwrap();
        let b = gcm_seal(&key, b"same message").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_gcm_tamper_detected() {
        let key = AesKey::generate();
        let mut blob = gcm_seal(&key, b"payload").unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0xff;
        assert!(gcm_open(&key, &blob).is_err());
    }

    #[test]
    fn test_gcm_wrong_key() {
        let blob = gcm_seal(&AesKey::generate(), b"payload").unwrap();
        assert!(gcm_open(&AesKey::generate(), &blob).is_err());
    }

    #[test]
    fn test_gcm_short_blob() {
        let key = AesKey::generate();
        assert!(gcm_open(&key, &[0u8; 8]).is_err());
    }

    #[test]
    fn test_key_length_validation() {
        assert!(AesKey::from_bytes(&[0u8; 32]).is_ok());
        assert!(AesKey::from_bytes(&[0u8; 16]).is_err());
        assert!(AesKey::from_bytes(&[]).is_err());
    }
}
