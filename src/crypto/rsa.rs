use super::{CryptoError, Result};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

pub const RSA_KEY_BITS: usize = 2048;

/// Generate a fresh RSA keypair for a C2 domain.
pub fn generate_keypair() -> Result<RsaPrivateKey> {
    RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS).map_err(|e| CryptoError::Rsa(e.to_string()))
}

pub fn private_key_to_pem(key: &RsaPrivateKey) -> Result<String> {
    key.to_pkcs8_pem(LineEnding::LF)
        .map(|pem| pem.to_string())
        .map_err(|e| CryptoError::Rsa(e.to_string()))
}

pub fn private_key_from_pem(pem: &str) -> Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| CryptoError::Rsa(e.to_string()))
}

/// PKCS#1 v1.5 decrypt of a session-init blob.
pub fn rsa_decrypt(key: &RsaPrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>> {
    key.decrypt(Pkcs1v15Encrypt, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Implant-side half of the handshake; kept server-side for loopback tests.
pub fn rsa_encrypt(key: &RsaPublicKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    key.encrypt(&mut OsRng, Pkcs1v15Encrypt, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)
}
