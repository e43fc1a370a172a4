pub mod base64;
pub mod english;
pub mod hex;

use thiserror::Error;

/// Low-order digits of the request nonce select the encoder.
pub const ENCODER_MODULUS: u64 = 100;

pub const BASE64_ENCODER_ID: u64 = 13;
pub const ENGLISH_ENCODER_ID: u64 = 31;
pub const HEX_ENCODER_ID: u64 = 92;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("Invalid encoder nonce: {0}")]
    InvalidEncoder(u64),
    #[error("Failed to decode data")]
    DecodeFailed,
}

pub type Result<T> = std::result::Result<T, EncoderError>;

/// A content disguise: requests and responses pass through the encoder the
/// client selected via its nonce, so payloads read as different file types.
pub trait Encoder: Send + Sync {
    fn encode(&self, data: &[u8]) -> Vec<u8>;
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Deterministic nonce → encoder selection; stable across the handshake and
/// data phases. Nonces that land outside the registered set are rejected.
pub fn encoder_from_nonce(nonce: u64) -> Result<(u64, &'static dyn Encoder)> {
    let id = nonce % ENCODER_MODULUS;
    match id {
        BASE64_ENCODER_ID => Ok((id, &self::base64::Base64Encoder)),
        ENGLISH_ENCODER_ID => Ok((id, &self::english::EnglishEncoder)),
        HEX_ENCODER_ID => Ok((id, &self::hex::HexEncoder)),
        _ => Err(EncoderError::InvalidEncoder(nonce)),
    }
}
