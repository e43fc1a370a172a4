use super::{Encoder, EncoderError, Result};
use base64::alphabet::Alphabet;
use base64::engine::{DecodePaddingMode, Engine, GeneralPurpose, GeneralPurposeConfig};
use lazy_static::lazy_static;

// Shuffled alphabet so payloads don't match stock base64 signatures.
// Shared with the implant's encoder table.
const SHUFFLED_ALPHABET: &str = "wprh3SLUDMAJacfjQCRtI8O+i4769FePdHnBzmvWgE12bG5qNsZTXyoYV0xK/lku";

lazy_static! {
    static ref ENGINE: GeneralPurpose = GeneralPurpose::new(
        &Alphabet::new(SHUFFLED_ALPHABET).expect("shuffled alphabet is 64 unique chars"),
        GeneralPurposeConfig::new()
            .with_encode_padding(false)
            .with_decode_padding_mode(DecodePaddingMode::Indifferent),
    );
}

pub struct Base64Encoder;

impl Encoder for Base64Encoder {
    fn encode(&self, data: &[u8]) -> Vec<u8> {
        ENGINE.encode(data).into_bytes()
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        ENGINE.decode(data).map_err(|_| EncoderError::DecodeFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_standard_base64() {
        let encoded = Base64Encoder.encode(b"\x00\x01\x02\x03");
        let standard = base64::engine::general_purpose::STANDARD_NO_PAD.encode(b"\x00\x01\x02\x03");
        assert_ne!(encoded, standard.into_bytes());
    }

    #[test]
    fn test_malformed_input() {
        assert!(Base64Encoder.decode(b"!!! not base64 !!!").is_err());
    }
}
