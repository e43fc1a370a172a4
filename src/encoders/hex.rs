use super::{Encoder, EncoderError, Result};

pub struct HexEncoder;

impl Encoder for HexEncoder {
    fn encode(&self, data: &[u8]) -> Vec<u8> {
        hex::encode(data).into_bytes()
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        hex::decode(data).map_err(|_| EncoderError::DecodeFailed)
    }
}
