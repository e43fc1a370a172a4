use prost::Message;

// Wire schema shared with the implant. Hand-derived prost messages; the
// schema is versioned by field tags and decoding skips unknown fields, so
// newer implants can extend either message without breaking this server.

/// Unit of communication on an established session. `id == 0` marks an
/// unsolicited message handled by type; nonzero ids answer a pending
/// operator request.
#[derive(Clone, PartialEq, Message)]
pub struct Envelope {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(uint32, tag = "2")]
    pub kind: u32,
    #[prost(bytes = "vec", tag = "3")]
    pub data: Vec<u8>,
}

/// First message of the handshake, RSA-encrypted by the implant. Carries
/// the symmetric session key.
#[derive(Clone, PartialEq, Message)]
pub struct SessionInit {
    #[prost(bytes = "vec", tag = "1")]
    pub key: Vec<u8>,
}

// Envelope kinds handled for unsolicited (id == 0) messages.
pub const MSG_PING: u32 = 1;
pub const MSG_REGISTER: u32 = 2;

impl Envelope {
    pub fn new(id: u64, kind: u32, data: Vec<u8>) -> Self {
        Self { id, kind, data }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, prost::DecodeError> {
        Self::decode(data)
    }
}

impl SessionInit {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, prost::DecodeError> {
        Self::decode(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_roundtrip() {
        let envelope = Envelope::new(7, MSG_PING, b"payload".to_vec());
        let decoded = Envelope::from_bytes(&envelope.to_bytes()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_session_init_roundtrip() {
        let init = SessionInit {
            key: vec![0xab; 32],
        };
        let decoded = SessionInit::from_bytes(&init.to_bytes()).unwrap();
        assert_eq!(decoded.key, init.key);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        // A future SessionInit revision with an extra field (tag 15,
        // varint) must still decode on this side.
        let mut buf = SessionInit {
            key: vec![1u8; 32],
        }
        .to_bytes();
        buf.extend_from_slice(&[0x78, 0x2a]); // field 15, varint 42
        let decoded = SessionInit::from_bytes(&buf).unwrap();
        assert_eq!(decoded.key, vec![1u8; 32]);
    }

    #[test]
    fn test_malformed_envelope_rejected() {
        assert!(Envelope::from_bytes(&[0x08]).is_err()); // truncated varint
    }
}
