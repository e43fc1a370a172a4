use super::{CryptoError, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

pub const TOTP_DIGITS: u32 = 8;
pub const TOTP_PERIOD_SECS: u64 = 30;

/// Shared-secret TOTP validator (RFC 6238, HMAC-SHA256, 8 digits).
/// Secret provisioning is the operator plane's job; we only verify.
#[derive(Clone)]
pub struct TotpProvider {
    secret: Vec<u8>,
}

impl TotpProvider {
    pub fn new(secret: Vec<u8>) -> Result<Self> {
        if secret.is_empty() {
            return Err(CryptoError::InvalidOtpSecret);
        }
        Ok(Self { secret })
    }

    pub fn from_hex(hex_secret: &str) -> Result<Self> {
        let secret = hex::decode(hex_secret).map_err(|_| CryptoError::InvalidOtpSecret)?;
        Self::new(secret)
    }

    /// Validate a code against the current time with a ±1 step window.
    pub fn validate(&self, code: &str) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.validate_at(code, now)
    }

    pub fn validate_at(&self, code: &str, unix_secs: u64) -> bool {
        let code: u32 = match code.parse() {
            Ok(c) => c,
            Err(_) => return false,
        };
        let step = unix_secs / TOTP_PERIOD_SECS;
        for candidate in step.saturating_sub(1)..=step + 1 {
            if self.code_at_step(candidate) == code {
                return true;
            }
        }
        false
    }

    pub fn code_at(&self, unix_secs: u64) -> u32 {
        self.code_at_step(unix_secs / TOTP_PERIOD_SECS)
    }

    fn code_at_step(&self, step: u64) -> u32 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("hmac accepts any key length");
        mac.update(&step.to_be_bytes());
        let digest = mac.finalize().into_bytes();

        let offset = (digest[digest.len() - 1] & 0x0f) as usize;
        let binary = u32::from_be_bytes([
            digest[offset] & 0x7f,
            digest[offset + 1],
            digest[offset + 2],
            digest[offset + 3],
        ]);
        binary % 10u32.pow(TOTP_DIGITS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> TotpProvider {
        TotpProvider::new(b"wraith totp shared secret".to_vec()).unwrap()
    }

    #[test]
    fn test_current_code_validates() {
        let totp = provider();
        let now = 1_700_000_000;
        let code = format!("{}", totp.code_at(now));
        assert!(totp.validate_at(&code, now));
    }

    #[test]
    fn test_window_tolerance() {
        let totp = provider();
        let now = 1_700_000_000;
        let previous = format!("{}", totp.code_at(now - TOTP_PERIOD_SECS));
        let next = format!("{}", totp.code_at(now + TOTP_PERIOD_SECS));
        assert!(totp.validate_at(&previous, now));
        assert!(totp.validate_at(&next, now));
    }

    #[test]
    fn test_stale_code_rejected() {
        let totp = provider();
        let now = 1_700_000_000;
        let stale = format!("{}", totp.code_at(now - 4 * TOTP_PERIOD_SECS));
        assert!(!totp.validate_at(&stale, now));
    }

    #[test]
    fn test_non_numeric_rejected() {
        let totp = provider();
        assert!(!totp.validate_at("not-a-code", 1_700_000_000));
        assert!(!totp.validate_at("", 1_700_000_000));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(TotpProvider::new(Vec::new()).is_err());
        assert!(TotpProvider::from_hex("zz").is_err());
    }
}
