use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_MAX_BODY_LENGTH: usize = 4 * 1024 * 1024 * 1024; // 4 GiB

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpC2Config {
    /// Bind address for the HTTP(S) listener
    pub addr: SocketAddr,

    /// Virtual host; also the CA common name and ACME host
    pub domain: String,

    /// Name of the static cover site served on non-C2 paths; empty → 404
    pub website: String,

    /// Whether TLS is negotiated on the listener
    pub secure: bool,

    /// PEM certificate/key files; if absent and not ACME, a self-signed
    /// certificate is generated for `domain` (or "localhost")
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,

    /// Let ACME manage the listener certificate (runs a plaintext
    /// challenge server on port 80)
    pub acme: bool,

    /// Byte cap on request bodies
    pub max_request_length: usize,

    /// Require a TOTP code on handshake endpoints
    pub enforce_otp: bool,

    /// Hex-encoded shared TOTP secret; required when `enforce_otp`
    pub otp_secret: Option<String>,

    /// Long-poll base timeout and uniform jitter upper bound
    pub long_poll_timeout_ms: u64,
    pub long_poll_jitter_ms: u64,

    /// Set the Secure attribute on session cookies
    pub secure_cookie: bool,

    /// Cookie name pool, part of the C2 profile
    pub cookie_names: Vec<String>,

    /// Shellcode blob served on the stager route
    pub stage_file: Option<PathBuf>,

    /// Content root for the static cover site
    pub website_root: Option<PathBuf>,

    /// Certificate authority storage directory
    pub data_dir: PathBuf,

    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

impl Default for HttpC2Config {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8443".parse().unwrap(),
            domain: String::new(),
            website: String::new(),
            secure: true,
            cert_file: None,
            key_file: None,
            acme: false,
            max_request_length: DEFAULT_MAX_BODY_LENGTH,
            enforce_otp: false,
            otp_secret: None,
            long_poll_timeout_ms: 30_000,
            long_poll_jitter_ms: 10_000,
            secure_cookie: false,
            cookie_names: vec![
                "PHPSESSID".to_string(),
                "SID".to_string(),
                "SSID".to_string(),
                "APISID".to_string(),
                "csrf-state".to_string(),
                "AWSALBCORS".to_string(),
            ],
            stage_file: None,
            website_root: None,
            data_dir: PathBuf::from("wraith-data"),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
        }
    }
}

impl HttpC2Config {
    pub fn from_file(path: &PathBuf) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: HttpC2Config = toml::from_str(&content)
            .map_err(|e| crate::WraithError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &PathBuf) -> crate::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::WraithError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.cookie_names.is_empty() {
            return Err(crate::WraithError::Config(
                "cookie name pool must not be empty".to_string(),
            ));
        }
        if self.enforce_otp && self.otp_secret.is_none() {
            return Err(crate::WraithError::Config(
                "enforce_otp requires otp_secret".to_string(),
            ));
        }
        if self.acme && !self.secure {
            return Err(crate::WraithError::Config(
                "acme requires secure".to_string(),
            ));
        }
        if self.acme && self.domain.is_empty() {
            return Err(crate::WraithError::Config(
                "acme requires a domain".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c2.toml");
        let config = HttpC2Config::default();
        config.save_to_file(&path).unwrap();
        let loaded = HttpC2Config::from_file(&path).unwrap();
        assert_eq!(loaded.addr, config.addr);
        assert_eq!(loaded.cookie_names, config.cookie_names);
        assert_eq!(loaded.max_request_length, DEFAULT_MAX_BODY_LENGTH);
    }

    #[test]
    fn test_otp_requires_secret() {
        let config = HttpC2Config {
            enforce_otp: true,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_acme_requires_domain() {
        let config = HttpC2Config {
            acme: true,
            domain: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
