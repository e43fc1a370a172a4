pub mod acme;

use crate::crypto::{self, CryptoError};
use rcgen::{CertificateParams, DnType, KeyPair, PKCS_RSA_SHA256};
use rsa::pkcs8::EncodePrivateKey;
use rustls_pki_types::PrivatePkcs8KeyDer;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

/// CA bucket for the C2 handshake keypairs (one per domain).
pub const C2_SERVER_CA: &str = "c2-server";
/// CA bucket for self-signed listener certificates.
pub const HTTPS_CA: &str = "https";

#[derive(Error, Debug)]
pub enum CertError {
    #[error("Certificate does not exist")]
    DoesNotExist,
    #[error("Certificate generation failed: {0}")]
    Generation(String),
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CertError>;

/// File-backed certificate store keyed by (ca, common name). Keypairs are
/// generated lazily, first request wins, and persist across restarts.
pub struct CertificateAuthority {
    root: PathBuf,
}

impl CertificateAuthority {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Fetch both PEM halves for (ca, cn).
    pub fn get(&self, ca: &str, cn: &str) -> Result<(String, String)> {
        let (cert_path, key_path) = self.paths(ca, cn);
        if !cert_path.exists() || !key_path.exists() {
            return Err(CertError::DoesNotExist);
        }
        let cert_pem = fs::read_to_string(cert_path)?;
        let key_pem = fs::read_to_string(key_path)?;
        Ok((cert_pem, key_pem))
    }

    /// Generate a self-signed RSA certificate for `cn` and persist it.
    pub fn generate_rsa(&self, ca: &str, cn: &str) -> Result<(String, String)> {
        tracing::info!(ca = ca, cn = cn, "Generating RSA certificate");
        let private_key = crypto::rsa::generate_keypair()?;
        let key_pem = crypto::rsa::private_key_to_pem(&private_key)?;

        let pkcs8 = private_key
            .to_pkcs8_der()
            .map_err(|e| CertError::Generation(e.to_string()))?;
        let key_pair = KeyPair::from_pkcs8_der_and_sign_algo(
            &PrivatePkcs8KeyDer::from(pkcs8.as_bytes()),
            &PKCS_RSA_SHA256,
        )
        .map_err(|e| CertError::Generation(e.to_string()))?;

        let mut params = CertificateParams::new(vec![cn.to_string()])
            .map_err(|e| CertError::Generation(e.to_string()))?;
        params.distinguished_name.push(DnType::CommonName, cn);
        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| CertError::Generation(e.to_string()))?;
        let cert_pem = cert.pem();

        self.persist(ca, cn, &cert_pem, &key_pem)?;
        Ok((cert_pem, key_pem))
    }

    pub fn get_or_generate_rsa(&self, ca: &str, cn: &str) -> Result<(String, String)> {
        match self.get(ca, cn) {
            Ok(pair) => Ok(pair),
            Err(CertError::DoesNotExist) => self.generate_rsa(ca, cn),
            Err(e) => Err(e),
        }
    }

    fn persist(&self, ca: &str, cn: &str, cert_pem: &str, key_pem: &str) -> Result<()> {
        let (cert_path, key_path) = self.paths(ca, cn);
        fs::create_dir_all(cert_path.parent().expect("cert path has parent"))?;
        fs::write(&cert_path, cert_pem)?;
        fs::write(&key_path, key_pem)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&key_path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&key_path, perms)?;
        }

        Ok(())
    }

    fn paths(&self, ca: &str, cn: &str) -> (PathBuf, PathBuf) {
        let cn = sanitize(cn);
        let dir = self.root.join(ca);
        (
            dir.join(format!("{}.crt.pem", cn)),
            dir.join(format!("{}.key.pem", cn)),
        )
    }
}

fn sanitize(cn: &str) -> String {
    cn.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_cert() {
        let dir = tempfile::tempdir().unwrap();
        let ca = CertificateAuthority::new(dir.path()).unwrap();
        assert!(matches!(
            ca.get(C2_SERVER_CA, "example.com"),
            Err(CertError::DoesNotExist)
        ));
    }

    #[test]
    fn test_generate_and_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let ca = CertificateAuthority::new(dir.path()).unwrap();
        let (cert_pem, key_pem) = ca.get_or_generate_rsa(C2_SERVER_CA, "example.com").unwrap();
        assert!(cert_pem.contains("BEGIN CERTIFICATE"));
        assert!(key_pem.contains("BEGIN PRIVATE KEY"));

        // Second fetch returns the persisted pair, not a fresh one.
        let (cert_again, key_again) = ca.get_or_generate_rsa(C2_SERVER_CA, "example.com").unwrap();
        assert_eq!(cert_pem, cert_again);
        assert_eq!(key_pem, key_again);

        let key = crate::crypto::rsa::private_key_from_pem(&key_pem).unwrap();
        let public = rsa::RsaPublicKey::from(&key);
        let ct = crate::crypto::rsa::rsa_encrypt(&public, b"probe").unwrap();
        assert_eq!(crate::crypto::rsa::rsa_decrypt(&key, &ct).unwrap(), b"probe");
    }

    #[test]
    fn test_ca_buckets_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let ca = CertificateAuthority::new(dir.path()).unwrap();
        ca.generate_rsa(C2_SERVER_CA, "example.com").unwrap();
        assert!(ca.get(HTTPS_CA, "example.com").is_err());
    }
}
