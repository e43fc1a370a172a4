use super::{CertError, Result};
use dashmap::DashMap;
use parking_lot::RwLock;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use std::sync::Arc;

pub const ACME_CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

/// Per-domain ACME collaborator. Owns the HTTP-01 challenge table consulted
/// by the port-80 server and the certificate resolver handed to rustls.
/// Order/account handling lives in the operator plane; certificates arrive
/// through `install_certificate`.
pub struct AcmeManager {
    domain: String,
    challenges: DashMap<String, String>,
    resolver: Arc<AcmeResolver>,
}

impl AcmeManager {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            challenges: DashMap::new(),
            resolver: Arc::new(AcmeResolver {
                certified: RwLock::new(None),
            }),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn set_challenge(&self, token: impl Into<String>, key_auth: impl Into<String>) {
        self.challenges.insert(token.into(), key_auth.into());
    }

    pub fn clear_challenge(&self, token: &str) {
        self.challenges.remove(token);
    }

    /// HTTP-01 hook: key authorization for a challenge path, if one is live.
    pub fn http01_response(&self, path: &str) -> Option<String> {
        let token = path.strip_prefix(ACME_CHALLENGE_PREFIX)?;
        self.challenges.get(token).map(|auth| auth.clone())
    }

    /// Install a provisioned certificate chain + key (PEM).
    pub fn install_certificate(&self, cert_pem: &[u8], key_pem: &[u8]) -> Result<()> {
        let certs = rustls_pemfile::certs(&mut &cert_pem[..])
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| CertError::Generation(e.to_string()))?;
        if certs.is_empty() {
            return Err(CertError::Generation("no certificates in PEM".to_string()));
        }
        let key = rustls_pemfile::private_key(&mut &key_pem[..])
            .map_err(|e| CertError::Generation(e.to_string()))?
            .ok_or_else(|| CertError::Generation("no private key in PEM".to_string()))?;
        let signing_key = rustls::crypto::ring::sign::any_supported_type(&key)
            .map_err(|e| CertError::Generation(e.to_string()))?;

        let certified = CertifiedKey::new(certs, signing_key);
        *self.resolver.certified.write() = Some(Arc::new(certified));
        tracing::info!(domain = %self.domain, "Installed ACME certificate");
        Ok(())
    }

    pub fn has_certificate(&self) -> bool {
        self.resolver.certified.read().is_some()
    }

    /// `GetCertificate` hook for the TLS config.
    pub fn resolver(&self) -> Arc<dyn ResolvesServerCert> {
        self.resolver.clone()
    }
}

struct AcmeResolver {
    certified: RwLock<Option<Arc<CertifiedKey>>>,
}

impl std::fmt::Debug for AcmeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AcmeResolver")
    }
}

impl ResolvesServerCert for AcmeResolver {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        self.certified.read().clone()
    }
}
