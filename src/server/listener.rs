use super::handlers;
use super::C2Context;
use crate::certs::acme::AcmeManager;
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;

pub const HTTP_TIMEOUT: Duration = Duration::from_secs(60);
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The HTTP(S) C2 listener: accept loop, optional TLS, one task per
/// connection, graceful drain on shutdown.
pub struct HttpC2Listener {
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    ctx: Arc<C2Context>,
}

impl HttpC2Listener {
    pub async fn bind(
        ctx: Arc<C2Context>,
        tls: Option<rustls::ServerConfig>,
    ) -> crate::Result<Self> {
        let listener = TcpListener::bind(ctx.config.addr).await?;
        tracing::info!(
            "HTTP C2 listener bound to {} (tls: {})",
            ctx.config.addr,
            tls.is_some()
        );
        Ok(Self {
            listener,
            tls: tls.map(|config| TlsAcceptor::from(Arc::new(config))),
            ctx,
        })
    }

    pub fn local_addr(&self) -> crate::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self, shutdown: watch::Receiver<bool>) -> crate::Result<()> {
        let mut accept_shutdown = shutdown.clone();
        let mut connections = tokio::task::JoinSet::new();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            tracing::debug!("New connection from {}", peer);
                            let ctx = self.ctx.clone();
                            let tls = self.tls.clone();
                            let conn_shutdown = shutdown.clone();
                            connections.spawn(async move {
                                handle_connection(stream, peer, tls, ctx, conn_shutdown).await;
                            });
                        }
                        Err(e) => tracing::warn!("Accept error: {}", e),
                    }
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = accept_shutdown.changed() => {
                    tracing::info!("C2 listener shutting down");
                    break;
                }
            }
        }

        // In-flight connections get the grace period to drain.
        let drain = async {
            while connections.join_next().await.is_some() {}
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            tracing::warn!("Shutdown grace expired with connections still open");
            connections.abort_all();
        }
        Ok(())
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    tls: Option<TlsAcceptor>,
    ctx: Arc<C2Context>,
    shutdown: watch::Receiver<bool>,
) {
    match tls {
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(tls_stream) => serve_io(tls_stream, peer, ctx, shutdown).await,
            Err(e) => tracing::debug!("TLS handshake with {} failed: {}", peer, e),
        },
        None => serve_io(stream, peer, ctx, shutdown).await,
    }
}

async fn serve_io<I>(io: I, peer: SocketAddr, ctx: Arc<C2Context>, mut shutdown: watch::Receiver<bool>)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |req| {
        let ctx = ctx.clone();
        async move {
            Ok::<_, std::convert::Infallible>(handlers::dispatch(ctx, peer, req).await)
        }
    });

    let conn = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(HTTP_TIMEOUT)
        .serve_connection(TokioIo::new(io), service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => {
            if let Err(e) = result {
                tracing::debug!("Connection from {} ended: {}", peer, e);
            }
        }
        _ = shutdown.changed() => {
            conn.as_mut().graceful_shutdown();
            let _ = tokio::time::timeout(SHUTDOWN_GRACE, conn.as_mut()).await;
        }
    }
}

/// Plaintext HTTP-01 challenge server, alive for the lifetime of an ACME
/// listener.
pub struct AcmeChallengeServer {
    listener: TcpListener,
    acme: Arc<AcmeManager>,
}

impl AcmeChallengeServer {
    pub async fn bind(acme: Arc<AcmeManager>) -> crate::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", 80)).await?;
        tracing::info!(domain = acme.domain(), "ACME challenge server bound to :80");
        Ok(Self { listener, acme })
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let Ok((stream, peer)) = accepted else { continue };
                    let acme = self.acme.clone();
                    tokio::spawn(async move {
                        let service = service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
                            let acme = acme.clone();
                            async move {
                                let response = match acme.http01_response(req.uri().path()) {
                                    Some(key_auth) => hyper::Response::new(Full::new(Bytes::from(key_auth))),
                                    None => {
                                        let mut resp = hyper::Response::new(Full::new(Bytes::new()));
                                        *resp.status_mut() = http::StatusCode::NOT_FOUND;
                                        resp
                                    }
                                };
                                Ok::<_, std::convert::Infallible>(response)
                            }
                        });
                        let conn = http1::Builder::new()
                            .timer(TokioTimer::new())
                            .header_read_timeout(HTTP_TIMEOUT)
                            .serve_connection(TokioIo::new(stream), service);
                        if let Err(e) = conn.await {
                            tracing::debug!("ACME challenge connection from {} ended: {}", peer, e);
                        }
                    });
                }
                _ = shutdown.changed() => {
                    tracing::info!("ACME challenge server shutting down");
                    break;
                }
            }
        }
    }
}
