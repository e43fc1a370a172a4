use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue};
use http_body_util::Full;
use rand::Rng;

/// Response camouflage. Banners are sampled once per listener and cached so
/// the fingerprint stays stable for the listener's lifetime.
pub struct CoverHeaders {
    server: HeaderValue,
    powered_by: HeaderValue,
    cookie_names: Vec<String>,
}

impl CoverHeaders {
    pub fn new(cookie_names: Vec<String>) -> Self {
        let mut rng = rand::thread_rng();
        let server = match rng.gen_range(0..2) {
            0 => format!("Apache/2.4.{} (Unix)", rng.gen_range(0..48)),
            _ => format!(
                "nginx/1.{}.{} (Ubuntu)",
                rng.gen_range(0..21),
                rng.gen_range(0..8)
            ),
        };
        let powered_by = match rng.gen_range(0..2) {
            0 => format!("PHP/8.0.{}", rng.gen_range(0..10)),
            _ => format!("PHP/7.{}.{}", rng.gen_range(0..4), rng.gen_range(0..20)),
        };
        Self {
            server: HeaderValue::from_str(&server).expect("banner is ascii"),
            powered_by: HeaderValue::from_str(&powered_by).expect("banner is ascii"),
            cookie_names,
        }
    }

    pub fn server(&self) -> &HeaderValue {
        &self.server
    }

    pub fn powered_by(&self) -> &HeaderValue {
        &self.powered_by
    }

    /// Draw a cookie name from the profile pool.
    pub fn cookie_name(&self) -> &str {
        let index = rand::thread_rng().gen_range(0..self.cookie_names.len());
        &self.cookie_names[index]
    }

    /// Stamp the cover headers onto a staged response. Handlers never set
    /// Server, X-Powered-By, or Cache-Control themselves; Content-Type is
    /// only filled in when a handler left it unset.
    pub fn decorate(&self, path: &str, response: &mut http::Response<Full<Bytes>>) {
        let headers = response.headers_mut();
        headers.insert(header::SERVER, self.server.clone());
        headers.insert(
            HeaderName::from_static("x-powered-by"),
            self.powered_by.clone(),
        );
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store, no-cache, must-revalidate"),
        );
        headers
            .entry(header::CONTENT_TYPE)
            .or_insert_with(|| content_type_for_suffix(path));
    }
}

fn content_type_for_suffix(path: &str) -> HeaderValue {
    let content_type = if path.ends_with(".txt") {
        "text/plain; charset=utf-8"
    } else if path.ends_with(".css") {
        "text/css; charset=utf-8"
    } else if path.ends_with(".php") || path.ends_with(".phtml") {
        "text/html; charset=utf-8"
    } else if path.ends_with(".js") {
        "text/javascript; charset=utf-8"
    } else if path.ends_with(".png") {
        "image/png"
    } else {
        "application/octet-stream"
    };
    HeaderValue::from_static(content_type)
}

/// Fresh 128-bit random hex, served as the ETag on empty long polls.
pub fn random_etag() -> String {
    let mut buf = [0u8; 16];
    crate::crypto::secure_random(&mut buf);
    hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Response;

    fn cover() -> CoverHeaders {
        CoverHeaders::new(vec!["PHPSESSID".to_string(), "SID".to_string()])
    }

    #[test]
    fn test_banner_cached_per_listener() {
        let cover = cover();
        assert_eq!(cover.server(), cover.server());
        let server = cover.server().to_str().unwrap().to_string();
        assert!(server.starts_with("Apache/2.4.") || server.starts_with("nginx/1."));
        let powered = cover.powered_by().to_str().unwrap().to_string();
        assert!(powered.starts_with("PHP/8.0.") || powered.starts_with("PHP/7."));
    }

    #[test]
    fn test_decorate_sets_cover_headers() {
        let cover = cover();
        let mut response = Response::new(Full::new(Bytes::new()));
        cover.decorate("/files/readme.txt", &mut response);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "no-store, no-cache, must-revalidate"
        );
        assert!(response.headers().contains_key(header::SERVER));
        assert!(response.headers().contains_key("x-powered-by"));
    }

    #[test]
    fn test_decorate_keeps_handler_content_type() {
        let cover = cover();
        let mut response = Response::new(Full::new(Bytes::new()));
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("image/svg+xml"),
        );
        cover.decorate("/logo.png", &mut response);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/svg+xml");
    }

    #[test]
    fn test_content_type_map() {
        for (path, expected) in [
            ("/a.css", "text/css; charset=utf-8"),
            ("/a.php", "text/html; charset=utf-8"),
            ("/a.js", "text/javascript; charset=utf-8"),
            ("/a.png", "image/png"),
            ("/a.bin", "application/octet-stream"),
        ] {
            assert_eq!(content_type_for_suffix(path), expected, "{}", path);
        }
    }

    #[test]
    fn test_cookie_name_from_pool() {
        let cover = cover();
        for _ in 0..32 {
            let name = cover.cookie_name();
            assert!(name == "PHPSESSID" || name == "SID");
        }
    }

    #[test]
    fn test_random_etag() {
        let a = random_etag();
        let b = random_etag();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
