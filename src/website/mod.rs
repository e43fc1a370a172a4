use std::path::PathBuf;

/// Static cover-site content, served on every path that does not match the
/// C2 profile. Content lives under an on-disk root; the site name is the
/// profile key chosen in config.
pub struct WebsiteStore {
    name: String,
    root: PathBuf,
}

impl WebsiteStore {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Content and content type for a request path, or None when the site
    /// has nothing there.
    pub fn get_content(&self, path: &str) -> Option<(String, Vec<u8>)> {
        let rel = path.trim_start_matches('/');
        // Never step outside the content root.
        if rel.split('/').any(|part| part == "..") {
            return None;
        }
        let full = if rel.is_empty() {
            self.root.join("index.html")
        } else {
            self.root.join(rel)
        };
        if !full.is_file() {
            return None;
        }
        let content = std::fs::read(&full).ok()?;
        Some((content_type_for(&full.to_string_lossy()).to_string(), content))
    }
}

fn content_type_for(path: &str) -> &'static str {
    match path.rsplit('.').next() {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn store() -> (tempfile::TempDir, WebsiteStore) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), b"<html>blog</html>").unwrap();
        fs::create_dir_all(dir.path().join("static")).unwrap();
        fs::write(dir.path().join("static/site.css"), b"body{}").unwrap();
        let store = WebsiteStore::new("blog", dir.path());
        (dir, store)
    }

    #[test]
    fn test_serves_content_with_type() {
        let (_dir, store) = store();
        let (content_type, content) = store.get_content("/static/site.css").unwrap();
        assert_eq!(content_type, "text/css; charset=utf-8");
        assert_eq!(content, b"body{}");
    }

    #[test]
    fn test_root_falls_back_to_index() {
        let (_dir, store) = store();
        let (content_type, content) = store.get_content("/").unwrap();
        assert_eq!(content_type, "text/html; charset=utf-8");
        assert_eq!(content, b"<html>blog</html>");
    }

    #[test]
    fn test_missing_content() {
        let (_dir, store) = store();
        assert!(store.get_content("/nope.html").is_none());
    }

    #[test]
    fn test_traversal_rejected() {
        let (_dir, store) = store();
        assert!(store.get_content("/../../etc/passwd").is_none());
    }
}
