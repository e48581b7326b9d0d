use crate::http::HttpMethod;
use crate::http::HttpVersion;
use crate::http::headers::HttpHeaders;

/// An immutable parsed HTTP/1.x request.
///
/// Built up field-by-field by [`parser::Parser`](crate::http::parser::Parser)
/// as bytes arrive; only handed off to the connection's dispatch once
/// [`parser::ParserOk::Done`](crate::http::parser::ParserOk::Done) is reached,
/// at which point headers are considered finalized.
pub struct HttpRequest {
    pub method: HttpMethod,
    /// The raw request-target exactly as it appeared on the wire (e.g.
    /// `/a/b.txt?x=1`), not yet percent-decoded or split from its query string.
    pub target: String,
    pub http_version: (u8, u8),
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new() -> Self {
        Self {
            method: HttpMethod::Unknown,
            target: String::new(),
            http_version: (0, 0),
            headers: HttpHeaders::new(),
            body: Vec::new(),
        }
    }

    /// The request-target with any `?query` or `#fragment` stripped.
    pub fn path(&self) -> &str {
        let without_fragment = self.target.split('#').next().unwrap_or("");
        without_fragment.split('?').next().unwrap_or("")
    }

    pub fn version(&self) -> HttpVersion {
        HttpVersion::is_valid(self.http_version).unwrap_or(HttpVersion::V1_0)
    }

    /// `Connection: close` / `Connection: keep-alive`, falling back to the
    /// protocol-version default when the header is absent.
    pub fn keep_alive(&self) -> bool {
        match self.headers.get("Connection") {
            Some(v) if v.eq_ignore_ascii_case("close") => false,
            Some(v) if v.eq_ignore_ascii_case("keep-alive") => true,
            _ => self.version().supports_keep_alive_by_default(),
        }
    }
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_strips_query_and_fragment() {
        let mut req = HttpRequest::new();
        req.target = "/a/b.txt?x=1#frag".to_string();
        assert_eq!(req.path(), "/a/b.txt");
    }

    #[test]
    fn keep_alive_defaults_by_version() {
        let mut req = HttpRequest::new();
        req.http_version = (1, 0);
        assert!(!req.keep_alive());
        req.http_version = (1, 1);
        assert!(req.keep_alive());
    }

    #[test]
    fn keep_alive_header_overrides_default() {
        let mut req = HttpRequest::new();
        req.http_version = (1, 1);
        req.headers.append_raw("Connection", "close");
        assert!(!req.keep_alive());
    }
}
