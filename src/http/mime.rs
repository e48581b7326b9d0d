//! Content-Type inference from a file extension.

/// Guesses a MIME type from a path's extension, falling back to
/// `application/octet-stream` for anything unrecognized.
pub fn guess_mime(path: &str) -> &'static str {
    match path.rsplit('.').next() {
        Some("htm") | Some("html") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("txt") => "text/plain",
        Some("pdf") => "application/pdf",
        Some("wasm") => "application/wasm",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mp3") => "audio/mpeg",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extension() {
        assert_eq!(guess_mime("a/b.html"), "text/html");
    }

    #[test]
    fn unknown_extension_falls_back() {
        assert_eq!(guess_mime("a/b.unknownext"), "application/octet-stream");
    }

    #[test]
    fn no_extension_falls_back() {
        assert_eq!(guess_mime("Makefile"), "application/octet-stream");
    }
}
