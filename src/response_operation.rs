//! The response operation: status determination, header assembly, and body
//! streaming for a single parsed request.
//!
//! Mirrors the "one operation instance per request, enqueued for in-order
//! processing" design this server's connection loop builds on: each
//! [`ResponseOperation`] is self-contained and, once it is its turn to run,
//! writes its entire response to the channel before the next one starts.
//! Whole-file and ranged requests are not separate types — they're the same
//! operation tagged by [`BodySource`], sharing one write pump that doesn't
//! care which kind of body it's pumping.

use async_std::io::ReadExt;
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::channel::{ChannelError, IoChannel};
use crate::config::config;
use crate::document_root::{self, ResolutionError};
use crate::error::ServerError;
use crate::http::HttpMethod;
use crate::http::headers::HttpHeaders;
use crate::http::mime::guess_mime;
use crate::http::range::{Range, parse_range};
use crate::http::request::HttpRequest;
use crate::http::status::HttpStatus;
use crate::provider::ResourceProvider;

const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Where the bytes of a response body come from.
pub enum BodySource {
    /// No body (HEAD, or an error response with no entity).
    Empty,
    /// Body already fully in memory (error pages, 304 bodies).
    Inline(Vec<u8>),
    /// Stream the entire resource.
    WholeFile { path: PathBuf, len: u64 },
    /// A single `Content-Range` slice of the resource.
    SingleRange {
        path: PathBuf,
        total_len: u64,
        range: Range,
    },
    /// A `multipart/byteranges` body covering more than one range.
    MultiRange {
        path: PathBuf,
        total_len: u64,
        ranges: Vec<Range>,
        boundary: String,
        part_content_type: &'static str,
    },
}

pub struct ResponseOperation {
    pub status: HttpStatus,
    pub headers: HttpHeaders,
    pub body: BodySource,
    pub keep_alive: bool,
    cancelled: Arc<AtomicBool>,
}

/// Chooses the response operation for a parsed request: a ranged operation
/// if the request carries a `Range` header with at least one satisfiable
/// range, a plain GET/HEAD operation otherwise, or a 405 for any other
/// method.
pub async fn response_operation_for_request(
    req: &HttpRequest,
    document_root: &std::path::Path,
    provider: &dyn ResourceProvider,
    cancelled: Arc<AtomicBool>,
) -> ResponseOperation {
    let keep_alive = req.keep_alive();

    if !matches!(req.method, HttpMethod::Get | HttpMethod::Head) {
        return error_operation(HttpStatus::MethodNotAllowed, keep_alive, cancelled);
    }

    let resolved = match document_root::resolve(document_root, req.path()) {
        Ok(path) => path,
        Err(ResolutionError::NotFound) => {
            return error_operation(HttpStatus::NotFound, keep_alive, cancelled);
        }
        Err(ResolutionError::Forbidden) => {
            return error_operation(HttpStatus::Forbidden, keep_alive, cancelled);
        }
    };

    let status = provider.status_for_path(&resolved).await;
    if status.is_error() {
        return error_operation(status, keep_alive, cancelled);
    }

    let len = provider.size_for_path(&resolved).await.unwrap_or(0);
    let etag = provider.etag_for_path(&resolved).await;
    let last_modified = provider.last_modified_for_path(&resolved).await;

    let mut headers = base_headers();
    if let Some(tag) = &etag {
        headers.set_raw("Etag", tag);
    }
    if let Some(modified) = last_modified {
        headers.set_raw("Last-Modified", &httpdate::fmt_http_date(modified));
    }
    headers.set_raw("Accept-Ranges", "bytes");

    if let (Some(tag), Some(if_none_match)) = (&etag, req.headers.get("If-None-Match")) {
        if if_none_match == tag || if_none_match == "*" {
            return ResponseOperation {
                status: HttpStatus::NotModified,
                headers,
                body: BodySource::Empty,
                keep_alive,
                cancelled,
            };
        }
    }

    let content_type = guess_mime(req.path());

    if let Some(range_header) = req.headers.get("Range") {
        return ranged_operation(
            resolved, len, range_header, content_type, headers, keep_alive, cancelled,
        );
    }

    headers.set_raw("Content-Type", content_type);
    headers.set_raw("Content-Length", &len.to_string());

    let body = if req.method == HttpMethod::Head {
        BodySource::Empty
    } else {
        BodySource::WholeFile {
            path: resolved,
            len,
        }
    };

    ResponseOperation {
        status: HttpStatus::Ok,
        headers,
        body,
        keep_alive,
        cancelled,
    }
}

fn ranged_operation(
    path: PathBuf,
    len: u64,
    range_header: &str,
    content_type: &'static str,
    mut headers: HttpHeaders,
    keep_alive: bool,
    cancelled: Arc<AtomicBool>,
) -> ResponseOperation {
    let Some(ranges) = parse_range(range_header, len) else {
        // Header didn't start with `bytes=`; serve the whole resource.
        headers.set_raw("Content-Type", content_type);
        headers.set_raw("Content-Length", &len.to_string());
        return ResponseOperation {
            status: HttpStatus::Ok,
            headers,
            body: BodySource::WholeFile { path, len },
            keep_alive,
            cancelled,
        };
    };

    if ranges.is_empty() {
        headers.set_raw("Content-Range", &format!("bytes */{len}"));
        return ResponseOperation {
            status: HttpStatus::RangeNotSatisfiable,
            headers,
            body: BodySource::Empty,
            keep_alive,
            cancelled,
        };
    }

    if ranges.len() == 1 {
        let range = ranges[0];
        headers.set_raw("Content-Type", content_type);
        headers.set_raw("Content-Length", &range.length.to_string());
        headers.set_raw(
            "Content-Range",
            &format!("bytes {}-{}/{}", range.offset, range.end_inclusive(), len),
        );
        return ResponseOperation {
            status: HttpStatus::PartialContent,
            headers,
            body: BodySource::SingleRange {
                path,
                total_len: len,
                range,
            },
            keep_alive,
            cancelled,
        };
    }

    let boundary = generate_boundary();
    let total = multipart_content_length(&ranges, len, content_type, &boundary);
    headers.set_raw(
        "Content-Type",
        &format!("multipart/byteranges; boundary={boundary}"),
    );
    headers.set_raw("Content-Length", &total.to_string());

    ResponseOperation {
        status: HttpStatus::PartialContent,
        headers,
        body: BodySource::MultiRange {
            path,
            total_len: len,
            ranges,
            boundary,
            part_content_type: content_type,
        },
        keep_alive,
        cancelled,
    }
}

/// Builds a self-contained error response, used both for resolution
/// failures discovered while building an operation and for parse/validation
/// failures discovered before a request could even be fully parsed.
pub fn error_response(
    status: HttpStatus,
    keep_alive: bool,
    cancelled: Arc<AtomicBool>,
) -> ResponseOperation {
    error_operation(status, keep_alive, cancelled)
}

fn error_operation(status: HttpStatus, keep_alive: bool, cancelled: Arc<AtomicBool>) -> ResponseOperation {
    let body_bytes = format!(
        "<!doctype html><title>{0}</title><h1>{0}</h1>",
        status.reason()
    )
    .into_bytes();
    let mut headers = base_headers();
    headers.set_raw("Content-Type", "text/html; charset=utf-8");
    headers.set_raw("Content-Length", &body_bytes.len().to_string());

    ResponseOperation {
        status,
        headers,
        body: BodySource::Inline(body_bytes),
        keep_alive,
        cancelled,
    }
}

fn base_headers() -> HttpHeaders {
    let mut headers = HttpHeaders::new();
    headers.set_raw("Server", &config().server_name);
    headers.set_raw(
        "Date",
        &httpdate::fmt_http_date(std::time::SystemTime::now()),
    );
    headers
}

fn generate_boundary() -> String {
    const PREFIX: &str = "filehearth-boundary-";
    let token: String = (0..24)
        .map(|_| {
            const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
            let idx = rand::thread_rng().gen_range(0..CHARS.len());
            CHARS[idx] as char
        })
        .collect();
    format!("{PREFIX}{token}")
}

fn part_header(boundary: &str, content_type: &str, range: Range, total_len: u64) -> String {
    format!(
        "\r\n--{boundary}\r\nContent-Type: {content_type}\r\nContent-Range: bytes {}-{}/{total_len}\r\n\r\n",
        range.offset,
        range.end_inclusive(),
    )
}

fn multipart_content_length(
    ranges: &[Range],
    total_len: u64,
    content_type: &str,
    boundary: &str,
) -> u64 {
    let mut total = 0u64;
    for range in ranges {
        total += part_header(boundary, content_type, *range, total_len).len() as u64;
        total += range.length;
    }
    total += format!("\r\n--{boundary}--\r\n").len() as u64;
    total
}

impl ResponseOperation {
    /// Writes the status line, headers, and body to `channel`, in that
    /// order. Every byte is submitted through [`IoChannel::write`], so this
    /// call behaves like a single synchronous write even though the
    /// underlying socket I/O is fully asynchronous. Body bytes for any
    /// file-backed [`BodySource`] are read through `provider`, never
    /// straight off disk, so a non-filesystem provider's content is
    /// actually served rather than silently bypassed.
    pub async fn write(
        &self,
        channel: &IoChannel,
        provider: &dyn ResourceProvider,
    ) -> Result<(), ServerError> {
        if self.cancelled.load(Ordering::Acquire) {
            return Err(ServerError::Cancelled);
        }

        let status_line = format!("HTTP/1.1 {} {}\r\n", self.status.code(), self.status.reason());
        let mut head = status_line.into_bytes();
        head.extend_from_slice(self.headers.stringify().as_bytes());
        head.extend_from_slice(b"\r\n");

        channel.write(head).await.map_err(map_write_err)?;

        if self.cancelled.load(Ordering::Acquire) {
            return Err(ServerError::Cancelled);
        }

        match &self.body {
            BodySource::Empty => Ok(()),
            BodySource::Inline(bytes) => channel.write(bytes.clone()).await.map_err(map_write_err),
            BodySource::WholeFile { path, len } => {
                self.stream_whole_file(channel, provider, path, *len).await
            }
            BodySource::SingleRange {
                path,
                total_len: _,
                range,
            } => self.stream_range(channel, provider, path, *range).await,
            BodySource::MultiRange {
                path,
                total_len,
                ranges,
                boundary,
                part_content_type,
            } => {
                self.stream_multipart(
                    channel,
                    provider,
                    path,
                    *total_len,
                    ranges,
                    boundary,
                    part_content_type,
                )
                .await
            }
        }
    }

    async fn stream_whole_file(
        &self,
        channel: &IoChannel,
        provider: &dyn ResourceProvider,
        path: &PathBuf,
        len: u64,
    ) -> Result<(), ServerError> {
        let mut file = provider
            .open_stream(path)
            .await
            .map_err(ServerError::IoRead)?;
        self.pump(channel, &mut file, len).await
    }

    async fn stream_range(
        &self,
        channel: &IoChannel,
        provider: &dyn ResourceProvider,
        path: &PathBuf,
        range: Range,
    ) -> Result<(), ServerError> {
        use async_std::io::SeekFrom;
        use async_std::io::prelude::SeekExt;

        let mut file = provider
            .open_random_access(path)
            .await
            .map_err(ServerError::IoRead)?;
        file.seek(SeekFrom::Start(range.offset))
            .await
            .map_err(ServerError::IoRead)?;
        self.pump(channel, &mut file, range.length).await
    }

    async fn stream_multipart(
        &self,
        channel: &IoChannel,
        provider: &dyn ResourceProvider,
        path: &PathBuf,
        total_len: u64,
        ranges: &[Range],
        boundary: &str,
        content_type: &str,
    ) -> Result<(), ServerError> {
        use async_std::io::SeekFrom;
        use async_std::io::prelude::SeekExt;

        let mut file = provider
            .open_random_access(path)
            .await
            .map_err(ServerError::IoRead)?;

        for range in ranges {
            if self.cancelled.load(Ordering::Acquire) {
                return Err(ServerError::Cancelled);
            }
            let header = part_header(boundary, content_type, *range, total_len);
            channel
                .write(header.into_bytes())
                .await
                .map_err(map_write_err)?;

            file.seek(SeekFrom::Start(range.offset))
                .await
                .map_err(ServerError::IoRead)?;
            self.pump(channel, &mut file, range.length).await?;
        }

        let trailer = format!("\r\n--{boundary}--\r\n");
        channel
            .write(trailer.into_bytes())
            .await
            .map_err(map_write_err)
    }

    /// Reads `remaining` bytes from `file` in fixed-size chunks and writes
    /// each one through `channel`, checking for cancellation between
    /// chunks so a closed connection stops a large transfer promptly.
    async fn pump(
        &self,
        channel: &IoChannel,
        file: &mut async_std::fs::File,
        mut remaining: u64,
    ) -> Result<(), ServerError> {
        let mut chunk = vec![0u8; STREAM_CHUNK_SIZE];
        while remaining > 0 {
            if self.cancelled.load(Ordering::Acquire) {
                return Err(ServerError::Cancelled);
            }
            let to_read = (remaining as usize).min(chunk.len());
            let n = file
                .read(&mut chunk[..to_read])
                .await
                .map_err(ServerError::IoRead)?;
            if n == 0 {
                break;
            }
            channel
                .write(chunk[..n].to_vec())
                .await
                .map_err(map_write_err)?;
            remaining -= n as u64;
        }
        Ok(())
    }

    /// Cancels this operation; any in-flight `pump` loop will stop at its
    /// next chunk boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn cancellation_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }
}

fn map_write_err(e: ChannelError) -> ServerError {
    match e {
        ChannelError::Io(io) => ServerError::IoWrite(io),
        ChannelError::Closed => {
            ServerError::IoWrite(std::io::Error::new(std::io::ErrorKind::NotConnected, "closed"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multipart_content_length_matches_what_is_written() {
        let ranges = vec![
            Range {
                offset: 0,
                length: 10,
            },
            Range {
                offset: 990,
                length: 10,
            },
        ];
        let boundary = "B";
        let total = multipart_content_length(&ranges, 1000, "text/plain", boundary);

        let mut expected = 0u64;
        for range in &ranges {
            expected += part_header(boundary, "text/plain", *range, 1000).len() as u64;
            expected += range.length;
        }
        expected += format!("\r\n--{boundary}--\r\n").len() as u64;

        assert_eq!(total, expected);
    }

    #[test]
    fn generated_boundaries_are_unique() {
        let a = generate_boundary();
        let b = generate_boundary();
        assert_ne!(a, b);
        assert!(a.starts_with("filehearth-boundary-"));
    }
}
