//! HTTP request validator.
//!
//! Once all headers have been parsed from an incoming request, this module
//! validates its semantics according to HTTP rules and server configuration.
//! Errors are mapped directly to HTTP status codes.
//!
//! This includes validating:
//! - HTTP version support
//! - Absence of a body on GET/HEAD
//! - Content-Length header correctness and size limit
//!
//! Method support (which verbs this server actually serves) is a routing
//! decision made later by the response operation, not a validation concern:
//! an unsupported method is a `405`, not a `400`.

use crate::config::config;
use crate::http::HttpMethod;
use crate::http::HttpVersion;
use crate::http::request::HttpRequest;
use crate::http::status::HttpStatus;

#[derive(Debug, PartialEq, Eq)]
pub enum ValidatorError {
    Error,
    HttpVersionNotSupported,
    PayloadTooLarge,
    MalformedHeaderField,
    BodyNotAllowed,
}

impl ValidatorError {
    pub fn into_http_status(self) -> HttpStatus {
        match self {
            ValidatorError::Error => HttpStatus::BadRequest,
            ValidatorError::HttpVersionNotSupported => HttpStatus::HttpVersionNotSupported,
            ValidatorError::PayloadTooLarge => HttpStatus::PayloadTooLarge,
            ValidatorError::MalformedHeaderField => HttpStatus::BadRequest,
            ValidatorError::BodyNotAllowed => HttpStatus::BadRequest,
        }
    }
}

pub struct Validator;

impl Validator {
    /// Validates that the HTTP version is one this server is configured to
    /// speak (see [`http_version`](crate::config::ServerConfig::http_version)).
    fn validate_http_version(v: (u8, u8)) -> Result<(), ValidatorError> {
        match HttpVersion::is_valid(v) {
            Ok(http_v) if http_v <= config().http_version => Ok(()),
            Ok(_) => Err(ValidatorError::HttpVersionNotSupported),
            Err(_) => Err(ValidatorError::Error),
        }
    }

    /// GET and HEAD requests carrying a body are rejected outright; this
    /// server has no notion of a request body for either verb.
    fn validate_http_method(
        content_length: Option<usize>,
        method: &HttpMethod,
    ) -> Result<(), ValidatorError> {
        match method {
            HttpMethod::Get | HttpMethod::Head => match content_length {
                Some(n) if n > 0 => Err(ValidatorError::BodyNotAllowed),
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }

    /// Public interface to enforce all validations on an `HttpRequest`.
    pub fn validate_request(req: &HttpRequest) -> Result<(), ValidatorError> {
        Self::validate_http_version(req.http_version)?;

        let content_length = req
            .headers
            .get("Content-Length")
            .map(|v| v.parse::<usize>())
            .transpose()
            .map_err(|_| ValidatorError::MalformedHeaderField)?;

        Self::validate_http_method(content_length, &req.method)?;

        if content_length.is_some_and(|n| n > config().max_body_size) {
            return Err(ValidatorError::PayloadTooLarge);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ServerConfig, set_config};
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn setup() {
        INIT.call_once(|| {
            set_config(ServerConfig {
                max_body_size: 16,
                ..Default::default()
            });
        });
    }

    #[test]
    fn rejects_body_on_get() {
        setup();
        let mut req = HttpRequest::new();
        req.method = HttpMethod::Get;
        req.http_version = (1, 1);
        req.headers.set_raw("Content-Length", "4");
        assert_eq!(
            Validator::validate_request(&req),
            Err(ValidatorError::BodyNotAllowed)
        );
    }

    #[test]
    fn rejects_oversize_body() {
        setup();
        let mut req = HttpRequest::new();
        req.method = HttpMethod::Post;
        req.http_version = (1, 1);
        req.headers.set_raw("Content-Length", "1000");
        assert_eq!(
            Validator::validate_request(&req),
            Err(ValidatorError::PayloadTooLarge)
        );
    }

    #[test]
    fn accepts_plain_get() {
        setup();
        let mut req = HttpRequest::new();
        req.method = HttpMethod::Get;
        req.http_version = (1, 1);
        assert!(Validator::validate_request(&req).is_ok());
    }
}
