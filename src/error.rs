//! Crate-wide error kinds produced while servicing a connection.
//!
//! Every kind maps to one of two outcomes: the connection is terminated
//! outright (an I/O-layer failure, or a protocol violation severe enough
//! that further parsing cannot be trusted), or an HTTP error response is
//! written and, if the request was keep-alive, the connection continues.

use crate::http::parser::ParserError;
use crate::http::status::HttpStatus;
use crate::http::validator::ValidatorError;

#[derive(Debug)]
pub enum ServerError {
    /// Malformed request line or headers.
    Parse(ParserError),
    /// Method not supported by this server's dispatch.
    Method,
    /// Path could not be resolved: not found, forbidden, or a symlink
    /// escaping the document root.
    Resolution(HttpStatus),
    /// Every spec in a `Range` header was unsatisfiable.
    Range,
    /// Reading the resource failed partway through the response body.
    IoRead(std::io::Error),
    /// Writing to the socket failed.
    IoWrite(std::io::Error),
    /// A transfer-encoding or other protocol feature this server does not
    /// implement was required by the request.
    Protocol,
    /// The response operation was cancelled before it completed, e.g. the
    /// connection closed mid-write.
    Cancelled,
    Validator(ValidatorError),
}

impl ServerError {
    /// Whether this error should terminate the connection outright rather
    /// than merely producing an HTTP error response.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ServerError::IoRead(_) | ServerError::IoWrite(_) | ServerError::Cancelled
        )
    }

    pub fn into_http_status(self) -> HttpStatus {
        match self {
            ServerError::Parse(e) => e.into_http_status(),
            ServerError::Method => HttpStatus::MethodNotAllowed,
            ServerError::Resolution(status) => status,
            ServerError::Range => HttpStatus::RangeNotSatisfiable,
            ServerError::IoRead(_) => HttpStatus::InternalServerError,
            ServerError::IoWrite(_) => HttpStatus::InternalServerError,
            ServerError::Protocol => HttpStatus::NotImplemented,
            ServerError::Cancelled => HttpStatus::InternalServerError,
            ServerError::Validator(e) => e.into_http_status(),
        }
    }
}

impl From<ParserError> for ServerError {
    fn from(e: ParserError) -> Self {
        ServerError::Parse(e)
    }
}

impl From<ValidatorError> for ServerError {
    fn from(e: ValidatorError) -> Self {
        ServerError::Validator(e)
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Parse(e) => write!(f, "parse error: {:?}", e),
            ServerError::Method => write!(f, "unsupported method"),
            ServerError::Resolution(status) => write!(f, "resolution error: {}", status.code()),
            ServerError::Range => write!(f, "unsatisfiable range"),
            ServerError::IoRead(e) => write!(f, "read error: {e}"),
            ServerError::IoWrite(e) => write!(f, "write error: {e}"),
            ServerError::Protocol => write!(f, "unsupported protocol feature"),
            ServerError::Cancelled => write!(f, "operation cancelled"),
            ServerError::Validator(e) => write!(f, "validation error: {:?}", e),
        }
    }
}

impl std::error::Error for ServerError {}
