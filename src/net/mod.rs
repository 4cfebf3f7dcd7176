#![cfg(feature = "net")]

//! Blocking HTTP/1.1 admin surface: request parsing, JSON responses, the
//! thread-per-connection listener, and the `/admin/rules` router.

use thiserror::Error;

pub mod admin;
mod http;
mod server;

pub use admin::{AdminHttpServer, AdminHttpServerConfig, AdminHttpServerHandle};
pub use http::{read_request, SimpleHttpRequest};

/// Errors emitted by the built-in networking helpers.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("connection closed while reading headers")]
    ConnectionClosedBeforeHeaders,
    #[error("connection closed while reading body")]
    ConnectionClosedBeforeBody,
    #[error("missing HTTP header terminator")]
    MissingHeaderTerminator,
    #[error("HTTP headers exceed limit")]
    HeadersTooLarge,
    #[error("HTTP body exceeds limit")]
    BodyTooLarge,
    #[error("partial HTTP request received")]
    PartialRequest,
    #[error("HTTP request timed out")]
    RequestTimeout,
    #[error("HTTP request parse error: {0:?}")]
    RequestParse(httparse::Error),
    #[error("HTTP method missing")]
    MissingMethod,
    #[error("HTTP path missing")]
    MissingPath,
    #[error("invalid header value for {name}")]
    InvalidHeaderValue { name: String },
    #[error("invalid Content-Length value")]
    InvalidContentLengthValue,
    #[error("chunked transfer encoding unsupported")]
    ChunkedEncodingUnsupported,
    #[error("failed to serialize JSON response: {0}")]
    JsonSerialize(serde_json::Error),
    #[error("failed to format HTTP response")]
    ResponseFormat,
    #[error("HTTP response write timed out")]
    ResponseTimeout,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("service lock poisoned ({context})")]
    Poisoned { context: &'static str },
    #[error("{context} server shutdown timed out")]
    ShutdownTimeout { context: &'static str },
}
