#![cfg(feature = "net")]

use crate::net::{HttpError, NetError};
use serde::Serialize;
use std::io::{self, Write};

/// Serialises `payload` and writes a complete `Connection: close` response.
/// `request_id`, when present, is echoed in `X-Request-ID`.
pub(crate) fn write_json_response<T: Serialize>(
    stream: &mut (impl Write + ?Sized),
    status: u16,
    request_id: Option<&str>,
    payload: &T,
) -> Result<(), NetError> {
    let body = serde_json::to_vec(payload).map_err(HttpError::JsonSerialize)?;
    let mut head = Vec::with_capacity(160);
    write!(
        head,
        "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n",
        reason_phrase(status),
        body.len()
    )
    .map_err(|_| HttpError::ResponseFormat)?;
    if let Some(id) = request_id {
        write!(head, "X-Request-ID: {id}\r\n").map_err(|_| HttpError::ResponseFormat)?;
    }
    head.extend_from_slice(b"Connection: close\r\n\r\n");
    head.extend_from_slice(&body);
    stream.write_all(&head).map_err(map_write_error)?;
    stream.flush().map_err(map_write_error)
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        408 => "Request Timeout",
        415 => "Unsupported Media Type",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

fn map_write_error(err: io::Error) -> NetError {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
            NetError::from(HttpError::ResponseTimeout)
        }
        _ => NetError::from(err),
    }
}
