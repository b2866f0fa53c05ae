//! Transport error taxonomy and classification.

use reqwest::StatusCode;
use serde_json::Value;
use std::error::Error as StdError;
use std::io;
use std::time::Duration;
use thiserror::Error;

pub(crate) const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please login again.";

/// What went wrong, independent of the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The server could not be reached or dropped the connection. Status 0.
    Network,
    /// No response within the configured timeout. Status 408.
    Timeout,
    /// The session could not be recovered. Status 401. Only produced after a
    /// refresh was attempted (or was impossible).
    Unauthorized,
    /// The server answered with a non-2xx status.
    Status,
    /// The request could not be built (bad URL, unencodable body). Status 0.
    Request,
}

/// Classified transport failure.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HttpError {
    pub kind: ErrorKind,
    pub message: String,
    pub status: u16,
    pub status_text: String,
    /// Parsed JSON error payload, when the server sent one.
    pub data: Option<Value>,
}

impl HttpError {
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Network,
            message: message.into(),
            status: 0,
            status_text: "Network Error".to_string(),
            data: None,
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self {
            kind: ErrorKind::Timeout,
            message: format!("Request timeout after {}ms", after.as_millis()),
            status: 408,
            status_text: "Request Timeout".to_string(),
            data: None,
        }
    }

    pub fn unauthorized() -> Self {
        Self {
            kind: ErrorKind::Unauthorized,
            message: SESSION_EXPIRED_MESSAGE.to_string(),
            status: 401,
            status_text: "Unauthorized".to_string(),
            data: None,
        }
    }

    pub fn request(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Request,
            message: message.into(),
            status: 0,
            status_text: "Request Error".to_string(),
            data: None,
        }
    }

    /// Network and timeout failures may succeed on a resend.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind, ErrorKind::Network | ErrorKind::Timeout)
    }

    pub fn is_client_error(&self) -> bool {
        self.kind == ErrorKind::Status && (400..500).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        self.kind == ErrorKind::Status && self.status >= 500
    }
}

/// Builds the error for a non-2xx response.
///
/// The message comes from the body's `error`, `detail` or `message` field, in
/// that order, falling back to the status line.
pub fn classify_status(status: StatusCode, body: Option<&Value>) -> HttpError {
    let status_text = status_text(status);
    let fallback = format!("API error: {} {}", status.as_u16(), status_text);

    let data = body.filter(|v| v.is_object()).cloned();
    let message = data
        .as_ref()
        .and_then(extract_message)
        .unwrap_or(fallback);

    HttpError {
        kind: ErrorKind::Status,
        message,
        status: status.as_u16(),
        status_text,
        data,
    }
}

/// Maps a failed send to the taxonomy using reqwest's own predicates and the
/// I/O error kinds underneath it.
pub fn classify_transport(err: &reqwest::Error, timeout: Duration) -> HttpError {
    if err.is_timeout() {
        return HttpError::timeout(timeout);
    }
    if err.is_builder() {
        return HttpError::request(format!("Invalid request: {}", err));
    }
    if err.is_connect() {
        return HttpError::network(
            "Network error: Unable to connect to the server. Please check your internet connection and try again.",
        );
    }
    if let Some(kind) = io_error_kind(err) {
        if connection_closed(kind) {
            let mut error = HttpError::network(
                "Connection error: The server closed the connection. Please try again.",
            );
            error.status_text = "Connection Error".to_string();
            return error;
        }
        if kind == io::ErrorKind::TimedOut {
            return HttpError::timeout(timeout);
        }
    }
    if err.is_body() && !err.is_decode() {
        return HttpError::request(format!("Failed to encode request body: {}", err));
    }

    HttpError::network(format!("Network error: {}", err))
}

pub(crate) fn status_text(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or("").to_string()
}

fn extract_message(body: &Value) -> Option<String> {
    ["error", "detail", "message"].iter().find_map(|field| {
        body.get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn io_error_kind(err: &reqwest::Error) -> Option<io::ErrorKind> {
    let mut source = err.source();
    while let Some(inner) = source {
        if let Some(io_err) = inner.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        source = inner.source();
    }
    None
}

fn connection_closed(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}
