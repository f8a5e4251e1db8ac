//! Exchange-level error taxonomy and the renderer that turns it into responses.
//!
//! None of these errors escape a single connection's exchange: each one is
//! either rendered to the client as an error response or ends the connection.

use std::io;

use thiserror::Error;

use crate::http::{Response, StatusCode, request::RequestError};

/// Boxed error returned by fallible handlers.
pub type BoxError = Box<dyn std::error::Error + 'static>;

/// Callback that renders a synthesized error response from a status and message.
pub type ErrorHandler = Box<dyn Fn(StatusCode, &str) -> Response>;

/// Everything that can cut an exchange short.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("malformed request: {0}")]
    BadRequest(#[from] RequestError),

    #[error("request exceeds maximum allowed size of {max_bytes} bytes")]
    PayloadTooLarge { max_bytes: usize },

    #[error("free memory {free} bytes is below the {floor} byte floor")]
    ServiceUnavailable { free: usize, floor: usize },

    #[error("handler failed: {0}")]
    HandlerFault(String),

    #[error("connection closed by peer")]
    Closed,

    #[error("read error: {0}")]
    Read(#[source] io::Error),

    #[error("request headers not complete within {timeout_ms} ms")]
    ReadTimeout { timeout_ms: u64 },
}

impl ExchangeError {
    /// The status a client receives for this error, or `None` when the
    /// connection is dropped without a response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::BadRequest(_) => Some(StatusCode::BAD_REQUEST),
            Self::PayloadTooLarge { .. } => Some(StatusCode::PAYLOAD_TOO_LARGE),
            Self::ServiceUnavailable { .. } => Some(StatusCode::SERVICE_UNAVAILABLE),
            Self::HandlerFault(_) => Some(StatusCode::INTERNAL_SERVER_ERROR),
            Self::Closed | Self::Read(_) | Self::ReadTimeout { .. } => None,
        }
    }
}

/// Renders error responses, through the registered error handler when present.
///
/// # Examples
///
/// ```
/// use hubhttp::error::ErrorRenderer;
/// use hubhttp::http::{Response, StatusCode};
///
/// let mut errors = ErrorRenderer::default();
/// assert_eq!(errors.render(StatusCode::NOT_FOUND, "Not Found").body_ref(), b"Not Found");
///
/// errors.set_handler(|status, msg| {
///     Response::new(status).body(format!("{{\"error\":\"{msg}\"}}"))
/// });
/// assert_eq!(errors.render(StatusCode::NOT_FOUND, "gone").body_ref(), br#"{"error":"gone"}"#);
/// ```
#[derive(Default)]
pub struct ErrorRenderer {
    custom: Option<ErrorHandler>,
}

impl ErrorRenderer {
    pub fn set_handler<F>(&mut self, handler: F)
    where
        F: Fn(StatusCode, &str) -> Response + 'static,
    {
        self.custom = Some(Box::new(handler));
    }

    /// Renders `status` with `message` as the response body.
    pub fn render(&self, status: StatusCode, message: &str) -> Response {
        match &self.custom {
            Some(handler) => handler(status, message),
            None => Response::error(status, message),
        }
    }

    /// Renders the response for `err` using the status table's reason phrase
    /// as the message. Returns `None` for errors that get no response.
    pub fn render_error(&self, err: &ExchangeError) -> Option<Response> {
        let status = err.status()?;
        Some(self.render(status, status.canonical_reason()))
    }
}
