//! HTTP/1.1 response builder.
//!
//! Provides a fluent builder API for constructing HTTP responses and
//! serializing the head for transmission. The body is written separately so
//! the writer can send it in bounded chunks.

use bytes::{BufMut, BytesMut};
use serde::Serialize;

use super::{Headers, StatusCode};

/// An HTTP/1.1 response, ready to be finalized and sent.
///
/// Consuming builders (`header`, `body`, `text`, ...) suit handlers; the
/// `set_*` mutators suit middleware and hooks that receive `&mut Response`.
/// Setting a header always overwrites an earlier value for that name.
///
/// # Examples
///
/// ```
/// use hubhttp::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::OK)
///     .header("X-Sensor", "temp")
///     .text("21.5");
///
/// let head = response.encode_head();
/// let text = std::str::from_utf8(&head).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Length: 4\r\n"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: impl Into<StatusCode>) -> Self {
        Self {
            status: status.into(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Creates a `302 Found` (or `301 Moved Permanently`) redirect to `location`.
    pub fn redirect(location: impl Into<String>, permanent: bool) -> Self {
        let status = if permanent {
            StatusCode::MOVED_PERMANENTLY
        } else {
            StatusCode::FOUND
        };
        Self::new(status).header("Location", location)
    }

    /// Creates a plain-text error response.
    pub fn error(status: impl Into<StatusCode>, message: impl Into<String>) -> Self {
        Self::new(status).text(message)
    }

    /// Sets a response header, replacing any previous value.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Sets the response body from a string.
    ///
    /// The `Content-Length` header is written by [`encode_head`](Self::encode_head).
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into().into_bytes();
        self
    }

    /// Sets the response body from raw bytes.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a plain-text body with `Content-Type: text/plain; charset=utf-8`.
    #[must_use]
    pub fn text(self, body: impl Into<String>) -> Self {
        self.header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
    }

    /// Sets an HTML body with `Content-Type: text/html; charset=utf-8`.
    #[must_use]
    pub fn html(self, body: impl Into<String>) -> Self {
        self.header("Content-Type", "text/html; charset=utf-8")
            .body(body)
    }

    /// Serializes `value` as the JSON body and sets `Content-Type: application/json`.
    ///
    /// # Errors
    ///
    /// Returns the [`serde_json::Error`] if `value` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        Ok(self
            .header("Content-Type", "application/json")
            .body_bytes(body))
    }

    /// Adds permissive CORS headers for `origin` to this response only.
    #[must_use]
    pub fn cors(self, origin: impl Into<String>) -> Self {
        self.header("Access-Control-Allow-Origin", origin)
            .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
    }

    /// Changes the status code in place.
    pub fn set_status(&mut self, status: impl Into<StatusCode>) -> &mut Self {
        self.status = status.into();
        self
    }

    /// Sets a header in place, replacing any previous value.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.set(name, value);
        self
    }

    /// Replaces the body in place.
    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) -> &mut Self {
        self.body = body.into();
        self
    }

    /// Removes a header in place.
    pub fn remove_header(&mut self, name: &str) -> &mut Self {
        self.headers.remove(name);
        self
    }

    /// Returns the status code of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Returns the body bytes.
    pub fn body_ref(&self) -> &[u8] {
        &self.body
    }

    /// Serializes the status line, headers, `Content-Length` and the blank
    /// separator line.
    ///
    /// `Content-Length` is the byte length of the body, so multi-byte UTF-8
    /// text is measured correctly. Any `Content-Length` a handler set is
    /// ignored in favour of the computed one.
    pub fn encode_head(&self) -> BytesMut {
        let estimated_size = 64 + self.headers.len() * 48;
        let mut buf = BytesMut::with_capacity(estimated_size);

        // Status line
        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );

        // Headers
        for (name, value) in self.headers.iter() {
            if name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }

        // Content-Length is always the last header before the blank line
        buf.put(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());

        // Header/body separator
        buf.put(&b"\r\n"[..]);

        buf
    }

    /// Serializes the complete response, head and body.
    pub fn into_bytes(self) -> BytesMut {
        let mut buf = self.encode_head();
        buf.put(self.body.as_slice());
        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_string(bytes: BytesMut) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn simple_ok_response() {
        let r = Response::new(StatusCode::OK).body("Hello");
        let s = to_string(r.into_bytes());
        assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\nHello"));
    }

    #[test]
    fn content_length_counts_bytes_not_chars() {
        let r = Response::new(StatusCode::OK).text("héllo ✓");
        let s = to_string(r.encode_head());
        assert!(s.contains("Content-Length: 10\r\n"));
    }

    #[test]
    fn unknown_status_reason() {
        let s = to_string(Response::new(418).encode_head());
        assert!(s.starts_with("HTTP/1.1 418 Unknown\r\n"));
    }

    #[test]
    fn header_overwrites() {
        let mut r = Response::new(StatusCode::OK).header("X-Request-Id", "abc-123");
        r.set_header("x-request-id", "def").set_status(StatusCode::CREATED);
        assert_eq!(r.headers().get("X-Request-Id"), Some("def"));
        assert_eq!(r.status(), StatusCode::CREATED);
        let s = to_string(r.encode_head());
        assert_eq!(s.matches("x-request-id").count() + s.matches("X-Request-Id").count(), 1);
    }

    #[test]
    fn handler_content_length_is_replaced() {
        let r = Response::new(StatusCode::OK)
            .header("Content-Length", "999")
            .body("ok");
        let s = to_string(r.encode_head());
        assert!(!s.contains("999"));
        assert!(s.contains("Content-Length: 2\r\n"));
    }

    #[test]
    fn redirect_sets_location() {
        let r = Response::redirect("/setup", false);
        assert_eq!(r.status(), StatusCode::FOUND);
        assert_eq!(r.headers().get("location"), Some("/setup"));
        assert_eq!(Response::redirect("/x", true).status(), StatusCode::MOVED_PERMANENTLY);
    }

    #[test]
    fn json_body() {
        #[derive(Serialize)]
        struct Reading {
            celsius: f32,
        }
        let r = Response::new(StatusCode::OK)
            .json(&Reading { celsius: 21.5 })
            .unwrap();
        assert_eq!(r.headers().get("content-type"), Some("application/json"));
        assert_eq!(r.body_ref(), br#"{"celsius":21.5}"#);
    }

    #[test]
    fn error_is_plain_text() {
        let r = Response::error(StatusCode::NOT_FOUND, "Not Found");
        assert_eq!(r.status(), StatusCode::NOT_FOUND);
        assert_eq!(r.headers().get("content-type"), Some("text/plain; charset=utf-8"));
        assert_eq!(r.body_ref(), b"Not Found");
    }
}
