//! HTTP/1.1 request parsing using the [`httparse`] crate.

use std::collections::HashMap;

use bytes::Bytes;
use thiserror::Error;

use super::Method;

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete, more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// A parsed HTTP/1.1 request.
///
/// Created by [`Request::parse`] from the connection's accumulated buffer.
/// Header names are kept both as sent and lower-cased; lookups through
/// [`header`](Self::header) are case-insensitive. Path parameters are only
/// populated when a pattern route matched.
///
/// # Examples
///
/// ```
/// use hubhttp::http::request::Request;
///
/// let raw = b"GET /hello/?name=world HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.method().as_str(), "GET");
/// assert_eq!(request.path(), "/hello");
/// assert_eq!(request.query_param("name"), Some("world"));
/// assert_eq!(request.header("HOST"), Some("localhost"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    body: Bytes,
    headers: HashMap<String, String>,
    headers_lower: HashMap<String, String>,
    query: HashMap<String, String>,
    params: HashMap<String, String>,
}

impl Request {
    /// Maximum number of headers accepted per request.
    pub const MAX_HEADERS: usize = 16;

    /// Parse a raw HTTP/1.1 request from a byte slice.
    ///
    /// Returns the parsed `Request` and the byte offset at which the header
    /// block ends. Everything after that offset is taken as the body.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`]: more data is needed to complete the request headers.
    /// - [`RequestError::Parse`]: the start line or headers are malformed.
    /// - [`RequestError::MissingField`]: a required field (method, path) is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method = Method::from(
            raw_req
                .method
                .ok_or(RequestError::MissingField { field: "method" })?,
        );

        let target = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;

        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, parse_query_string(query)),
            None => (target, HashMap::new()),
        };

        let mut header_map = HashMap::with_capacity(raw_req.headers.len());
        let mut lower_map = HashMap::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            let value = String::from_utf8_lossy(header.value).into_owned();
            lower_map.insert(header.name.to_ascii_lowercase(), value.clone());
            header_map.insert(header.name.to_owned(), value);
        }

        Ok((
            Self {
                method,
                path: normalize_path(path).to_owned(),
                body: Bytes::copy_from_slice(&buf[body_offset..]),
                headers: header_map,
                headers_lower: lower_map,
                query,
                params: HashMap::new(),
            },
            body_offset,
        ))
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the normalized request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the headers keyed by their original casing.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Returns a header value, looked up case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers_lower
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns a header value or `default` when it is absent.
    pub fn header_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.header(name).unwrap_or(default)
    }

    /// Returns `true` if the header is present (case-insensitive).
    pub fn has_header(&self, name: &str) -> bool {
        self.headers_lower.contains_key(&name.to_ascii_lowercase())
    }

    /// Returns the parsed query parameters.
    pub fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    /// Returns a query parameter value by key.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Returns a query parameter value or `default` when it is absent.
    pub fn query_param_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.query_param(key).unwrap_or(default)
    }

    pub fn has_query_param(&self, key: &str) -> bool {
        self.query.contains_key(key)
    }

    /// Returns a path parameter bound by the matching pattern route.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub(crate) fn bind_params(&mut self, params: HashMap<String, String>) {
        self.params.extend(params);
    }

    /// Returns the request body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the body as UTF-8 text, if it is valid UTF-8.
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    pub(crate) fn set_body(&mut self, body: Bytes) {
        self.body = body;
    }

    /// Returns the `Content-Type` header, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Returns `true` if the `Content-Type` contains `content_type`, ignoring case.
    pub fn is_content_type(&self, content_type: &str) -> bool {
        self.content_type().is_some_and(|ct| {
            ct.to_ascii_lowercase()
                .contains(&content_type.to_ascii_lowercase())
        })
    }

    /// Returns `true` if the client asked for JSON, either through the
    /// `Accept` header or with `?json=true|1|yes`.
    pub fn json_requested(&self) -> bool {
        if self
            .header("accept")
            .is_some_and(|accept| accept.to_ascii_lowercase().contains("json"))
        {
            return true;
        }
        self.query_param("json").is_some_and(|v| {
            let v = v.to_ascii_lowercase();
            v == "true" || v == "1" || v == "yes"
        })
    }

    /// Returns the value of the `Content-Length` header parsed as a `usize`, if present.
    pub fn content_length(&self) -> Option<usize> {
        self.header("content-length")?.trim().parse().ok()
    }
}

/// Strips a single trailing `/`, except from the root path.
pub fn normalize_path(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

/// Parses a URL query string (`key=value&key2=value2`) into a `HashMap`.
///
/// Values are kept literally; a key without `=` maps to an empty string and a
/// later duplicate key overwrites an earlier one.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_owned(), value.to_owned()),
            None => (pair.to_owned(), String::new()),
        })
        .collect()
}
