//! Cross-Origin Resource Sharing policy.
//!
//! The engine consults a [`CorsPolicy`] at two points of every exchange:
//!
//! - **Preflight**: an `OPTIONS` request is answered immediately with
//!   `204 No Content` carrying exactly the four `Access-Control-*` headers;
//!   middleware and routing never see it.
//! - **Finalization**: every other response gets the same headers unless the
//!   handler already set them.

use crate::http::{Response, StatusCode};

/// Seconds a browser may cache a preflight answer.
pub const PREFLIGHT_MAX_AGE: &str = "86400";

const ALLOW_ORIGIN: &str = "Access-Control-Allow-Origin";
const ALLOW_METHODS: &str = "Access-Control-Allow-Methods";
const ALLOW_HEADERS: &str = "Access-Control-Allow-Headers";
const MAX_AGE: &str = "Access-Control-Max-Age";

/// Server-wide CORS settings.
///
/// The defaults are:
///
/// | Setting          | Default value                          |
/// |------------------|----------------------------------------|
/// | Allowed origin   | `*`                                    |
/// | Allowed methods  | `GET, POST, PUT, DELETE, OPTIONS`      |
/// | Allowed headers  | `Content-Type, Authorization`          |
///
/// # Examples
///
/// ```rust
/// use hubhttp::security::CorsPolicy;
///
/// let cors = CorsPolicy::new()
///     .allow_origin("https://panel.local")
///     .allow_headers("Content-Type, X-Device-Token");
/// assert_eq!(cors.origin(), "https://panel.local");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsPolicy {
    origin: String,
    methods: String,
    headers: String,
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl CorsPolicy {
    pub fn new() -> Self {
        Self {
            origin: "*".to_string(),
            methods: "GET, POST, PUT, DELETE, OPTIONS".to_string(),
            headers: "Content-Type, Authorization".to_string(),
        }
    }

    /// Sets the value sent in `Access-Control-Allow-Origin`.
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Sets the comma-separated list sent in `Access-Control-Allow-Methods`.
    #[must_use]
    pub fn allow_methods(mut self, methods: impl Into<String>) -> Self {
        self.methods = methods.into();
        self
    }

    /// Sets the comma-separated list sent in `Access-Control-Allow-Headers`.
    #[must_use]
    pub fn allow_headers(mut self, headers: impl Into<String>) -> Self {
        self.headers = headers.into();
        self
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Builds the complete preflight answer.
    pub fn preflight(&self) -> Response {
        Response::new(StatusCode::NO_CONTENT)
            .header(ALLOW_ORIGIN, &self.origin)
            .header(ALLOW_METHODS, &self.methods)
            .header(ALLOW_HEADERS, &self.headers)
            .header(MAX_AGE, PREFLIGHT_MAX_AGE)
    }

    /// Adds the CORS headers that `response` does not carry yet.
    pub fn apply(&self, response: &mut Response) {
        let headers = response.headers_mut();
        headers.insert_if_absent(ALLOW_ORIGIN, &self.origin);
        headers.insert_if_absent(ALLOW_METHODS, &self.methods);
        headers.insert_if_absent(ALLOW_HEADERS, &self.headers);
        headers.insert_if_absent(MAX_AGE, PREFLIGHT_MAX_AGE);
    }
}
