//! Request routing: map paths and method/pattern pairs to handler functions.
//!
//! Resolution for a request runs through these stages, first hit wins:
//!
//! 1. **Pattern routes** in registration order. A route matches when its method
//!    equals the request method (ignoring case), the segment counts agree,
//!    literal segments are equal and every `:name` segment binds a value.
//! 2. **Exact paths**, registered without a method and matched literally.
//! 3. **Built-ins**: a greeting page on `/` and the device log tail on `/log`
//!    (see [`builtin`]).
//! 4. The **not-found** handler, or a default `404`.
//!
//! | Pattern            | Example match          | Bound params              |
//! |--------------------|------------------------|---------------------------|
//! | `/status`          | `/status`, `/status/`  | *(none)*                  |
//! | `/api/item/:id`    | `/api/item/42`         | `id → "42"`               |
//!
//! A handler that returns an error or panics is answered with `500` at this
//! boundary; the engine keeps running.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, warn};

use crate::error::{BoxError, ErrorRenderer, ExchangeError};
use crate::http::request::normalize_path;
use crate::http::{Request, Response, StatusCode};
use crate::platform::LogSink;

pub mod builtin;

/// Result type produced by a handler invocation.
pub type HandlerResult = Result<Response, BoxError>;

/// Type-erased handler stored in the routing tables.
pub type Handler = Box<dyn Fn(&Request) -> HandlerResult>;

/// Conversion for handler return values.
///
/// Handlers may return a bare [`Response`] or any `Result<Response, E>` whose
/// error converts into [`BoxError`].
pub trait IntoHandlerResult {
    fn into_handler_result(self) -> HandlerResult;
}

impl IntoHandlerResult for Response {
    fn into_handler_result(self) -> HandlerResult {
        Ok(self)
    }
}

impl<E> IntoHandlerResult for Result<Response, E>
where
    E: Into<BoxError>,
{
    fn into_handler_result(self) -> HandlerResult {
        self.map_err(Into::into)
    }
}

pub(crate) fn boxed<F, R>(handler: F) -> Handler
where
    F: Fn(&Request) -> R + 'static,
    R: IntoHandlerResult,
{
    Box::new(move |req: &Request| handler(req).into_handler_result())
}

// A single path segment, either a literal string or a named capture (`:name`).
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// Splits a normalized path into its non-empty segments.
fn segments(path: &str) -> impl Iterator<Item = &str> {
    normalize_path(path).split('/').filter(|s| !s.is_empty())
}

/// A registered method + path-template route.
pub struct RoutePattern {
    method: String,
    pattern: String,
    segments: Vec<Segment>,
    has_params: bool,
    handler: Handler,
}

impl RoutePattern {
    fn new(method: &str, pattern: &str, handler: Handler) -> Self {
        let segments: Vec<Segment> = segments(pattern)
            .map(|s| match s.strip_prefix(':') {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(s.to_string()),
            })
            .collect();
        let has_params = segments.iter().any(|s| matches!(s, Segment::Param(_)));
        Self {
            method: method.to_string(),
            pattern: pattern.to_string(),
            segments,
            has_params,
            handler,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// The pattern string as registered.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn has_params(&self) -> bool {
        self.has_params
    }

    // Returns the bound parameters when both the method and the path match.
    fn matches(&self, method: &str, path: &str) -> Option<HashMap<String, String>> {
        if !self.method.eq_ignore_ascii_case(method) {
            return None;
        }

        let path_segments: Vec<&str> = segments(path).collect();
        if path_segments.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (seg, actual) in self.segments.iter().zip(path_segments) {
            match seg {
                Segment::Literal(s) => {
                    if s != actual {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    params.insert(name.clone(), actual.to_string());
                }
            }
        }
        Some(params)
    }
}

/// What routing needs from the server to answer built-ins and faults.
pub struct RouteContext<'a> {
    pub server_name: &'a str,
    pub server_version: &'a str,
    pub log: Option<&'a dyn LogSink>,
    pub errors: &'a ErrorRenderer,
}

impl RouteContext<'_> {
    fn note(&self, line: &str) {
        if let Some(log) = self.log {
            log.append(line);
        }
    }
}

/// HTTP request router.
///
/// # Examples
///
/// ```rust
/// use hubhttp::error::ErrorRenderer;
/// use hubhttp::http::{Request, Response, StatusCode};
/// use hubhttp::router::{RouteContext, Router};
///
/// let mut router = Router::new();
/// router.get("/api/item/:id", |req: &Request| {
///     Response::new(StatusCode::OK).text(req.param("id").unwrap_or_default())
/// });
///
/// let errors = ErrorRenderer::default();
/// let ctx = RouteContext { server_name: "Hub", server_version: "1.0", log: None, errors: &errors };
/// let (mut req, _) = Request::parse(b"GET /api/item/42 HTTP/1.1\r\n\r\n").unwrap();
/// let res = router.dispatch(&mut req, &ctx);
/// assert_eq!(res.body_ref(), b"42");
/// ```
#[derive(Default)]
pub struct Router {
    patterns: Vec<RoutePattern>,
    exact: HashMap<String, Handler>,
    not_found: Option<Handler>,
}

impl Router {
    /// Create a new, empty `Router`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a method-agnostic handler for the exact `path`.
    ///
    /// The path is normalized like request paths, so `/foo/` and `/foo`
    /// register the same route. Re-registering a path replaces its handler.
    pub fn on<F, R>(&mut self, path: &str, handler: F)
    where
        F: Fn(&Request) -> R + 'static,
        R: IntoHandlerResult,
    {
        debug!(path, "registered exact route");
        self.exact
            .insert(normalize_path(path).to_string(), boxed(handler));
    }

    /// Registers a handler for `method` requests matching `pattern`.
    pub fn route<F, R>(&mut self, method: &str, pattern: &str, handler: F)
    where
        F: Fn(&Request) -> R + 'static,
        R: IntoHandlerResult,
    {
        debug!(method, pattern, "registered pattern route");
        self.patterns
            .push(RoutePattern::new(method, pattern, boxed(handler)));
    }

    pub fn get<F, R>(&mut self, pattern: &str, handler: F)
    where
        F: Fn(&Request) -> R + 'static,
        R: IntoHandlerResult,
    {
        self.route("GET", pattern, handler);
    }

    pub fn post<F, R>(&mut self, pattern: &str, handler: F)
    where
        F: Fn(&Request) -> R + 'static,
        R: IntoHandlerResult,
    {
        self.route("POST", pattern, handler);
    }

    pub fn put<F, R>(&mut self, pattern: &str, handler: F)
    where
        F: Fn(&Request) -> R + 'static,
        R: IntoHandlerResult,
    {
        self.route("PUT", pattern, handler);
    }

    pub fn delete<F, R>(&mut self, pattern: &str, handler: F)
    where
        F: Fn(&Request) -> R + 'static,
        R: IntoHandlerResult,
    {
        self.route("DELETE", pattern, handler);
    }

    pub fn patch<F, R>(&mut self, pattern: &str, handler: F)
    where
        F: Fn(&Request) -> R + 'static,
        R: IntoHandlerResult,
    {
        self.route("PATCH", pattern, handler);
    }

    /// Sets the handler used when nothing else matches.
    pub fn set_not_found<F, R>(&mut self, handler: F)
    where
        F: Fn(&Request) -> R + 'static,
        R: IntoHandlerResult,
    {
        self.not_found = Some(boxed(handler));
    }

    /// Returns the registered pattern routes in match order.
    pub fn patterns(&self) -> &[RoutePattern] {
        &self.patterns
    }

    /// Total number of pattern and exact routes.
    pub fn len(&self) -> usize {
        self.patterns.len() + self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty() && self.exact.is_empty()
    }

    /// Finds the handler for `req` among pattern and exact routes, binding
    /// path parameters into the request on a pattern match.
    pub fn resolve(&self, req: &mut Request) -> Option<&Handler> {
        for route in &self.patterns {
            if let Some(params) = route.matches(req.method().as_str(), req.path()) {
                req.bind_params(params);
                return Some(&route.handler);
            }
        }
        self.exact.get(req.path())
    }

    /// Routes `req` to a response, falling back to built-ins and not-found.
    pub fn dispatch(&self, req: &mut Request, ctx: &RouteContext<'_>) -> Response {
        if let Some(handler) = self.resolve(req) {
            return invoke(handler, req, ctx);
        }

        if let Some(response) = builtin::respond(req, ctx) {
            return response;
        }

        match &self.not_found {
            Some(handler) => invoke(handler, req, ctx),
            None => {
                debug!(path = req.path(), "no route");
                ctx.errors.render(StatusCode::NOT_FOUND, "Not Found")
            }
        }
    }
}

/// Runs `handler`, converting an error or a panic into a `500` response.
fn invoke(handler: &Handler, req: &Request, ctx: &RouteContext<'_>) -> Response {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(req)));
    let fault = match outcome {
        Ok(Ok(response)) => return response,
        Ok(Err(e)) => ExchangeError::HandlerFault(e.to_string()),
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic".to_string());
            ExchangeError::HandlerFault(msg)
        }
    };

    warn!(method = %req.method(), path = req.path(), error = %fault, "handler fault");
    ctx.note("[HTTP] Handler threw exception");
    ctx.errors
        .render_error(&fault)
        .unwrap_or_else(|| Response::new(StatusCode::INTERNAL_SERVER_ERROR))
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::platform::RingLog;

    fn make_request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    fn dispatch(router: &Router, method: &str, path: &str) -> Response {
        let errors = ErrorRenderer::default();
        let ctx = RouteContext {
            server_name: "Hub",
            server_version: "1.0",
            log: None,
            errors: &errors,
        };
        router.dispatch(&mut make_request(method, path), &ctx)
    }

    fn ok(body: &'static str) -> impl Fn(&Request) -> Response {
        move |_: &Request| Response::new(StatusCode::OK).body(body)
    }

    // ── RoutePattern ──────────────────────────────────────────────────────────

    #[test]
    fn pattern_segments_and_params_flag() {
        let rp = RoutePattern::new("GET", "/api/item/:id/", boxed(ok("")));
        assert_eq!(
            rp.segments,
            vec![
                Segment::Literal("api".into()),
                Segment::Literal("item".into()),
                Segment::Param("id".into()),
            ]
        );
        assert!(rp.has_params());
        assert_eq!(rp.pattern(), "/api/item/:id/");
        assert!(!RoutePattern::new("GET", "/status", boxed(ok(""))).has_params());
    }

    #[test]
    fn pattern_binds_value() {
        let rp = RoutePattern::new("GET", "/api/item/:id", boxed(ok("")));
        let params = rp.matches("GET", "/api/item/42").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("42"));
    }

    #[test]
    fn pattern_rejects_segment_count_mismatch() {
        let rp = RoutePattern::new("GET", "/api/item/:id", boxed(ok("")));
        assert!(rp.matches("GET", "/api/item/42/extra").is_none());
        assert!(rp.matches("GET", "/api/item").is_none());
    }

    #[test]
    fn pattern_rejects_other_method_and_accepts_any_case() {
        let rp = RoutePattern::new("GET", "/api/item/:id", boxed(ok("")));
        assert!(rp.matches("POST", "/api/item/42").is_none());
        assert!(rp.matches("get", "/api/item/42").is_some());
    }

    #[test]
    fn pattern_literal_must_match_exactly() {
        let rp = RoutePattern::new("GET", "/users/:id", boxed(ok("")));
        assert!(rp.matches("GET", "/posts/42").is_none());
    }

    // ── Router ────────────────────────────────────────────────────────────────

    #[test]
    fn router_starts_empty() {
        let router = Router::new();
        assert!(router.is_empty());
        assert_eq!(router.len(), 0);
    }

    #[test]
    fn pattern_route_receives_params() {
        let mut router = Router::new();
        router.get("/api/item/:id", |req: &Request| {
            Response::new(StatusCode::OK).body(req.param("id").unwrap_or("").to_owned())
        });
        let res = dispatch(&router, "GET", "/api/item/42");
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body_ref(), b"42");
    }

    #[test]
    fn first_registered_pattern_wins() {
        let mut router = Router::new();
        router.get("/a/:x", ok("first"));
        router.get("/a/:y", ok("second"));
        assert_eq!(dispatch(&router, "GET", "/a/1").body_ref(), b"first");
    }

    #[test]
    fn pattern_beats_exact() {
        let mut router = Router::new();
        router.on("/status", ok("exact"));
        router.get("/status", ok("pattern"));
        assert_eq!(dispatch(&router, "GET", "/status").body_ref(), b"pattern");
        // a method mismatch falls through to the method-agnostic table
        assert_eq!(dispatch(&router, "POST", "/status").body_ref(), b"exact");
    }

    #[test]
    fn exact_routes_ignore_trailing_slash() {
        let mut router = Router::new();
        router.on("/foo/", ok("foo"));
        assert_eq!(dispatch(&router, "GET", "/foo").body_ref(), b"foo");
        assert_eq!(dispatch(&router, "DELETE", "/foo/").body_ref(), b"foo");
    }

    #[test]
    fn unmatched_returns_default_404() {
        let router = Router::new();
        let res = dispatch(&router, "GET", "/nowhere");
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(res.body_ref(), b"Not Found");
    }

    #[test]
    fn custom_not_found_handler() {
        let mut router = Router::new();
        router.set_not_found(|req: &Request| {
            Response::new(StatusCode::NOT_FOUND).body(format!("no {}", req.path()))
        });
        assert_eq!(dispatch(&router, "GET", "/x").body_ref(), b"no /x");
    }

    #[test]
    fn erroring_handler_becomes_500() {
        let mut router = Router::new();
        router.on("/fail", |_req: &Request| -> Result<Response, BoxError> {
            Err("sensor offline".into())
        });
        let res = dispatch(&router, "GET", "/fail");
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn panicking_handler_becomes_500_and_is_logged() {
        let mut router = Router::new();
        router.get("/boom", |_req: &Request| -> Response { panic!("boom") });
        let log = RingLog::default();
        let errors = ErrorRenderer::default();
        let ctx = RouteContext {
            server_name: "Hub",
            server_version: "1.0",
            log: Some(&log),
            errors: &errors,
        };
        let res = router.dispatch(&mut make_request("GET", "/boom"), &ctx);
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(log.tail(1).contains("Handler threw exception"));
    }

    #[test]
    fn handler_errors_use_custom_renderer() {
        let mut router = Router::new();
        router.on("/fail", |_req: &Request| -> Result<Response, BoxError> { Err("x".into()) });
        let mut errors = ErrorRenderer::default();
        errors.set_handler(|status, msg| Response::new(status).body(format!("custom {msg}")));
        let ctx = RouteContext {
            server_name: "Hub",
            server_version: "1.0",
            log: None,
            errors: &errors,
        };
        let res = router.dispatch(&mut make_request("GET", "/fail"), &ctx);
        assert_eq!(res.body_ref(), b"custom Internal Server Error");
    }

    #[test]
    fn handlers_keep_captured_state() {
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let mut router = Router::new();
        router.on("/hit", move |_req: &Request| {
            counter.set(counter.get() + 1);
            Response::new(StatusCode::OK)
        });
        dispatch(&router, "GET", "/hit");
        dispatch(&router, "GET", "/hit");
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn method_variants_registered() {
        let mut router = Router::new();
        router.put("/r", ok("put"));
        router.delete("/r", ok("delete"));
        router.patch("/r", ok("patch"));
        router.post("/r", ok("post"));
        assert_eq!(router.len(), 4);
        assert_eq!(router.patterns()[0].method(), "PUT");
        assert_eq!(dispatch(&router, "PATCH", "/r").body_ref(), b"patch");
        assert_eq!(dispatch(&router, "DELETE", "/r").body_ref(), b"delete");
    }
}
