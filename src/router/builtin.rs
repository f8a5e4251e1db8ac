//! Built-in routes served when no registered route matches.
//!
//! - `/` renders a greeting page naming the server and its version.
//! - `/log` returns the tail of the attached device log as plain text.

use crate::http::{Request, Response, StatusCode};

use super::RouteContext;

/// Lines returned by `/log` when `lines` is absent, zero or not a number.
pub const DEFAULT_LOG_LINES: usize = 20;

/// Answers `req` if it targets a built-in route.
pub(crate) fn respond(req: &Request, ctx: &RouteContext<'_>) -> Option<Response> {
    match req.path() {
        "/" => Some(greeting(ctx.server_name, ctx.server_version)),
        "/log" => Some(log_tail(req, ctx)),
        _ => None,
    }
}

/// The root greeting page.
pub fn greeting(name: &str, version: &str) -> Response {
    let html = format!(
        "<html><head><title>{name}</title></head>\
         <body><h1>Hello!</h1><h3>You're connected to {name}!</h3>\
         <p>Version: {version}</p></body></html>"
    );
    Response::new(StatusCode::OK).html(html)
}

fn log_tail(req: &Request, ctx: &RouteContext<'_>) -> Response {
    let Some(log) = ctx.log else {
        return ctx.errors.render(StatusCode::NOT_FOUND, "Logging not enabled");
    };
    Response::new(StatusCode::OK).text(log.tail(requested_lines(req)))
}

fn requested_lines(req: &Request) -> usize {
    req.query_param("lines")
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(DEFAULT_LOG_LINES)
}
