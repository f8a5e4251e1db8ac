//! Cooperative, tick-driven HTTP/1.1 server engine.
//!
//! The host calls [`HttpServer::tick`] from its main loop. Each tick accepts at
//! most one new connection and then services the connection table in order,
//! bounded by the tick budget, so the loop never blocks for long.
//!
//! One exchange runs through these steps:
//!
//! 1. memory admission (`503` and close when the heap is low)
//! 2. incremental read and parse (`413` / `400` and close on failure)
//! 3. CORS preflight short-circuit
//! 4. middleware chain, then routing unless a middleware halted
//! 5. finalization: CORS, `Server`, default headers, `Connection`, before-send hook
//! 6. chunked write, then keep or close per `keep_alive`

use std::collections::HashMap;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::error::{ErrorRenderer, ExchangeError};
use crate::http::{Headers, Method, Request, Response, StatusCode};
use crate::middleware::{Flow, MiddlewareChain};
use crate::platform::{Clock, LogSink, MemoryProbe, NoWatchdog, SystemClock, Unmetered, Watchdog};
use crate::router::{IntoHandlerResult, RouteContext, Router};
use crate::security::CorsPolicy;
use crate::transport::{Listener, Stream};

pub mod config;
pub mod connection;
pub mod driver;
pub mod governor;
pub mod writer;


pub use config::{ConfigError, ServerConfig};
pub use connection::Connection;
pub use driver::serve;
pub use governor::{ResourceGovernor, TickBudget};
pub use writer::{ResponseWriter, WriteError};

/// Errors produced by the server lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to listen on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },
}

/// Body characters mirrored into the device log per request in debug mode.
const TRACE_BODY_CHARS: usize = 100;

/// Hook run on every routed response right before it is written.
pub type BeforeSend = Box<dyn Fn(&Request, &mut Response)>;

/// The device HTTP server.
///
/// # Examples
///
/// ```rust,no_run
/// use hubhttp::http::{Request, Response, StatusCode};
/// use hubhttp::server::{HttpServer, ServerConfig};
/// use hubhttp::transport::TcpListenerAdapter;
///
/// let mut server = HttpServer::new(TcpListenerAdapter::new("0.0.0.0"));
/// server.get("/api/led/:state", |req: &Request| {
///     Response::new(StatusCode::OK).text(req.param("state").unwrap_or("off"))
/// });
/// server.begin_with(ServerConfig::default().with_port(8080)).unwrap();
/// loop {
///     server.tick();
///     std::thread::sleep(std::time::Duration::from_millis(1));
/// }
/// ```
pub struct HttpServer<L: Listener> {
    listener: L,
    config: ServerConfig,
    governor: ResourceGovernor,
    writer: ResponseWriter,
    running: bool,

    connections: Vec<Connection<L::Stream>>,
    next_id: u64,
    resume_from: Option<u64>,

    router: Router,
    middleware: MiddlewareChain,
    errors: ErrorRenderer,
    cors: Option<CorsPolicy>,
    default_headers: Headers,
    before_send: Option<BeforeSend>,
    server_name: String,
    server_version: String,

    clock: Box<dyn Clock>,
    memory: Box<dyn MemoryProbe>,
    watchdog: Box<dyn Watchdog>,
    log: Option<Rc<dyn LogSink>>,
}

impl<L: Listener> HttpServer<L> {
    pub fn new(listener: L) -> Self {
        Self::with_config(listener, ServerConfig::default())
    }

    pub fn with_config(listener: L, config: ServerConfig) -> Self {
        let config = config.normalized();
        Self {
            listener,
            governor: ResourceGovernor::from_config(&config),
            writer: ResponseWriter::new(config.write_chunk_size, config.write_timeout_ms),
            config,
            running: false,
            connections: Vec::new(),
            next_id: 0,
            resume_from: None,
            router: Router::new(),
            middleware: MiddlewareChain::new(),
            errors: ErrorRenderer::default(),
            cors: None,
            default_headers: Headers::new(),
            before_send: None,
            server_name: "HubServer".to_string(),
            server_version: "1.0".to_string(),
            clock: Box::new(SystemClock::new()),
            memory: Box::new(Unmetered),
            watchdog: Box::new(NoWatchdog),
            log: None,
        }
    }

    // ── Collaborators ────────────────────────────────────────────────────────

    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    #[must_use]
    pub fn with_memory_probe(mut self, probe: impl MemoryProbe + 'static) -> Self {
        self.memory = Box::new(probe);
        self
    }

    #[must_use]
    pub fn with_watchdog(mut self, watchdog: impl Watchdog + 'static) -> Self {
        self.watchdog = Box::new(watchdog);
        self
    }

    /// Attaches the device log. Rejections and faults are appended to it, and
    /// `/log` serves its tail.
    pub fn attach_log<T: LogSink + 'static>(&mut self, log: Rc<T>) {
        let log: Rc<dyn LogSink> = log;
        self.log = Some(log);
    }

    // ── Registration ─────────────────────────────────────────────────────────

    /// Registers a method-agnostic handler for an exact path.
    pub fn on<F, R>(&mut self, path: &str, handler: F)
    where
        F: Fn(&Request) -> R + 'static,
        R: IntoHandlerResult,
    {
        self.router.on(path, handler);
    }

    /// Registers a handler for `method` requests matching a `:name` pattern.
    pub fn route<F, R>(&mut self, method: &str, pattern: &str, handler: F)
    where
        F: Fn(&Request) -> R + 'static,
        R: IntoHandlerResult,
    {
        self.router.route(method, pattern, handler);
    }

    pub fn get<F, R>(&mut self, pattern: &str, handler: F)
    where
        F: Fn(&Request) -> R + 'static,
        R: IntoHandlerResult,
    {
        self.router.get(pattern, handler);
    }

    pub fn post<F, R>(&mut self, pattern: &str, handler: F)
    where
        F: Fn(&Request) -> R + 'static,
        R: IntoHandlerResult,
    {
        self.router.post(pattern, handler);
    }

    pub fn put<F, R>(&mut self, pattern: &str, handler: F)
    where
        F: Fn(&Request) -> R + 'static,
        R: IntoHandlerResult,
    {
        self.router.put(pattern, handler);
    }

    pub fn delete<F, R>(&mut self, pattern: &str, handler: F)
    where
        F: Fn(&Request) -> R + 'static,
        R: IntoHandlerResult,
    {
        self.router.delete(pattern, handler);
    }

    pub fn patch<F, R>(&mut self, pattern: &str, handler: F)
    where
        F: Fn(&Request) -> R + 'static,
        R: IntoHandlerResult,
    {
        self.router.patch(pattern, handler);
    }

    pub fn on_not_found<F, R>(&mut self, handler: F)
    where
        F: Fn(&Request) -> R + 'static,
        R: IntoHandlerResult,
    {
        self.router.set_not_found(handler);
    }

    /// Replaces the plain-text renderer used for every synthesized error.
    pub fn on_error<F>(&mut self, handler: F)
    where
        F: Fn(StatusCode, &str) -> Response + 'static,
    {
        self.errors.set_handler(handler);
    }

    /// Appends a middleware that always lets the exchange continue.
    pub fn use_middleware<F>(&mut self, middleware: F)
    where
        F: Fn(&mut Request, &mut Response) + 'static,
    {
        debug!("registered middleware");
        self.middleware.push(middleware);
    }

    /// Appends a middleware that may halt the exchange by returning
    /// [`Flow::Halt`] or `false`.
    pub fn use_guard<F, R>(&mut self, middleware: F)
    where
        F: Fn(&mut Request, &mut Response) -> R + 'static,
        R: Into<Flow>,
    {
        debug!("registered guard middleware");
        self.middleware.push_guard(middleware);
    }

    pub fn on_before_send<F>(&mut self, hook: F)
    where
        F: Fn(&Request, &mut Response) + 'static,
    {
        self.before_send = Some(Box::new(hook));
    }

    /// Adds a header merged into every response that does not set it itself.
    pub fn add_default_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.default_headers.set(name, value);
    }

    pub fn remove_default_header(&mut self, name: &str) {
        self.default_headers.remove(name);
    }

    pub fn clear_default_headers(&mut self) {
        self.default_headers = Headers::new();
    }

    pub fn enable_cors(&mut self, policy: CorsPolicy) {
        debug!(origin = policy.origin(), "CORS enabled");
        self.cors = Some(policy);
    }

    pub fn disable_cors(&mut self) {
        debug!("CORS disabled");
        self.cors = None;
    }

    pub fn set_server_name(&mut self, name: impl Into<String>) {
        self.server_name = name.into();
    }

    pub fn set_server_version(&mut self, version: impl Into<String>) {
        self.server_version = version.into();
    }

    // ── Configuration ────────────────────────────────────────────────────────

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ServerConfig) {
        self.reconfigure("configuration", |_| config);
    }

    pub fn set_port(&mut self, port: u16) {
        self.reconfigure("port", |c| c.with_port(port));
    }

    pub fn set_max_request_size(&mut self, bytes: usize) {
        self.reconfigure("max request size", |c| c.with_max_request_size(bytes));
    }

    pub fn set_client_timeout(&mut self, timeout: Duration) {
        self.reconfigure("client timeout", |c| c.with_client_timeout(timeout));
    }

    pub fn set_connection_inactivity_timeout(&mut self, timeout: Duration) {
        self.reconfigure("inactivity timeout", |c| {
            c.with_connection_inactivity_timeout(timeout)
        });
    }

    pub fn set_max_connections(&mut self, max: usize) {
        self.reconfigure("max connections", |c| c.with_max_connections(max));
    }

    pub fn set_keep_alive(&mut self, enabled: bool) {
        self.reconfigure("keep-alive", |c| c.with_keep_alive(enabled));
    }

    pub fn set_debug(&mut self, enabled: bool) {
        self.reconfigure("debug", |c| c.with_debug(enabled));
    }

    fn reconfigure(&mut self, setting: &str, apply: impl FnOnce(ServerConfig) -> ServerConfig) {
        if self.running {
            warn!(setting, "configuration is fixed while the server is running");
            self.note(&format!("[HTTP] Cannot change {setting} while server is running"));
            return;
        }
        let current = std::mem::take(&mut self.config);
        self.config = apply(current).normalized();
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Starts listening on the configured port.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the listener cannot be started.
    pub fn begin(&mut self) -> Result<(), ServerError> {
        if self.running {
            warn!("server already running");
            self.note("[HTTP] Server already running");
            return Ok(());
        }

        self.governor = ResourceGovernor::from_config(&self.config);
        self.writer = ResponseWriter::new(self.config.write_chunk_size, self.config.write_timeout_ms);

        let port = self.config.port;
        self.listener
            .listen(port)
            .map_err(|source| ServerError::Bind { port, source })?;
        self.running = true;

        info!(port, name = %self.server_name, "http server listening");
        self.note(&format!("[HTTP] Server started on port {port}"));
        Ok(())
    }

    /// Replaces the configuration, then starts listening.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the listener cannot be started.
    pub fn begin_with(&mut self, config: ServerConfig) -> Result<(), ServerError> {
        self.set_config(config);
        self.begin()
    }

    /// Closes every connection and the listener.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.connections.clear();
        self.resume_from = None;
        self.listener.stop();
        self.running = false;
        info!("http server stopped");
        self.note("[HTTP] Server stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    // ── Tick ─────────────────────────────────────────────────────────────────

    /// Runs one cooperative step: accept at most one connection, then service
    /// the table in order until done or the tick budget runs out.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }

        self.accept();

        let start = self
            .resume_from
            .take()
            .and_then(|id| self.connections.iter().position(|c| c.id() == id))
            .unwrap_or(0);
        let order: Vec<u64> = self.connections[start..]
            .iter()
            .chain(&self.connections[..start])
            .map(Connection::id)
            .collect();

        let budget = self.governor.start_tick(self.clock.as_ref());
        for (visited, id) in order.into_iter().enumerate() {
            if visited > 0 && budget.exhausted(self.clock.as_ref()) {
                debug!(conn = id, "tick budget spent, deferring");
                self.resume_from = Some(id);
                break;
            }
            let Some(index) = self.connections.iter().position(|c| c.id() == id) else {
                continue;
            };

            self.watchdog.feed();
            let mut conn = self.connections.remove(index);
            if self.visit(&mut conn) {
                self.connections.insert(index, conn);
            }
        }
    }

    fn accept(&mut self) {
        if !self.governor.has_capacity(self.connections.len()) {
            return;
        }
        self.watchdog.feed();
        match self.listener.accept() {
            Ok(Some(stream)) => {
                let id = self.next_id;
                self.next_id += 1;
                debug!(conn = id, peer = %stream.peer(), "connection accepted");
                self.trace("[HTTP] New client connected");
                let now = self.clock.now_ms();
                self.connections.push(Connection::new(id, stream, now));
            }
            Ok(None) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => error!(error = %e, "failed to accept connection"),
        }
    }

    /// Services one connection. Returns `false` when it should be dropped.
    fn visit(&mut self, conn: &mut Connection<L::Stream>) -> bool {
        if !conn.connected() {
            debug!(conn = conn.id(), "client disconnected");
            self.trace("[HTTP] Client disconnected");
            return false;
        }
        let now = self.clock.now_ms();
        if conn.is_idle(now, self.config.connection_inactivity_timeout_ms) {
            debug!(conn = conn.id(), "closing idle connection");
            self.trace("[HTTP] Closing inactive client connection");
            return false;
        }

        if let Err(err) = self.governor.admit(self.memory.as_ref()) {
            self.reject(conn, err);
            return false;
        }

        let request = match conn.read_request(&self.config, &self.governor, self.clock.as_ref()) {
            Ok(Some(request)) => request,
            Ok(None) => return true,
            Err(err) => {
                self.reject(conn, err);
                return false;
            }
        };

        let keep = self.exchange(conn, request);
        if !keep {
            debug!(conn = conn.id(), "closing connection after exchange");
            self.trace("[HTTP] Closing client connection after handling");
        }
        keep
    }

    /// Answers a failure that happened before a request existed, if it has a
    /// status, then lets the caller drop the connection.
    fn reject(&mut self, conn: &mut Connection<L::Stream>, err: ExchangeError) {
        let line = match &err {
            ExchangeError::ServiceUnavailable { .. } => Some("[HTTP] Insufficient memory for new client"),
            ExchangeError::PayloadTooLarge { .. } => Some("[HTTP] Request exceeds max size"),
            ExchangeError::BadRequest(_) => Some("[HTTP] Parse error"),
            ExchangeError::Read(_) => Some("[HTTP] Read error"),
            ExchangeError::ReadTimeout { .. } => Some("[HTTP] Read timeout"),
            _ => None,
        };

        match err.status() {
            Some(status) => warn!(conn = conn.id(), status = status.as_u16(), error = %err, "rejecting request"),
            None if matches!(err, ExchangeError::Closed) => debug!(conn = conn.id(), "peer closed connection"),
            None => warn!(conn = conn.id(), error = %err, "dropping connection"),
        }
        if let Some(line) = line {
            self.note(line);
        }

        if let Some(mut response) = self.errors.render_error(&err) {
            self.finalize(&mut response, false);
            self.trace_response(&response);
            self.send(conn, &response);
        }
    }

    /// Runs one parsed request to completion. Returns whether the connection
    /// stays open.
    fn exchange(&mut self, conn: &mut Connection<L::Stream>, mut request: Request) -> bool {
        self.trace_request(&request);
        let keep_alive = self.config.keep_alive;

        if let Some(cors) = &self.cors {
            if *request.method() == Method::Options {
                let response = cors.preflight();
                debug!(conn = conn.id(), path = request.path(), "answered CORS preflight");
                self.trace_response(&response);
                let sent = self.send(conn, &response);
                conn.touch(self.clock.now_ms());
                return sent && keep_alive;
            }
        }

        let mut response = Response::default();
        if self.middleware.run(&mut request, &mut response) == Flow::Continue {
            let ctx = RouteContext {
                server_name: &self.server_name,
                server_version: &self.server_version,
                log: self.log.as_deref(),
                errors: &self.errors,
            };
            let decorated = response;
            response = self.router.dispatch(&mut request, &ctx);
            for (name, value) in decorated.headers().iter() {
                response.headers_mut().insert_if_absent(name, value);
            }
        } else {
            debug!(conn = conn.id(), path = request.path(), "middleware halted exchange");
        }

        self.finalize(&mut response, keep_alive);
        if let Some(hook) = &self.before_send {
            hook(&request, &mut response);
        }

        debug!(
            conn = conn.id(),
            method = %request.method(),
            path = request.path(),
            status = response.status().as_u16(),
            "request handled"
        );
        self.trace_response(&response);

        let sent = self.send(conn, &response);
        conn.touch(self.clock.now_ms());
        sent && keep_alive
    }

    fn finalize(&self, response: &mut Response, keep_alive: bool) {
        if let Some(cors) = &self.cors {
            cors.apply(response);
        }
        let headers = response.headers_mut();
        headers.insert_if_absent("Server", format!("{}/{}", self.server_name, self.server_version));
        for (name, value) in self.default_headers.iter() {
            headers.insert_if_absent(name, value);
        }
        headers.set("Connection", if keep_alive { "keep-alive" } else { "close" });
    }

    fn send(&self, conn: &mut Connection<L::Stream>, response: &Response) -> bool {
        match self.writer.write(conn.stream_mut(), response, self.clock.as_ref()) {
            Ok(()) => true,
            Err(err) => {
                error!(conn = conn.id(), error = %err, "failed to write response");
                self.note(match err {
                    WriteError::Timeout { .. } => "[HTTP] Write timeout",
                    _ => "[HTTP] Write error",
                });
                false
            }
        }
    }

    // ── Device log ───────────────────────────────────────────────────────────

    fn note(&self, line: &str) {
        if let Some(log) = &self.log {
            log.append(line);
        }
    }

    /// Like `note`, but only with `debug` enabled.
    fn trace(&self, line: &str) {
        if self.config.debug {
            self.note(line);
        }
    }

    fn trace_request(&self, request: &Request) {
        if !self.config.debug {
            return;
        }
        self.note(&format!("[HTTP] Request: {} {}", request.method(), request.path()));
        for (key, value) in sorted(request.query()) {
            self.note(&format!("  Query: {key}={value}"));
        }
        for (name, value) in sorted(request.headers()) {
            self.note(&format!("  Header: {name}: {value}"));
        }
        if !request.body().is_empty() {
            let text = String::from_utf8_lossy(request.body());
            let mut preview: String = text.chars().take(TRACE_BODY_CHARS).collect();
            if text.chars().count() > TRACE_BODY_CHARS {
                preview.push_str("...");
            }
            self.note(&format!("  Body: {preview}"));
        }
    }

    fn trace_response(&self, response: &Response) {
        if self.config.debug {
            self.note(&format!("[HTTP] Response: {}", response.status()));
        }
    }
}

fn sorted(map: &HashMap<String, String>) -> Vec<(&String, &String)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort();
    entries
}
