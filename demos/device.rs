//! A simulated sensor hub served by the cooperative engine.
//!
//! Run with:
//! ```bash
//! RUST_LOG=hubhttp=debug cargo run --example device
//! ```
//!
//! Then try:
//! ```bash
//! curl http://127.0.0.1:8080/
//! curl http://127.0.0.1:8080/api/sensors/greenhouse
//! curl -X POST -d '{"on":true}' -H 'Content-Type: application/json' http://127.0.0.1:8080/api/relay/1
//! curl http://127.0.0.1:8080/log?lines=5
//! ```

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use hubhttp::http::{Request, Response, StatusCode};
use hubhttp::middleware::Flow;
use hubhttp::platform::{LogSink, RingLog};
use hubhttp::security::CorsPolicy;
use hubhttp::server::{self, HttpServer, ServerConfig};
use hubhttp::transport::TcpListenerAdapter;
use serde::Deserialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Deserialize)]
struct RelayCommand {
    on: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("hubhttp=info".parse()?))
        .init();

    let config = match std::env::var("HUB_CONFIG") {
        Ok(path) => ServerConfig::from_json(&std::fs::read_to_string(path)?)?,
        Err(_) => ServerConfig::default()
            .with_port(8080)
            .with_keep_alive(true)
            .with_debug(true),
    };

    let log = Rc::new(RingLog::with_capacity(200));
    let relay = Rc::new(Cell::new(false));

    let mut server = HttpServer::new(TcpListenerAdapter::new("127.0.0.1"));
    server.attach_log(Rc::clone(&log));
    server.set_server_name("GreenhouseHub");
    server.set_server_version(env!("CARGO_PKG_VERSION"));
    server.enable_cors(CorsPolicy::new());
    server.add_default_header("Cache-Control", "no-store");

    server.use_guard(|req: &mut Request, res: &mut Response| {
        if req.path().starts_with("/admin") && !req.has_header("authorization") {
            res.set_status(StatusCode::UNAUTHORIZED).set_body("token required");
            return Flow::Halt;
        }
        Flow::Continue
    });

    server.get("/api/sensors/:zone", |req: &Request| {
        let zone = req.param("zone").unwrap_or("unknown");
        Response::new(StatusCode::OK).json(&json!({ "zone": zone, "celsius": 21.5, "humidity": 48 }))
    });

    let state = Rc::clone(&relay);
    server.post("/api/relay/:id", move |req: &Request| -> Result<Response, serde_json::Error> {
        let cmd: RelayCommand = serde_json::from_slice(req.body())?;
        state.set(cmd.on);
        Response::new(StatusCode::OK).json(&json!({ "relay": req.param("id"), "on": cmd.on }))
    });

    let state = Rc::clone(&relay);
    server.on("/api/relay", move |_: &Request| {
        Response::new(StatusCode::OK).text(if state.get() { "on" } else { "off" })
    });

    server.on("/admin/reboot", |_: &Request| Response::new(StatusCode::OK).text("rebooting"));

    log.append("[BOOT] sensor hub ready");
    server.begin_with(config)?;
    server::serve(&mut server, Duration::from_millis(2), async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    Ok(())
}
