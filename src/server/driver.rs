//! Async host loop for hosts that already run a tokio runtime.

use std::future::Future;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tracing::info;

use super::{HttpServer, ServerError};
use crate::transport::Listener;

/// Ticks `server` every `period` until `shutdown` resolves, then stops it.
///
/// The server is started first if it is not running yet. The engine is not
/// `Send`, so run this on a current-thread runtime or a `LocalSet`.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the server has to be started and the
/// listener cannot be opened.
pub async fn serve<L, F>(server: &mut HttpServer<L>, period: Duration, shutdown: F) -> Result<(), ServerError>
where
    L: Listener,
    F: Future<Output = ()>,
{
    if !server.is_running() {
        server.begin()?;
    }

    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            _ = ticker.tick() => server.tick(),
        }
    }

    info!("shutdown requested");
    server.stop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::http::{Request, Response, StatusCode};
    use crate::platform::ManualClock;
    use crate::transport::mock::MockListener;

    #[tokio::test]
    async fn serves_until_shutdown() {
        let listener = MockListener::new();
        let backlog = listener.backlog();
        let ticks = Rc::new(Cell::new(0u32));
        let counter = Rc::clone(&ticks);

        let mut server = HttpServer::new(listener)
            .with_clock(ManualClock::new())
            .with_watchdog(move || counter.set(counter.get() + 1));
        server.get("/ping", |_: &Request| Response::new(StatusCode::OK).text("pong"));

        let peer = backlog.connect();
        peer.send("GET /ping HTTP/1.1\r\n\r\n");

        serve(&mut server, Duration::from_millis(5), time::sleep(Duration::from_millis(60)))
            .await
            .unwrap();

        assert!(!server.is_running());
        assert!(ticks.get() > 1);
        assert!(peer.output().ends_with("pong"));
        assert!(peer.is_closed());
    }
}
