use crate::errors::{Error, Result};
use crate::metrics::{
    LAST_RSSI_DBM, STREAM_INVALID_TOTAL, STREAM_MESSAGES_TOTAL, STREAM_RECONNECTS_TOTAL,
};
use crate::model::{ConnectionStatus, RawReading};
use crate::sse::SseDecoder;
use crate::store::TelemetryStore;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const INITIAL_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 30_000;

/// Reconnection policy for the live stream.
///
/// The browser EventSource primitive retries on its own; here retry is an
/// explicit, injectable policy so tests can run it fast and callers can bound
/// it. `max_attempts` counts consecutive failures and resets on every
/// successful open; `None` retries forever.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
            max_attempts: None,
        }
    }
}

/// Owns the single live subscription to the telemetry stream.
///
/// `open` is idempotent keyed on whether a live handle already exists, so a
/// caller may invoke it repeatedly without fanning out duplicate
/// subscriptions. The connector holds no telemetry itself; every decoded
/// reading is forwarded to the store.
pub struct StreamConnector {
    store: Arc<TelemetryStore>,
    client: reqwest::Client,
    policy: RetryPolicy,
    handle: Option<JoinHandle<()>>,
}

impl StreamConnector {
    pub fn new(store: Arc<TelemetryStore>, client: reqwest::Client) -> Self {
        Self {
            store,
            client,
            policy: RetryPolicy::default(),
            handle: None,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Opens the subscription unless one is already live.
    pub fn open(&mut self, url: &str) {
        if self.handle.is_some() {
            return;
        }

        info!("Connecting to stream: {}", url);
        self.store.set_status(ConnectionStatus::Connecting);

        let client = self.client.clone();
        let store = self.store.clone();
        let policy = self.policy.clone();
        let url = url.to_string();
        self.handle = Some(tokio::spawn(async move {
            run_stream(client, url, store, policy).await;
        }));
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Tears the subscription down. No further readings reach the store
    /// through this connector once it returns.
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            info!("Closing stream connection");
            handle.abort();
            self.store.set_status(ConnectionStatus::Disconnected);
        }
    }
}

impl Drop for StreamConnector {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_stream(
    client: reqwest::Client,
    url: String,
    store: Arc<TelemetryStore>,
    policy: RetryPolicy,
) {
    let mut attempts: u32 = 0;
    let mut backoff = policy.initial_backoff;

    loop {
        match open_stream(&client, &url).await {
            Ok(response) => {
                info!("Stream connected");
                store.set_status(ConnectionStatus::Connected);
                attempts = 0;
                backoff = policy.initial_backoff;

                if let Err(e) = consume(response, &store).await {
                    warn!("Stream interrupted: {}", e);
                }
            }
            Err(e) => {
                warn!("Stream connection failed: {}", e);
            }
        }

        store.set_status(ConnectionStatus::Reconnecting);
        STREAM_RECONNECTS_TOTAL.inc();

        attempts += 1;
        if let Some(max) = policy.max_attempts {
            if attempts >= max {
                error!("Giving up on stream after {} attempts", attempts);
                store.set_status(ConnectionStatus::Disconnected);
                return;
            }
        }

        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(policy.max_backoff);
    }
}

async fn open_stream(client: &reqwest::Client, url: &str) -> Result<reqwest::Response> {
    let response = client
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .send()
        .await?
        .error_for_status()?;
    Ok(response)
}

/// Decodes and forwards readings until the transport gives out.
///
/// A malformed payload is logged and dropped; it never stops the stream and
/// never alters status or history.
async fn consume(response: reqwest::Response, store: &TelemetryStore) -> Result<()> {
    let mut decoder = SseDecoder::new();
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(Error::Http)?;
        for payload in decoder.push(&chunk) {
            STREAM_MESSAGES_TOTAL.inc();
            match serde_json::from_str::<RawReading>(&payload) {
                Ok(raw) => {
                    let reading = raw.normalize();
                    LAST_RSSI_DBM.set(reading.rssi_dbm as f64);
                    store.set_latest_data(reading);
                }
                Err(e) => {
                    STREAM_INVALID_TOTAL.inc();
                    warn!("Dropping malformed stream message: {}", e);
                }
            }
        }
    }

    Err(Error::StreamClosed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MonitorState;
    use axum::extract::State;
    use axum::response::sse::{Event, Sse};
    use axum::routing::get;
    use axum::Router;
    use futures_util::stream::{self, Stream};
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::watch;

    type EventStream = std::pin::Pin<Box<dyn Stream<Item = std::result::Result<Event, Infallible>> + Send>>;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
            max_attempts: None,
        }
    }

    async fn spawn_server(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/stream", addr)
    }

    async fn wait_for(
        rx: &mut watch::Receiver<MonitorState>,
        predicate: impl Fn(&MonitorState) -> bool,
    ) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if predicate(&rx.borrow()) {
                    return;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("store never reached the expected state");
    }

    fn reading_event(rssi_dbm: i32) -> std::result::Result<Event, Infallible> {
        Ok(Event::default().data(format!(
            r#"{{"rssi_dbm":{},"signal_quality":"Good","water_level_cm":15.0,"timestamp":"2025-06-01T12:00:00Z"}}"#,
            rssi_dbm
        )))
    }

    #[tokio::test]
    async fn test_readings_delivered_and_status_connected() {
        let app = Router::new().route(
            "/stream",
            get(|| async {
                let events: EventStream = Box::pin(
                    stream::iter(vec![reading_event(-75)]).chain(stream::pending()),
                );
                Sse::new(events)
            }),
        );
        let url = spawn_server(app).await;

        let store = Arc::new(TelemetryStore::new());
        let mut rx = store.subscribe();
        let mut connector =
            StreamConnector::new(store.clone(), reqwest::Client::new()).with_policy(fast_policy());
        connector.open(&url);

        wait_for(&mut rx, |s| {
            s.status == ConnectionStatus::Connected
                && s.latest.as_ref().is_some_and(|r| r.rssi_dbm == -75)
        })
        .await;

        let state = store.snapshot();
        assert_eq!(state.history.len(), 1);
        connector.close();
    }

    #[tokio::test]
    async fn test_malformed_message_dropped_and_stream_continues() {
        let app = Router::new().route(
            "/stream",
            get(|| async {
                let events: EventStream = Box::pin(
                    stream::iter(vec![
                        Ok(Event::default().data("not json")),
                        reading_event(-82),
                    ])
                    .chain(stream::pending()),
                );
                Sse::new(events)
            }),
        );
        let url = spawn_server(app).await;

        let store = Arc::new(TelemetryStore::new());
        let mut rx = store.subscribe();
        let mut connector =
            StreamConnector::new(store.clone(), reqwest::Client::new()).with_policy(fast_policy());
        connector.open(&url);

        wait_for(&mut rx, |s| {
            s.latest.as_ref().is_some_and(|r| r.rssi_dbm == -82)
        })
        .await;

        // The malformed payload left no trace in history
        let state = store.snapshot();
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.status, ConnectionStatus::Connected);
        connector.close();
    }

    #[tokio::test]
    async fn test_reconnects_after_transport_error() {
        // First connection serves one reading then ends; the connector must
        // go reconnecting and pick up readings from the second connection.
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/stream",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    let n = hits.fetch_add(1, Ordering::SeqCst);
                    let events: EventStream = if n == 0 {
                        Box::pin(stream::iter(vec![reading_event(-75)]))
                    } else {
                        Box::pin(
                            stream::iter(vec![reading_event(-60)]).chain(stream::pending()),
                        )
                    };
                    Sse::new(events)
                }),
            )
            .with_state(hits.clone());
        let url = spawn_server(app).await;

        let store = Arc::new(TelemetryStore::new());
        let mut rx = store.subscribe();
        let mut connector =
            StreamConnector::new(store.clone(), reqwest::Client::new()).with_policy(fast_policy());
        connector.open(&url);

        wait_for(&mut rx, |s| {
            s.latest.as_ref().is_some_and(|r| r.rssi_dbm == -60)
        })
        .await;

        assert!(hits.load(Ordering::SeqCst) >= 2);
        let state = store.snapshot();
        assert_eq!(state.status, ConnectionStatus::Connected);
        // Both readings survived the reconnect
        assert_eq!(state.history.len(), 2);
        assert_eq!(state.history[0].rssi_dbm, -75);
        connector.close();
    }

    #[tokio::test]
    async fn test_status_reconnecting_while_endpoint_down() {
        let app = Router::new().route(
            "/stream",
            get(|| async { axum::http::StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let url = spawn_server(app).await;

        let store = Arc::new(TelemetryStore::new());
        let mut rx = store.subscribe();
        let mut connector =
            StreamConnector::new(store.clone(), reqwest::Client::new()).with_policy(fast_policy());
        connector.open(&url);

        wait_for(&mut rx, |s| s.status == ConnectionStatus::Reconnecting).await;
        connector.close();
        assert_eq!(store.snapshot().status, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_open_is_idempotent_on_live_handle() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/stream",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    let events: EventStream = Box::pin(stream::pending());
                    Sse::new(events)
                }),
            )
            .with_state(hits.clone());
        let url = spawn_server(app).await;

        let store = Arc::new(TelemetryStore::new());
        let mut rx = store.subscribe();
        let mut connector =
            StreamConnector::new(store.clone(), reqwest::Client::new()).with_policy(fast_policy());

        connector.open(&url);
        connector.open(&url);
        connector.open(&url);

        wait_for(&mut rx, |s| s.status == ConnectionStatus::Connected).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(connector.is_open());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        connector.close();
        assert!(!connector.is_open());
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let store = Arc::new(TelemetryStore::new());
        let mut rx = store.subscribe();
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(10),
            max_attempts: Some(2),
        };
        let mut connector =
            StreamConnector::new(store.clone(), reqwest::Client::new()).with_policy(policy);
        // Nothing listens on this port
        connector.open("http://127.0.0.1:9/stream");

        wait_for(&mut rx, |s| s.status == ConnectionStatus::Disconnected).await;
    }
}
