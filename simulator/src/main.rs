mod reading;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use reading::{generate_reading, HistoryResponse, Reading, RssiLog};
use serde::Deserialize;
use std::collections::VecDeque;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{error, info};

#[derive(Clone)]
struct AppState {
    tx: broadcast::Sender<Reading>,
    log: Arc<RwLock<VecDeque<Reading>>>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    #[serde(rename = "startDate")]
    start_date: Option<DateTime<Utc>>,
    limit: Option<usize>,
}

#[tokio::main]
async fn main() {
    let http_addr = env::var("HTTP_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".to_string());
    let interval_ms: u64 = env::var("INTERVAL_MS")
        .unwrap_or_else(|_| "2000".to_string())
        .parse()
        .unwrap_or(2000);
    let log_capacity: usize = env::var("LOG_CAPACITY")
        .unwrap_or_else(|_| "10000".to_string())
        .parse()
        .unwrap_or(10000);

    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Starting telemetry simulator");
    info!(
        "HTTP server: {}, interval: {}ms, log capacity: {}",
        http_addr, interval_ms, log_capacity
    );

    let (tx, _) = broadcast::channel(256);
    let state = AppState {
        tx: tx.clone(),
        log: Arc::new(RwLock::new(VecDeque::with_capacity(log_capacity))),
    };

    // Generator task: one reading per tick, fanned out to stream subscribers
    // and appended to the in-memory history log
    let generator_log = state.log.clone();
    let generator_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
        loop {
            ticker.tick().await;
            let reading = {
                let mut rng = rand::thread_rng();
                generate_reading(&mut rng)
            };

            {
                let mut log = generator_log.write().await;
                log.push_back(reading.clone());
                while log.len() > log_capacity {
                    log.pop_front();
                }
            }

            // Send fails only when no subscriber is connected
            let _ = tx.send(reading);
        }
    });

    let app = Router::new()
        .route("/api/rssi/stream", get(stream_handler))
        .route("/api/rssi", get(history_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .unwrap_or_else(|e| {
            error!("Failed to bind to {}: {}", http_addr, e);
            std::process::exit(1);
        });

    info!("HTTP server listening on {}", http_addr);

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap_or_else(|e| {
            error!("HTTP server error: {}", e);
        });
    });

    tokio::select! {
        _ = generator_handle => {
            error!("Generator task terminated");
        }
        _ = server_handle => {
            error!("HTTP server terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down");
}

/// Live readings as server-sent events, stream-native snake_case payloads
async fn stream_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    info!("Stream subscriber connected");
    let rx = state.tx.subscribe();
    let stream = BroadcastStream::new(rx)
        .filter_map(|item| item.ok())
        .map(|reading| Event::default().json_data(&reading));

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Recent history, newest-first, in the REST camelCase shape
async fn history_handler(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    let limit = params.limit.unwrap_or(100).min(1000);

    let log = state.log.read().await;
    let data: Vec<RssiLog> = log
        .iter()
        .rev()
        .filter(|r| params.start_date.map_or(true, |start| r.timestamp >= start))
        .take(limit)
        .map(RssiLog::from)
        .collect();

    let total = data.len();
    Json(HistoryResponse { data, total, limit })
}
