mod bootstrap;
mod errors;
mod metrics;
mod model;
mod sse;
mod store;
mod stream;

use axum::{routing::get, Router};
use chrono::Utc;
use std::env;
use std::sync::Arc;
use store::TelemetryStore;
use stream::StreamConnector;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let stream_url = env::var("STREAM_URL")
        .unwrap_or_else(|_| "http://localhost:3001/api/rssi/stream".to_string());
    let history_url =
        env::var("HISTORY_URL").unwrap_or_else(|_| "http://localhost:3001/api/rssi".to_string());
    let http_addr = env::var("HTTP_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let history_hours: i64 = env::var("HISTORY_HOURS")
        .unwrap_or_else(|_| "6".to_string())
        .parse()
        .unwrap_or(6);
    let history_limit: usize = env::var("HISTORY_LIMIT")
        .unwrap_or_else(|_| "100".to_string())
        .parse()
        .unwrap_or(100);

    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Starting telemetry monitor");
    info!("Stream endpoint: {}", stream_url);
    info!("History endpoint: {}", history_url);
    info!("HTTP server: {}", http_addr);

    // Initialize metrics
    metrics::init_metrics();

    let store = Arc::new(TelemetryStore::new());
    let client = reqwest::Client::new();

    // Open the live subscription
    let mut connector = StreamConnector::new(store.clone(), client.clone());
    connector.open(&stream_url);

    // Seed the rolling history, fire-and-forget
    let bootstrap_store = store.clone();
    let bootstrap_client = client.clone();
    tokio::spawn(async move {
        bootstrap::run_bootstrap(
            &bootstrap_client,
            &history_url,
            history_hours,
            history_limit,
            &bootstrap_store,
        )
        .await;
    });

    // Headless stand-in for the dashboard view: log status transitions and
    // incoming readings as the store changes
    let mut rx = store.subscribe();
    let display_handle = tokio::spawn(async move {
        let mut last_status = rx.borrow().status;
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            if state.status != last_status {
                info!("Connection status: {}", state.status);
                last_status = state.status;
            }
            if let Some(reading) = &state.latest {
                info!(
                    "rssi={} dBm quality={} water_level={:.1} cm age={}s history={}",
                    reading.rssi_dbm,
                    reading.signal_quality,
                    reading.water_level_cm,
                    reading.age(Utc::now()).num_seconds(),
                    state.history.len()
                );
            }
        }
    });

    // Metrics endpoint
    let app = Router::new().route("/metrics", get(metrics_handler));

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
        _ = display_handle => {
            error!("Display task terminated");
        }
        _ = server_handle => {
            error!("HTTP server terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    connector.close();
    info!("Shutting down");
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}
