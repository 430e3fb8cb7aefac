use crate::errors::Result;
use crate::metrics::BOOTSTRAP_FAILURES_TOTAL;
use crate::model::{HistoryEnvelope, RawReading};
use crate::store::TelemetryStore;
use chrono::Utc;
use tracing::{error, info};

/// One-shot seed of the store's rolling history from the REST endpoint.
///
/// Fire-and-forget: every failure is logged and counted, never propagated.
/// The store keeps whatever history it already had.
pub async fn run_bootstrap(
    client: &reqwest::Client,
    url: &str,
    hours: i64,
    limit: usize,
    store: &TelemetryStore,
) {
    match fetch_history(client, url, hours, limit).await {
        Ok(mut batch) => {
            info!("Bootstrap loaded {} historical readings", batch.len());
            // The endpoint returns newest-first; the store expects
            // chronological ascending
            batch.reverse();
            store.set_history(batch);
        }
        Err(e) => {
            BOOTSTRAP_FAILURES_TOTAL.inc();
            error!("Bootstrap history fetch failed: {}", e);
        }
    }
}

async fn fetch_history(
    client: &reqwest::Client,
    url: &str,
    hours: i64,
    limit: usize,
) -> Result<Vec<RawReading>> {
    let start = Utc::now() - chrono::Duration::hours(hours);
    let response = client
        .get(url)
        .query(&[
            ("startDate", start.to_rfc3339()),
            ("limit", limit.to_string()),
        ])
        .send()
        .await?
        .error_for_status()?;

    let body = response.bytes().await?;
    let envelope: HistoryEnvelope = serde_json::from_slice(&body)?;
    Ok(envelope.data)
}
