use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref STREAM_MESSAGES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "monitor_stream_messages_total",
        "Total messages received on the live stream"
    ))
    .unwrap();
    pub static ref STREAM_INVALID_TOTAL: Counter = Counter::with_opts(Opts::new(
        "monitor_stream_invalid_total",
        "Total malformed stream messages dropped"
    ))
    .unwrap();
    pub static ref STREAM_RECONNECTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "monitor_stream_reconnects_total",
        "Total stream reconnection attempts after a transport error"
    ))
    .unwrap();
    pub static ref BOOTSTRAP_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "monitor_bootstrap_failures_total",
        "Total failed bootstrap history fetches"
    ))
    .unwrap();
    pub static ref LAST_RSSI_DBM: Gauge = Gauge::with_opts(Opts::new(
        "monitor_last_rssi_dbm",
        "RSSI of the most recent live reading"
    ))
    .unwrap();
}

pub fn init_metrics() {
    REGISTRY
        .register(Box::new(STREAM_MESSAGES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(STREAM_INVALID_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(STREAM_RECONNECTS_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(BOOTSTRAP_FAILURES_TOTAL.clone()))
        .unwrap();
    REGISTRY.register(Box::new(LAST_RSSI_DBM.clone())).unwrap();
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
