use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;

/// Telemetry sample in the stream's native snake_case shape
#[derive(Debug, Clone, Serialize)]
pub struct Reading {
    pub rssi_dbm: i32,
    pub signal_quality: String,
    pub water_level_cm: f64,
    pub timestamp: DateTime<Utc>,
}

/// The same sample in the camelCase shape the history endpoint serves
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RssiLog {
    pub rssi_dbm: i32,
    pub signal_strength: String,
    pub water_level_cm: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<&Reading> for RssiLog {
    fn from(reading: &Reading) -> Self {
        Self {
            rssi_dbm: reading.rssi_dbm,
            signal_strength: reading.signal_quality.clone(),
            water_level_cm: reading.water_level_cm,
            timestamp: reading.timestamp,
        }
    }
}

/// History endpoint response wrapper, data is newest-first
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub data: Vec<RssiLog>,
    pub total: usize,
    pub limit: usize,
}

/// Label the signal strength the way the dashboard bins it
pub fn signal_quality(rssi_dbm: i32) -> &'static str {
    if rssi_dbm >= -70 {
        "Excellent"
    } else if rssi_dbm >= -85 {
        "Good"
    } else if rssi_dbm >= -100 {
        "Fair"
    } else if rssi_dbm > -110 {
        "Poor"
    } else {
        "No Signal"
    }
}

pub fn generate_reading(rng: &mut impl Rng) -> Reading {
    let rssi_dbm = if rng.gen_bool(0.05) {
        rng.gen_range(-120..-100) // 5% weak-signal outliers
    } else {
        rng.gen_range(-95..-55) // Normal range
    };

    let water_level_cm = if rng.gen_bool(0.02) {
        rng.gen_range(250.0..400.0) // 2% flood-level spikes
    } else {
        rng.gen_range(5.0..120.0) // Normal range
    };

    Reading {
        rssi_dbm,
        signal_quality: signal_quality(rssi_dbm).to_string(),
        water_level_cm,
        timestamp: Utc::now(),
    }
}
