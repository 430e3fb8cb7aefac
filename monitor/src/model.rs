use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single telemetry sample in canonical shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub rssi_dbm: i32,
    pub signal_quality: String,
    pub water_level_cm: f64,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    /// Elapsed time since the reading was taken. Clamped to zero when the
    /// local clock lags the producer's, so callers never display a negative
    /// or future duration.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.timestamp).max(chrono::Duration::zero())
    }
}

/// Wire-format reading as delivered by the upstream API.
///
/// The same fields arrive under two naming conventions: the live stream uses
/// the canonical snake_case names, the history endpoint uses camelCase names.
/// Both are carried as optional pairs here and collapsed by [`normalize`].
///
/// [`normalize`]: RawReading::normalize
#[derive(Debug, Clone, Deserialize)]
pub struct RawReading {
    pub rssi_dbm: Option<i32>,
    #[serde(rename = "rssiDbm")]
    pub rssi_dbm_rest: Option<i32>,
    pub signal_quality: Option<String>,
    #[serde(rename = "signalStrength")]
    pub signal_strength: Option<String>,
    pub water_level_cm: Option<f64>,
    #[serde(rename = "waterLevelCm")]
    pub water_level_cm_rest: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl RawReading {
    /// Collapses both wire namings into the canonical shape.
    ///
    /// The canonical name wins when a field is present under both names.
    /// Total: a field absent under both names falls back to 0 for numerics,
    /// "" for the quality label and the Unix epoch for the timestamp.
    pub fn normalize(self) -> Reading {
        Reading {
            rssi_dbm: self.rssi_dbm.or(self.rssi_dbm_rest).unwrap_or(0),
            signal_quality: self
                .signal_quality
                .or(self.signal_strength)
                .unwrap_or_default(),
            water_level_cm: self
                .water_level_cm
                .or(self.water_level_cm_rest)
                .unwrap_or(0.0),
            timestamp: self.timestamp.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        }
    }
}

/// Envelope returned by the history REST endpoint, data is newest-first
#[derive(Debug, Deserialize)]
pub struct HistoryEnvelope {
    pub data: Vec<RawReading>,
}

/// Connectivity of the live stream subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_normalize_stream_naming() {
        let raw: RawReading = serde_json::from_str(
            r#"{"rssi_dbm":-75,"signal_quality":"Good","water_level_cm":42.5,"timestamp":"2025-06-01T12:00:00Z"}"#,
        )
        .unwrap();

        let reading = raw.normalize();
        assert_eq!(reading.rssi_dbm, -75);
        assert_eq!(reading.signal_quality, "Good");
        assert_eq!(reading.water_level_cm, 42.5);
    }

    #[test]
    fn test_normalize_rest_naming_matches_stream_naming() {
        let stream: RawReading = serde_json::from_str(
            r#"{"rssi_dbm":-75,"signal_quality":"Good","water_level_cm":42.5,"timestamp":"2025-06-01T12:00:00Z"}"#,
        )
        .unwrap();
        let rest: RawReading = serde_json::from_str(
            r#"{"rssiDbm":-75,"signalStrength":"Good","waterLevelCm":42.5,"timestamp":"2025-06-01T12:00:00Z"}"#,
        )
        .unwrap();

        assert_eq!(stream.normalize(), rest.normalize());
    }

    #[test]
    fn test_normalize_canonical_name_wins() {
        let raw: RawReading = serde_json::from_str(
            r#"{"rssi_dbm":-60,"rssiDbm":-90,"signal_quality":"Excellent","signalStrength":"Poor","timestamp":"2025-06-01T12:00:00Z"}"#,
        )
        .unwrap();

        let reading = raw.normalize();
        assert_eq!(reading.rssi_dbm, -60);
        assert_eq!(reading.signal_quality, "Excellent");
    }

    #[test]
    fn test_normalize_defaults_for_missing_fields() {
        let raw: RawReading = serde_json::from_str("{}").unwrap();

        let reading = raw.normalize();
        assert_eq!(reading.rssi_dbm, 0);
        assert_eq!(reading.signal_quality, "");
        assert_eq!(reading.water_level_cm, 0.0);
        assert_eq!(reading.timestamp, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_unparseable_timestamp_rejected_at_parse_time() {
        let result =
            serde_json::from_str::<RawReading>(r#"{"rssi_dbm":-75,"timestamp":"not-a-date"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_age_clamped_to_zero_for_future_timestamps() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let reading = Reading {
            rssi_dbm: -75,
            signal_quality: "Good".to_string(),
            water_level_cm: 10.0,
            timestamp: now + chrono::Duration::seconds(30),
        };

        assert_eq!(reading.age(now), chrono::Duration::zero());
    }

    #[test]
    fn test_age_for_past_timestamps() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let reading = Reading {
            rssi_dbm: -75,
            signal_quality: "Good".to_string(),
            water_level_cm: 10.0,
            timestamp: now - chrono::Duration::seconds(30),
        };

        assert_eq!(reading.age(now), chrono::Duration::seconds(30));
    }
}
