//! Core telemetry types for safedrive.
//!
//! This module defines the sensor readings and accident events served by the
//! telemetry API, plus the lenient decoding rules the wire format needs: the
//! device firmware and the backend disagree on timestamp encodings and on
//! which fields are always present.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Where a set of telemetry data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataSource {
    /// Fetched from the live API.
    #[default]
    #[serde(rename = "api-data")]
    Live,
    /// Built-in demo data used while the API is unreachable.
    #[serde(rename = "demo-data")]
    Demo,
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "Live API"),
            Self::Demo => write!(f, "Demo Data"),
        }
    }
}

/// A GPS position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

/// A single timestamped sensor reading reported by a vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Identifier assigned by the API or the local store.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_id")]
    pub id: Option<i64>,

    /// Reporting device (the firmware sends its MAC address).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    /// When the reading was taken.
    #[serde(default = "Utc::now", deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,

    /// Alcohol sensor level.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub alcohol: f64,

    /// Vibration level in g.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub vibration: f64,

    /// Distance to the nearest obstacle.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub distance: f64,

    /// Whether the seatbelt is fastened.
    #[serde(default, deserialize_with = "lenient_bool")]
    pub seatbelt: bool,

    /// Impact force in g.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub impact: f64,

    /// Latitude, when the device has a position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,

    /// Longitude, when the device has a position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,

    /// Whether the GPS module reported a valid fix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_valid: Option<bool>,

    /// Text currently shown on the in-vehicle display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lcd_display: Option<String>,

    /// Heart rate in beats per minute.
    #[serde(default, alias = "pulse", skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<i64>,
}

impl Default for SensorReading {
    fn default() -> Self {
        Self {
            id: None,
            device_id: None,
            timestamp: Utc::now(),
            alcohol: 0.0,
            vibration: 0.0,
            distance: 0.0,
            seatbelt: false,
            impact: 0.0,
            lat: None,
            lng: None,
            gps_valid: None,
            lcd_display: None,
            heart_rate: None,
        }
    }
}

impl SensorReading {
    /// The GPS position of this reading, if it has a usable one.
    ///
    /// Both coordinates must be present and the device must not have flagged
    /// the fix as invalid.
    #[must_use]
    pub fn gps_fix(&self) -> Option<GpsFix> {
        if self.gps_valid == Some(false) {
            return None;
        }
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(GpsFix { lat, lng }),
            _ => None,
        }
    }

    /// Compute the BLAKE3 hash of the reading's measured values.
    ///
    /// The id is excluded so that a reading fetched twice hashes the same
    /// whether or not the API assigned it an id.
    #[must_use]
    pub fn content_hash(&self) -> String {
        let canonical = format!(
            "{}|{}|{}|{}|{}|{}|{}|{:?}|{:?}|{}",
            self.device_id.as_deref().unwrap_or(""),
            self.timestamp.timestamp_millis(),
            self.alcohol,
            self.vibration,
            self.distance,
            self.seatbelt,
            self.impact,
            self.lat,
            self.lng,
            self.lcd_display.as_deref().unwrap_or(""),
        );
        blake3::hash(canonical.as_bytes()).to_hex().to_string()
    }
}

/// How severe an accident was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Light impact.
    #[serde(alias = "Low", alias = "minor")]
    Low,
    /// Impact accompanied by other hazards.
    #[serde(alias = "Medium", alias = "moderate")]
    Medium,
    /// Severe impact.
    #[serde(alias = "High", alias = "severe")]
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" | "minor" => Ok(Self::Low),
            "medium" | "moderate" => Ok(Self::Medium),
            "high" | "severe" => Ok(Self::High),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// A persisted record of an accident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccidentEvent {
    /// Unique identifier of the event.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,

    /// Reporting device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    /// When the accident happened.
    #[serde(default = "Utc::now", alias = "time", deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,

    /// Alcohol level at the time of the accident.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub alcohol: f64,

    /// Vibration level at the time of the accident.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub vibration: f64,

    /// Obstacle distance at the time of the accident.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub distance: f64,

    /// Seatbelt state at the time of the accident.
    #[serde(default, deserialize_with = "lenient_bool")]
    pub seatbelt: bool,

    /// Impact force in g.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub impact: f64,

    /// Latitude of the accident.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,

    /// Longitude of the accident.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,

    /// Display text at the time of the accident.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lcd_display: Option<String>,

    /// Classified severity.
    #[serde(default, alias = "impactLevel", skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,

    /// Short human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl AccidentEvent {
    /// Build an accident event from the reading that triggered it.
    #[must_use]
    pub fn from_reading(id: String, reading: &SensorReading, severity: Severity) -> Self {
        Self {
            id,
            device_id: reading.device_id.clone(),
            timestamp: reading.timestamp,
            alcohol: reading.alcohol,
            vibration: reading.vibration,
            distance: reading.distance,
            seatbelt: reading.seatbelt,
            impact: reading.impact,
            lat: reading.lat,
            lng: reading.lng,
            lcd_display: reading.lcd_display.clone(),
            severity: Some(severity),
            summary: None,
        }
    }

    /// The accident location, if known.
    #[must_use]
    pub fn location(&self) -> Option<GpsFix> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(GpsFix { lat, lng }),
            _ => None,
        }
    }
}

/// Aggregate statistics served by the API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiStats {
    /// Number of readings the backend holds.
    #[serde(default, alias = "totalReadings", skip_serializing_if = "Option::is_none")]
    pub total_readings: Option<i64>,

    /// Number of accidents the backend holds.
    #[serde(default, alias = "totalAccidents", skip_serializing_if = "Option::is_none")]
    pub total_accidents: Option<i64>,

    /// When the statistics were last refreshed.
    #[serde(default, alias = "lastUpdated", skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,

    /// Any other fields the backend reports.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Accept an integer, a numeric string or null as an optional id.
fn lenient_id<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Accept a string or a number as an id string.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// Accept a number, a numeric string or null; null and garbage become 0.
fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

/// Accept a boolean, 0/1 or "true"/"false".
fn lenient_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Bool(b)) => b,
        Some(serde_json::Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        Some(serde_json::Value::String(s)) => matches!(s.trim(), "true" | "1"),
        _ => false,
    })
}

/// Accept RFC 3339 strings, epoch milliseconds (as a number or a string),
/// or null, which falls back to the current time.
fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => parse_timestamp(&s).unwrap_or_else(Utc::now),
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now),
        _ => Utc::now(),
    })
}

/// Parse a timestamp in any of the encodings the API produces.
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    s.parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_source_serialization() {
        assert_eq!(
            serde_json::to_string(&DataSource::Live).unwrap(),
            "\"api-data\""
        );
        assert_eq!(
            serde_json::to_string(&DataSource::Demo).unwrap(),
            "\"demo-data\""
        );
        assert_eq!(DataSource::Demo.to_string(), "Demo Data");
    }

    #[test]
    fn test_reading_from_backend_json() {
        let json = r#"{
            "id": 17,
            "device_id": "AA:BB:CC:DD:EE:FF",
            "timestamp": "2025-04-23T20:11:00Z",
            "alcohol": 0.02,
            "vibration": 0.4,
            "distance": 120,
            "seatbelt": true,
            "impact": 1.1,
            "lat": 5.6037,
            "lng": -0.187,
            "lcd_display": "D120 A0 | HR:72",
            "heart_rate": 72
        }"#;
        let reading: SensorReading = serde_json::from_str(json).unwrap();

        assert_eq!(reading.id, Some(17));
        assert_eq!(reading.device_id.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert!((reading.distance - 120.0).abs() < f64::EPSILON);
        assert!(reading.seatbelt);
        assert_eq!(reading.heart_rate, Some(72));
        assert_eq!(reading.timestamp.to_rfc3339(), "2025-04-23T20:11:00+00:00");
    }

    #[test]
    fn test_reading_from_firmware_json() {
        // The firmware sends integer levels, `pulse`, and uptime-based timestamps.
        let json = r#"{
            "device_id": "AA:BB",
            "timestamp": "1700000000000",
            "alcohol": 512,
            "vibration": 3,
            "distance": 48,
            "seatbelt": false,
            "impact": 9.8,
            "pulse": 80,
            "gps_valid": false
        }"#;
        let reading: SensorReading = serde_json::from_str(json).unwrap();

        assert!(reading.id.is_none());
        assert_eq!(reading.heart_rate, Some(80));
        assert_eq!(reading.timestamp.timestamp_millis(), 1_700_000_000_000);
        assert!(reading.gps_fix().is_none());
    }

    #[test]
    fn test_reading_missing_fields_default() {
        let before = Utc::now();
        let reading: SensorReading = serde_json::from_str("{}").unwrap();

        assert!(reading.timestamp >= before);
        assert!(reading.alcohol.abs() < f64::EPSILON);
        assert!(!reading.seatbelt);
        assert!(reading.lcd_display.is_none());
    }

    #[test]
    fn test_reading_null_numbers_default_to_zero() {
        let json = r#"{"alcohol": null, "impact": "2.5", "seatbelt": 1}"#;
        let reading: SensorReading = serde_json::from_str(json).unwrap();

        assert!(reading.alcohol.abs() < f64::EPSILON);
        assert!((reading.impact - 2.5).abs() < f64::EPSILON);
        assert!(reading.seatbelt);
    }

    #[test]
    fn test_gps_fix() {
        let mut reading = SensorReading {
            lat: Some(5.6),
            lng: Some(-0.18),
            ..Default::default()
        };
        assert_eq!(reading.gps_fix(), Some(GpsFix { lat: 5.6, lng: -0.18 }));

        reading.gps_valid = Some(true);
        assert!(reading.gps_fix().is_some());

        reading.gps_valid = Some(false);
        assert!(reading.gps_fix().is_none());

        reading.gps_valid = None;
        reading.lng = None;
        assert!(reading.gps_fix().is_none());
    }

    #[test]
    fn test_content_hash_ignores_id() {
        let reading = SensorReading {
            alcohol: 0.3,
            ..Default::default()
        };
        let mut with_id = reading.clone();
        with_id.id = Some(99);

        assert_eq!(reading.content_hash(), with_id.content_hash());
    }

    #[test]
    fn test_content_hash_changes_with_values() {
        let reading = SensorReading::default();
        let mut other = reading.clone();
        other.impact = 4.0;

        assert_ne!(reading.content_hash(), other.content_hash());
    }

    #[test]
    fn test_accident_event_numeric_id_and_aliases() {
        let json = r#"{
            "id": 1,
            "time": "2025-04-23T20:05:00Z",
            "impactLevel": "High",
            "impact": 7.2
        }"#;
        let event: AccidentEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.id, "1");
        assert_eq!(event.severity, Some(Severity::High));
        assert_eq!(event.timestamp.to_rfc3339(), "2025-04-23T20:05:00+00:00");
    }

    #[test]
    fn test_accident_event_moderate_severity() {
        let json = r#"{"id": "a1", "severity": "moderate"}"#;
        let event: AccidentEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.severity, Some(Severity::Medium));
    }

    #[test]
    fn test_accident_from_reading() {
        let reading = SensorReading {
            impact: 6.5,
            lat: Some(1.0),
            lng: Some(2.0),
            ..Default::default()
        };
        let event = AccidentEvent::from_reading("evt".to_string(), &reading, Severity::High);

        assert_eq!(event.id, "evt");
        assert_eq!(event.timestamp, reading.timestamp);
        assert_eq!(event.location(), Some(GpsFix { lat: 1.0, lng: 2.0 }));
    }

    #[test]
    fn test_severity_from_str() {
        assert_eq!("HIGH".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!("moderate".parse::<Severity>().unwrap(), Severity::Medium);
        assert!("unknown".parse::<Severity>().is_err());
        assert!(Severity::High > Severity::Low);
    }

    #[test]
    fn test_api_stats_keeps_extra_fields() {
        let json = r#"{"totalReadings": 42, "lastUpdated": "now", "avg_alcohol": 0.01}"#;
        let stats: ApiStats = serde_json::from_str(json).unwrap();

        assert_eq!(stats.total_readings, Some(42));
        assert_eq!(stats.last_updated.as_deref(), Some("now"));
        assert!(stats.extra.contains_key("avg_alcohol"));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2025-04-23T20:11:00.123Z").is_some());
        assert!(parse_timestamp("2025-04-23 20:11:00").is_some());
        assert!(parse_timestamp("1700000000000").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
