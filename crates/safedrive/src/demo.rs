//! Built-in demo dataset.
//!
//! Served in place of live data when the API fails its health check, so the
//! dashboard, reports and exports still have something to show.

use chrono::Utc;

use crate::client::DashboardSnapshot;
use crate::reading::{AccidentEvent, ApiStats, DataSource, SensorReading, Severity};

/// Number of readings the demo statistics claim the backend holds.
pub const DEMO_TOTAL_READINGS: i64 = 42;

/// Demo sensor readings: one calm, one with a light bump.
#[must_use]
pub fn sensor_data() -> Vec<SensorReading> {
    let now = Utc::now();
    vec![
        SensorReading {
            id: Some(1),
            device_id: Some("demo".to_string()),
            timestamp: now,
            alcohol: 0.01,
            vibration: 0.2,
            distance: 150.0,
            seatbelt: true,
            impact: 0.3,
            lat: Some(40.7128),
            lng: Some(-74.0060),
            gps_valid: Some(true),
            lcd_display: Some("Drive safe".to_string()),
            heart_rate: Some(72),
        },
        SensorReading {
            id: Some(2),
            device_id: Some("demo".to_string()),
            timestamp: now,
            alcohol: 0.02,
            vibration: 0.78,
            distance: 35.0,
            seatbelt: true,
            impact: 0.78,
            lat: Some(40.7130),
            lng: Some(-74.0058),
            gps_valid: Some(true),
            lcd_display: None,
            heart_rate: Some(80),
        },
    ]
}

/// Demo accident events.
#[must_use]
pub fn accidents() -> Vec<AccidentEvent> {
    let trigger = SensorReading {
        device_id: Some("demo".to_string()),
        vibration: 1.4,
        distance: 12.0,
        seatbelt: true,
        impact: 4.2,
        lat: Some(40.7128),
        lng: Some(-74.0060),
        gps_valid: Some(true),
        ..SensorReading::default()
    };
    let mut event = AccidentEvent::from_reading("1".to_string(), &trigger, Severity::Medium);
    event.summary = Some("Moderate impact near obstacle".to_string());
    vec![event]
}

/// Demo API statistics.
#[must_use]
pub fn stats() -> ApiStats {
    ApiStats {
        total_readings: Some(DEMO_TOTAL_READINGS),
        total_accidents: Some(1),
        last_updated: Some(Utc::now().to_rfc3339()),
        extra: serde_json::Map::new(),
    }
}

/// The full demo dataset as a dashboard snapshot.
#[must_use]
pub fn snapshot() -> DashboardSnapshot {
    DashboardSnapshot {
        source: DataSource::Demo,
        fetched_at: Utc::now(),
        sensor_data: sensor_data(),
        accidents: accidents(),
        statistics: Some(stats()),
        failures: Vec::new(),
    }
}
