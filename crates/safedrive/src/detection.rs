//! Danger assessment and accident detection.
//!
//! [`assess`] classifies a single reading against the dashboard's danger
//! thresholds. [`AccidentDetector`] watches a stream of readings and raises
//! an [`AccidentEvent`] when the impact sensor crosses the accident
//! threshold, with a cooldown so one crash is not reported many times.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::reading::{AccidentEvent, SensorReading, Severity};

/// Limits a reading is checked against.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    /// Alcohol level above which the driver is impaired.
    pub alcohol_limit: f64,
    /// Obstacle distance (cm) below which the vehicle is too close.
    pub min_distance: f64,
    /// Vibration (g) above which driving is rough.
    pub max_vibration: f64,
    /// Impact (g) above which a reading is dangerous.
    pub max_impact: f64,
    /// Impact (g) at which an accident is recorded.
    pub impact_low: f64,
    /// Impact (g) at which an accident is severe.
    pub impact_high: f64,
    /// Minimum time between two recorded accidents.
    pub accident_cooldown: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            alcohol_limit: 0.05,
            min_distance: 20.0,
            max_vibration: 1.0,
            max_impact: 2.0,
            impact_low: 3.0,
            impact_high: 6.0,
            accident_cooldown: Duration::from_secs(60),
        }
    }
}

/// A single dangerous condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hazard {
    /// Alcohol level above the limit.
    AlcoholAboveLimit,
    /// Obstacle closer than the minimum distance.
    TooClose,
    /// Vibration above the limit.
    HighVibration,
    /// Impact above the limit.
    HighImpact,
    /// Seatbelt not fastened.
    SeatbeltUnfastened,
}

impl std::fmt::Display for Hazard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::AlcoholAboveLimit => "alcohol above limit",
            Self::TooClose => "obstacle too close",
            Self::HighVibration => "high vibration",
            Self::HighImpact => "high impact",
            Self::SeatbeltUnfastened => "seatbelt unfastened",
        };
        f.write_str(label)
    }
}

/// Overall danger level of a reading.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DangerLevel {
    /// Nothing to report.
    #[default]
    Normal,
    /// At least one hazard.
    Warning,
    /// A strong impact, alone or with other hazards.
    Critical,
}

impl std::fmt::Display for DangerLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "NORMAL"),
            Self::Warning => write!(f, "WARNING"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Result of assessing one reading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    /// Every hazard present, in a fixed order.
    pub hazards: Vec<Hazard>,
    /// The overall level.
    pub level: DangerLevel,
}

impl Assessment {
    /// Check whether the reading was free of hazards.
    #[must_use]
    pub fn is_safe(&self) -> bool {
        self.hazards.is_empty()
    }

    /// Check whether a specific hazard is present.
    #[must_use]
    pub fn has(&self, hazard: Hazard) -> bool {
        self.hazards.contains(&hazard)
    }
}

/// Classify a reading against the thresholds.
#[must_use]
pub fn assess(reading: &SensorReading, thresholds: &Thresholds) -> Assessment {
    let mut hazards = Vec::new();
    if reading.alcohol > thresholds.alcohol_limit {
        hazards.push(Hazard::AlcoholAboveLimit);
    }
    if reading.distance < thresholds.min_distance {
        hazards.push(Hazard::TooClose);
    }
    if reading.vibration > thresholds.max_vibration {
        hazards.push(Hazard::HighVibration);
    }
    if reading.impact > thresholds.max_impact {
        hazards.push(Hazard::HighImpact);
    }
    if !reading.seatbelt {
        hazards.push(Hazard::SeatbeltUnfastened);
    }

    let high_impact = hazards.contains(&Hazard::HighImpact);
    let level = if reading.impact >= thresholds.impact_high || (high_impact && hazards.len() > 1) {
        DangerLevel::Critical
    } else if hazards.is_empty() {
        DangerLevel::Normal
    } else {
        DangerLevel::Warning
    };

    Assessment { hazards, level }
}

/// Turns a stream of readings into accident events.
#[derive(Debug, Clone)]
pub struct AccidentDetector {
    thresholds: Thresholds,
    last_accident: Option<DateTime<Utc>>,
}

impl AccidentDetector {
    /// Create a detector with the given thresholds.
    #[must_use]
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            last_accident: None,
        }
    }

    /// The thresholds in use.
    #[must_use]
    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Timestamp of the last accident raised.
    #[must_use]
    pub fn last_accident(&self) -> Option<DateTime<Utc>> {
        self.last_accident
    }

    /// Classify the severity of an impact.
    #[must_use]
    pub fn severity(&self, reading: &SensorReading) -> Severity {
        if reading.impact >= self.thresholds.impact_high {
            Severity::High
        } else if reading.distance < self.thresholds.min_distance
            || reading.vibration > self.thresholds.max_vibration
        {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    fn in_cooldown(&self, at: DateTime<Utc>) -> bool {
        let Some(last) = self.last_accident else {
            return false;
        };
        // Out-of-order readings older than the last accident also count.
        match (at - last).to_std() {
            Ok(elapsed) => elapsed < self.thresholds.accident_cooldown,
            Err(_) => true,
        }
    }

    /// Feed a reading; returns an event if it records a new accident.
    pub fn observe(&mut self, reading: &SensorReading) -> Option<AccidentEvent> {
        if reading.impact < self.thresholds.impact_low {
            return None;
        }
        if self.in_cooldown(reading.timestamp) {
            debug!(impact = reading.impact, "Impact within accident cooldown");
            return None;
        }

        let severity = self.severity(reading);
        let hash = reading.content_hash();
        let id = format!("acc-{}", &hash[..16]);

        let hazards = assess(reading, &self.thresholds).hazards;
        let mut summary = format!("{severity} impact of {:.1} g", reading.impact);
        if !hazards.is_empty() {
            let labels: Vec<String> = hazards.iter().map(ToString::to_string).collect();
            summary.push_str(&format!(" ({})", labels.join(", ")));
        }

        let mut event = AccidentEvent::from_reading(id, reading, severity);
        event.summary = Some(summary);

        self.last_accident = Some(reading.timestamp);
        info!(
            id = %event.id,
            impact = reading.impact,
            severity = %severity,
            "Accident detected"
        );
        Some(event)
    }
}

impl Default for AccidentDetector {
    fn default() -> Self {
        Self::new(Thresholds::default())
    }
}
