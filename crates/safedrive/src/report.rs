//! Evidence packages and reading summaries.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::DashboardSnapshot;
use crate::detection::{assess, Thresholds};
use crate::error::{Error, Result};
use crate::reading::{AccidentEvent, ApiStats, DataSource, SensorReading};

/// File name prefix of evidence packages.
const FILE_PREFIX: &str = "safedrive_evidence_";

/// Provenance of an evidence package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceMetadata {
    /// Whether the data is live or demo data.
    pub source: DataSource,
    /// When the package was generated.
    #[serde(rename = "generatedAt")]
    pub generated_at: DateTime<Utc>,
}

/// Everything known at export time, bundled as one JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidencePackage {
    /// Export time.
    pub timestamp: DateTime<Utc>,
    /// Provenance.
    pub metadata: EvidenceMetadata,
    /// Sensor readings.
    pub sensor_data: Vec<SensorReading>,
    /// Accident events.
    pub accident_data: Vec<AccidentEvent>,
    /// API statistics, `null` when unavailable.
    pub statistics: Option<ApiStats>,
}

impl EvidencePackage {
    /// Build a package from a dashboard snapshot, stamped with `now`.
    #[must_use]
    pub fn from_snapshot(snapshot: DashboardSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            timestamp: now,
            metadata: EvidenceMetadata {
                source: snapshot.source,
                generated_at: now,
            },
            sensor_data: snapshot.sensor_data,
            accident_data: snapshot.accidents,
            statistics: snapshot.statistics,
        }
    }

    /// The file name for a package exported at `now`.
    ///
    /// The ISO timestamp has `:` and `.` replaced by `-` so the name is valid
    /// on every filesystem.
    #[must_use]
    pub fn file_name(now: DateTime<Utc>) -> String {
        let stamp = now
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .replace([':', '.'], "-");
        format!("{FILE_PREFIX}{stamp}.json")
    }

    /// Serialize as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the package into `dir`, returning the file's path.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        if !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|source| Error::DirectoryCreate {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let path = dir.join(Self::file_name(self.timestamp));
        std::fs::write(&path, self.to_json()?)?;
        info!(
            path = %path.display(),
            readings = self.sensor_data.len(),
            accidents = self.accident_data.len(),
            "Evidence package written"
        );
        Ok(path)
    }
}

/// Aggregates over a set of readings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Number of readings.
    pub count: usize,
    /// Mean alcohol level.
    pub avg_alcohol: f64,
    /// Highest alcohol level.
    pub max_alcohol: f64,
    /// Mean vibration.
    pub avg_vibration: f64,
    /// Highest vibration.
    pub max_vibration: f64,
    /// Mean impact.
    pub avg_impact: f64,
    /// Highest impact.
    pub max_impact: f64,
    /// Closest obstacle distance.
    pub min_distance: Option<f64>,
    /// Share of readings with the seatbelt fastened, from 0 to 1.
    pub seatbelt_ratio: f64,
    /// Readings with at least one hazard.
    pub hazardous: usize,
}

impl Summary {
    /// Summarize `readings` against `thresholds`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_readings(readings: &[SensorReading], thresholds: &Thresholds) -> Self {
        if readings.is_empty() {
            return Self::default();
        }

        let n = readings.len() as f64;
        let mean = |f: fn(&SensorReading) -> f64| readings.iter().map(f).sum::<f64>() / n;
        let max = |f: fn(&SensorReading) -> f64| readings.iter().map(f).fold(f64::MIN, f64::max);

        let belted = readings.iter().filter(|r| r.seatbelt).count();
        let hazardous = readings
            .iter()
            .filter(|r| !assess(r, thresholds).is_safe())
            .count();

        Self {
            count: readings.len(),
            avg_alcohol: mean(|r| r.alcohol),
            max_alcohol: max(|r| r.alcohol),
            avg_vibration: mean(|r| r.vibration),
            max_vibration: max(|r| r.vibration),
            avg_impact: mean(|r| r.impact),
            max_impact: max(|r| r.impact),
            min_distance: readings.iter().map(|r| r.distance).reduce(f64::min),
            seatbelt_ratio: belted as f64 / n,
            hazardous,
        }
    }
}
