//! Storage layer for safedrive.
//!
//! This module provides `SQLite`-based persistent storage for telemetry:
//! sensor readings (deduplicated by content hash), accident events, and
//! retention pruning.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::reading::{AccidentEvent, GpsFix, SensorReading, Severity};

const READING_COLUMNS: &str = "id, remote_id, device_id, timestamp, alcohol, vibration, \
     distance, seatbelt, impact, lat, lng, gps_valid, lcd_display, heart_rate";

const ACCIDENT_COLUMNS: &str = "id, device_id, timestamp, alcohol, vibration, distance, \
     seatbelt, impact, lat, lng, lcd_display, severity, summary";

/// Format a timestamp the way it is stored.
fn to_db_time(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn from_db_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Local telemetry history.
///
/// Provides persistent storage using `SQLite` with support for:
/// - Reading insertion with deduplication
/// - Accident events keyed by their id
/// - Time-range queries and GPS tracks
/// - Pruning of old entries
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let mut conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&mut conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&mut conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert a sensor reading.
    ///
    /// Returns the local id, or `None` if an identical reading is already
    /// stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_reading(&self, reading: &SensorReading) -> Result<Option<i64>> {
        let hash = reading.content_hash();

        let affected = self.conn.execute(
            r"
            INSERT OR IGNORE INTO sensor_readings (
                remote_id, device_id, timestamp, alcohol, vibration, distance,
                seatbelt, impact, lat, lng, gps_valid, lcd_display, heart_rate, content_hash
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ",
            params![
                reading.id,
                reading.device_id,
                to_db_time(&reading.timestamp),
                reading.alcohol,
                reading.vibration,
                reading.distance,
                reading.seatbelt,
                reading.impact,
                reading.lat,
                reading.lng,
                reading.gps_valid,
                reading.lcd_display,
                reading.heart_rate,
                hash,
            ],
        )?;

        if affected == 0 {
            debug!("Skipping duplicate reading with hash {}", &hash[..16]);
            return Ok(None);
        }

        let id = self.conn.last_insert_rowid();
        debug!("Inserted reading with id {}", id);
        Ok(Some(id))
    }

    /// Insert many readings, returning how many were new.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails.
    pub fn insert_readings<'a>(
        &self,
        readings: impl IntoIterator<Item = &'a SensorReading>,
    ) -> Result<usize> {
        let mut inserted = 0;
        for reading in readings {
            if self.insert_reading(reading)?.is_some() {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Get a reading by its local id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_reading(&self, id: i64) -> Result<Option<SensorReading>> {
        let sql = format!("SELECT {READING_COLUMNS} FROM sensor_readings WHERE id = ?1");
        let reading = self
            .conn
            .query_row(&sql, [id], Self::row_to_reading)
            .optional()?;
        Ok(reading)
    }

    /// Get the most recent readings, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn recent_readings(&self, limit: usize) -> Result<Vec<SensorReading>> {
        let sql = format!(
            "SELECT {READING_COLUMNS} FROM sensor_readings \
             ORDER BY timestamp DESC, id DESC LIMIT ?1"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let readings = stmt
            .query_map([limit_param(limit)], Self::row_to_reading)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(readings)
    }

    /// Get readings within a time range, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn readings_in_range(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<SensorReading>> {
        let sql = format!(
            "SELECT {READING_COLUMNS} FROM sensor_readings \
             WHERE timestamp >= ?1 AND timestamp <= ?2 \
             ORDER BY timestamp DESC, id DESC LIMIT ?3"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let readings = stmt
            .query_map(
                params![to_db_time(&since), to_db_time(&until), limit_param(limit)],
                Self::row_to_reading,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(readings)
    }

    /// The GPS track of the most recent `limit` readings.
    ///
    /// Fixes are in chronological order; readings without a usable fix are
    /// skipped and consecutive identical positions are collapsed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn track(&self, limit: usize) -> Result<Vec<GpsFix>> {
        let mut readings = self.recent_readings(limit)?;
        readings.reverse();

        let mut track: Vec<GpsFix> = readings.iter().filter_map(SensorReading::gps_fix).collect();
        track.dedup();
        Ok(track)
    }

    /// Insert an accident event.
    ///
    /// Returns `false` if an event with the same id is already stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_accident(&self, event: &AccidentEvent) -> Result<bool> {
        let affected = self.conn.execute(
            r"
            INSERT OR IGNORE INTO accident_events (
                id, device_id, timestamp, alcohol, vibration, distance,
                seatbelt, impact, lat, lng, lcd_display, severity, summary
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ",
            params![
                event.id,
                event.device_id,
                to_db_time(&event.timestamp),
                event.alcohol,
                event.vibration,
                event.distance,
                event.seatbelt,
                event.impact,
                event.lat,
                event.lng,
                event.lcd_display,
                event.severity.map(|s| s.to_string()),
                event.summary,
            ],
        )?;

        if affected > 0 {
            debug!(id = %event.id, "Stored accident event");
        }
        Ok(affected > 0)
    }

    /// Get the most recent accident events, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn recent_accidents(&self, limit: usize) -> Result<Vec<AccidentEvent>> {
        let sql = format!(
            "SELECT {ACCIDENT_COLUMNS} FROM accident_events \
             ORDER BY timestamp DESC LIMIT ?1"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let events = stmt
            .query_map([limit_param(limit)], Self::row_to_accident)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// Count stored readings.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_readings(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM sensor_readings", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Count stored accident events.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_accidents(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM accident_events", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Delete readings older than `max_age`.
    ///
    /// Accident events are kept. Returns the number of readings deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn prune_older_than(&self, max_age: std::time::Duration) -> Result<usize> {
        let cutoff = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age));
        let Some(cutoff) = cutoff else {
            debug!(?max_age, "Retention period reaches past the earliest timestamp");
            return Ok(0);
        };

        let affected = self.conn.execute(
            "DELETE FROM sensor_readings WHERE timestamp < ?1",
            [to_db_time(&cutoff)],
        )?;

        if affected > 0 {
            info!("Pruned {} old readings", affected);
        }
        Ok(affected)
    }

    /// Keep only the most recent `keep_count` readings.
    ///
    /// Returns the number of readings deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn prune_keep_recent(&self, keep_count: usize) -> Result<usize> {
        let affected = self.conn.execute(
            r"
            DELETE FROM sensor_readings WHERE id NOT IN (
                SELECT id FROM sensor_readings ORDER BY timestamp DESC, id DESC LIMIT ?1
            )
            ",
            [limit_param(keep_count)],
        )?;

        if affected > 0 {
            info!("Pruned {} readings to keep {} recent", affected, keep_count);
        }
        Ok(affected)
    }

    /// Apply both retention limits, age first.
    ///
    /// `None` disables a limit. Returns the readings deleted by age and by
    /// count.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn apply_retention(
        &self,
        max_age: Option<std::time::Duration>,
        max_readings: Option<usize>,
    ) -> Result<(usize, usize)> {
        let by_age = match max_age {
            Some(age) => self.prune_older_than(age)?,
            None => 0,
        };
        let by_count = match max_readings {
            Some(keep) => self.prune_keep_recent(keep)?,
            None => 0,
        };
        Ok((by_age, by_count))
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let (oldest, newest): (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(timestamp), MAX(timestamp) FROM sensor_readings",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            total_readings: self.count_readings()?,
            total_accidents: self.count_accidents()?,
            oldest_reading: oldest.as_deref().map(from_db_time),
            newest_reading: newest.as_deref().map(from_db_time),
            db_size_bytes,
        })
    }

    fn row_to_reading(row: &rusqlite::Row) -> rusqlite::Result<SensorReading> {
        let timestamp: String = row.get(3)?;
        Ok(SensorReading {
            id: Some(row.get(0)?),
            device_id: row.get(2)?,
            timestamp: from_db_time(&timestamp),
            alcohol: row.get(4)?,
            vibration: row.get(5)?,
            distance: row.get(6)?,
            seatbelt: row.get(7)?,
            impact: row.get(8)?,
            lat: row.get(9)?,
            lng: row.get(10)?,
            gps_valid: row.get(11)?,
            lcd_display: row.get(12)?,
            heart_rate: row.get(13)?,
        })
    }

    fn row_to_accident(row: &rusqlite::Row) -> rusqlite::Result<AccidentEvent> {
        let timestamp: String = row.get(2)?;
        let severity: Option<String> = row.get(11)?;
        let severity = severity.and_then(|s| match s.parse::<Severity>() {
            Ok(severity) => Some(severity),
            Err(e) => {
                warn!("{e}, ignoring");
                None
            }
        });

        Ok(AccidentEvent {
            id: row.get(0)?,
            device_id: row.get(1)?,
            timestamp: from_db_time(&timestamp),
            alcohol: row.get(3)?,
            vibration: row.get(4)?,
            distance: row.get(5)?,
            seatbelt: row.get(6)?,
            impact: row.get(7)?,
            lat: row.get(8)?,
            lng: row.get(9)?,
            lcd_display: row.get(10)?,
            severity,
            summary: row.get(12)?,
        })
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    /// Total number of readings stored.
    pub total_readings: i64,
    /// Total number of accident events stored.
    pub total_accidents: i64,
    /// Timestamp of the oldest reading.
    pub oldest_reading: Option<DateTime<Utc>>,
    /// Timestamp of the newest reading.
    pub newest_reading: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}
