//! `SQLite` schema definitions for safedrive.
//!
//! Timestamps are stored as RFC 3339 text in UTC with millisecond
//! precision, so lexical order matches chronological order.

/// SQL statement to create the sensor readings table.
pub const CREATE_READINGS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS sensor_readings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    remote_id INTEGER,
    device_id TEXT,
    timestamp TEXT NOT NULL,
    alcohol REAL NOT NULL,
    vibration REAL NOT NULL,
    distance REAL NOT NULL,
    seatbelt INTEGER NOT NULL,
    impact REAL NOT NULL,
    lat REAL,
    lng REAL,
    gps_valid INTEGER,
    lcd_display TEXT,
    heart_rate INTEGER,
    content_hash TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// SQL statement to create an index on reading timestamps.
pub const CREATE_READINGS_TIMESTAMP_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_readings_timestamp ON sensor_readings(timestamp DESC)
";

/// SQL statement to create a unique index on `content_hash` for deduplication.
pub const CREATE_READINGS_HASH_INDEX: &str = r"
CREATE UNIQUE INDEX IF NOT EXISTS idx_readings_hash ON sensor_readings(content_hash)
";

/// SQL statement to create the accident events table.
pub const CREATE_ACCIDENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS accident_events (
    id TEXT PRIMARY KEY,
    device_id TEXT,
    timestamp TEXT NOT NULL,
    alcohol REAL NOT NULL,
    vibration REAL NOT NULL,
    distance REAL NOT NULL,
    seatbelt INTEGER NOT NULL,
    impact REAL NOT NULL,
    lat REAL,
    lng REAL,
    lcd_display TEXT,
    severity TEXT,
    summary TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// SQL statement to create an index on accident timestamps.
pub const CREATE_ACCIDENTS_TIMESTAMP_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_accidents_timestamp ON accident_events(timestamp DESC)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_READINGS_TABLE,
    CREATE_READINGS_TIMESTAMP_INDEX,
    CREATE_READINGS_HASH_INDEX,
    CREATE_ACCIDENTS_TABLE,
    CREATE_ACCIDENTS_TIMESTAMP_INDEX,
    CREATE_METADATA_TABLE,
];
