//! Schema versioning for the telemetry database.
//!
//! The version lives in the `metadata` table. Fresh databases get the base
//! schema and are stamped with [`CURRENT_VERSION`]; older ones are stepped
//! forward through [`MIGRATIONS`] inside a single transaction.

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::{Error, Result};

use super::schema::SCHEMA_STATEMENTS;

/// The current schema version.
pub const CURRENT_VERSION: i32 = 1;

/// Key used to store the schema version in the metadata table.
const VERSION_KEY: &str = "schema_version";

/// Upgrade steps: each entry brings a database from `version - 1` to
/// `version`. Version 1 is the base schema itself.
const MIGRATIONS: &[(i32, &[&str])] = &[(1, &[])];

/// Create the schema if needed and bring it up to the current version.
///
/// # Errors
///
/// Returns an error if schema creation or a migration fails, or if the
/// stored version cannot be read.
pub fn initialize_schema(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;
    for statement in SCHEMA_STATEMENTS {
        tx.execute(statement, [])?;
    }

    let version = schema_version(&tx)?;
    if version < CURRENT_VERSION {
        for (target, statements) in MIGRATIONS.iter().filter(|(v, _)| *v > version) {
            for statement in *statements {
                tx.execute(statement, []).map_err(|e| Error::DatabaseMigration {
                    message: format!("migration to v{target} failed: {e}"),
                })?;
            }
        }
        set_schema_version(&tx, CURRENT_VERSION)?;
        info!(from = version, to = CURRENT_VERSION, "Database schema upgraded");
    }

    tx.commit()?;
    Ok(())
}

/// Read the schema version; 0 means a fresh database.
pub fn schema_version(conn: &Connection) -> Result<i32> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            [VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;

    match value {
        None => Ok(0),
        Some(value) => value.trim().parse().map_err(|_| Error::DatabaseMigration {
            message: format!("invalid schema version: {value}"),
        }),
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        (VERSION_KEY, version.to_string()),
    )?;
    Ok(())
}
