//! Embedded SQL migration runner.
//!
//! Migrations are SQL files embedded at compile time and applied in order on
//! startup. Applied migrations are recorded in `_logpulse_migrations`, so
//! each one runs exactly once per database.

use rusqlite::Connection;
use thiserror::Error;

struct Migration {
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. New migrations are appended here.
const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "000_telemetry",
        sql: include_str!("migrations/000_telemetry.sql"),
    },
    Migration {
        name: "001_anomaly_params",
        sql: include_str!("migrations/001_anomaly_params.sql"),
    },
    Migration {
        name: "002_hdfs_lookups",
        sql: include_str!("migrations/002_hdfs_lookups.sql"),
    },
];

/// Errors that can occur during migration execution.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A SQL statement within a migration failed.
    #[error("migration '{name}' failed: {source}")]
    ExecutionFailed {
        /// The name of the migration that failed.
        name: String,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },

    /// Failed to query migration state.
    #[error("failed to check migration state: {0}")]
    StateQuery(rusqlite::Error),
}

/// Runs all pending migrations and returns how many were applied.
///
/// # Errors
///
/// Returns `MigrationError` if a migration fails or the tracking table
/// cannot be queried. A failed migration is rolled back as a whole.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    apply(conn, MIGRATIONS)
}

fn apply(conn: &Connection, migrations: &[Migration]) -> Result<usize, MigrationError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _logpulse_migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| failed("_logpulse_migrations_bootstrap", e))?;

    let mut applied = 0;

    for migration in migrations {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _logpulse_migrations WHERE name = ?1",
                [migration.name],
                |row| row.get(0),
            )
            .map_err(MigrationError::StateQuery)?;

        if already_applied {
            tracing::debug!(migration = migration.name, "migration already applied");
            continue;
        }

        tracing::info!(migration = migration.name, "applying migration");

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| failed(migration.name, e))?;
        tx.execute_batch(migration.sql)
            .map_err(|e| failed(migration.name, e))?;
        tx.execute(
            "INSERT INTO _logpulse_migrations (name) VALUES (?1)",
            [migration.name],
        )
        .map_err(|e| failed(migration.name, e))?;
        tx.commit().map_err(|e| failed(migration.name, e))?;

        applied += 1;
    }

    Ok(applied)
}

fn failed(name: &str, source: rusqlite::Error) -> MigrationError {
    MigrationError::ExecutionFailed {
        name: name.to_string(),
        source,
    }
}
