//! Database layer for logpulse.
//!
//! Provides the SQLite connection pool (via `r2d2`) and the embedded,
//! versioned migrations that create the telemetry tables. Every table the
//! store writes to is created here.
//!
//! The pool runs SQLite in WAL mode so dashboard queries can read while the
//! ingestion pipeline writes.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
