//! Write path: persisting ingested events.
//!
//! Each insert stamps the row with the current UTC time and lets SQLite
//! assign the identifier, returning the complete record in a single
//! `INSERT .. RETURNING` statement. `AUTOINCREMENT` keeps identifiers
//! strictly increasing per table, even across deletions.

use chrono::{SecondsFormat, Utc};
use logpulse_db::DbPool;
use logpulse_types::{
    AnomalyParamRecord, ClassificationRecord, IngestEvent, LogFields, LogRecord, NewAnomalyParam,
    NewClassification, NewLogEntry, StoredRecord,
};
use rusqlite::{params, Connection};

use crate::error::StoreError;

/// The durable store the router writes through.
///
/// `save` is synchronous; async callers run it on the blocking pool.
pub trait EventStore: Send + Sync + 'static {
    /// Persists `event` and returns the stored record with its assigned
    /// identifier and timestamp.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` when the event could not be stored. Nothing is
    /// written in that case.
    fn save(&self, event: &IngestEvent) -> Result<StoredRecord, StoreError>;
}

/// [`EventStore`] backed by the SQLite pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Returns the underlying pool, for read queries.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl EventStore for SqliteStore {
    fn save(&self, event: &IngestEvent) -> Result<StoredRecord, StoreError> {
        let conn = self.pool.get()?;
        let record = match event {
            IngestEvent::Log(entry) => StoredRecord::Log(insert_log(&conn, entry)?),
            IngestEvent::Classification(counts) => {
                StoredRecord::Classification(insert_classification(&conn, counts)?)
            }
            IngestEvent::AnomalyParam(param) => {
                StoredRecord::AnomalyParam(insert_anomaly_param(&conn, param)?)
            }
        };
        tracing::trace!(kind = %record.kind(), id = record.id(), "stored event");
        Ok(record)
    }
}

/// Current UTC time in the format every table stores.
///
/// Millisecond precision with a `Z` suffix keeps lexical and chronological
/// order identical, which the time-range queries rely on.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Inserts a log entry, extracting HDFS fields from its message.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure.
pub fn insert_log(conn: &Connection, entry: &NewLogEntry) -> Result<LogRecord, StoreError> {
    let timestamp = now_timestamp();
    let fields = LogFields::parse(&entry.message);

    let id = conn.query_row(
        "INSERT INTO log_entries
            (timestamp, message, log_level, hdfs_date, hdfs_time, thread_id, hdfs_component, block_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         RETURNING id",
        params![
            timestamp,
            entry.message,
            entry.log_level,
            fields.hdfs_date,
            fields.hdfs_time,
            fields.thread_id,
            fields.hdfs_component,
            fields.block_id,
        ],
        |row| row.get::<_, i64>(0),
    )?;

    Ok(LogRecord {
        id,
        timestamp,
        message: entry.message.clone(),
        log_level: entry.log_level.clone(),
        hdfs_date: fields.hdfs_date,
        hdfs_time: fields.hdfs_time,
        thread_id: fields.thread_id,
        hdfs_component: fields.hdfs_component,
        block_id: fields.block_id,
    })
}

/// Inserts one interval of classification counts.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure.
pub fn insert_classification(
    conn: &Connection,
    counts: &NewClassification,
) -> Result<ClassificationRecord, StoreError> {
    let timestamp = now_timestamp();
    let id = conn.query_row(
        "INSERT INTO classifications (timestamp, normal_count, anomaly_count, unidentified_count)
         VALUES (?1, ?2, ?3, ?4)
         RETURNING id",
        params![
            timestamp,
            counts.normal_count,
            counts.anomaly_count,
            counts.unidentified_count,
        ],
        |row| row.get::<_, i64>(0),
    )?;

    Ok(ClassificationRecord {
        id,
        timestamp,
        normal_count: counts.normal_count,
        anomaly_count: counts.anomaly_count,
        unidentified_count: counts.unidentified_count,
    })
}

/// Inserts an anomaly parameter.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure.
pub fn insert_anomaly_param(
    conn: &Connection,
    param: &NewAnomalyParam,
) -> Result<AnomalyParamRecord, StoreError> {
    let timestamp = now_timestamp();
    let id = conn.query_row(
        "INSERT INTO anomaly_params (timestamp, param_value, classification_type)
         VALUES (?1, ?2, ?3)
         RETURNING id",
        params![
            timestamp,
            param.param_value,
            param.classification_type.as_str(),
        ],
        |row| row.get::<_, i64>(0),
    )?;

    Ok(AnomalyParamRecord {
        id,
        timestamp,
        param_value: param.param_value.clone(),
        classification_type: param.classification_type,
    })
}
