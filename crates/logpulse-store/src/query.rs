//! Read path: paginated listings and summaries for the dashboard.
//!
//! All listings return newest records first.

use chrono::{DateTime, SecondsFormat};
use logpulse_types::{AnomalyParamRecord, ClassificationRecord, ClassificationType, LogRecord};
use rusqlite::{params, Connection, Row, Statement};
use serde::Serialize;

use crate::error::StoreError;

/// Offset pagination shared by every listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Number of newest records to skip.
    pub skip: i64,
    /// Maximum number of records to return.
    pub limit: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: 100,
        }
    }
}

/// Filter criteria for [`list_logs`].
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    /// Only return entries with this level (exact match, e.g. `ERROR`).
    pub log_level: Option<String>,
    /// Only return entries mentioning this HDFS block.
    pub block_id: Option<String>,
    pub page: Page,
}

/// Lists stored log entries.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure.
pub fn list_logs(conn: &Connection, filter: &LogFilter) -> Result<Vec<LogRecord>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, timestamp, message, log_level, hdfs_date, hdfs_time, thread_id, hdfs_component, block_id
         FROM log_entries
         WHERE (?1 IS NULL OR log_level = ?1)
           AND (?4 IS NULL OR block_id = ?4)
         ORDER BY id DESC
         LIMIT ?2 OFFSET ?3",
    )?;
    let rows = stmt.query_map(
        params![
            filter.log_level,
            filter.page.limit,
            filter.page.skip,
            filter.block_id
        ],
        map_log_row,
    )?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

/// Lists stored classification intervals.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure.
pub fn list_classifications(
    conn: &Connection,
    page: Page,
) -> Result<Vec<ClassificationRecord>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, timestamp, normal_count, anomaly_count, unidentified_count
         FROM classifications
         ORDER BY id DESC
         LIMIT ?1 OFFSET ?2",
    )?;
    let rows = stmt.query_map(params![page.limit, page.skip], |row| {
        Ok(ClassificationRecord {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            normal_count: row.get(2)?,
            anomaly_count: row.get(3)?,
            unidentified_count: row.get(4)?,
        })
    })?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

/// Lists stored anomaly parameters, optionally restricted to one tag.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure and
/// `StoreError::InvalidRecord` if a row carries an unknown tag.
pub fn list_anomaly_params(
    conn: &Connection,
    classification_type: Option<ClassificationType>,
    page: Page,
) -> Result<Vec<AnomalyParamRecord>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, timestamp, param_value, classification_type
         FROM anomaly_params
         WHERE (?1 IS NULL OR classification_type = ?1)
         ORDER BY id DESC
         LIMIT ?2 OFFSET ?3",
    )?;
    collect_anomaly_params(
        &mut stmt,
        params![
            classification_type.map(ClassificationType::as_str),
            page.limit,
            page.skip
        ],
    )
}

/// Lists the newest `limit` parameters tagged `classification_type` that
/// were stored at or after `since`.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure.
pub fn recent_anomaly_params(
    conn: &Connection,
    classification_type: ClassificationType,
    since: &str,
    limit: i64,
) -> Result<Vec<AnomalyParamRecord>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, timestamp, param_value, classification_type
         FROM anomaly_params
         WHERE classification_type = ?1 AND timestamp >= ?2
         ORDER BY id DESC
         LIMIT ?3",
    )?;
    collect_anomaly_params(
        &mut stmt,
        params![classification_type.as_str(), since, limit],
    )
}

fn collect_anomaly_params(
    stmt: &mut Statement<'_>,
    args: impl rusqlite::Params,
) -> Result<Vec<AnomalyParamRecord>, StoreError> {
    let rows = stmt.query_map(args, |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (id, timestamp, param_value, tag) = row?;
        let classification_type = tag
            .parse()
            .map_err(|e: logpulse_types::ParseClassificationTypeError| {
                StoreError::InvalidRecord(format!("anomaly_params row {id}: {e}"))
            })?;
        records.push(AnomalyParamRecord {
            id,
            timestamp,
            param_value,
            classification_type,
        });
    }
    Ok(records)
}

/// Aggregate classification counts over a time window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationSummary {
    pub total_events: u64,
    pub normal_count: u64,
    pub anomaly_count: u64,
    pub unidentified_count: u64,
    pub normal_percent: f64,
    pub anomaly_percent: f64,
    pub unidentified_percent: f64,
}

/// Sums every classification interval stored at or after `since`.
///
/// `since` must use the store's timestamp format (see
/// [`now_timestamp`](crate::now_timestamp)). Percentages are rounded to two
/// decimals and are all zero when nothing was classified.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure.
pub fn summarize_classifications(
    conn: &Connection,
    since: &str,
) -> Result<ClassificationSummary, StoreError> {
    let (normal, anomaly, unidentified): (i64, i64, i64) = conn.query_row(
        "SELECT COALESCE(SUM(normal_count), 0),
                COALESCE(SUM(anomaly_count), 0),
                COALESCE(SUM(unidentified_count), 0)
         FROM classifications
         WHERE timestamp >= ?1",
        [since],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    let normal_count = non_negative(normal);
    let anomaly_count = non_negative(anomaly);
    let unidentified_count = non_negative(unidentified);
    let total_events = normal_count + anomaly_count + unidentified_count;

    Ok(ClassificationSummary {
        total_events,
        normal_count,
        anomaly_count,
        unidentified_count,
        normal_percent: percent(normal_count, total_events),
        anomaly_percent: percent(anomaly_count, total_events),
        unidentified_percent: percent(unidentified_count, total_events),
    })
}

/// Classification counts summed over one time bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeSeriesPoint {
    /// Start of the bucket.
    pub timestamp: String,
    pub normal_count: u64,
    pub anomaly_count: u64,
    pub unidentified_count: u64,
}

/// Sums classification intervals stored at or after `since` into buckets of
/// `interval_minutes`, aligned to the Unix epoch, oldest bucket first.
/// Buckets with no stored interval are omitted.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure and
/// `StoreError::InvalidRecord` if a stored timestamp cannot be bucketed.
pub fn classification_time_series(
    conn: &Connection,
    since: &str,
    interval_minutes: u32,
) -> Result<Vec<TimeSeriesPoint>, StoreError> {
    let width = i64::from(interval_minutes.max(1)) * 60;
    let mut stmt = conn.prepare(
        "SELECT (CAST(strftime('%s', timestamp) AS INTEGER) / ?2) * ?2 AS bucket,
                SUM(normal_count),
                SUM(anomaly_count),
                SUM(unidentified_count)
         FROM classifications
         WHERE timestamp >= ?1
         GROUP BY bucket
         ORDER BY bucket ASC",
    )?;
    let rows = stmt.query_map(params![since, width], |row| {
        Ok((
            row.get::<_, Option<i64>>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, i64>(3)?,
        ))
    })?;

    let mut points = Vec::new();
    for row in rows {
        let (bucket, normal, anomaly, unidentified) = row?;
        let start = bucket
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| {
                StoreError::InvalidRecord(format!(
                    "classification timestamp cannot be bucketed: {bucket:?}"
                ))
            })?;
        points.push(TimeSeriesPoint {
            timestamp: start.to_rfc3339_opts(SecondsFormat::Millis, true),
            normal_count: non_negative(normal),
            anomaly_count: non_negative(anomaly),
            unidentified_count: non_negative(unidentified),
        });
    }
    Ok(points)
}

pub(crate) fn non_negative(sum: i64) -> u64 {
    u64::try_from(sum).unwrap_or(0)
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = part as f64 / total as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}

fn map_log_row(row: &Row) -> rusqlite::Result<LogRecord> {
    Ok(LogRecord {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        message: row.get(2)?,
        log_level: row.get(3)?,
        hdfs_date: row.get(4)?,
        hdfs_time: row.get(5)?,
        thread_id: row.get(6)?,
        hdfs_component: row.get(7)?,
        block_id: row.get(8)?,
    })
}
