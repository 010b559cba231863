//! Read-only REST queries over stored telemetry.
//!
//! Provides:
//! - `GET /api/logs`: paginated log entries, optionally filtered by level
//! - `GET /api/statistics/classifications`: paginated classification rows
//! - `GET /api/statistics/summary`: totals and percentages over a window
//! - `GET /api/statistics/time-series`: classification counts per time bucket
//! - `GET /api/anomalies`: paginated anomaly parameters, optionally by tag
//! - `GET /api/anomalies/recent`, `GET /api/anomalies/unidentified`: newest
//!   parameters of one tag within a window
//! - `GET /api/hdfs/blocks`: per-block activity
//! - `GET /api/hdfs/components`: log line counts per component
//! - `GET /api/hdfs/logs/{block_id}`: log entries mentioning one block
//!
//! Lists are newest first except the time series, which is oldest first.

use crate::AppState;
use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use logpulse_store::{
    classification_time_series, component_activity, hdfs_block_stats, list_anomaly_params,
    list_classifications, list_logs, recent_anomaly_params, summarize_classifications, BlockStats,
    ClassificationSummary, LogFilter, Page, TimeSeriesPoint,
};
use logpulse_types::{AnomalyParamRecord, ClassificationRecord, ClassificationType, LogRecord};
use rusqlite::Connection;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::Arc;

const MAX_LIMIT: i64 = 1000;
const WINDOW_HOURS: RangeInclusive<i64> = 1..=168;
const DEFAULT_WINDOW_HOURS: i64 = 24;

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// Applies `default` and rejects values outside `range` with a 400.
fn bounded(
    name: &str,
    value: Option<i64>,
    default: i64,
    range: RangeInclusive<i64>,
) -> Result<i64, Response> {
    let value = value.unwrap_or(default);
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(error_response(
            StatusCode::BAD_REQUEST,
            format!(
                "{name} must be between {} and {}, got {value}",
                range.start(),
                range.end()
            ),
        ))
    }
}

/// Store timestamp `hours` before now.
fn window_start(hours: i64) -> String {
    (Utc::now() - chrono::Duration::hours(hours)).to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Runs a read on a pooled connection off the async runtime.
async fn with_conn<T, F>(state: &AppState, query: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T, logpulse_store::StoreError> + Send + 'static,
{
    let pool = state.pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(|e| e.to_string())?;
        query(&conn).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| {
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("task join error: {e}"),
        )
    })?
    .map_err(|e| {
        tracing::error!(error = %e, "query failed");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
    })
}

/// Pagination shared by every list endpoint.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub skip: Option<i64>,
    /// Default 100, capped at 1000.
    pub limit: Option<i64>,
}

impl PageQuery {
    fn page(&self) -> Page {
        Page {
            skip: self.skip.unwrap_or(0).max(0),
            limit: self.limit.unwrap_or(100).clamp(1, MAX_LIMIT),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub log_level: Option<String>,
}

/// Handler for `GET /api/logs`.
pub async fn list_logs_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<LogsQuery>,
) -> Result<Json<Vec<LogRecord>>, Response> {
    let filter = LogFilter {
        log_level: params.log_level.filter(|l| !l.is_empty()),
        block_id: None,
        page: PageQuery {
            skip: params.skip,
            limit: params.limit,
        }
        .page(),
    };
    let logs = with_conn(&state, move |conn| list_logs(conn, &filter)).await?;
    Ok(Json(logs))
}

/// Handler for `GET /api/statistics/classifications`.
pub async fn list_classifications_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<PageQuery>,
) -> Result<Json<Vec<ClassificationRecord>>, Response> {
    let page = params.page();
    let rows = with_conn(&state, move |conn| list_classifications(conn, page)).await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    /// Window length in hours, 1 to 168. Default 24.
    pub hours: Option<i64>,
}

/// Handler for `GET /api/statistics/summary`.
pub async fn summary_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<SummaryQuery>,
) -> Result<Json<ClassificationSummary>, Response> {
    let hours = bounded("hours", params.hours, DEFAULT_WINDOW_HOURS, WINDOW_HOURS)?;
    let since = window_start(hours);
    let summary = with_conn(&state, move |conn| summarize_classifications(conn, &since)).await?;
    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
pub struct AnomaliesQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub classification_type: Option<String>,
}

/// Handler for `GET /api/anomalies`.
pub async fn list_anomalies_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<AnomaliesQuery>,
) -> Result<Json<Vec<AnomalyParamRecord>>, Response> {
    let tag = match params.classification_type.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(raw.parse::<ClassificationType>().map_err(|e| {
            error_response(
                StatusCode::BAD_REQUEST,
                format!("{e}. Expected one of: anomaly, unidentified"),
            )
        })?),
    };
    let page = PageQuery {
        skip: params.skip,
        limit: params.limit,
    }
    .page();

    let rows = with_conn(&state, move |conn| list_anomaly_params(conn, tag, page)).await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct TimeSeriesQuery {
    /// Bucket width in minutes, 1 to 60. Default 5.
    pub interval_minutes: Option<i64>,
    pub hours: Option<i64>,
}

/// Handler for `GET /api/statistics/time-series`.
pub async fn time_series_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<TimeSeriesQuery>,
) -> Result<Json<Vec<TimeSeriesPoint>>, Response> {
    let interval = bounded("interval_minutes", params.interval_minutes, 5, 1..=60)?;
    let hours = bounded("hours", params.hours, DEFAULT_WINDOW_HOURS, WINDOW_HOURS)?;
    let since = window_start(hours);
    // Bounded to 1..=60 above.
    let interval = u32::try_from(interval).unwrap_or(5);

    let points =
        with_conn(&state, move |conn| classification_time_series(conn, &since, interval)).await?;
    Ok(Json(points))
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub hours: Option<i64>,
    /// 1 to 100. Default 10.
    pub limit: Option<i64>,
}

async fn recent_by_tag(
    state: &AppState,
    tag: ClassificationType,
    params: RecentQuery,
) -> Result<Json<Vec<AnomalyParamRecord>>, Response> {
    let hours = bounded("hours", params.hours, DEFAULT_WINDOW_HOURS, WINDOW_HOURS)?;
    let limit = bounded("limit", params.limit, 10, 1..=100)?;
    let since = window_start(hours);

    let rows =
        with_conn(state, move |conn| recent_anomaly_params(conn, tag, &since, limit)).await?;
    Ok(Json(rows))
}

/// Handler for `GET /api/anomalies/recent`.
pub async fn recent_anomalies_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<RecentQuery>,
) -> Result<Json<Vec<AnomalyParamRecord>>, Response> {
    recent_by_tag(&state, ClassificationType::Anomaly, params).await
}

/// Handler for `GET /api/anomalies/unidentified`.
pub async fn recent_unidentified_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<RecentQuery>,
) -> Result<Json<Vec<AnomalyParamRecord>>, Response> {
    recent_by_tag(&state, ClassificationType::Unidentified, params).await
}

#[derive(Debug, Deserialize)]
pub struct BlocksQuery {
    pub hours: Option<i64>,
    pub min_logs: Option<i64>,
    pub limit: Option<i64>,
}

/// Handler for `GET /api/hdfs/blocks`.
pub async fn hdfs_blocks_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<BlocksQuery>,
) -> Result<Json<Vec<BlockStats>>, Response> {
    let hours = bounded("hours", params.hours, DEFAULT_WINDOW_HOURS, WINDOW_HOURS)?;
    let min_logs = bounded("min_logs", params.min_logs, 1, 1..=i64::MAX)?;
    let limit = params.limit.unwrap_or(100).clamp(1, MAX_LIMIT);
    let since = window_start(hours);

    let blocks =
        with_conn(&state, move |conn| hdfs_block_stats(conn, &since, min_logs, limit)).await?;
    Ok(Json(blocks))
}

#[derive(Debug, Deserialize)]
pub struct ComponentsQuery {
    pub hours: Option<i64>,
    /// Comma-separated component names. Absent means all.
    pub components: Option<String>,
}

/// Handler for `GET /api/hdfs/components`.
pub async fn hdfs_components_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<ComponentsQuery>,
) -> Result<Json<BTreeMap<String, u64>>, Response> {
    let hours = bounded("hours", params.hours, DEFAULT_WINDOW_HOURS, WINDOW_HOURS)?;
    let since = window_start(hours);
    let components: Vec<String> = params
        .components
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();

    let activity =
        with_conn(&state, move |conn| component_activity(conn, &since, &components)).await?;
    Ok(Json(
        activity
            .into_iter()
            .map(|a| (a.component, a.log_count))
            .collect(),
    ))
}

/// Handler for `GET /api/hdfs/logs/{block_id}`.
pub async fn hdfs_block_logs_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(block_id): Path<String>,
    Query(params): Query<PageQuery>,
) -> Result<Json<Vec<LogRecord>>, Response> {
    if !block_id.starts_with("blk_") {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("invalid block id: {block_id}"),
        ));
    }

    let filter = LogFilter {
        log_level: None,
        block_id: Some(block_id.clone()),
        page: params.page(),
    };
    let logs = with_conn(&state, move |conn| list_logs(conn, &filter)).await?;
    if logs.is_empty() {
        return Err(error_response(
            StatusCode::NOT_FOUND,
            format!("no logs found for block {block_id}"),
        ));
    }
    Ok(Json(logs))
}
