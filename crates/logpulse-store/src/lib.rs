//! Persistence gateway for the logpulse pipeline.
//!
//! Every event the pipeline broadcasts is first written here. Writes go
//! through the [`EventStore`] trait so the router can be exercised against
//! any backend; [`SqliteStore`] is the production implementation on top of
//! the `logpulse-db` pool.
//!
//! Reads are plain functions over a [`rusqlite::Connection`] and back the
//! dashboard's REST queries:
//!
//! | Function | Table |
//! |----------|-------|
//! | [`list_logs`] | `log_entries` |
//! | [`list_classifications`] | `classifications` |
//! | [`list_anomaly_params`] | `anomaly_params` |
//! | [`recent_anomaly_params`] | `anomaly_params` |
//! | [`summarize_classifications`] | `classifications` |
//! | [`classification_time_series`] | `classifications` |
//! | [`hdfs_block_stats`] | `log_entries` |
//! | [`component_activity`] | `log_entries` |
//!
//! Once [`EventStore::save`] returns, the record is visible to these reads.

mod error;
mod hdfs;
mod query;
mod store;

pub use error::StoreError;
pub use hdfs::{component_activity, hdfs_block_stats, BlockStats, ComponentActivity};
pub use query::{
    classification_time_series, list_anomaly_params, list_classifications, list_logs,
    recent_anomaly_params, summarize_classifications, ClassificationSummary, LogFilter, Page,
    TimeSeriesPoint,
};
pub use store::{
    insert_anomaly_param, insert_classification, insert_log, now_timestamp, EventStore,
    SqliteStore,
};
