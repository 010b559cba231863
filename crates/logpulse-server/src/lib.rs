//! Logpulse server library logic.
//!
//! Ingested events flow through [`router::EventRouter`] into the store and
//! then out through one [`hub::BroadcastHub`] per channel to every connected
//! [`stream::StreamSession`].

pub mod api_query;
pub mod api_stream;
pub mod config;
pub mod hub;
pub mod router;
pub mod stream;

use axum::{routing::get, Extension, Json, Router};
use config::{Config, ConfigError, IngestMode};
use hub::ChannelHubs;
use logpulse_db::DbPool;
use logpulse_ingest::{IngestionSource, SyntheticSource};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool, used by the query handlers.
    pub pool: DbPool,
    /// One broadcast hub per channel.
    pub hubs: ChannelHubs,
    /// Queue inactivity before a stream sends a keepalive frame.
    pub keepalive: Duration,
    /// Set to `true` to end every open stream session.
    shutdown: Arc<watch::Sender<bool>>,
}

impl AppState {
    pub fn new(pool: DbPool, hubs: ChannelHubs, keepalive: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            pool,
            hubs,
            keepalive,
            shutdown: Arc::new(shutdown),
        }
    }

    /// A receiver that flips to `true` when the server begins shutting down.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Ends every open stream session.
    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

/// Builds the ingestion source selected by `ingest.mode`.
///
/// # Errors
///
/// Returns `ConfigError::BrokerUnavailable` when broker mode is selected in a
/// build without the `kafka` feature.
pub fn ingestion_source(config: &Config) -> Result<IngestionSource, ConfigError> {
    match config.ingest.mode {
        IngestMode::Synthetic => Ok(IngestionSource::Synthetic(SyntheticSource::new(
            config.ingest.synthetic_interval(),
            config.ingest.seed,
        ))),
        IngestMode::Broker => broker_source(config),
    }
}

#[cfg(feature = "kafka")]
fn broker_source(config: &Config) -> Result<IngestionSource, ConfigError> {
    let connector = logpulse_ingest::KafkaConnector::new(config.broker.bootstrap_servers.clone());
    Ok(IngestionSource::Broker(logpulse_ingest::BrokerSource::new(
        Arc::new(connector),
        config.broker.settings(),
    )))
}

#[cfg(not(feature = "kafka"))]
fn broker_source(_config: &Config) -> Result<IngestionSource, ConfigError> {
    Err(ConfigError::BrokerUnavailable)
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/logs", get(api_query::list_logs_handler))
        .route("/api/logs/stream", get(api_stream::logs_stream_handler))
        .route(
            "/api/statistics/classifications",
            get(api_query::list_classifications_handler),
        )
        .route("/api/statistics/summary", get(api_query::summary_handler))
        .route(
            "/api/statistics/time-series",
            get(api_query::time_series_handler),
        )
        .route(
            "/api/statistics/stream",
            get(api_stream::statistics_stream_handler),
        )
        .route("/api/anomalies", get(api_query::list_anomalies_handler))
        .route(
            "/api/anomalies/recent",
            get(api_query::recent_anomalies_handler),
        )
        .route(
            "/api/anomalies/unidentified",
            get(api_query::recent_unidentified_handler),
        )
        .route(
            "/api/anomalies/stream",
            get(api_stream::anomalies_stream_handler),
        )
        .route("/api/streams", get(api_stream::streams_handler))
        .route("/api/hdfs/blocks", get(api_query::hdfs_blocks_handler))
        .route(
            "/api/hdfs/components",
            get(api_query::hdfs_components_handler),
        )
        .route(
            "/api/hdfs/logs/{block_id}",
            get(api_query::hdfs_block_logs_handler),
        )
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
