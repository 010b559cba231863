//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Ingestion source selection.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Message broker settings, used in `broker` mode.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Live stream settings.
    #[serde(default)]
    pub stream: StreamConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "logpulse_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Where events come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// Randomized telemetry generated in-process.
    #[default]
    Synthetic,
    /// A message broker, one topic per event kind.
    Broker,
}

impl std::str::FromStr for IngestMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "synthetic" => Ok(Self::Synthetic),
            "broker" | "kafka" => Ok(Self::Broker),
            other => Err(ConfigError::InvalidValue {
                key: "ingest.mode",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub mode: IngestMode,

    /// Seconds between synthetic batches.
    #[serde(default = "default_synthetic_interval_secs")]
    pub synthetic_interval_secs: u64,

    /// Fixed seed for reproducible synthetic data.
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Comma-separated `host:port` list.
    #[serde(default = "default_bootstrap_servers")]
    pub bootstrap_servers: String,

    /// Base consumer group; each topic consumes as `<group>-<kind>`.
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,

    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Delay before reconnecting after a broker failure.
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,

    #[serde(default)]
    pub topics: TopicsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicsConfig {
    #[serde(default = "default_topic_logs")]
    pub logs: String,

    #[serde(default = "default_topic_classifications")]
    pub classifications: String,

    #[serde(default = "default_topic_anomaly_params")]
    pub anomaly_params: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Seconds of queue inactivity before a keepalive frame.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// Undelivered records buffered per subscriber before new ones are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8000
}

fn default_db_path() -> String {
    "logpulse.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_synthetic_interval_secs() -> u64 {
    5
}

fn default_bootstrap_servers() -> String {
    "kafka1:9092,kafka2:9092".to_string()
}

fn default_consumer_group() -> String {
    "dashboard-backend".to_string()
}

fn default_poll_timeout_ms() -> u64 {
    1000
}

fn default_backoff_secs() -> u64 {
    5
}

fn default_topic_logs() -> String {
    "logs".to_string()
}

fn default_topic_classifications() -> String {
    "classifications".to_string()
}

fn default_topic_anomaly_params() -> String {
    "anomaly_params".to_string()
}

fn default_keepalive_secs() -> u64 {
    30
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            mode: IngestMode::default(),
            synthetic_interval_secs: default_synthetic_interval_secs(),
            seed: None,
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: default_bootstrap_servers(),
            consumer_group: default_consumer_group(),
            poll_timeout_ms: default_poll_timeout_ms(),
            backoff_secs: default_backoff_secs(),
            topics: TopicsConfig::default(),
        }
    }
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            logs: default_topic_logs(),
            classifications: default_topic_classifications(),
            anomaly_params: default_topic_anomaly_params(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            keepalive_secs: default_keepalive_secs(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl IngestConfig {
    pub fn synthetic_interval(&self) -> Duration {
        Duration::from_secs(self.synthetic_interval_secs.max(1))
    }
}

impl BrokerConfig {
    pub fn settings(&self) -> logpulse_ingest::BrokerSettings {
        logpulse_ingest::BrokerSettings {
            topics: logpulse_ingest::Topics {
                logs: self.topics.logs.clone(),
                classifications: self.topics.classifications.clone(),
                anomaly_params: self.topics.anomaly_params.clone(),
            },
            consumer_group: self.consumer_group.clone(),
            poll_timeout: Duration::from_millis(self.poll_timeout_ms.max(1)),
            backoff: Duration::from_secs(self.backoff_secs.max(1)),
        }
    }
}

impl StreamConfig {
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs.max(1))
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// An override held a value the option does not accept.
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    /// `ingest.mode = "broker"` in a build without a broker client.
    #[error("broker ingestion requires building with the `kafka` feature")]
    BrokerUnavailable,
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `LOGPULSE_HOST` overrides `server.host`
/// - `LOGPULSE_PORT` overrides `server.port`
/// - `LOGPULSE_DB_PATH` overrides `database.path`
/// - `LOGPULSE_LOG_LEVEL` overrides `logging.level`
/// - `LOGPULSE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `LOGPULSE_INGEST_MODE` overrides `ingest.mode`
/// - `LOGPULSE_SYNTHETIC_INTERVAL_SECS` overrides `ingest.synthetic_interval_secs`
/// - `LOGPULSE_KAFKA_BOOTSTRAP_SERVERS` overrides `broker.bootstrap_servers`
/// - `LOGPULSE_KAFKA_CONSUMER_GROUP` overrides `broker.consumer_group`
/// - `LOGPULSE_KAFKA_TOPIC_LOGS`, `LOGPULSE_KAFKA_TOPIC_CLASSIFICATIONS` and
///   `LOGPULSE_KAFKA_TOPIC_ANOMALY_PARAMS` override `broker.topics.*`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed, or
/// if `LOGPULSE_INGEST_MODE` names an unknown mode.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = read_config_file(path)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Parses `path`, or returns defaults when there is no path or no file.
fn read_config_file(path: Option<&str>) -> Result<Config, ConfigError> {
    let Some(p) = path else {
        return Ok(Config::default());
    };
    match std::fs::read_to_string(p) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = p, "config file not found, using defaults");
            Ok(Config::default())
        }
        Err(e) => Err(ConfigError::FileRead(e)),
    }
}

fn apply_env_overrides(
    config: &mut Config,
    var: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(host) = var("LOGPULSE_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("LOGPULSE_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(db_path) = var("LOGPULSE_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(level) = var("LOGPULSE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("LOGPULSE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(mode) = var("LOGPULSE_INGEST_MODE") {
        config.ingest.mode = mode.parse()?;
    }
    if let Some(interval) = var("LOGPULSE_SYNTHETIC_INTERVAL_SECS") {
        if let Ok(parsed) = interval.parse() {
            config.ingest.synthetic_interval_secs = parsed;
        }
    }
    if let Some(servers) = var("LOGPULSE_KAFKA_BOOTSTRAP_SERVERS") {
        config.broker.bootstrap_servers = servers;
    }
    if let Some(group) = var("LOGPULSE_KAFKA_CONSUMER_GROUP") {
        config.broker.consumer_group = group;
    }
    if let Some(topic) = var("LOGPULSE_KAFKA_TOPIC_LOGS") {
        config.broker.topics.logs = topic;
    }
    if let Some(topic) = var("LOGPULSE_KAFKA_TOPIC_CLASSIFICATIONS") {
        config.broker.topics.classifications = topic;
    }
    if let Some(topic) = var("LOGPULSE_KAFKA_TOPIC_ANOMALY_PARAMS") {
        config.broker.topics.anomaly_params = topic;
    }

    Ok(())
}
