//! Shared types for the logpulse telemetry pipeline.
//!
//! This crate provides the domain vocabulary used across all logpulse
//! crates: the event channels, the payloads produced by ingestion sources,
//! and the records returned by the persistence layer once an event has been
//! stored and stamped with an identifier and timestamp.
//!
//! No crate in the workspace depends on anything *except* `logpulse-types`
//! for cross-cutting type definitions.

use serde::{Deserialize, Serialize};

mod event;
mod hdfs;

pub use event::{
    AnomalyParamRecord, ClassificationRecord, IngestEvent, LogRecord, NewAnomalyParam,
    NewClassification, NewLogEntry, StoredRecord,
};
pub use hdfs::LogFields;

/// The event channels carried by the pipeline.
///
/// Each kind maps to exactly one ingestion topic, one storage table and one
/// live broadcast channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Raw log lines from the monitored process.
    Log,
    /// Per-interval classification counts.
    Classification,
    /// Parameters describing an anomalous or unidentified item.
    AnomalyParam,
}

impl EventKind {
    /// All event kinds, in dispatch order.
    pub const ALL: [EventKind; 3] = [Self::Log, Self::Classification, Self::AnomalyParam];

    /// Returns the channel label used in logs and topic defaults.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Log => "logs",
            Self::Classification => "classifications",
            Self::AnomalyParam => "anomaly_params",
        }
    }

    /// Returns the event name written on the `event:` line of stream frames.
    pub fn event_name(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Classification => "statistics",
            Self::AnomalyParam => "anomaly",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity levels produced by the synthetic generator.
///
/// Broker-fed log entries carry their level as free text, so stored records
/// keep the level as a string; this enum only covers the levels the
/// pipeline itself emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Returns the canonical upper-case label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Classification tag attached to an anomaly parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationType {
    /// The item was classified as an anomaly.
    Anomaly,
    /// The item could not be classified.
    Unidentified,
}

impl ClassificationType {
    /// Returns the lower-case label stored and sent on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anomaly => "anomaly",
            Self::Unidentified => "unidentified",
        }
    }
}

impl std::fmt::Display for ClassificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ClassificationType {
    type Err = ParseClassificationTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anomaly" => Ok(Self::Anomaly),
            "unidentified" => Ok(Self::Unidentified),
            _ => Err(ParseClassificationTypeError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown classification tag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown classification type: {0}")]
pub struct ParseClassificationTypeError(pub String);
