//! Ingestion payloads and stored records.

use serde::{Deserialize, Serialize};

use crate::{ClassificationType, EventKind};

/// A log line as produced by an ingestion source, before persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLogEntry {
    pub message: String,
    pub log_level: String,
}

/// Classification counts for one interval, before persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewClassification {
    pub normal_count: u32,
    pub anomaly_count: u32,
    pub unidentified_count: u32,
}

impl NewClassification {
    /// Total number of items classified in the interval.
    pub fn total(&self) -> u64 {
        u64::from(self.normal_count)
            + u64::from(self.anomaly_count)
            + u64::from(self.unidentified_count)
    }
}

/// A parameter describing an anomalous or unidentified item, before persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAnomalyParam {
    pub param_value: String,
    pub classification_type: ClassificationType,
}

/// A raw domain event handed from an ingestion source to the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestEvent {
    Log(NewLogEntry),
    Classification(NewClassification),
    AnomalyParam(NewAnomalyParam),
}

impl IngestEvent {
    /// Returns the channel this event belongs to.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Log(_) => EventKind::Log,
            Self::Classification(_) => EventKind::Classification,
            Self::AnomalyParam(_) => EventKind::AnomalyParam,
        }
    }
}

/// A persisted log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Identifier assigned by the store.
    pub id: i64,
    /// Persistence time (RFC 3339, UTC).
    pub timestamp: String,
    pub message: String,
    pub log_level: String,
    /// `YYMMDD` date extracted from an HDFS-formatted line.
    pub hdfs_date: Option<String>,
    /// `HHMMSS` time extracted from an HDFS-formatted line.
    pub hdfs_time: Option<String>,
    pub thread_id: Option<u32>,
    pub hdfs_component: Option<String>,
    pub block_id: Option<String>,
}

/// A persisted classification interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub id: i64,
    pub timestamp: String,
    pub normal_count: u32,
    pub anomaly_count: u32,
    pub unidentified_count: u32,
}

/// A persisted anomaly parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyParamRecord {
    pub id: i64,
    pub timestamp: String,
    pub param_value: String,
    pub classification_type: ClassificationType,
}

/// Any record returned by the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredRecord {
    Log(LogRecord),
    Classification(ClassificationRecord),
    AnomalyParam(AnomalyParamRecord),
}

impl StoredRecord {
    /// Returns the channel this record belongs to.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Log(_) => EventKind::Log,
            Self::Classification(_) => EventKind::Classification,
            Self::AnomalyParam(_) => EventKind::AnomalyParam,
        }
    }

    /// Returns the store-assigned identifier.
    pub fn id(&self) -> i64 {
        match self {
            Self::Log(r) => r.id,
            Self::Classification(r) => r.id,
            Self::AnomalyParam(r) => r.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_total_sums_counts() {
        let c = NewClassification {
            normal_count: 90,
            anomaly_count: 7,
            unidentified_count: 3,
        };
        assert_eq!(c.total(), 100);
    }

    #[test]
    fn ingest_event_kind_matches_variant() {
        let log = IngestEvent::Log(NewLogEntry {
            message: "hello".to_string(),
            log_level: "INFO".to_string(),
        });
        assert_eq!(log.kind(), EventKind::Log);

        let param = IngestEvent::AnomalyParam(NewAnomalyParam {
            param_value: "Corrupted block: blk_123".to_string(),
            classification_type: ClassificationType::Anomaly,
        });
        assert_eq!(param.kind(), EventKind::AnomalyParam);
    }
}
