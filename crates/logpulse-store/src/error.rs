//! Error types for the persistence gateway.

/// Errors that can occur while storing or reading telemetry.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database operation failed.
    #[error("store database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No pooled connection could be obtained.
    #[error("store connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A stored row could not be turned back into a record.
    #[error("invalid stored record: {0}")]
    InvalidRecord(String),
}
