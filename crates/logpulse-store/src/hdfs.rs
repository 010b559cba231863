//! HDFS-specific aggregates over the fields extracted from stored log lines.

use rusqlite::{params, Connection};
use serde::Serialize;

use crate::error::StoreError;
use crate::query::non_negative;

/// Activity of one HDFS block within a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockStats {
    pub block_id: String,
    pub log_count: u64,
    pub first_seen: String,
    pub last_seen: String,
    /// Distinct levels logged for the block, sorted.
    pub log_levels: Vec<String>,
    /// Distinct components that mentioned the block, sorted.
    pub components: Vec<String>,
}

/// Number of log lines one component produced within a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentActivity {
    pub component: String,
    pub log_count: u64,
}

/// Blocks mentioned by at least `min_logs` lines stored at or after `since`,
/// busiest first, at most `limit` of them.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure.
pub fn hdfs_block_stats(
    conn: &Connection,
    since: &str,
    min_logs: i64,
    limit: i64,
) -> Result<Vec<BlockStats>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT block_id,
                COUNT(*) AS log_count,
                MIN(timestamp),
                MAX(timestamp),
                GROUP_CONCAT(DISTINCT log_level),
                GROUP_CONCAT(DISTINCT hdfs_component)
         FROM log_entries
         WHERE block_id IS NOT NULL AND timestamp >= ?1
         GROUP BY block_id
         HAVING COUNT(*) >= ?2
         ORDER BY log_count DESC, block_id ASC
         LIMIT ?3",
    )?;
    let rows = stmt.query_map(params![since, min_logs, limit], |row| {
        Ok(BlockStats {
            block_id: row.get(0)?,
            log_count: non_negative(row.get(1)?),
            first_seen: row.get(2)?,
            last_seen: row.get(3)?,
            log_levels: split_distinct(row.get(4)?),
            components: split_distinct(row.get(5)?),
        })
    })?;

    let mut blocks = Vec::new();
    for row in rows {
        blocks.push(row?);
    }
    Ok(blocks)
}

/// Log line counts per component since `since`, busiest first. An empty
/// `components` slice means every component.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure.
pub fn component_activity(
    conn: &Connection,
    since: &str,
    components: &[String],
) -> Result<Vec<ComponentActivity>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT hdfs_component, COUNT(*) AS log_count
         FROM log_entries
         WHERE hdfs_component IS NOT NULL AND timestamp >= ?1
         GROUP BY hdfs_component
         ORDER BY log_count DESC, hdfs_component ASC",
    )?;
    let rows = stmt.query_map([since], |row| {
        Ok(ComponentActivity {
            component: row.get(0)?,
            log_count: non_negative(row.get(1)?),
        })
    })?;

    let mut activity = Vec::new();
    for row in rows {
        let row = row?;
        if components.is_empty() || components.contains(&row.component) {
            activity.push(row);
        }
    }
    Ok(activity)
}

// GROUP_CONCAT joins with ','; levels and component names never contain one.
fn split_distinct(joined: Option<String>) -> Vec<String> {
    let mut values: Vec<String> = joined
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();
    values.sort();
    values.dedup();
    values
}
