use anyhow::{Context, Result};
use rusqlite::{params, types::Value};
use thiserror::Error;

use crate::db::{
    connection::Database,
    helpers::{parse_timestamp, to_u32},
    models::{Observation, TimeSeries},
};

/// A persisted row that cannot be turned back into an [`Observation`].
///
/// Loading fails as a whole when any row is corrupt; skipping bad rows would
/// quietly skew every statistic computed from the series.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("corrupt observation row {row_id}: {reason}")]
pub struct CorruptRowError {
    pub row_id: i64,
    pub reason: String,
}

impl Database {
    /// Appends observations in one transaction, after any existing rows.
    ///
    /// Rows are never merged or reordered: overlapping timestamps from
    /// separate runs are stored as separate entries.
    pub async fn append_observations(&self, observations: &[Observation]) -> Result<usize> {
        if observations.is_empty() {
            return Ok(0);
        }

        let records = observations.to_vec();
        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open append transaction")?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO observations (timestamp, occupancy) VALUES (?1, ?2)",
                )?;
                for record in &records {
                    stmt.execute(params![record.timestamp.to_rfc3339(), record.occupancy])
                        .with_context(|| "failed to insert observation")?;
                }
            }
            tx.commit().context("failed to commit observations")?;
            Ok(records.len())
        })
        .await
    }

    /// Loads the whole series in insertion order. An empty store yields an
    /// empty series.
    pub async fn load_observations(&self) -> Result<TimeSeries> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, timestamp, occupancy
                 FROM observations
                 ORDER BY id ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut series = Vec::new();
            while let Some(row) = rows.next()? {
                let row_id: i64 = row.get(0)?;
                let raw_timestamp: Value = row.get(1)?;
                let raw_occupancy: Value = row.get(2)?;
                series.push(decode_row(row_id, raw_timestamp, raw_occupancy)?);
            }

            Ok(series)
        })
        .await
    }

    /// Deletes every persisted observation. Resetting an empty store succeeds.
    pub async fn reset_observations(&self) -> Result<usize> {
        self.execute(|conn| {
            let removed = conn
                .execute("DELETE FROM observations", [])
                .with_context(|| "failed to clear observations")?;
            Ok(removed)
        })
        .await
    }

    pub async fn count_observations(&self) -> Result<u64> {
        self.execute(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
        .await
    }
}

fn decode_row(
    row_id: i64,
    raw_timestamp: Value,
    raw_occupancy: Value,
) -> Result<Observation, CorruptRowError> {
    let corrupt = |reason: String| CorruptRowError { row_id, reason };

    let timestamp = match raw_timestamp {
        Value::Text(text) => {
            parse_timestamp(&text, "timestamp").map_err(|err| corrupt(format!("{err:#}")))?
        }
        other => return Err(corrupt(format!("timestamp is not text: {other:?}"))),
    };

    let occupancy = match raw_occupancy {
        Value::Integer(value) => {
            to_u32(value, "occupancy").map_err(|err| corrupt(err.to_string()))?
        }
        other => return Err(corrupt(format!("occupancy is not an integer: {other:?}"))),
    };

    Ok(Observation::new(timestamp, occupancy))
}
