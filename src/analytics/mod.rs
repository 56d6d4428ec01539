//! Summary statistics over a loaded occupancy time series.

pub mod export;

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::Observation;

pub use export::{read_series_csv, write_series_csv, write_summary_csv, CsvError};

/// There is nothing to summarise: the series holds no observations.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("no analytics data available")]
pub struct EmptyDataError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    /// Full-precision mean; see [`mean_occupancy_rounded`](Self::mean_occupancy_rounded)
    /// for display.
    pub mean_occupancy: f64,
    pub peak_occupancy: u32,
    /// Timestamp of the first observation reaching the peak.
    pub peak_timestamp: DateTime<FixedOffset>,
    /// Mean occupancy per hour of day (0-23). Hours without observations are
    /// absent, not zero.
    pub hourly_average: BTreeMap<u32, f64>,
    pub observation_count: usize,
}

impl SummaryStatistics {
    pub fn mean_occupancy_rounded(&self) -> f64 {
        round_2dp(self.mean_occupancy)
    }
}

fn round_2dp(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Computes mean, peak, peak time and hour-of-day averages.
///
/// Hours are read from each timestamp in the offset it was stored with.
pub fn summarize(series: &[Observation]) -> Result<SummaryStatistics, EmptyDataError> {
    let first = series.first().ok_or(EmptyDataError)?;

    let mut total: u64 = 0;
    let mut peak = *first;
    let mut buckets: BTreeMap<u32, (u64, u64)> = BTreeMap::new();

    for observation in series {
        total += u64::from(observation.occupancy);

        // Strictly greater keeps the earliest timestamp on ties.
        if observation.occupancy > peak.occupancy {
            peak = *observation;
        }

        let bucket = buckets.entry(observation.timestamp.hour()).or_insert((0, 0));
        bucket.0 += u64::from(observation.occupancy);
        bucket.1 += 1;
    }

    let hourly_average = buckets
        .into_iter()
        .map(|(hour, (sum, count))| (hour, sum as f64 / count as f64))
        .collect();

    Ok(SummaryStatistics {
        mean_occupancy: total as f64 / series.len() as f64,
        peak_occupancy: peak.occupancy,
        peak_timestamp: peak.timestamp,
        hourly_average,
        observation_count: series.len(),
    })
}
