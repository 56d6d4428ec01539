//! Occupancy observation data model.
//!
//! One row of the persisted time series: the number of distinct tracked
//! entities seen at a sampling instant.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Distinct-entity count at one sampling instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<FixedOffset>,
    pub occupancy: u32,
}

impl Observation {
    pub fn new(timestamp: DateTime<FixedOffset>, occupancy: u32) -> Self {
        Self {
            timestamp,
            occupancy,
        }
    }
}

/// Observations in insertion order.
pub type TimeSeries = Vec<Observation>;
