use anyhow::{bail, Result};
use chrono::{DateTime, Duration, FixedOffset};

use crate::db::Observation;

pub const DEFAULT_SAMPLING_INTERVAL_MS: u64 = 1_000;

/// How often per-frame counts become persisted observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingConfig {
    interval: Duration,
}

impl SamplingConfig {
    pub fn from_millis(interval_ms: u64) -> Result<Self> {
        if interval_ms == 0 {
            bail!("sampling interval must be greater than zero");
        }
        let Ok(millis) = i64::try_from(interval_ms) else {
            bail!("sampling interval {interval_ms}ms is too large");
        };
        Ok(Self {
            interval: Duration::milliseconds(millis),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::milliseconds(DEFAULT_SAMPLING_INTERVAL_MS as i64),
        }
    }
}

/// Throttles per-frame occupancy to at most one observation per interval of
/// wall-clock time, independent of the detector's frame rate.
#[derive(Debug, Clone)]
pub struct Sampler {
    interval: Duration,
    last_sample_time: Option<DateTime<FixedOffset>>,
}

impl Sampler {
    pub fn new(config: SamplingConfig) -> Self {
        Self {
            interval: config.interval(),
            last_sample_time: None,
        }
    }

    pub fn last_sample_time(&self) -> Option<DateTime<FixedOffset>> {
        self.last_sample_time
    }

    /// Emits an observation on the first call and whenever at least one
    /// interval has passed since the last emitted one.
    ///
    /// A clock that steps backwards never emits, so emitted timestamps stay
    /// strictly increasing.
    pub fn observe(&mut self, now: DateTime<FixedOffset>, occupancy: u32) -> Option<Observation> {
        if let Some(last) = self.last_sample_time {
            if now <= last || now - last < self.interval {
                return None;
            }
        }

        self.last_sample_time = Some(now);
        Some(Observation::new(now, occupancy))
    }
}
