use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, FixedOffset};

pub fn to_u32(value: i64, field: &str) -> Result<u32> {
    if value < 0 {
        return Err(anyhow!("{field} contains negative value {value}"));
    }
    u32::try_from(value).map_err(|_| anyhow!("{field} value {value} is out of range"))
}

/// Parses an RFC 3339 timestamp keeping the offset it was written with, so
/// hour-of-day reads back as the wall-clock hour at sampling time.
pub fn parse_timestamp(value: &str, field: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).with_context(|| format!("failed to parse {field} '{value}'"))
}
