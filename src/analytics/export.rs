//! Two-column CSV exchange format for the raw series and its summary.
//!
//! The series file is `timestamp,occupancy` with RFC 3339 timestamps. Reading
//! also accepts naive `YYYY-MM-DD HH:MM:SS[.f]` timestamps from older
//! exports, taken as local time.

use std::io::{self, BufRead, Write};

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone};
use thiserror::Error;

use crate::db::{helpers::parse_timestamp, Observation, TimeSeries};

use super::SummaryStatistics;

pub const SERIES_HEADER: &str = "timestamp,occupancy";
pub const SUMMARY_HEADER: &str = "metric,value";

const LEGACY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Debug, Error)]
pub enum CsvError {
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub fn write_series_csv<W: Write>(series: &[Observation], mut writer: W) -> Result<(), CsvError> {
    writeln!(writer, "{SERIES_HEADER}")?;
    for observation in series {
        writeln!(
            writer,
            "{},{}",
            observation.timestamp.to_rfc3339(),
            observation.occupancy
        )?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_summary_csv<W: Write>(
    summary: &SummaryStatistics,
    mut writer: W,
) -> Result<(), CsvError> {
    writeln!(writer, "{SUMMARY_HEADER}")?;
    writeln!(writer, "mean_occupancy,{:.2}", summary.mean_occupancy_rounded())?;
    writeln!(writer, "peak_occupancy,{}", summary.peak_occupancy)?;
    writeln!(writer, "peak_timestamp,{}", summary.peak_timestamp.to_rfc3339())?;
    writeln!(writer, "observation_count,{}", summary.observation_count)?;
    for (hour, average) in &summary.hourly_average {
        writeln!(writer, "hour_{hour:02},{average:.2}")?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads a series written by [`write_series_csv`]. Any bad row fails the
/// whole read.
pub fn read_series_csv<R: BufRead>(reader: R) -> Result<TimeSeries, CsvError> {
    let mut lines = reader.lines().enumerate();

    match lines.next() {
        Some((_, header)) => {
            let header = header?;
            if header.trim().trim_start_matches('\u{feff}') != SERIES_HEADER {
                return Err(CsvError::Malformed {
                    line: 1,
                    reason: format!("expected header '{SERIES_HEADER}', found '{header}'"),
                });
            }
        }
        None => {
            return Err(CsvError::Malformed {
                line: 1,
                reason: "missing header".into(),
            })
        }
    }

    let mut series = Vec::new();
    for (index, line) in lines {
        let line = line?;
        let line_number = index + 1;
        if line.trim().is_empty() {
            continue;
        }
        series.push(parse_row(&line).map_err(|reason| CsvError::Malformed {
            line: line_number,
            reason,
        })?);
    }

    Ok(series)
}

fn parse_row(line: &str) -> Result<Observation, String> {
    let mut fields = line.split(',');
    let (Some(raw_timestamp), Some(raw_occupancy), None) =
        (fields.next(), fields.next(), fields.next())
    else {
        return Err(format!("expected 2 fields in '{line}'"));
    };

    let timestamp = parse_any_timestamp(raw_timestamp.trim())?;
    let occupancy = raw_occupancy
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("occupancy '{}' is not a non-negative integer", raw_occupancy.trim()))?;

    Ok(Observation::new(timestamp, occupancy))
}

fn parse_any_timestamp(value: &str) -> Result<DateTime<FixedOffset>, String> {
    if let Ok(timestamp) = parse_timestamp(value, "timestamp") {
        return Ok(timestamp);
    }

    let naive = NaiveDateTime::parse_from_str(value, LEGACY_TIMESTAMP_FORMAT)
        .map_err(|_| format!("unparseable timestamp '{value}'"))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.fixed_offset())
        .ok_or_else(|| format!("timestamp '{value}' does not exist in the local time zone"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::summarize;
    use chrono::Timelike;

    fn obs(rfc3339: &str, occupancy: u32) -> Observation {
        Observation::new(DateTime::parse_from_rfc3339(rfc3339).unwrap(), occupancy)
    }

    #[test]
    fn series_export_has_one_header_and_a_row_per_observation() {
        let series = vec![
            obs("2024-03-04T09:00:00+00:00", 2),
            obs("2024-03-04T09:00:01+00:00", 0),
        ];
        let mut out = Vec::new();
        write_series_csv(&series, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "timestamp,occupancy\n2024-03-04T09:00:00+00:00,2\n2024-03-04T09:00:01+00:00,0\n"
        );
        assert_eq!(read_series_csv(text.as_bytes()).unwrap(), series);
    }

    #[test]
    fn summary_export_lists_metrics_and_populated_hours() {
        let summary = summarize(&[
            obs("2024-03-04T09:00:00+00:00", 2),
            obs("2024-03-04T09:30:00+00:00", 4),
            obs("2024-03-04T10:15:00+00:00", 4),
        ])
        .unwrap();

        let mut out = Vec::new();
        write_summary_csv(&summary, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "metric,value",
                "mean_occupancy,3.33",
                "peak_occupancy,4",
                "peak_timestamp,2024-03-04T09:30:00+00:00",
                "observation_count,3",
                "hour_09,3.00",
                "hour_10,4.00",
            ]
        );
    }

    #[test]
    fn legacy_naive_timestamps_are_read_as_local_time() {
        let text = "timestamp,occupancy\n2024-03-04 09:15:00.250000,3\n";
        let series = read_series_csv(text.as_bytes()).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].timestamp.hour(), 9);
        assert_eq!(series[0].occupancy, 3);
    }

    #[test]
    fn malformed_rows_fail_the_whole_read() {
        let cases = [
            ("timestamp,occupancy\n2024-03-04T09:00:00Z,-1\n", 2),
            ("timestamp,occupancy\n2024-03-04T09:00:00Z,1\nsoon,2\n", 3),
            ("timestamp,occupancy\n2024-03-04T09:00:00Z,2.5\n", 2),
            ("timestamp,occupancy\n2024-03-04T09:00:00Z\n", 2),
            ("time,count\n", 1),
            ("", 1),
        ];

        for (text, expected_line) in cases {
            match read_series_csv(text.as_bytes()) {
                Err(CsvError::Malformed { line, .. }) => assert_eq!(line, expected_line, "{text:?}"),
                other => panic!("expected malformed error for {text:?}, got {other:?}"),
            }
        }
    }
}
