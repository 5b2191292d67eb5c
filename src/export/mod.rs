//! Metric Export
//!
//! Writes a [`MetricLog`] as CSV or JSON, one record per entry in sample
//! order, and reads such files back. Both formats share one row shape:
//!
//! ```text
//! time,cpu,ram,disk,net_sent,net_recv
//! 2024-05-01T12:00:00.125+02:00,37.5,61.2,48.0,1048576,2097152
//! 2024-05-01T12:00:02.125+02:00,,,,,
//! ```
//!
//! A missing sample keeps its timestamp and leaves every metric empty
//! (CSV) or `null` (JSON).

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Local};
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StressError};
use crate::monitoring::{MetricLog, MetricRecord, MetricSample};

/// Reason attached to gaps read back from a file.
const IMPORTED_GAP: &str = "missing sample";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ExportRow {
    time: String,
    cpu: Option<f64>,
    ram: Option<f64>,
    disk: Option<f64>,
    net_sent: Option<u64>,
    net_recv: Option<u64>,
}

impl From<&MetricRecord> for ExportRow {
    fn from(record: &MetricRecord) -> Self {
        let time = record.timestamp().to_rfc3339();
        match record {
            MetricRecord::Sample(s) => Self {
                time,
                cpu: Some(s.cpu_percent),
                ram: Some(s.memory_percent),
                disk: Some(s.disk_percent),
                net_sent: Some(s.net_bytes_sent),
                net_recv: Some(s.net_bytes_recv),
            },
            MetricRecord::Missing { .. } => Self {
                time,
                cpu: None,
                ram: None,
                disk: None,
                net_sent: None,
                net_recv: None,
            },
        }
    }
}

impl ExportRow {
    fn into_record(self) -> Result<MetricRecord> {
        let timestamp = DateTime::parse_from_rfc3339(&self.time)
            .map_err(|e| StressError::Export(format!("bad timestamp '{}': {}", self.time, e)))?
            .with_timezone(&Local);

        let record = match (self.cpu, self.ram, self.disk, self.net_sent, self.net_recv) {
            (Some(cpu), Some(ram), Some(disk), Some(net_sent), Some(net_recv)) => {
                MetricRecord::Sample(MetricSample {
                    timestamp,
                    cpu_percent: cpu,
                    memory_percent: ram,
                    disk_percent: disk,
                    net_bytes_sent: net_sent,
                    net_bytes_recv: net_recv,
                })
            }
            (None, None, None, None, None) => MetricRecord::Missing {
                timestamp,
                reason: IMPORTED_GAP.to_string(),
            },
            _ => {
                return Err(StressError::Export(format!(
                    "row at {} is only partially filled",
                    self.time
                )))
            }
        };
        Ok(record)
    }
}

fn create(path: &Path) -> Result<File> {
    File::create(path)
        .map_err(|e| StressError::Export(format!("cannot create {}: {}", path.display(), e)))
}

fn open(path: &Path) -> Result<File> {
    File::open(path)
        .map_err(|e| StressError::Export(format!("cannot open {}: {}", path.display(), e)))
}

/// Writes `log` to `path` as CSV with a header row.
pub fn write_csv(log: &MetricLog, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_writer(create(path)?);
    for record in log.records() {
        writer.serialize(ExportRow::from(record))?;
    }
    writer
        .flush()
        .map_err(|e| StressError::Export(e.to_string()))?;

    info!("Exported {} metric records to {}", log.len(), path.display());
    Ok(())
}

/// Reads a CSV file written by [`write_csv`].
pub fn read_csv(path: impl AsRef<Path>) -> Result<MetricLog> {
    let mut reader = csv::Reader::from_reader(open(path.as_ref())?);
    let records = reader
        .deserialize::<ExportRow>()
        .map(|row| row?.into_record())
        .collect::<Result<Vec<_>>>()?;
    Ok(MetricLog::from_records(records))
}

/// Writes `log` to `path` as a pretty-printed JSON array.
pub fn write_json(log: &MetricLog, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let rows: Vec<ExportRow> = log.records().iter().map(ExportRow::from).collect();

    let mut writer = BufWriter::new(create(path)?);
    serde_json::to_writer_pretty(&mut writer, &rows)?;
    writer
        .flush()
        .map_err(|e| StressError::Export(e.to_string()))?;

    info!("Exported {} metric records to {}", log.len(), path.display());
    Ok(())
}

/// Reads a JSON file written by [`write_json`].
pub fn read_json(path: impl AsRef<Path>) -> Result<MetricLog> {
    let rows: Vec<ExportRow> = serde_json::from_reader(BufReader::new(open(path.as_ref())?))?;
    let records = rows
        .into_iter()
        .map(ExportRow::into_record)
        .collect::<Result<Vec<_>>>()?;
    Ok(MetricLog::from_records(records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::fs;
    use tempfile::tempdir;

    fn sample_log() -> MetricLog {
        let start = Local::now();
        let mut log = MetricLog::new();
        for i in 0..5u64 {
            log.push_sample(MetricSample {
                timestamp: start + Duration::seconds(i as i64),
                cpu_percent: 10.0 + i as f64 * 7.3,
                memory_percent: 42.1,
                disk_percent: 67.0,
                net_bytes_sent: 1_000_000 + i * 4096,
                net_bytes_recv: 9_000_000 + i * 8192,
            });
        }
        log.push_gap(start + Duration::seconds(5), "sampler timed out");
        log
    }

    fn assert_same_samples(a: &MetricLog, b: &MetricLog) {
        assert_eq!(a.len(), b.len());
        let left: Vec<_> = a.samples().collect();
        let right: Vec<_> = b.samples().collect();
        assert_eq!(left, right);
        assert_eq!(a.gap_count(), b.gap_count());
    }

    #[test]
    fn test_csv_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let log = sample_log();

        write_csv(&log, &path).unwrap();
        let back = read_csv(&path).unwrap();
        assert_same_samples(&log, &back);
    }

    #[test]
    fn test_csv_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        write_csv(&sample_log(), &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("time,cpu,ram,disk,net_sent,net_recv"));
        assert_eq!(text.lines().count(), 7);
        assert!(text.lines().last().unwrap().ends_with(",,,,,"));
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        let log = sample_log();

        write_json(&log, &path).unwrap();
        let back = read_json(&path).unwrap();
        assert_same_samples(&log, &back);
    }

    #[test]
    fn test_json_gaps_are_null() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        write_json(&sample_log(), &path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), 6);
        assert!(rows[5]["cpu"].is_null());
        assert_eq!(rows[0]["disk"], 67.0);
    }

    #[test]
    fn test_empty_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.json");
        write_json(&MetricLog::new(), &path).unwrap();
        assert!(read_json(&path).unwrap().is_empty());
    }

    #[test]
    fn test_partial_row_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(
            &path,
            "time,cpu,ram,disk,net_sent,net_recv\n2024-05-01T12:00:00+00:00,1.0,,,,\n",
        )
        .unwrap();
        assert!(matches!(read_csv(&path), Err(StressError::Export(_))));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            read_json(dir.path().join("nope.json")),
            Err(StressError::Export(_))
        ));
    }
}
