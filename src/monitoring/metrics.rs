//! Metric Log
//!
//! The ordered history of system samples for one run. The monitor thread
//! is its only writer; everyone else reads it after the monitor stops.

use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::sampler::{round_percent, SystemSnapshot};

/// One timestamped system measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Local>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    /// Cumulative, never decreasing within a run
    pub net_bytes_sent: u64,
    /// Cumulative, never decreasing within a run
    pub net_bytes_recv: u64,
}

impl MetricSample {
    pub fn from_snapshot(timestamp: DateTime<Local>, snapshot: SystemSnapshot) -> Self {
        Self {
            timestamp,
            cpu_percent: snapshot.cpu_percent,
            memory_percent: snapshot.memory_percent,
            disk_percent: snapshot.disk_percent,
            net_bytes_sent: snapshot.net_bytes_sent,
            net_bytes_recv: snapshot.net_bytes_recv,
        }
    }
}

/// An entry in the log: a sample, or a marker for a tick that failed.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricRecord {
    Sample(MetricSample),
    Missing {
        timestamp: DateTime<Local>,
        reason: String,
    },
}

impl MetricRecord {
    pub fn timestamp(&self) -> DateTime<Local> {
        match self {
            Self::Sample(sample) => sample.timestamp,
            Self::Missing { timestamp, .. } => *timestamp,
        }
    }

    pub fn sample(&self) -> Option<&MetricSample> {
        match self {
            Self::Sample(sample) => Some(sample),
            Self::Missing { .. } => None,
        }
    }
}

/// Append-only, time-ordered metric history.
///
/// Timestamps are clamped to the previous entry's so that a wall-clock
/// step backwards cannot reorder the log; network counters are clamped
/// the same way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricLog {
    records: Vec<MetricRecord>,
}

impl MetricLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn clamp_time(&self, timestamp: DateTime<Local>) -> DateTime<Local> {
        match self.records.last() {
            Some(last) if last.timestamp() > timestamp => last.timestamp(),
            _ => timestamp,
        }
    }

    fn last_sample(&self) -> Option<&MetricSample> {
        self.records.iter().rev().find_map(MetricRecord::sample)
    }

    /// Appends a sample and returns the stored copy.
    ///
    /// Percentages are stored rounded to one decimal within `[0, 100]`,
    /// whatever sampler produced them.
    pub fn push_sample(&mut self, mut sample: MetricSample) -> MetricSample {
        sample.timestamp = self.clamp_time(sample.timestamp);
        sample.cpu_percent = round_percent(sample.cpu_percent);
        sample.memory_percent = round_percent(sample.memory_percent);
        sample.disk_percent = round_percent(sample.disk_percent);
        if let Some(prev) = self.last_sample() {
            sample.net_bytes_sent = sample.net_bytes_sent.max(prev.net_bytes_sent);
            sample.net_bytes_recv = sample.net_bytes_recv.max(prev.net_bytes_recv);
        }

        self.records.push(MetricRecord::Sample(sample.clone()));
        sample
    }

    /// Rebuilds a log from records read back from an export.
    pub fn from_records(records: Vec<MetricRecord>) -> Self {
        let mut log = Self::new();
        for record in records {
            match record {
                MetricRecord::Sample(sample) => {
                    log.push_sample(sample);
                }
                MetricRecord::Missing { timestamp, reason } => log.push_gap(timestamp, reason),
            }
        }
        log
    }

    /// Appends a missing-sample marker.
    pub fn push_gap(&mut self, timestamp: DateTime<Local>, reason: impl Into<String>) {
        let timestamp = self.clamp_time(timestamp);
        self.records.push(MetricRecord::Missing {
            timestamp,
            reason: reason.into(),
        });
    }

    pub fn records(&self) -> &[MetricRecord] {
        &self.records
    }

    /// Samples only, in order.
    pub fn samples(&self) -> impl Iterator<Item = &MetricSample> {
        self.records.iter().filter_map(MetricRecord::sample)
    }

    pub fn sample_count(&self) -> usize {
        self.samples().count()
    }

    pub fn gap_count(&self) -> usize {
        self.records.len() - self.sample_count()
    }

    /// Number of entries, gaps included.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn summary(&self) -> MetricSummary {
        MetricSummary::from_log(self)
    }
}

/// Basic aggregates over a metric log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricSummary {
    pub samples: usize,
    pub gaps: usize,
    pub cpu_avg: f64,
    pub cpu_max: f64,
    pub memory_avg: f64,
    pub memory_max: f64,
    pub disk_avg: f64,
    pub disk_max: f64,
    /// Bytes sent between the first and last sample
    pub net_sent_delta: u64,
    /// Bytes received between the first and last sample
    pub net_recv_delta: u64,
}

impl MetricSummary {
    fn from_log(log: &MetricLog) -> Self {
        let samples: Vec<&MetricSample> = log.samples().collect();
        let gaps = log.gap_count();

        let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
            return Self {
                gaps,
                ..Self::default()
            };
        };

        let n = samples.len() as f64;
        let avg = |f: fn(&MetricSample) -> f64| samples.iter().map(|s| f(s)).sum::<f64>() / n;
        let max = |f: fn(&MetricSample) -> f64| samples.iter().map(|s| f(s)).fold(0.0, f64::max);

        Self {
            samples: samples.len(),
            gaps,
            cpu_avg: avg(|s| s.cpu_percent),
            cpu_max: max(|s| s.cpu_percent),
            memory_avg: avg(|s| s.memory_percent),
            memory_max: max(|s| s.memory_percent),
            disk_avg: avg(|s| s.disk_percent),
            disk_max: max(|s| s.disk_percent),
            net_sent_delta: last.net_bytes_sent.saturating_sub(first.net_bytes_sent),
            net_recv_delta: last.net_bytes_recv.saturating_sub(first.net_bytes_recv),
        }
    }
}

impl fmt::Display for MetricSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.samples == 0 {
            return write!(f, "No metric samples collected ({} gaps)", self.gaps);
        }
        writeln!(f, "Samples: {} ({} gaps)", self.samples, self.gaps)?;
        writeln!(f, "  CPU:    avg {:.1}%  max {:.1}%", self.cpu_avg, self.cpu_max)?;
        writeln!(f, "  Memory: avg {:.1}%  max {:.1}%", self.memory_avg, self.memory_max)?;
        writeln!(f, "  Disk:   avg {:.1}%  max {:.1}%", self.disk_avg, self.disk_max)?;
        write!(
            f,
            "  Network: {} bytes sent, {} bytes received",
            self.net_sent_delta, self.net_recv_delta
        )
    }
}
