//! Device Benchmark Module
//!
//! The GPU worker only talks to a compute device through the
//! [`BenchmarkRunner`] contract, so any native backend can sit behind it.
//!
//! # Components
//!
//! - [`BenchmarkRunner`]: The four-operation measurement contract
//! - [`HostBenchmarkRunner`]: Host-memory/CPU simulation of a device
//! - [`RunnerFactory`]: How the orchestrator obtains a runner per run

pub mod host;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StressError};

pub use host::HostBenchmarkRunner;

/// Bytes per GiB, used for the GB/s figures.
const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// What a benchmark result measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricKind {
    Throughput,
    Compute,
    Concurrency,
    ThermalDrift,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One measurement reported by a runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub metric_kind: MetricKind,
    pub value: f64,
    pub unit: String,
}

impl BenchmarkResult {
    pub fn throughput(gb_per_sec: f64) -> Self {
        Self {
            metric_kind: MetricKind::Throughput,
            value: gb_per_sec,
            unit: "GB/s".to_string(),
        }
    }

    pub fn compute(gflops: f64) -> Self {
        Self {
            metric_kind: MetricKind::Compute,
            value: gflops,
            unit: "GFLOPS".to_string(),
        }
    }

    pub fn concurrency(gb_per_sec: f64) -> Self {
        Self {
            metric_kind: MetricKind::Concurrency,
            value: gb_per_sec,
            unit: "GB/s".to_string(),
        }
    }

    /// Change in kernel time over a thermal run, in percent.
    pub fn thermal_drift(percent: f64) -> Self {
        Self {
            metric_kind: MetricKind::ThermalDrift,
            value: percent,
            unit: "%".to_string(),
        }
    }
}

impl fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:.2} {}", self.metric_kind, self.value, self.unit)
    }
}

/// One point of a thermal run, taken every 10th iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermalSample {
    /// Time since the thermal run started
    pub elapsed: Duration,
    /// Duration of this single kernel invocation
    pub per_operation: Duration,
    /// 1-based iteration number
    pub iteration: u64,
}

/// Device measurement contract used by the GPU worker.
///
/// Every operation fails with [`StressError::DeviceError`] on allocation
/// or execution problems.
pub trait BenchmarkRunner: Send {
    /// Human-readable backend name.
    fn name(&self) -> &str;

    /// Repeated buffer copies after one warmup; returns GB/s counting
    /// both the read and the write of every byte.
    fn measure_memory_throughput(&mut self, size_mb: usize, iterations: usize) -> Result<f64>;

    /// Repeated dense square matrix multiplies; returns GFLOPS.
    fn measure_compute_performance(&mut self, matrix_size: usize) -> Result<f64>;

    /// Independent transfer+compute operations on `stream_count` queues;
    /// returns aggregate GB/s over the wall time of the slowest queue.
    fn measure_concurrency(&mut self, stream_count: usize, size_mb: usize) -> Result<f64>;

    /// Runs a fixed compute kernel back-to-back for `duration`.
    fn thermal_stress(&mut self, duration: Duration) -> Result<Vec<ThermalSample>>;
}

/// Produces a runner for a GPU worker, or explains why none exists.
pub type RunnerFactory = Arc<dyn Fn() -> Result<Box<dyn BenchmarkRunner>> + Send + Sync>;

/// Factory used when no device backend is compiled in.
pub fn unavailable_factory() -> RunnerFactory {
    Arc::new(|| {
        Err(StressError::DeviceUnavailable(
            "no GPU backend available (use the host simulation to exercise the GPU worker)"
                .to_string(),
        ))
    })
}

/// Factory for the host-simulated device.
pub fn host_factory() -> RunnerFactory {
    Arc::new(|| Ok(Box::new(HostBenchmarkRunner::new()) as Box<dyn BenchmarkRunner>))
}

/// GB/s for `iterations` copies of `bytes`, counting read and write.
pub fn copy_throughput(bytes: u64, iterations: u64, elapsed: Duration) -> f64 {
    let moved = bytes as f64 * iterations as f64 * 2.0;
    moved / BYTES_PER_GB / seconds(elapsed)
}

/// GB/s for `bytes` moved in total.
pub fn aggregate_throughput(bytes: u64, elapsed: Duration) -> f64 {
    bytes as f64 / BYTES_PER_GB / seconds(elapsed)
}

/// GFLOPS for `iterations` multiplies of `m x k` by `k x n`.
pub fn matmul_gflops(m: u64, n: u64, k: u64, iterations: u64, elapsed: Duration) -> f64 {
    let flops = 2.0 * m as f64 * n as f64 * k as f64 * iterations as f64;
    flops / seconds(elapsed) / 1e9
}

/// Percent change in per-operation time from the first to the last
/// thermal sample. Positive means the device slowed down.
pub fn thermal_drift(samples: &[ThermalSample]) -> Option<f64> {
    if samples.len() < 2 {
        return None;
    }
    let first = samples.first()?.per_operation.as_secs_f64();
    let last = samples.last()?.per_operation.as_secs_f64();
    if first <= 0.0 {
        return None;
    }
    Some((last - first) / first * 100.0)
}

fn seconds(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64().max(1e-9)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_throughput_counts_read_and_write() {
        let gib = 1024 * 1024 * 1024;
        let gbps = copy_throughput(gib, 1, Duration::from_secs(1));
        assert!((gbps - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_matmul_gflops_formula() {
        let gflops = matmul_gflops(1000, 1000, 1000, 10, Duration::from_secs(2));
        assert!((gflops - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_throughput() {
        let gbps = aggregate_throughput(4 * 1024 * 1024 * 1024, Duration::from_secs(2));
        assert!((gbps - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_elapsed_does_not_divide_by_zero() {
        assert!(copy_throughput(1, 1, Duration::ZERO).is_finite());
    }

    #[test]
    fn test_thermal_drift() {
        let point = |ms: u64, iteration: u64| ThermalSample {
            elapsed: Duration::from_millis(ms * iteration),
            per_operation: Duration::from_millis(ms),
            iteration,
        };
        let slowing = [point(10, 10), point(11, 20), point(12, 30)];
        let drift = thermal_drift(&slowing).unwrap();
        assert!((drift - 20.0).abs() < 1e-9);

        assert_eq!(thermal_drift(&slowing[..1]), None);
        assert_eq!(thermal_drift(&[]), None);
        assert_eq!(
            BenchmarkResult::thermal_drift(1.5).to_string(),
            "ThermalDrift: 1.50 %"
        );
    }

    #[test]
    fn test_unavailable_factory() {
        let factory = unavailable_factory();
        assert!(matches!(factory(), Err(StressError::DeviceUnavailable(_))));
    }

    #[test]
    fn test_host_factory() {
        let factory = host_factory();
        let runner = factory().unwrap();
        assert_eq!(runner.name(), "host-simulated");
    }

    #[test]
    fn test_result_display() {
        let result = BenchmarkResult::compute(12.5);
        assert_eq!(result.to_string(), "Compute: 12.50 GFLOPS");
        assert_eq!(BenchmarkResult::throughput(1.0).unit, "GB/s");
    }
}
