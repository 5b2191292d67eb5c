//! GPU Stressor
//!
//! Drives a compute device through a [`BenchmarkRunner`]: one memory
//! throughput measurement, one concurrency measurement, an optional
//! thermal run, then compute measurements back-to-back until stopped.
//! Any device error fails the worker, not the run.

use std::time::{Duration, Instant};

use log::{debug, info};

use super::handle::{ResourceWorker, WorkerContext};
use super::status::WorkerKind;
use crate::benchmark::{thermal_drift, BenchmarkResult, BenchmarkRunner, RunnerFactory};
use crate::error::Result;

/// Compute results between log lines.
const REPORT_EVERY: u64 = 10;

/// Longest single thermal call, so a stop is seen within about a second.
const THERMAL_SLICE: Duration = Duration::from_secs(1);

/// Sizes used for each measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuWorkload {
    pub throughput_size_mb: usize,
    pub throughput_iterations: usize,
    pub matrix_size: usize,
    pub streams: usize,
    pub concurrency_size_mb: usize,
}

impl Default for GpuWorkload {
    /// Sizes meant for a real device.
    fn default() -> Self {
        Self {
            throughput_size_mb: 1024,
            throughput_iterations: 10,
            matrix_size: 512,
            streams: 4,
            concurrency_size_mb: 512,
        }
    }
}

impl GpuWorkload {
    /// Smaller sizes so the host simulation still honors the stop
    /// latency of about one second.
    pub fn host() -> Self {
        Self {
            throughput_size_mb: 64,
            throughput_iterations: 5,
            matrix_size: 160,
            streams: 4,
            concurrency_size_mb: 32,
        }
    }
}

/// Stress worker backed by a benchmark runner.
pub struct GpuWorker {
    factory: RunnerFactory,
    workload: GpuWorkload,
    thermal: Duration,
}

impl GpuWorker {
    pub fn new(factory: RunnerFactory, workload: GpuWorkload) -> Self {
        Self {
            factory,
            workload,
            thermal: Duration::ZERO,
        }
    }

    /// Runs the thermal kernel for `duration` before the compute loop and
    /// records how much its per-operation time drifted.
    pub fn with_thermal(mut self, duration: Duration) -> Self {
        self.thermal = duration;
        self
    }

    fn run_thermal(&self, runner: &mut dyn BenchmarkRunner, ctx: &WorkerContext) -> Result<()> {
        let started = Instant::now();
        let mut samples = Vec::new();

        while !ctx.should_stop() {
            let remaining = self.thermal.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }
            let offset = started.elapsed();
            let batch = runner.thermal_stress(remaining.min(THERMAL_SLICE))?;
            ctx.status().add_operations(1);
            samples.extend(batch.into_iter().map(|mut sample| {
                sample.elapsed += offset;
                sample
            }));
        }

        debug!("GPU thermal run kept {} samples", samples.len());
        if let Some(drift) = thermal_drift(&samples) {
            info!("GPU thermal drift: {:+.2}% per operation", drift);
            ctx.status().record_result(BenchmarkResult::thermal_drift(drift));
        }
        Ok(())
    }
}

impl ResourceWorker for GpuWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Gpu
    }

    fn run(&mut self, ctx: &WorkerContext) -> Result<()> {
        let mut runner = (self.factory)()?;
        let w = self.workload;

        ctx.running();
        info!("GPU worker using backend '{}'", runner.name());

        let throughput = BenchmarkResult::throughput(
            runner.measure_memory_throughput(w.throughput_size_mb, w.throughput_iterations)?,
        );
        info!("GPU memory throughput: {:.2} GB/s", throughput.value);
        ctx.status().record_result(throughput);
        ctx.status().add_operations(1);

        if ctx.should_stop() {
            return Ok(());
        }

        let concurrency = BenchmarkResult::concurrency(
            runner.measure_concurrency(w.streams, w.concurrency_size_mb)?,
        );
        info!("GPU concurrent throughput: {:.2} GB/s", concurrency.value);
        ctx.status().record_result(concurrency);
        ctx.status().add_operations(1);

        if !self.thermal.is_zero() {
            self.run_thermal(runner.as_mut(), ctx)?;
        }

        let mut iteration: u64 = 0;
        while !ctx.should_stop() {
            let gflops = runner.measure_compute_performance(w.matrix_size)?;
            iteration += 1;
            ctx.status().add_operations(1);

            if iteration == 1 || iteration % REPORT_EVERY == 0 {
                info!("GPU compute performance: {:.2} GFLOPS", gflops);
                ctx.status().record_result(BenchmarkResult::compute(gflops));
            }
        }

        Ok(())
    }
}
