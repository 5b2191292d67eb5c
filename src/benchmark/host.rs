//! Host-Simulated Device
//!
//! Implements the [`BenchmarkRunner`] contract with host memory and CPU
//! threads standing in for device buffers and queues. Useful on machines
//! without a GPU backend and for exercising the GPU worker in tests.

use std::hint::black_box;
use std::thread;
use std::time::{Duration, Instant};

use super::{
    aggregate_throughput, copy_throughput, matmul_gflops, BenchmarkRunner, ThermalSample,
};
use crate::error::{Result, StressError};

const MIB: usize = 1024 * 1024;

/// Multiplies timed per compute measurement.
const COMPUTE_ITERATIONS: usize = 10;

/// Side of the image rendered by the thermal kernel.
const THERMAL_SIDE: usize = 96;

/// Escape-time limit of the thermal kernel.
const THERMAL_MAX_ITER: u32 = 200;

/// CPU-backed stand-in for a compute device.
#[derive(Debug, Default)]
pub struct HostBenchmarkRunner;

impl HostBenchmarkRunner {
    pub fn new() -> Self {
        Self
    }
}

/// Allocates a zeroed "device" buffer, reporting failure instead of aborting.
fn device_alloc<T: Clone + Default>(len: usize) -> Result<Vec<T>> {
    if len == 0 {
        return Err(StressError::DeviceError(
            "buffer size must be greater than zero".to_string(),
        ));
    }
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|e| StressError::DeviceError(format!("allocation of {} elements failed: {}", len, e)))?;
    buf.resize(len, T::default());
    Ok(buf)
}

/// `c = a * b` for square `n x n` row-major matrices.
fn matmul(a: &[f32], b: &[f32], c: &mut [f32], n: usize) {
    c.iter_mut().for_each(|x| *x = 0.0);
    for i in 0..n {
        for k in 0..n {
            let aik = a[i * n + k];
            let row_b = &b[k * n..(k + 1) * n];
            let row_c = &mut c[i * n..(i + 1) * n];
            for (cj, bj) in row_c.iter_mut().zip(row_b) {
                *cj += aik * bj;
            }
        }
    }
}

/// Renders a small Mandelbrot image; returns the total escape count.
fn mandelbrot(side: usize, max_iter: u32) -> u64 {
    let mut total = 0u64;
    for py in 0..side {
        for px in 0..side {
            let cx = -2.0 + 3.0 * px as f64 / side as f64;
            let cy = -1.5 + 3.0 * py as f64 / side as f64;
            let (mut x, mut y) = (0.0f64, 0.0f64);
            let mut i = 0;
            while i < max_iter && x * x + y * y <= 4.0 {
                let xt = x * x - y * y + cx;
                y = 2.0 * x * y + cy;
                x = xt;
                i += 1;
            }
            total += i as u64;
        }
    }
    total
}

impl BenchmarkRunner for HostBenchmarkRunner {
    fn name(&self) -> &str {
        "host-simulated"
    }

    fn measure_memory_throughput(&mut self, size_mb: usize, iterations: usize) -> Result<f64> {
        let len = size_mb.saturating_mul(MIB);
        let mut src: Vec<u8> = device_alloc(len)?;
        let mut dst: Vec<u8> = device_alloc(len)?;
        for (i, b) in src.iter_mut().enumerate() {
            *b = i as u8;
        }

        // Warmup
        dst.copy_from_slice(&src);

        let start = Instant::now();
        for _ in 0..iterations {
            dst.copy_from_slice(black_box(&src));
            black_box(&mut dst);
        }
        let elapsed = start.elapsed();

        Ok(copy_throughput(len as u64, iterations as u64, elapsed))
    }

    fn measure_compute_performance(&mut self, matrix_size: usize) -> Result<f64> {
        let n = matrix_size;
        let elements = n.checked_mul(n).ok_or_else(|| {
            StressError::DeviceError(format!("matrix size {} overflows", n))
        })?;

        let mut a: Vec<f32> = device_alloc(elements)?;
        let mut b: Vec<f32> = device_alloc(elements)?;
        let mut c: Vec<f32> = device_alloc(elements)?;
        for (i, (x, y)) in a.iter_mut().zip(b.iter_mut()).enumerate() {
            *x = (i % 7) as f32 * 0.5;
            *y = (i % 5) as f32 * 0.25;
        }

        // Warmup
        matmul(&a, &b, &mut c, n);

        let start = Instant::now();
        for _ in 0..COMPUTE_ITERATIONS {
            matmul(black_box(&a), black_box(&b), &mut c, n);
        }
        let elapsed = start.elapsed();
        black_box(&c);

        let n = n as u64;
        Ok(matmul_gflops(n, n, n, COMPUTE_ITERATIONS as u64, elapsed))
    }

    fn measure_concurrency(&mut self, stream_count: usize, size_mb: usize) -> Result<f64> {
        if stream_count == 0 {
            return Err(StressError::DeviceError(
                "at least one stream is required".to_string(),
            ));
        }
        let len = size_mb.saturating_mul(MIB) / 4;

        let mut host_buffers = Vec::with_capacity(stream_count);
        let mut device_buffers = Vec::with_capacity(stream_count);
        for stream in 0..stream_count {
            let mut host: Vec<f32> = device_alloc(len)?;
            host.iter_mut()
                .enumerate()
                .for_each(|(i, x)| *x = (i + stream) as f32);
            host_buffers.push(host);
            device_buffers.push(device_alloc::<f32>(len)?);
        }

        let start = Instant::now();
        let outcome: std::result::Result<(), ()> = thread::scope(|scope| {
            let queues: Vec<_> = host_buffers
                .iter()
                .zip(device_buffers.iter_mut())
                .enumerate()
                .map(|(stream, (host, device))| {
                    scope.spawn(move || {
                        device.copy_from_slice(host);
                        let factor = 1.0 + stream as f32 * 1e-3;
                        device.iter_mut().for_each(|x| *x = *x * factor + 1.0);
                        black_box(&device);
                    })
                })
                .collect();

            queues
                .into_iter()
                .map(|q| q.join().map_err(|_| ()))
                .collect()
        });
        let elapsed = start.elapsed();

        outcome.map_err(|_| StressError::DeviceError("a stream failed to complete".to_string()))?;

        let total = (len * 4 * stream_count) as u64;
        Ok(aggregate_throughput(total, elapsed))
    }

    fn thermal_stress(&mut self, duration: Duration) -> Result<Vec<ThermalSample>> {
        let start = Instant::now();
        let mut samples = Vec::new();
        let mut iteration = 0u64;

        while start.elapsed() < duration {
            let op_start = Instant::now();
            black_box(mandelbrot(THERMAL_SIDE, THERMAL_MAX_ITER));
            let per_operation = op_start.elapsed();

            iteration += 1;
            if iteration % 10 == 0 {
                samples.push(ThermalSample {
                    elapsed: start.elapsed(),
                    per_operation,
                    iteration,
                });
            }
        }

        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matmul_identity() {
        let n = 3;
        let a: Vec<f32> = (0..9).map(|x| x as f32).collect();
        let mut identity = vec![0.0f32; 9];
        for i in 0..n {
            identity[i * n + i] = 1.0;
        }
        let mut c = vec![0.0f32; 9];
        matmul(&a, &identity, &mut c, n);
        assert_eq!(c, a);
    }

    #[test]
    fn test_memory_throughput_positive() {
        let mut runner = HostBenchmarkRunner::new();
        let gbps = runner.measure_memory_throughput(2, 3).unwrap();
        assert!(gbps > 0.0);
        assert!(gbps.is_finite());
    }

    #[test]
    fn test_zero_size_is_device_error() {
        let mut runner = HostBenchmarkRunner::new();
        assert!(matches!(
            runner.measure_memory_throughput(0, 3),
            Err(StressError::DeviceError(_))
        ));
        assert!(matches!(
            runner.measure_compute_performance(0),
            Err(StressError::DeviceError(_))
        ));
    }

    #[test]
    fn test_compute_performance_positive() {
        let mut runner = HostBenchmarkRunner::new();
        let gflops = runner.measure_compute_performance(24).unwrap();
        assert!(gflops > 0.0);
    }

    #[test]
    fn test_concurrency() {
        let mut runner = HostBenchmarkRunner::new();
        let gbps = runner.measure_concurrency(3, 1).unwrap();
        assert!(gbps > 0.0);

        assert!(runner.measure_concurrency(0, 1).is_err());
    }

    #[test]
    fn test_thermal_samples_every_tenth_iteration() {
        let mut runner = HostBenchmarkRunner::new();
        let samples = runner.thermal_stress(Duration::from_millis(200)).unwrap();

        for (i, sample) in samples.iter().enumerate() {
            assert_eq!(sample.iteration, (i as u64 + 1) * 10);
            assert!(sample.per_operation <= sample.elapsed);
        }
        for pair in samples.windows(2) {
            assert!(pair[0].elapsed <= pair[1].elapsed);
        }
    }

    #[test]
    fn test_mandelbrot_is_deterministic() {
        assert_eq!(mandelbrot(16, 50), mandelbrot(16, 50));
        assert!(mandelbrot(16, 50) > 0);
    }
}
