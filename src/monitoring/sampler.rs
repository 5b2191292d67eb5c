//! System Metric Sampling
//!
//! Reads system-wide CPU, memory, disk and network figures from the OS.
//! The monitor only sees the [`SystemSampler`] trait, so tests can feed
//! it scripted snapshots.

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use log::debug;
use sysinfo::{Disks, Networks, System, MINIMUM_CPU_UPDATE_INTERVAL};

use crate::error::Result;

/// One reading from a [`SystemSampler`], before it is timestamped.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SystemSnapshot {
    /// Global CPU usage (0-100)
    pub cpu_percent: f64,
    /// Used memory as a share of total (0-100)
    pub memory_percent: f64,
    /// Used space on the root disk (0-100)
    pub disk_percent: f64,
    /// Cumulative bytes sent on all interfaces
    pub net_bytes_sent: u64,
    /// Cumulative bytes received on all interfaces
    pub net_bytes_recv: u64,
}

/// Produces one snapshot per call, blocking for a bounded time.
pub trait SystemSampler: Send {
    fn sample(&mut self) -> Result<SystemSnapshot>;
}

/// Builds a fresh sampler for each run.
pub type SamplerFactory = Arc<dyn Fn() -> Result<Box<dyn SystemSampler>> + Send + Sync>;

/// Factory for the OS-backed sampler.
pub fn sysinfo_factory() -> SamplerFactory {
    Arc::new(|| Ok(Box::new(SysinfoSampler::new()) as Box<dyn SystemSampler>))
}

/// Rounds a percentage to one decimal and clamps it to `[0, 100]`.
pub fn round_percent(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    ((value * 10.0).round() / 10.0).clamp(0.0, 100.0)
}

fn share(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_percent(used as f64 / total as f64 * 100.0)
}

/// Sampler backed by `sysinfo`.
pub struct SysinfoSampler {
    system: System,
    disks: Disks,
    networks: Networks,
    last_cpu_refresh: Instant,
}

impl SysinfoSampler {
    /// Creates a sampler and primes the CPU counters.
    ///
    /// CPU usage is a difference between two refreshes, so the first
    /// reading is only meaningful after this warmup.
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();

        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
            last_cpu_refresh: Instant::now(),
        }
    }

    /// Total physical memory in bytes, or 0 if it cannot be read.
    pub fn total_memory() -> u64 {
        let mut system = System::new();
        system.refresh_memory();
        system.total_memory()
    }

    fn cpu_percent(&mut self) -> f64 {
        let since = self.last_cpu_refresh.elapsed();
        if since < MINIMUM_CPU_UPDATE_INTERVAL {
            thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL - since);
        }
        self.system.refresh_cpu();
        self.last_cpu_refresh = Instant::now();
        round_percent(self.system.global_cpu_info().cpu_usage() as f64)
    }

    fn memory_percent(&mut self) -> f64 {
        self.system.refresh_memory();
        share(self.system.used_memory(), self.system.total_memory())
    }

    fn disk_percent(&mut self) -> f64 {
        self.disks.refresh();
        let root = Path::new("/");
        let disk = self
            .disks
            .iter()
            .find(|d| d.mount_point() == root)
            .or_else(|| self.disks.iter().next());

        match disk {
            Some(disk) => {
                let total = disk.total_space();
                share(total.saturating_sub(disk.available_space()), total)
            }
            None => {
                debug!("No disks visible to the sampler");
                0.0
            }
        }
    }

    fn network_totals(&mut self) -> (u64, u64) {
        self.networks.refresh();
        self.networks
            .iter()
            .fold((0u64, 0u64), |(sent, recv), (_name, data)| {
                (
                    sent.saturating_add(data.total_transmitted()),
                    recv.saturating_add(data.total_received()),
                )
            })
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemSampler for SysinfoSampler {
    fn sample(&mut self) -> Result<SystemSnapshot> {
        let cpu_percent = self.cpu_percent();
        let memory_percent = self.memory_percent();
        let disk_percent = self.disk_percent();
        let (net_bytes_sent, net_bytes_recv) = self.network_totals();

        Ok(SystemSnapshot {
            cpu_percent,
            memory_percent,
            disk_percent,
            net_bytes_sent,
            net_bytes_recv,
        })
    }
}
