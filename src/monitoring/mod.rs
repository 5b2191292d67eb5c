//! Resource Monitoring Module
//!
//! Samples system-wide utilization on a fixed cadence while workers run
//! and keeps the ordered history for reporting and export.
//!
//! # Components
//!
//! - [`SystemSampler`]: One-call snapshot of CPU, memory, disk and network
//! - [`MonitorLoop`]: Background sampling thread with an `Idle -> Running -> Stopped` lifecycle
//! - [`MetricLog`]: Append-only sample history, including gap markers

pub mod metrics;
pub mod monitor;
pub mod sampler;

pub use metrics::{MetricLog, MetricRecord, MetricSample, MetricSummary};
pub use monitor::{MonitorLoop, MonitorState};
pub use sampler::{
    round_percent, sysinfo_factory, SamplerFactory, SysinfoSampler, SystemSampler, SystemSnapshot,
};
