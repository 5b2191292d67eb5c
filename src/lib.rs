//! hwstress - Multi-Resource Hardware Stress Harness
//!
//! Drives CPU, memory, disk, network and GPU toward saturation at the
//! same time, while a background monitor samples system utilization on
//! a fixed cadence for live display and export.
//!
//! # Architecture
//!
//! The library is organized into six modules:
//!
//! - [`config`]: Run configuration, size parsing and validation
//! - [`workers`]: The five resource stressors and their lifecycle
//! - [`benchmark`]: Device measurement contract used by the GPU worker
//! - [`monitoring`]: System sampling and the metric log
//! - [`execution`]: Orchestrator, shutdown ordering and interrupts
//! - [`export`]: CSV and JSON output of the metric log
//!
//! # Example
//!
//! ```rust,no_run
//! use hwstress::{parse_size, Orchestrator, RunConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RunConfig {
//!         cpu_workers: 4,
//!         memory_mib: parse_size("2G")?,
//!         duration_secs: 30,
//!         ..RunConfig::default()
//!     };
//!
//!     let mut orchestrator = Orchestrator::new();
//!     orchestrator.set_handle_signals(true);
//!
//!     let mut run = orchestrator.start(config)?;
//!     let deadline = run.deadline();
//!     let report = run.await_completion(deadline);
//!
//!     println!("{}", report.render());
//!     hwstress::export::write_csv(&report.metrics, "metrics.csv")?;
//!     Ok(())
//! }
//! ```

pub mod benchmark;
pub mod config;
pub mod error;
pub mod execution;
pub mod export;
pub mod monitoring;
pub mod workers;

// Re-export commonly used types
pub use config::{load_config, parse_size, RunConfig};
pub use error::{Result, StressError};
pub use execution::{Orchestrator, RunHandle, RunReport};
pub use monitoring::{MetricLog, MetricSample};
pub use workers::{WorkerKind, WorkerState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "hwstress";
