//! Resource Workers
//!
//! Each worker consumes one hardware resource on its own OS thread until
//! its [`StopSignal`] is set, then releases what it acquired.
//!
//! # Components
//!
//! - [`WorkerHandle`]: The orchestrator's exclusive handle to a worker thread
//! - [`WorkerStatus`]: Lifecycle state, counters and faults shared with the worker
//! - [`CpuWorker`], [`MemoryWorker`], [`DiskWorker`], [`NetworkWorker`],
//!   [`GpuWorker`]: The five stressors

pub mod cpu;
pub mod disk;
pub mod gpu;
pub mod handle;
pub mod memory;
pub mod network;
pub mod signal;
pub mod status;

pub use cpu::CpuWorker;
pub use disk::DiskWorker;
pub use gpu::{GpuWorker, GpuWorkload};
pub use handle::{ResourceWorker, WorkerContext, WorkerHandle};
pub use memory::{MemoryPlan, MemoryWorker};
pub use network::NetworkWorker;
pub use signal::StopSignal;
pub use status::{WorkerFault, WorkerKind, WorkerState, WorkerStatus, MAX_FAULTS_PER_WORKER};
