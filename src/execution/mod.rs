//! Run Execution Module
//!
//! Starts, supervises and tears down a stress run.
//!
//! # Architecture
//!
//! - [`orchestrator`]: Builds workers from a config and owns the shutdown path
//! - [`signals`]: Process-wide SIGINT/SIGTERM forwarding to the active run
//! - [`report`]: What a finished run hands to the CLI and exporters

pub mod orchestrator;
pub mod report;
pub mod signals;

pub use orchestrator::{Orchestrator, RunHandle};
pub use report::{CompletionReason, RunReport, WorkerSummary};
pub use signals::{CancelToken, SignalRegistration};
