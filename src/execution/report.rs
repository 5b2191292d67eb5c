//! Run Report
//!
//! Everything a finished run leaves behind: each worker's terminal state
//! and faults, benchmark results, warnings and the full metric log.

use std::fmt::Write as _;

use chrono::{DateTime, Local};
use colored::Colorize;
use serde::Serialize;

use crate::benchmark::BenchmarkResult;
use crate::config::RunConfig;
use crate::monitoring::MetricLog;
use crate::workers::{WorkerFault, WorkerKind, WorkerState, WorkerStatus};

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompletionReason {
    /// The configured duration elapsed
    DeadlineReached,
    /// An interrupt or external cancellation arrived first
    Interrupted,
    /// `stop` was called directly
    Stopped,
}

/// Final state of one worker.
#[derive(Debug, Clone)]
pub struct WorkerSummary {
    pub kind: WorkerKind,
    pub index: usize,
    pub state: WorkerState,
    pub operations: u64,
    pub failures: u64,
    pub bytes: u64,
    pub faults: Vec<WorkerFault>,
    pub dropped_faults: u64,
    pub results: Vec<BenchmarkResult>,
}

impl WorkerSummary {
    pub fn from_status(status: &WorkerStatus) -> Self {
        Self {
            kind: status.kind(),
            index: status.index(),
            state: status.state(),
            operations: status.operations(),
            failures: status.failures(),
            bytes: status.bytes(),
            faults: status.faults(),
            dropped_faults: status.dropped_faults(),
            results: status.results(),
        }
    }

    pub fn label(&self) -> String {
        format!("{}#{}", self.kind, self.index)
    }
}

/// Result of a complete run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub config: RunConfig,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub reason: CompletionReason,
    pub workers: Vec<WorkerSummary>,
    pub warnings: Vec<String>,
    pub metrics: MetricLog,
    /// When the last worker was joined or abandoned
    pub workers_stopped_at: DateTime<Local>,
    /// When the monitor thread was joined
    pub monitor_stopped_at: DateTime<Local>,
}

impl RunReport {
    pub fn workers_of(&self, kind: WorkerKind) -> impl Iterator<Item = &WorkerSummary> {
        self.workers.iter().filter(move |w| w.kind == kind)
    }

    pub fn failed_workers(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| w.state == WorkerState::Failed)
            .count()
    }

    pub fn total_faults(&self) -> u64 {
        self.workers
            .iter()
            .map(|w| w.faults.len() as u64 + w.dropped_faults)
            .sum()
    }

    /// Wall time from start to the end of shutdown.
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// Human-readable report for the terminal.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let elapsed = self.elapsed().num_milliseconds() as f64 / 1000.0;

        let _ = writeln!(out, "{}", "Run Report".bold());
        let _ = writeln!(
            out,
            "  Started:  {}",
            self.started_at.format("%Y-%m-%d %H:%M:%S")
        );
        let _ = writeln!(out, "  Duration: {:.1}s ({:?})", elapsed, self.reason);
        let _ = writeln!(out);

        if self.workers.is_empty() {
            let _ = writeln!(out, "Workers: none (monitor-only run)");
        } else {
            let _ = writeln!(out, "Workers:");
        }
        for worker in &self.workers {
            let state = match worker.state {
                WorkerState::Stopped => worker.state.to_string().green(),
                WorkerState::Failed => worker.state.to_string().red(),
                _ => worker.state.to_string().yellow(),
            };
            let _ = writeln!(
                out,
                "  {:<10} {:<8} ops={} failures={} bytes={}",
                worker.label(),
                state,
                worker.operations,
                worker.failures,
                worker.bytes
            );
            for result in &worker.results {
                let _ = writeln!(out, "      {}", result);
            }
            for fault in &worker.faults {
                let _ = writeln!(
                    out,
                    "      [{}] {} {}",
                    fault.at.format("%H:%M:%S"),
                    fault.error.kind_name(),
                    fault.error
                );
            }
            if worker.dropped_faults > 0 {
                let _ = writeln!(out, "      ... {} more faults", worker.dropped_faults);
            }
        }

        if !self.warnings.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Warnings:");
            for warning in &self.warnings {
                let _ = writeln!(out, "  {} {}", "!".yellow(), warning);
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "{}", self.metrics.summary());
        out
    }
}
