//! Worker Lifecycle State
//!
//! Shared, lock-light status for one worker. The worker moves itself
//! `Starting -> Running -> Stopped | Failed`; the orchestrator only ever
//! requests `Stopping` or records an unclean stop.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::benchmark::BenchmarkResult;
use crate::error::StressError;

/// Faults kept per worker before further ones are only counted.
pub const MAX_FAULTS_PER_WORKER: usize = 32;

/// Resource a worker consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerKind {
    Cpu,
    Memory,
    Disk,
    Network,
    Gpu,
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::Disk => "disk",
            Self::Network => "network",
            Self::Gpu => "gpu",
        };
        f.write_str(name)
    }
}

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum WorkerState {
    Starting = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
    Failed = 4,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Starting,
            1 => Self::Running,
            2 => Self::Stopping,
            3 => Self::Stopped,
            _ => Self::Failed,
        }
    }

    /// Returns true for `Stopped` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A fault recorded against a worker.
#[derive(Debug, Clone)]
pub struct WorkerFault {
    pub at: DateTime<Local>,
    pub error: StressError,
}

#[derive(Debug, Default)]
struct FaultLog {
    faults: Vec<WorkerFault>,
    dropped: u64,
}

/// Shared status of one worker.
#[derive(Debug)]
pub struct WorkerStatus {
    kind: WorkerKind,
    index: usize,
    state: AtomicU8,
    operations: AtomicU64,
    failures: AtomicU64,
    bytes: AtomicU64,
    faults: Mutex<FaultLog>,
    results: Mutex<Vec<BenchmarkResult>>,
}

impl WorkerStatus {
    pub fn new(kind: WorkerKind, index: usize) -> Self {
        Self {
            kind,
            index,
            state: AtomicU8::new(WorkerState::Starting as u8),
            operations: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            faults: Mutex::new(FaultLog::default()),
            results: Mutex::new(Vec::new()),
        }
    }

    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// `Starting -> Running`. Returns false if the worker was already
    /// asked to stop or has failed.
    pub fn mark_running(&self) -> bool {
        self.transition(&[WorkerState::Starting], WorkerState::Running)
    }

    /// `Starting | Running -> Stopping`. Returns false if the worker is
    /// already stopping or finished.
    pub fn request_stop(&self) -> bool {
        self.transition(
            &[WorkerState::Starting, WorkerState::Running],
            WorkerState::Stopping,
        )
    }

    /// Moves to `Stopped` unless the worker has already failed.
    pub fn mark_stopped(&self) {
        self.transition(
            &[
                WorkerState::Starting,
                WorkerState::Running,
                WorkerState::Stopping,
            ],
            WorkerState::Stopped,
        );
    }

    /// Records `error` and moves to `Failed`.
    pub fn mark_failed(&self, error: StressError) {
        self.record_fault(error);
        self.state.store(WorkerState::Failed as u8, Ordering::SeqCst);
    }

    fn transition(&self, from: &[WorkerState], to: WorkerState) -> bool {
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            if !from.contains(&WorkerState::from_u8(current)) {
                return false;
            }
            match self.state.compare_exchange(
                current,
                to as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Records a non-fatal fault.
    pub fn record_fault(&self, error: StressError) {
        let mut log = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        if log.faults.len() < MAX_FAULTS_PER_WORKER {
            log.faults.push(WorkerFault {
                at: Local::now(),
                error,
            });
        } else {
            log.dropped += 1;
        }
    }

    pub fn faults(&self) -> Vec<WorkerFault> {
        self.faults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .faults
            .clone()
    }

    /// Faults that were counted but not kept.
    pub fn dropped_faults(&self) -> u64 {
        self.faults.lock().unwrap_or_else(|e| e.into_inner()).dropped
    }

    pub fn add_operations(&self, n: u64) {
        self.operations.fetch_add(n, Ordering::Relaxed);
    }

    pub fn operations(&self) -> u64 {
        self.operations.load(Ordering::Relaxed)
    }

    pub fn add_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn add_bytes(&self, n: u64) {
        self.bytes.fetch_add(n, Ordering::Relaxed);
    }

    pub fn set_bytes(&self, n: u64) {
        self.bytes.store(n, Ordering::Relaxed);
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn record_result(&self, result: BenchmarkResult) {
        self.results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(result);
    }

    pub fn results(&self) -> Vec<BenchmarkResult> {
        self.results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Short label like `cpu#2`.
    pub fn label(&self) -> String {
        format!("{}#{}", self.kind, self.index)
    }
}
