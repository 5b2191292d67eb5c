//! Worker Handles
//!
//! Spawns a [`ResourceWorker`] on its own OS thread and keeps the only
//! reference to that thread's lifetime.

use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};

use super::signal::StopSignal;
use super::status::{WorkerKind, WorkerState, WorkerStatus};
use crate::error::{Result, StressError};

/// A unit of work that consumes one resource until told to stop.
///
/// Implementations must check [`WorkerContext::should_stop`] often enough
/// to react within about a second, release everything they acquired
/// before returning, and call [`WorkerContext::running`] once their
/// setup has succeeded.
pub trait ResourceWorker: Send {
    fn kind(&self) -> WorkerKind;

    /// Temporary files the orchestrator removes at shutdown, even if the
    /// worker never gets the chance to.
    fn scratch_files(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    /// Runs until the stop signal is set. An `Err` marks the worker failed.
    fn run(&mut self, ctx: &WorkerContext) -> Result<()>;
}

/// What a running worker sees of the outside world.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    stop: StopSignal,
    status: Arc<WorkerStatus>,
}

impl WorkerContext {
    pub fn new(stop: StopSignal, status: Arc<WorkerStatus>) -> Self {
        Self { stop, status }
    }

    pub fn should_stop(&self) -> bool {
        self.stop.is_set()
    }

    /// Sleeps up to `timeout`; returns true if a stop was requested.
    pub fn pause(&self, timeout: Duration) -> bool {
        self.stop.wait_timeout(timeout)
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    pub fn status(&self) -> &WorkerStatus {
        &self.status
    }

    /// Reports that setup succeeded.
    pub fn running(&self) {
        if self.status.mark_running() {
            debug!("{} running", self.status.label());
        }
    }
}

/// Notifies the orchestrator when the worker thread exits, even by panic.
struct CompletionGuard {
    status: Arc<WorkerStatus>,
    done: Sender<usize>,
    slot: usize,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            self.status
                .mark_failed(StressError::Panicked(format!("{} panicked", self.status.label())));
        }
        self.status.mark_stopped();
        // The orchestrator may already have given up on us.
        let _ = self.done.send(self.slot);
    }
}

/// The orchestrator's exclusive handle to one worker.
pub struct WorkerHandle {
    slot: usize,
    status: Arc<WorkerStatus>,
    stop: StopSignal,
    thread: Option<JoinHandle<()>>,
    scratch_files: Vec<PathBuf>,
}

impl WorkerHandle {
    /// Spawns `worker` on a new named thread.
    ///
    /// `slot` is sent on `done` when the thread exits. If the thread
    /// cannot be created the handle comes back already `Failed` and the
    /// slot is reported done immediately.
    pub fn spawn(
        mut worker: Box<dyn ResourceWorker>,
        index: usize,
        slot: usize,
        done: Sender<usize>,
    ) -> Self {
        let kind = worker.kind();
        let status = Arc::new(WorkerStatus::new(kind, index));
        let stop = StopSignal::new();
        let scratch_files = worker.scratch_files();

        let ctx = WorkerContext::new(stop.clone(), Arc::clone(&status));
        let guard = CompletionGuard {
            status: Arc::clone(&status),
            done: done.clone(),
            slot,
        };

        let spawned = thread::Builder::new()
            .name(format!("hwstress-{}-{}", kind, index))
            .spawn(move || {
                let _guard = guard;
                info!("Starting {} worker #{}", kind, index);

                match worker.run(&ctx) {
                    Ok(()) => debug!("{} worker #{} finished", kind, index),
                    Err(e) => {
                        error!("{} worker #{} failed: {}", kind, index, e);
                        ctx.status().mark_failed(e);
                    }
                }
            });

        let thread = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("Could not start {} worker #{}: {}", kind, index, e);
                status.mark_failed(StressError::io("spawn worker thread", &e));
                let _ = done.send(slot);
                None
            }
        };

        Self {
            slot,
            status,
            stop,
            thread,
            scratch_files,
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn kind(&self) -> WorkerKind {
        self.status.kind()
    }

    pub fn state(&self) -> WorkerState {
        self.status.state()
    }

    pub fn status(&self) -> &Arc<WorkerStatus> {
        &self.status
    }

    /// Moves the worker to `Stopping` and raises its stop signal.
    ///
    /// Safe to call on failed or finished workers.
    pub fn signal_stop(&self) {
        if self.status.request_stop() {
            debug!("Stop requested for {}", self.status.label());
        }
        self.stop.request();
    }

    /// Joins the worker thread. Returns false if it panicked.
    pub fn join(&mut self) -> bool {
        match self.thread.take() {
            Some(handle) => handle.join().is_ok(),
            None => true,
        }
    }

    /// Gives up on a worker that ignored its stop signal.
    ///
    /// The thread is detached; the process exit reclaims it.
    pub fn abandon(&mut self, grace: Duration) {
        let error = StressError::UncleanStop {
            kind: self.kind(),
            index: self.status.index(),
            grace_ms: grace.as_millis(),
        };
        warn!("{}", error);
        self.status.mark_failed(error);
        self.thread.take();
    }

    /// Removes the worker's scratch files, if any remain.
    pub fn remove_scratch_files(&self) {
        for path in &self.scratch_files {
            if !path.exists() {
                continue;
            }
            match fs::remove_file(path) {
                Ok(()) => info!("Removed scratch file {}", path.display()),
                Err(e) => warn!("Failed to remove scratch file {}: {}", path.display(), e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    struct IdleWorker;

    impl ResourceWorker for IdleWorker {
        fn kind(&self) -> WorkerKind {
            WorkerKind::Cpu
        }

        fn run(&mut self, ctx: &WorkerContext) -> Result<()> {
            ctx.running();
            while !ctx.pause(Duration::from_millis(20)) {}
            Ok(())
        }
    }

    struct BrokenWorker;

    impl ResourceWorker for BrokenWorker {
        fn kind(&self) -> WorkerKind {
            WorkerKind::Gpu
        }

        fn run(&mut self, _ctx: &WorkerContext) -> Result<()> {
            Err(StressError::DeviceUnavailable("no device".to_string()))
        }
    }

    struct PanickyWorker;

    impl ResourceWorker for PanickyWorker {
        fn kind(&self) -> WorkerKind {
            WorkerKind::Memory
        }

        fn run(&mut self, _ctx: &WorkerContext) -> Result<()> {
            panic!("worker blew up");
        }
    }

    #[test]
    fn test_spawn_stop_join() {
        let (tx, rx) = channel();
        let mut handle = WorkerHandle::spawn(Box::new(IdleWorker), 0, 7, tx);

        handle.signal_stop();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
        assert!(handle.join());
        assert_eq!(handle.state(), WorkerState::Stopped);
    }

    #[test]
    fn test_failed_worker_reports_done() {
        let (tx, rx) = channel();
        let mut handle = WorkerHandle::spawn(Box::new(BrokenWorker), 0, 0, tx);

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 0);
        assert!(handle.join());
        assert_eq!(handle.state(), WorkerState::Failed);

        // Stopping a failed worker is harmless.
        handle.signal_stop();
        assert_eq!(handle.state(), WorkerState::Failed);
    }

    #[test]
    fn test_panicking_worker_is_failed() {
        let (tx, rx) = channel();
        let mut handle = WorkerHandle::spawn(Box::new(PanickyWorker), 0, 1, tx);

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);
        assert!(!handle.join());
        assert_eq!(handle.state(), WorkerState::Failed);
        assert!(matches!(
            handle.status().faults()[0].error,
            StressError::Panicked(_)
        ));
    }

    #[test]
    fn test_abandon_records_unclean_stop() {
        let (tx, _rx) = channel();
        let mut handle = WorkerHandle::spawn(Box::new(IdleWorker), 2, 0, tx);
        handle.abandon(Duration::from_millis(10));

        assert_eq!(handle.state(), WorkerState::Failed);
        assert!(matches!(
            handle.status().faults()[0].error,
            StressError::UncleanStop { index: 2, .. }
        ));
        handle.signal_stop();
    }

    #[test]
    fn test_remove_scratch_files() {
        struct ScratchWorker(PathBuf);

        impl ResourceWorker for ScratchWorker {
            fn kind(&self) -> WorkerKind {
                WorkerKind::Disk
            }

            fn scratch_files(&self) -> Vec<PathBuf> {
                vec![self.0.clone()]
            }

            fn run(&mut self, _ctx: &WorkerContext) -> Result<()> {
                fs::write(&self.0, b"scratch").map_err(|e| StressError::io("write", &e))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scratch.bin");
        let (tx, rx) = channel();
        let mut handle = WorkerHandle::spawn(Box::new(ScratchWorker(path.clone())), 0, 0, tx);

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        handle.join();
        assert!(path.exists());

        handle.remove_scratch_files();
        assert!(!path.exists());
    }
}
