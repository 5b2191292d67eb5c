//! Run Orchestration
//!
//! Turns a [`RunConfig`] into running workers plus a monitor, and owns
//! the only path that shuts them down. Shutdown always runs in the same
//! order:
//!
//! 1. cancel the run, which also ends sampling, and raise every
//!    worker's stop signal
//! 2. wait up to the grace period for workers to report done
//! 3. join finished workers, abandon stragglers as `UncleanStop`
//! 4. remove scratch files
//! 5. stop the monitor
//!
//! # Example
//!
//! ```rust,no_run
//! use hwstress::config::RunConfig;
//! use hwstress::execution::Orchestrator;
//!
//! let config = RunConfig {
//!     cpu_workers: 2,
//!     duration_secs: 10,
//!     ..RunConfig::default()
//! };
//!
//! let mut handle = Orchestrator::new().start(config)?;
//! let deadline = handle.deadline();
//! let report = handle.await_completion(deadline);
//! println!("{}", report.render());
//! # Ok::<(), hwstress::StressError>(())
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use chrono::Local;
use log::{debug, info, warn};

use super::report::{CompletionReason, RunReport, WorkerSummary};
use super::signals::{self, CancelToken, SignalRegistration};
use crate::benchmark::{host_factory, unavailable_factory, RunnerFactory};
use crate::config::{validate_config, RunConfig, MIB};
use crate::error::{Result, StressError};
use crate::monitoring::{
    sysinfo_factory, MetricSample, MonitorLoop, MonitorState, SamplerFactory, SysinfoSampler,
    SystemSampler, SystemSnapshot,
};
use crate::workers::{
    CpuWorker, DiskWorker, GpuWorker, GpuWorkload, MemoryPlan, MemoryWorker, NetworkWorker,
    ResourceWorker, WorkerHandle, WorkerState,
};

/// Distinguishes scratch files of runs started by the same process.
static DISK_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Stands in for a sampler that could not be built, so every tick
/// becomes a gap instead of the run failing.
struct UnavailableSampler(String);

impl SystemSampler for UnavailableSampler {
    fn sample(&mut self) -> Result<SystemSnapshot> {
        Err(StressError::Sampler(self.0.clone()))
    }
}

/// Starts runs.
///
/// Holds the pluggable parts (device backend, sampler, signal wiring);
/// each [`Orchestrator::start`] produces an independent [`RunHandle`].
pub struct Orchestrator {
    runner_factory: RunnerFactory,
    sampler_factory: SamplerFactory,
    gpu_workload: Option<GpuWorkload>,
    handle_signals: bool,
    live_feed: Option<Sender<MetricSample>>,
    total_memory: Option<u64>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    /// Orchestrator with the OS sampler and no GPU backend.
    pub fn new() -> Self {
        Self {
            runner_factory: unavailable_factory(),
            sampler_factory: sysinfo_factory(),
            gpu_workload: None,
            handle_signals: false,
            live_feed: None,
            total_memory: None,
        }
    }

    /// Sets the device backend used by GPU workers.
    pub fn set_runner_factory(&mut self, factory: RunnerFactory) {
        self.runner_factory = factory;
    }

    pub fn set_sampler_factory(&mut self, factory: SamplerFactory) {
        self.sampler_factory = factory;
    }

    /// Overrides the GPU measurement sizes.
    pub fn set_gpu_workload(&mut self, workload: GpuWorkload) {
        self.gpu_workload = Some(workload);
    }

    /// Routes SIGINT/SIGTERM to the runs this orchestrator starts.
    pub fn set_handle_signals(&mut self, enabled: bool) {
        self.handle_signals = enabled;
    }

    /// Sends every metric sample of the next run to `feed` as well.
    pub fn set_live_feed(&mut self, feed: Sender<MetricSample>) {
        self.live_feed = Some(feed);
    }

    /// Overrides the total memory used for the safety ceiling.
    pub fn set_total_memory(&mut self, bytes: u64) {
        self.total_memory = Some(bytes);
    }

    /// Validates `config` and starts every requested worker and the
    /// monitor.
    ///
    /// Only an invalid configuration is an error; workers that fail to
    /// start are recorded as `Failed` on their handle.
    pub fn start(&mut self, config: RunConfig) -> Result<RunHandle> {
        let total_memory = self.total_memory.unwrap_or_else(SysinfoSampler::total_memory);
        validate_config(&config, total_memory)?;

        let started = Instant::now();
        let started_at = Local::now();
        let cancel = CancelToken::new();
        let mut warnings = Vec::new();

        let signal_guard = if self.handle_signals {
            match signals::register(&cancel) {
                Ok(guard) => Some(guard),
                Err(e) => {
                    warn!("Interrupts will not stop the run: {}", e);
                    warnings.push(e.to_string());
                    None
                }
            }
        } else {
            None
        };

        let sampler = (self.sampler_factory)().unwrap_or_else(|e| {
            warn!("System sampler unavailable: {}", e);
            warnings.push(e.to_string());
            Box::new(UnavailableSampler(e.to_string())) as Box<dyn SystemSampler>
        });

        let (done_tx, done_rx) = channel();
        let mut workers = Vec::new();
        for (index, worker) in self.build_workers(&config) {
            let slot = workers.len();
            workers.push(WorkerHandle::spawn(worker, index, slot, done_tx.clone()));
        }
        drop(done_tx);

        info!(
            "Started {} workers ({} CPU){}",
            workers.len(),
            config.cpu_workers,
            if config.is_monitor_only() {
                ", monitor only"
            } else {
                ""
            }
        );

        // Samples end at cancellation; the thread is joined after the workers.
        let mut monitor = MonitorLoop::new(sampler, config.monitor_interval())
            .with_stop_signal(cancel.clone());
        if let Some(feed) = self.live_feed.take() {
            monitor = monitor.with_live_feed(feed);
        }
        if let Err(e) = monitor.start() {
            warn!("Monitor failed to start: {}", e);
            warnings.push(e.to_string());
        }

        Ok(RunHandle {
            config,
            started,
            started_at,
            cancel,
            workers,
            done_rx,
            monitor,
            warnings,
            report: None,
            _signal_guard: signal_guard,
        })
    }

    /// Stops `handle`'s run. See [`RunHandle::stop`].
    pub fn stop<'h>(&self, handle: &'h mut RunHandle) -> &'h RunReport {
        handle.stop()
    }

    /// Waits for `handle`'s run. See [`RunHandle::await_completion`].
    pub fn await_completion<'h>(
        &self,
        handle: &'h mut RunHandle,
        deadline: Option<Duration>,
    ) -> &'h RunReport {
        handle.await_completion(deadline)
    }

    /// One worker per requested resource, paired with its per-kind index.
    fn build_workers(&self, config: &RunConfig) -> Vec<(usize, Box<dyn ResourceWorker>)> {
        let mut workers: Vec<(usize, Box<dyn ResourceWorker>)> = Vec::new();

        for index in 0..config.cpu_workers {
            workers.push((index, Box::new(CpuWorker::new(index))));
        }

        if config.memory_mib > 0 {
            let plan = MemoryPlan::new(config.memory_bytes());
            workers.push((0, Box::new(MemoryWorker::new(plan))));
        }

        if config.disk_mib > 0 {
            let chunk = config
                .disk_chunk_mib
                .saturating_mul(MIB)
                .min(config.disk_bytes());
            let seq = DISK_SEQ.fetch_add(1, Ordering::Relaxed);
            let dir: PathBuf = config.scratch_dir();
            let worker = DiskWorker::new(&dir, config.disk_bytes(), chunk as usize, seq);
            workers.push((0, Box::new(worker)));
        }

        if let Some(url) = &config.network_target {
            let worker = NetworkWorker::new(url.clone(), config.network_timeout());
            workers.push((0, Box::new(worker)));
        }

        if config.gpu_enabled {
            let (factory, default_workload) = if config.gpu_simulate {
                (host_factory(), GpuWorkload::host())
            } else {
                (self.runner_factory.clone(), GpuWorkload::default())
            };
            let workload = self.gpu_workload.unwrap_or(default_workload);
            let worker = GpuWorker::new(factory, workload).with_thermal(config.gpu_thermal());
            workers.push((0, Box::new(worker)));
        }

        workers
    }
}

/// One run in progress, or finished.
///
/// The handle exclusively owns the worker threads and the monitor. Once
/// stopped it keeps the [`RunReport`].
pub struct RunHandle {
    config: RunConfig,
    started: Instant,
    started_at: chrono::DateTime<Local>,
    cancel: CancelToken,
    workers: Vec<WorkerHandle>,
    done_rx: Receiver<usize>,
    monitor: MonitorLoop,
    warnings: Vec<String>,
    report: Option<RunReport>,
    _signal_guard: Option<SignalRegistration>,
}

impl RunHandle {
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Token that ends the run early when cancelled from any thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn workers(&self) -> &[WorkerHandle] {
        &self.workers
    }

    pub fn monitor_state(&self) -> MonitorState {
        self.monitor.state()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// The configured run length, or `None` for an open-ended
    /// monitor-only run.
    pub fn deadline(&self) -> Option<Duration> {
        if self.config.duration_secs == 0 && self.config.is_monitor_only() {
            None
        } else {
            Some(self.config.duration())
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.report.is_some()
    }

    pub fn report(&self) -> Option<&RunReport> {
        self.report.as_ref()
    }

    /// Blocks until `deadline` (measured from start) passes or the run is
    /// cancelled, then stops it. `None` waits for cancellation only.
    pub fn await_completion(&mut self, deadline: Option<Duration>) -> &RunReport {
        match self.report {
            Some(ref report) => report,
            None => {
                let cancelled = match deadline {
                    Some(limit) => {
                        let remaining = limit.saturating_sub(self.started.elapsed());
                        self.cancel.wait_timeout(remaining)
                    }
                    None => {
                        self.cancel.wait();
                        true
                    }
                };

                let reason = if cancelled {
                    CompletionReason::Interrupted
                } else {
                    CompletionReason::DeadlineReached
                };
                info!("Run ending: {:?}", reason);
                let report = self.shutdown(reason);
                &*self.report.insert(report)
            }
        }
    }

    /// Stops every worker and the monitor and returns the report.
    ///
    /// Calling it again returns the same report without doing anything.
    pub fn stop(&mut self) -> &RunReport {
        match self.report {
            Some(ref report) => report,
            None => {
                let reason = if self.cancel.is_set() {
                    CompletionReason::Interrupted
                } else {
                    CompletionReason::Stopped
                };
                let report = self.shutdown(reason);
                &*self.report.insert(report)
            }
        }
    }

    fn shutdown(&mut self, reason: CompletionReason) -> RunReport {
        self.cancel.cancel();
        let grace = self.config.grace_period();

        for worker in &self.workers {
            worker.signal_stop();
        }

        let finished = self.collect_finished(grace);
        for (worker, done) in self.workers.iter_mut().zip(finished) {
            if done {
                if !worker.join() {
                    debug!("{} panicked", worker.status().label());
                }
            } else {
                worker.abandon(grace);
                self.warnings.push(format!(
                    "{} did not stop within {} ms and was abandoned",
                    worker.status().label(),
                    grace.as_millis()
                ));
            }
        }

        for worker in &self.workers {
            worker.remove_scratch_files();
        }
        let workers_stopped_at = Local::now();

        let metrics = self.monitor.stop().clone();
        let monitor_stopped_at = Local::now();
        self._signal_guard = None;

        let workers: Vec<WorkerSummary> = self
            .workers
            .iter()
            .map(|w| WorkerSummary::from_status(w.status()))
            .collect();
        debug_assert!(workers.iter().all(|w| w.state != WorkerState::Running));

        let report = RunReport {
            config: self.config.clone(),
            started_at: self.started_at,
            finished_at: Local::now(),
            reason,
            workers,
            warnings: std::mem::take(&mut self.warnings),
            metrics,
            workers_stopped_at,
            monitor_stopped_at,
        };
        info!(
            "Run finished in {:.1}s: {} workers, {} failed",
            self.started.elapsed().as_secs_f64(),
            report.workers.len(),
            report.failed_workers()
        );
        report
    }

    /// Waits up to `grace` for every worker thread to report done.
    fn collect_finished(&self, grace: Duration) -> Vec<bool> {
        let mut finished = vec![false; self.workers.len()];
        let deadline = Instant::now() + grace;

        while finished.iter().any(|done| !done) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match self.done_rx.recv_timeout(deadline - now) {
                Ok(slot) => {
                    if let Some(done) = finished.get_mut(slot) {
                        *done = true;
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        finished
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        if self.report.is_none() {
            debug!("Run handle dropped while running; stopping");
            self.stop();
        }
    }
}
