//! Monitor Loop
//!
//! Samples the system on its own thread at a fixed wall-clock cadence,
//! independent of worker activity. The thread owns the [`MetricLog`]
//! while running and hands it back when joined.

use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Local;
use log::{debug, info, warn};

use super::metrics::{MetricLog, MetricSample};
use super::sampler::SystemSampler;
use crate::error::{Result, StressError};
use crate::workers::StopSignal;

/// Shortest allowed tick.
const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Lifecycle of a monitor; transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Running,
    Stopped,
}

/// Periodic system sampler for one run.
pub struct MonitorLoop {
    interval: Duration,
    state: MonitorState,
    sampler: Option<Box<dyn SystemSampler>>,
    live: Option<Sender<MetricSample>>,
    stop: StopSignal,
    thread: Option<JoinHandle<MetricLog>>,
    log: MetricLog,
}

impl MonitorLoop {
    pub fn new(sampler: Box<dyn SystemSampler>, interval: Duration) -> Self {
        Self {
            interval: interval.max(MIN_INTERVAL),
            state: MonitorState::Idle,
            sampler: Some(sampler),
            live: None,
            stop: StopSignal::new(),
            thread: None,
            log: MetricLog::new(),
        }
    }

    /// Ends sampling as soon as `signal` is set, not only on [`stop`].
    ///
    /// The thread is still joined by [`stop`], so a run can stop its
    /// workers first without the log growing past the moment `signal`
    /// fired.
    ///
    /// [`stop`]: MonitorLoop::stop
    pub fn with_stop_signal(mut self, signal: StopSignal) -> Self {
        if self.state == MonitorState::Idle {
            self.stop = signal;
        }
        self
    }

    /// Forwards a copy of every sample to `feed` as it is taken.
    pub fn with_live_feed(mut self, feed: Sender<MetricSample>) -> Self {
        self.live = Some(feed);
        self
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Starts sampling. Fails unless the monitor is `Idle`.
    pub fn start(&mut self) -> Result<()> {
        if self.state != MonitorState::Idle {
            return Err(StressError::Sampler(format!(
                "monitor cannot start from state {:?}",
                self.state
            )));
        }
        let Some(sampler) = self.sampler.take() else {
            return Err(StressError::Sampler("monitor has no sampler".to_string()));
        };

        let interval = self.interval;
        let stop = self.stop.clone();
        let live = self.live.take();

        let handle = thread::Builder::new()
            .name("hwstress-monitor".to_string())
            .spawn(move || sample_until_stopped(sampler, interval, stop, live))
            .map_err(|e| StressError::io("spawn monitor thread", &e))?;

        info!("Monitor started (interval {:?})", interval);
        self.thread = Some(handle);
        self.state = MonitorState::Running;
        Ok(())
    }

    /// Stops sampling and waits for the monitor thread to exit.
    ///
    /// No entry is appended after this returns. Calling it again, or on
    /// a monitor that never started, only moves it to `Stopped`.
    pub fn stop(&mut self) -> &MetricLog {
        self.stop.request();

        if let Some(handle) = self.thread.take() {
            match handle.join() {
                Ok(log) => self.log = log,
                Err(_) => warn!("Monitor thread panicked; its samples are lost"),
            }
            info!(
                "Monitor stopped after {} samples ({} gaps)",
                self.log.sample_count(),
                self.log.gap_count()
            );
        }

        self.state = MonitorState::Stopped;
        &self.log
    }

    /// The collected log. Empty until the monitor has been stopped.
    pub fn log(&self) -> &MetricLog {
        &self.log
    }

    pub fn into_log(mut self) -> MetricLog {
        self.stop();
        std::mem::take(&mut self.log)
    }
}

impl Drop for MonitorLoop {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop();
        }
    }
}

fn sample_until_stopped(
    mut sampler: Box<dyn SystemSampler>,
    interval: Duration,
    stop: StopSignal,
    mut live: Option<Sender<MetricSample>>,
) -> MetricLog {
    let mut log = MetricLog::new();
    let mut next_tick = Instant::now();

    while !stop.is_set() {
        let taken_at = Local::now();
        match sampler.sample() {
            // Stop fired while sampling; the reading is already too late.
            _ if stop.is_set() => break,
            Ok(snapshot) => {
                let sample = log.push_sample(MetricSample::from_snapshot(taken_at, snapshot));
                if let Some(feed) = &live {
                    if feed.send(sample).is_err() {
                        debug!("Live metric feed closed");
                        live = None;
                    }
                }
            }
            Err(e) => {
                warn!("Missing metric sample: {}", e);
                log.push_gap(taken_at, e.to_string());
            }
        }

        // Wall-clock schedule; ticks missed by a slow sampler are skipped.
        let now = Instant::now();
        next_tick += interval;
        while next_tick <= now {
            next_tick += interval;
        }
        if stop.wait_timeout(next_tick - now) {
            break;
        }
    }

    log
}
