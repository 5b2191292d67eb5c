//! Stop Signal
//!
//! A write-once flag shared between the orchestrator and a worker.
//! Workers poll [`StopSignal::is_set`] in their hot loops and use
//! [`StopSignal::wait_timeout`] instead of `thread::sleep` so that a
//! stop request wakes them immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Inner {
    fired: AtomicBool,
    lock: Mutex<bool>,
    cvar: Condvar,
}

/// Cloneable, write-once stop flag.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag and wakes every waiter.
    ///
    /// Returns `true` only for the call that actually set it, which makes
    /// the signal usable as a single-trigger guard.
    pub fn request(&self) -> bool {
        let first = !self.inner.fired.swap(true, Ordering::SeqCst);
        let mut set = self.inner.lock.lock().unwrap_or_else(|e| e.into_inner());
        *set = true;
        self.inner.cvar.notify_all();
        first
    }

    /// Same as [`request`](Self::request), under the name a run-wide
    /// cancellation token uses.
    pub fn cancel(&self) -> bool {
        self.request()
    }

    pub fn is_set(&self) -> bool {
        self.inner.fired.load(Ordering::Relaxed)
    }

    /// Blocks for at most `timeout`, returning early if the flag is set.
    ///
    /// Returns `true` if the flag is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut set = self.inner.lock.lock().unwrap_or_else(|e| e.into_inner());

        while !*set {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = self
                .inner
                .cvar
                .wait_timeout(set, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            set = guard;
        }

        *set
    }

    /// Returns true if both handles refer to the same flag.
    pub fn same_as(&self, other: &StopSignal) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Blocks until the flag is set.
    pub fn wait(&self) {
        let mut set = self.inner.lock.lock().unwrap_or_else(|e| e.into_inner());
        while !*set {
            set = self.inner.cvar.wait(set).unwrap_or_else(|e| e.into_inner());
        }
    }
}
