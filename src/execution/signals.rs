//! Interrupt Handling
//!
//! SIGINT and SIGTERM cancel the active run's [`CancelToken`]. The handler
//! is installed once per process and never does cleanup itself: the
//! thread blocked in `await_completion` wakes up and performs the
//! shutdown, so a second signal only finds the token already set.

use std::sync::Mutex;

use log::{debug, info, warn};
use once_cell::sync::{Lazy, OnceCell};

use crate::error::{Result, StressError};
use crate::workers::StopSignal;

/// Run-wide cancellation request. `cancel` is single-trigger: only the
/// first caller gets `true`.
pub type CancelToken = StopSignal;

/// Token of the run currently receiving interrupts.
static ACTIVE: Lazy<Mutex<Option<CancelToken>>> = Lazy::new(|| Mutex::new(None));

/// Outcome of the one-time handler installation.
static INSTALLED: OnceCell<std::result::Result<(), String>> = OnceCell::new();

/// Routes interrupts to `token` until the returned guard is dropped.
pub fn register(token: &CancelToken) -> Result<SignalRegistration> {
    install_handler()?;

    let mut active = ACTIVE.lock().unwrap_or_else(|e| e.into_inner());
    if active.is_some() {
        warn!("Another run was receiving interrupts; redirecting them to the new run");
    }
    *active = Some(token.clone());

    Ok(SignalRegistration {
        token: token.clone(),
    })
}

fn install_handler() -> Result<()> {
    INSTALLED
        .get_or_init(|| {
            ctrlc::set_handler(deliver_interrupt).map_err(|e| e.to_string())?;
            debug!("Interrupt handler installed");
            Ok(())
        })
        .clone()
        .map_err(|message| StressError::IoFailure {
            operation: "install signal handler".to_string(),
            message,
        })
}

/// What the signal handler does; exposed so the path can be exercised
/// without raising a real signal.
pub fn deliver_interrupt() {
    let active = ACTIVE.lock().unwrap_or_else(|e| e.into_inner());
    match active.as_ref() {
        Some(token) if token.cancel() => info!("Interrupt received, stopping run"),
        Some(_) => debug!("Interrupt received while already stopping; ignored"),
        None => debug!("Interrupt received with no active run"),
    }
}

/// Keeps a run registered for interrupts.
#[derive(Debug)]
pub struct SignalRegistration {
    token: CancelToken,
}

impl Drop for SignalRegistration {
    fn drop(&mut self) {
        let mut active = ACTIVE.lock().unwrap_or_else(|e| e.into_inner());
        if active.as_ref().is_some_and(|t| t.same_as(&self.token)) {
            *active = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test touches the process-wide handler so nothing races on it.
    #[test]
    fn test_interrupt_cancels_active_run_once() {
        let token = CancelToken::new();
        let registration = register(&token).unwrap();

        deliver_interrupt();
        assert!(token.is_set());
        // A second interrupt finds the token already set.
        deliver_interrupt();
        assert!(!token.cancel());

        drop(registration);
        assert!(ACTIVE.lock().unwrap().is_none());

        // Installing again reuses the existing handler.
        let other = CancelToken::new();
        let registration = register(&other).unwrap();
        drop(registration);
        deliver_interrupt();
        assert!(!other.is_set());
    }
}
