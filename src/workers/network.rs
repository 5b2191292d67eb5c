//! Network Stressor
//!
//! Fetches a target URL over and over. Individual request failures are
//! counted and retried on the next cycle; they never end the worker.

use std::time::Duration;

use log::{debug, info};
use reqwest::Client;

use super::handle::{ResourceWorker, WorkerContext};
use super::signal::StopSignal;
use super::status::WorkerKind;
use crate::error::{Result, StressError};

/// How often the async loop re-checks the stop flag.
const STOP_POLL: Duration = Duration::from_millis(50);

/// Pause after a failed request so a dead target is not hammered in a
/// hot loop.
const FAILURE_BACKOFF: Duration = Duration::from_millis(100);

/// Repeated HTTP GET against one target.
#[derive(Debug, Clone)]
pub struct NetworkWorker {
    url: String,
    timeout: Duration,
}

impl NetworkWorker {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }

    async fn drive(&self, client: &Client, ctx: &WorkerContext) {
        while !ctx.should_stop() {
            tokio::select! {
                result = fetch(client, &self.url) => match result {
                    Ok(bytes) => {
                        ctx.status().add_operations(1);
                        ctx.status().add_bytes(bytes);
                    }
                    Err(e) => {
                        debug!("Network request to {} failed: {}", self.url, e);
                        ctx.status().add_failure();
                        ctx.status().record_fault(StressError::IoFailure {
                            operation: format!("GET {}", self.url),
                            message: e.to_string(),
                        });
                        tokio::select! {
                            _ = tokio::time::sleep(FAILURE_BACKOFF) => {}
                            _ = stop_requested(ctx.stop_signal()) => break,
                        }
                    }
                },
                _ = stop_requested(ctx.stop_signal()) => break,
            }
        }
    }
}

/// Downloads the full body and returns its size.
async fn fetch(client: &Client, url: &str) -> std::result::Result<u64, reqwest::Error> {
    let response = client.get(url).send().await?.error_for_status()?;
    let body = response.bytes().await?;
    Ok(body.len() as u64)
}

/// Resolves once the stop flag is set.
async fn stop_requested(stop: &StopSignal) {
    while !stop.is_set() {
        tokio::time::sleep(STOP_POLL).await;
    }
}

impl ResourceWorker for NetworkWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Network
    }

    fn run(&mut self, ctx: &WorkerContext) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StressError::io("build async runtime", &e))?;

        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| StressError::IoFailure {
                operation: "build HTTP client".to_string(),
                message: e.to_string(),
            })?;

        ctx.running();
        info!("Network worker fetching {}", self.url);

        runtime.block_on(self.drive(&client, ctx));

        info!(
            "Network worker done: {} requests ok, {} failed",
            ctx.status().operations(),
            ctx.status().failures()
        );
        Ok(())
    }
}
