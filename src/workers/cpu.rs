//! CPU Stressor
//!
//! Saturates one logical core with integer arithmetic. No sleeping; the
//! stop flag is checked once per burst.

use std::hint::black_box;

use super::handle::{ResourceWorker, WorkerContext};
use super::status::WorkerKind;
use crate::error::Result;

/// Iterations between stop-flag checks.
const BURST: u64 = 200_000;

/// Tight arithmetic loop on one thread.
#[derive(Debug, Default)]
pub struct CpuWorker {
    seed: u64,
}

impl CpuWorker {
    pub fn new(index: usize) -> Self {
        Self {
            seed: 0x9e37_79b9_7f4a_7c15 ^ index as u64,
        }
    }
}

/// Runs `iterations` rounds of an LCG mixed with a rotate.
fn burn(mut x: u64, iterations: u64) -> u64 {
    for _ in 0..iterations {
        x = x
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407)
            .rotate_left(7);
    }
    x
}

impl ResourceWorker for CpuWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Cpu
    }

    fn run(&mut self, ctx: &WorkerContext) -> Result<()> {
        ctx.running();

        let mut x = self.seed;
        while !ctx.should_stop() {
            x = burn(black_box(x), BURST);
            ctx.status().add_operations(BURST);
        }

        black_box(x);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::{StopSignal, WorkerState, WorkerStatus};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_burn_is_deterministic() {
        assert_eq!(burn(1, 10), burn(1, 10));
        assert_ne!(burn(1, 10), burn(2, 10));
    }

    #[test]
    fn test_cpu_worker_stops_promptly() {
        let stop = StopSignal::new();
        let status = Arc::new(WorkerStatus::new(WorkerKind::Cpu, 0));
        let ctx = WorkerContext::new(stop.clone(), Arc::clone(&status));

        let handle = thread::spawn(move || {
            let mut worker = CpuWorker::new(0);
            worker.run(&ctx)
        });

        thread::sleep(Duration::from_millis(100));
        assert_eq!(status.state(), WorkerState::Running);

        let asked = Instant::now();
        stop.request();
        handle.join().unwrap().unwrap();

        assert!(asked.elapsed() < Duration::from_secs(1));
        assert!(status.operations() >= BURST);
    }
}
