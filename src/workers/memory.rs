//! Memory Stressor
//!
//! Allocates the configured amount in fixed-size blocks, writes every
//! page to defeat lazy allocation, then holds the memory until stopped.
//! A failed allocation keeps whatever was already obtained.

use std::time::Duration;

use log::{info, warn};
use sysinfo::System;

use super::handle::{ResourceWorker, WorkerContext};
use super::status::WorkerKind;
use crate::config::GIB;
use crate::error::{Result, StressError};

/// Stride used when touching allocated memory.
const PAGE_SIZE: usize = 4096;

/// Memory kept free for the rest of the system.
const DEFAULT_HEADROOM: u64 = 256 * 1024 * 1024;

/// How often held memory is re-touched.
const HOLD_TICK: Duration = Duration::from_millis(250);

/// Allocation plan for the memory worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryPlan {
    /// Total bytes to hold
    pub total_bytes: u64,
    /// Size of each allocation unit
    pub block_bytes: u64,
    /// Bytes of available memory that must remain after each block
    pub headroom_bytes: u64,
}

impl MemoryPlan {
    /// Plan for `total_bytes` in 1 GiB blocks.
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            block_bytes: GIB,
            headroom_bytes: DEFAULT_HEADROOM,
        }
    }

    pub fn with_block_bytes(mut self, block_bytes: u64) -> Self {
        self.block_bytes = block_bytes.max(1);
        self
    }

    pub fn with_headroom(mut self, headroom_bytes: u64) -> Self {
        self.headroom_bytes = headroom_bytes;
        self
    }
}

/// Holds a configured amount of touched memory.
pub struct MemoryWorker {
    plan: MemoryPlan,
    system: System,
    blocks: Vec<Vec<u8>>,
}

impl MemoryWorker {
    pub fn new(plan: MemoryPlan) -> Self {
        Self {
            plan,
            system: System::new(),
            blocks: Vec::new(),
        }
    }

    fn held_bytes(&self) -> u64 {
        self.blocks.iter().map(|b| b.len() as u64).sum()
    }

    fn available_bytes(&mut self) -> u64 {
        self.system.refresh_memory();
        self.system.available_memory()
    }

    /// Allocates and touches one block of `size` bytes.
    fn allocate_block(&mut self, size: u64) -> std::result::Result<(), String> {
        let available = self.available_bytes();
        if available > 0 && size.saturating_add(self.plan.headroom_bytes) > available {
            return Err(format!(
                "only {} bytes available, need {} plus {} headroom",
                available, size, self.plan.headroom_bytes
            ));
        }

        let size = usize::try_from(size).map_err(|_| "block exceeds address space".to_string())?;
        let mut block: Vec<u8> = Vec::new();
        block.try_reserve_exact(size).map_err(|e| e.to_string())?;
        block.resize(size, 0);
        touch(&mut block, 1);

        self.blocks.push(block);
        Ok(())
    }
}

/// Writes one byte per page so the kernel has to back every page.
fn touch(block: &mut [u8], value: u8) {
    for i in (0..block.len()).step_by(PAGE_SIZE) {
        block[i] = block[i].wrapping_add(value);
    }
}

impl ResourceWorker for MemoryWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Memory
    }

    fn run(&mut self, ctx: &WorkerContext) -> Result<()> {
        let target = self.plan.total_bytes;
        let mut failure = None;

        while self.held_bytes() < target && !ctx.should_stop() {
            let size = (target - self.held_bytes()).min(self.plan.block_bytes);
            match self.allocate_block(size) {
                Ok(()) => {
                    ctx.status().set_bytes(self.held_bytes());
                    ctx.status().add_operations(1);
                }
                Err(reason) => {
                    failure = Some(StressError::AllocationFailure {
                        requested_bytes: target,
                        obtained_bytes: self.held_bytes(),
                        reason,
                    });
                    break;
                }
            }
        }

        if let Some(error) = failure {
            if self.blocks.is_empty() {
                return Err(error);
            }
            warn!("Memory worker holding partial allocation: {}", error);
            ctx.status().record_fault(error);
        }

        ctx.running();
        info!(
            "Memory worker holding {} MiB",
            self.held_bytes() / (1024 * 1024)
        );

        let mut round: usize = 0;
        while !ctx.pause(HOLD_TICK) {
            if !self.blocks.is_empty() {
                let idx = round % self.blocks.len();
                touch(&mut self.blocks[idx], 1);
                ctx.status().add_operations(1);
            }
            round = round.wrapping_add(1);
        }

        self.blocks.clear();
        self.blocks.shrink_to_fit();
        ctx.status().set_bytes(0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::{StopSignal, WorkerState, WorkerStatus};
    use std::sync::Arc;
    use std::thread;

    fn context() -> (StopSignal, Arc<WorkerStatus>, WorkerContext) {
        let stop = StopSignal::new();
        let status = Arc::new(WorkerStatus::new(WorkerKind::Memory, 0));
        let ctx = WorkerContext::new(stop.clone(), Arc::clone(&status));
        (stop, status, ctx)
    }

    #[test]
    fn test_plan_defaults() {
        let plan = MemoryPlan::new(3 * GIB);
        assert_eq!(plan.block_bytes, GIB);
        assert_eq!(plan.with_block_bytes(0).block_bytes, 1);
    }

    #[test]
    fn test_touch_hits_every_page() {
        let mut block = vec![0u8; PAGE_SIZE * 3 + 10];
        touch(&mut block, 1);
        assert_eq!(block[0], 1);
        assert_eq!(block[PAGE_SIZE], 1);
        assert_eq!(block[PAGE_SIZE * 3], 1);
        assert_eq!(block[1], 0);
    }

    #[test]
    fn test_allocates_and_releases() {
        let (stop, status, ctx) = context();
        let plan = MemoryPlan::new(8 * 1024 * 1024)
            .with_block_bytes(2 * 1024 * 1024)
            .with_headroom(0);

        let handle = thread::spawn(move || MemoryWorker::new(plan).run(&ctx));

        for _ in 0..100 {
            if status.state() == WorkerState::Running {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(status.state(), WorkerState::Running);
        assert_eq!(status.bytes(), 8 * 1024 * 1024);

        stop.request();
        handle.join().unwrap().unwrap();
        assert_eq!(status.bytes(), 0);
    }

    #[test]
    fn test_impossible_request_is_allocation_failure() {
        let (_stop, _status, ctx) = context();
        let plan = MemoryPlan::new(u64::MAX / 2).with_block_bytes(1 << 50);

        let result = MemoryWorker::new(plan).run(&ctx);
        assert!(matches!(
            result,
            Err(StressError::AllocationFailure {
                obtained_bytes: 0,
                ..
            })
        ));
    }

    #[test]
    fn test_partial_allocation_is_held() {
        let (stop, status, ctx) = context();
        // First block fits; the second is absurd and must fail.
        let plan = MemoryPlan::new((1 << 50) + 1024 * 1024)
            .with_block_bytes(1 << 50)
            .with_headroom(0);
        let mut worker = MemoryWorker::new(plan);
        worker.allocate_block(1024 * 1024).unwrap();

        let handle = thread::spawn(move || worker.run(&ctx));

        for _ in 0..100 {
            if status.state() == WorkerState::Running {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(status.state(), WorkerState::Running);
        assert!(matches!(
            status.faults()[0].error,
            StressError::AllocationFailure { .. }
        ));

        stop.request();
        handle.join().unwrap().unwrap();
    }
}
