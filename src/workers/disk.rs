//! Disk Stressor
//!
//! Cycles over a scratch file: write a per-cycle pattern chunk by chunk,
//! force it to stable storage, read it back and compare byte for byte.
//! A mismatch is a [`StressError::DataIntegrityFault`], never retried
//! away; I/O errors are recorded and the cycle is retried.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, error, info, warn};

use super::handle::{ResourceWorker, WorkerContext};
use super::status::WorkerKind;
use crate::error::{Result, StressError};

/// Pause after an I/O error before the next cycle.
const IO_BACKOFF: Duration = Duration::from_millis(250);

enum Cycle {
    Completed,
    Interrupted,
}

/// Storage a disk cycle runs against.
trait ScratchMedium: Read + Write + Seek {
    /// Forces written data to stable storage.
    fn sync(&mut self) -> io::Result<()>;
}

impl ScratchMedium for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

/// Write/fsync/read/verify loop over one scratch file.
#[derive(Debug)]
pub struct DiskWorker {
    path: PathBuf,
    file_bytes: u64,
    chunk_bytes: usize,
}

impl DiskWorker {
    /// Creates a worker whose scratch file lives in `dir`.
    ///
    /// The file is named after the process id and `seq`, so concurrent
    /// runs never share one.
    pub fn new(dir: &Path, file_bytes: u64, chunk_bytes: usize, seq: usize) -> Self {
        let name = format!("hwstress_disk_{}_{}.bin", std::process::id(), seq);
        Self {
            path: dir.join(name),
            file_bytes: file_bytes.max(1),
            chunk_bytes: chunk_bytes.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StressError::io("create scratch dir", &e))?;
        }
        OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| StressError::io(format!("open {}", self.path.display()), &e))
    }

    fn chunks(&self) -> impl Iterator<Item = (u64, usize)> {
        let chunk = self.chunk_bytes as u64;
        let total = self.file_bytes;
        (0..total)
            .step_by(self.chunk_bytes)
            .map(move |offset| (offset, chunk.min(total - offset) as usize))
    }

    fn run_cycle<M: ScratchMedium>(
        &self,
        file: &mut M,
        cycle: u64,
        write_buf: &mut [u8],
        read_buf: &mut [u8],
        ctx: &WorkerContext,
    ) -> Result<Cycle> {
        file.seek(SeekFrom::Start(0))
            .map_err(|e| StressError::io("seek", &e))?;
        for (index, (_offset, len)) in self.chunks().enumerate() {
            if ctx.should_stop() {
                return Ok(Cycle::Interrupted);
            }
            fill_pattern(&mut write_buf[..len], cycle, index as u64);
            file.write_all(&write_buf[..len])
                .map_err(|e| StressError::io("write", &e))?;
            ctx.status().add_bytes(len as u64);
        }

        file.sync().map_err(|e| StressError::io("fsync", &e))?;

        file.seek(SeekFrom::Start(0))
            .map_err(|e| StressError::io("seek", &e))?;
        for (index, (offset, len)) in self.chunks().enumerate() {
            if ctx.should_stop() {
                return Ok(Cycle::Interrupted);
            }
            file.read_exact(&mut read_buf[..len])
                .map_err(|e| StressError::io("read", &e))?;
            fill_pattern(&mut write_buf[..len], cycle, index as u64);

            if let Some(bad) = first_mismatch(&write_buf[..len], &read_buf[..len]) {
                let fault = StressError::DataIntegrityFault {
                    offset: offset + bad as u64,
                    cycle,
                };
                error!("Disk worker: {}", fault);
                ctx.status().add_failure();
                ctx.status().record_fault(fault);
            }
        }

        Ok(Cycle::Completed)
    }

    fn remove_file(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", self.path.display(), e),
        }
    }
}

/// Fills `buf` with a pseudo-random pattern unique to `(cycle, chunk)`.
fn fill_pattern(buf: &mut [u8], cycle: u64, chunk: u64) {
    let mut state = (cycle.wrapping_add(1))
        .wrapping_mul(0x100_0000_01b3)
        ^ chunk.wrapping_mul(0x9e37_79b9_7f4a_7c15)
        | 1;
    for word in buf.chunks_mut(8) {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let bytes = state.to_le_bytes();
        word.copy_from_slice(&bytes[..word.len()]);
    }
}

/// Index of the first differing byte, if any.
fn first_mismatch(expected: &[u8], actual: &[u8]) -> Option<usize> {
    if expected.len() != actual.len() {
        return Some(expected.len().min(actual.len()));
    }
    expected.iter().zip(actual).position(|(a, b)| a != b)
}

impl ResourceWorker for DiskWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Disk
    }

    fn scratch_files(&self) -> Vec<PathBuf> {
        vec![self.path.clone()]
    }

    fn run(&mut self, ctx: &WorkerContext) -> Result<()> {
        let mut file = self.open()?;
        let mut write_buf = vec![0u8; self.chunk_bytes];
        let mut read_buf = vec![0u8; self.chunk_bytes];

        ctx.running();
        info!(
            "Disk worker cycling {} MiB through {}",
            self.file_bytes / (1024 * 1024),
            self.path.display()
        );

        let mut cycle: u64 = 0;
        while !ctx.should_stop() {
            match self.run_cycle(&mut file, cycle, &mut write_buf, &mut read_buf, ctx) {
                Ok(Cycle::Completed) => {
                    ctx.status().add_operations(1);
                    cycle += 1;
                }
                Ok(Cycle::Interrupted) => break,
                Err(e) => {
                    warn!("Disk worker cycle {} failed: {}", cycle, e);
                    ctx.status().add_failure();
                    ctx.status().record_fault(e);
                    cycle += 1;
                    if ctx.pause(IO_BACKOFF) {
                        break;
                    }
                }
            }
        }

        drop(file);
        self.remove_file();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::{StopSignal, WorkerState, WorkerStatus};
    use std::io::Cursor;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    /// In-memory medium that flips one stored byte after each sync.
    struct FlakyMedium {
        data: Cursor<Vec<u8>>,
        corrupt_at: usize,
    }

    impl Read for FlakyMedium {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.data.read(buf)
        }
    }

    impl Write for FlakyMedium {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.data.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Seek for FlakyMedium {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.data.seek(pos)
        }
    }

    impl ScratchMedium for FlakyMedium {
        fn sync(&mut self) -> io::Result<()> {
            let stored = self.data.get_mut();
            stored[self.corrupt_at] ^= 0xff;
            Ok(())
        }
    }

    fn context() -> (WorkerContext, Arc<WorkerStatus>) {
        let status = Arc::new(WorkerStatus::new(WorkerKind::Disk, 0));
        (WorkerContext::new(StopSignal::new(), Arc::clone(&status)), status)
    }

    #[test]
    fn test_pattern_differs_per_cycle_and_chunk() {
        let mut a = vec![0u8; 64];
        let mut b = vec![0u8; 64];
        let mut c = vec![0u8; 64];
        fill_pattern(&mut a, 0, 0);
        fill_pattern(&mut b, 1, 0);
        fill_pattern(&mut c, 0, 1);
        assert_ne!(a, b);
        assert_ne!(a, c);

        let mut again = vec![0u8; 64];
        fill_pattern(&mut again, 0, 0);
        assert_eq!(a, again);
    }

    #[test]
    fn test_pattern_handles_odd_lengths() {
        let mut buf = vec![0u8; 13];
        fill_pattern(&mut buf, 3, 4);
        assert!(buf.iter().any(|b| *b != 0));
    }

    #[test]
    fn test_first_mismatch() {
        let expected = [1u8, 2, 3, 4];
        assert_eq!(first_mismatch(&expected, &[1, 2, 3, 4]), None);
        assert_eq!(first_mismatch(&expected, &[1, 2, 9, 4]), Some(2));
        assert_eq!(first_mismatch(&expected, &[1, 2]), Some(2));
    }

    #[test]
    fn test_chunks_cover_file() {
        let dir = tempdir().unwrap();
        let worker = DiskWorker::new(dir.path(), 10, 4, 0);
        let chunks: Vec<_> = worker.chunks().collect();
        assert_eq!(chunks, vec![(0, 4), (4, 4), (8, 2)]);
    }

    #[test]
    fn test_cycles_verify_and_cleanup() {
        let dir = tempdir().unwrap();
        let mut worker = DiskWorker::new(dir.path(), 256 * 1024, 64 * 1024, 0);
        let path = worker.path().to_path_buf();

        let stop = StopSignal::new();
        let status = Arc::new(WorkerStatus::new(WorkerKind::Disk, 0));
        let ctx = WorkerContext::new(stop.clone(), Arc::clone(&status));

        let handle = thread::spawn(move || worker.run(&ctx));

        for _ in 0..250 {
            if status.operations() >= 2 {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(status.state(), WorkerState::Running);
        assert!(path.exists());

        stop.request();
        handle.join().unwrap().unwrap();

        assert!(status.operations() >= 2);
        assert_eq!(status.failures(), 0);
        assert!(status.faults().is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn test_readback_mismatch_is_integrity_fault() {
        let dir = tempdir().unwrap();
        let worker = DiskWorker::new(dir.path(), 1024, 256, 0);
        let mut medium = FlakyMedium {
            data: Cursor::new(Vec::new()),
            corrupt_at: 600,
        };
        let mut write_buf = vec![0u8; 256];
        let mut read_buf = vec![0u8; 256];
        let (ctx, status) = context();

        let outcome = worker
            .run_cycle(&mut medium, 7, &mut write_buf, &mut read_buf, &ctx)
            .unwrap();

        assert!(matches!(outcome, Cycle::Completed));
        assert_eq!(status.failures(), 1);
        let faults = status.faults();
        assert_eq!(faults.len(), 1);
        assert_eq!(
            faults[0].error,
            StressError::DataIntegrityFault {
                offset: 600,
                cycle: 7
            }
        );
        assert!(!faults
            .iter()
            .any(|f| matches!(f.error, StressError::IoFailure { .. })));
    }

    #[test]
    fn test_clean_medium_records_nothing() {
        let dir = tempdir().unwrap();
        let worker = DiskWorker::new(dir.path(), 1024, 256, 0);
        let mut file = tempfile::tempfile().unwrap();
        let mut write_buf = vec![0u8; 256];
        let mut read_buf = vec![0u8; 256];
        let (ctx, status) = context();

        let outcome = worker
            .run_cycle(&mut file, 0, &mut write_buf, &mut read_buf, &ctx)
            .unwrap();

        assert!(matches!(outcome, Cycle::Completed));
        assert_eq!(status.failures(), 0);
        assert!(status.faults().is_empty());
    }

    #[test]
    fn test_unwritable_dir_fails_at_start() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, b"file").unwrap();

        let mut worker = DiskWorker::new(&blocker, 1024, 512, 0);
        let stop = StopSignal::new();
        let status = Arc::new(WorkerStatus::new(WorkerKind::Disk, 0));
        let ctx = WorkerContext::new(stop, status);

        let result = worker.run(&ctx);
        assert!(matches!(result, Err(StressError::IoFailure { .. })));
    }
}
