//! Error Types
//!
//! A single error enum covers every failure the harness can observe.
//! Only [`StressError::Config`] stops a run from starting; every other
//! kind is recorded against the worker (or monitor tick) it came from.

use thiserror::Error;

use crate::workers::WorkerKind;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StressError>;

/// Errors raised by configuration, workers, the monitor and exporters.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StressError {
    /// The run configuration is invalid; fatal before start.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A worker could not acquire its target amount of a resource.
    #[error("allocation failure: obtained {obtained_bytes} of {requested_bytes} bytes ({reason})")]
    AllocationFailure {
        requested_bytes: u64,
        obtained_bytes: u64,
        reason: String,
    },

    /// A disk or network operation failed.
    #[error("I/O failure during {operation}: {message}")]
    IoFailure { operation: String, message: String },

    /// Bytes read back from disk differ from the bytes written.
    #[error("data integrity fault at offset {offset} (cycle {cycle})")]
    DataIntegrityFault { offset: u64, cycle: u64 },

    /// The compute device failed during allocation or execution.
    #[error("device error: {0}")]
    DeviceError(String),

    /// No compute device backend is available.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A worker ignored its stop signal for the whole grace period.
    #[error("{kind} worker #{index} did not stop within {grace_ms} ms")]
    UncleanStop {
        kind: WorkerKind,
        index: usize,
        grace_ms: u128,
    },

    /// A worker thread panicked.
    #[error("worker panicked: {0}")]
    Panicked(String),

    /// The system sampler could not produce a snapshot.
    #[error("sampler failure: {0}")]
    Sampler(String),

    /// Reading or writing an export file failed.
    #[error("export failure: {0}")]
    Export(String),
}

impl StressError {
    /// Builds an [`StressError::IoFailure`] from an `std::io::Error`.
    pub fn io(operation: impl Into<String>, err: &std::io::Error) -> Self {
        Self::IoFailure {
            operation: operation.into(),
            message: err.to_string(),
        }
    }

    /// Short tag used in reports and log lines.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Config(_) => "ConfigError",
            Self::AllocationFailure { .. } => "AllocationFailure",
            Self::IoFailure { .. } => "IOFailure",
            Self::DataIntegrityFault { .. } => "DataIntegrityFault",
            Self::DeviceError(_) => "DeviceError",
            Self::DeviceUnavailable(_) => "DeviceUnavailable",
            Self::UncleanStop { .. } => "UncleanStop",
            Self::Panicked(_) => "WorkerPanic",
            Self::Sampler(_) => "SamplerFailure",
            Self::Export(_) => "ExportFailure",
        }
    }
}

impl From<csv::Error> for StressError {
    fn from(err: csv::Error) -> Self {
        Self::Export(err.to_string())
    }
}

impl From<serde_json::Error> for StressError {
    fn from(err: serde_json::Error) -> Self {
        Self::Export(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrity_fault_is_distinct_from_io_failure() {
        let integrity = StressError::DataIntegrityFault { offset: 4096, cycle: 2 };
        let io = StressError::IoFailure {
            operation: "write".to_string(),
            message: "disk full".to_string(),
        };

        assert_ne!(integrity.kind_name(), io.kind_name());
        assert!(integrity.to_string().contains("offset 4096"));
    }

    #[test]
    fn test_io_helper_keeps_operation() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let wrapped = StressError::io("fsync", &err);

        match wrapped {
            StressError::IoFailure { operation, message } => {
                assert_eq!(operation, "fsync");
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unclean_stop_message() {
        let err = StressError::UncleanStop {
            kind: WorkerKind::Disk,
            index: 0,
            grace_ms: 5000,
        };
        assert!(err.to_string().contains("disk worker #0"));
        assert_eq!(err.kind_name(), "UncleanStop");
    }
}
