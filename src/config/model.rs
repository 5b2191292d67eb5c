//! Run Configuration Model
//!
//! The immutable description of one stress run.
//!
//! # Example YAML Format
//!
//! ```yaml
//! cpu_workers: 4
//! memory: 2GB
//! disk: 512MB
//! duration_secs: 60
//! monitor_interval_secs: 2
//! network_target: http://192.168.1.10/big.bin
//! gpu_enabled: false
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, StressError};

/// Bytes in one mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Bytes in one gibibyte.
pub const GIB: u64 = 1024 * MIB;

/// Immutable configuration for a single run.
///
/// Sizes are held in MiB so that sub-gigabyte requests like `512MB`
/// survive parsing; [`RunConfig::memory_gib`] and [`RunConfig::disk_gib`]
/// give the whole-GiB view.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// Number of CPU burner threads
    pub cpu_workers: usize,

    /// Memory to hold, in MiB (0 = no memory worker)
    #[serde(rename = "memory", deserialize_with = "size_field")]
    pub memory_mib: u64,

    /// Disk scratch file size, in MiB (0 = no disk worker)
    #[serde(rename = "disk", deserialize_with = "size_field")]
    pub disk_mib: u64,

    /// Run length in seconds; 0 only for monitor-only runs
    pub duration_secs: u64,

    /// Seconds between metric samples
    pub monitor_interval_secs: u64,

    /// URL fetched repeatedly by the network worker
    pub network_target: Option<String>,

    /// Start a GPU worker
    pub gpu_enabled: bool,

    /// Back the GPU worker with the host-simulated benchmark runner
    pub gpu_simulate: bool,

    /// Seconds of thermal-drift kernel the GPU worker runs before its
    /// compute loop (0 = skip)
    pub gpu_thermal_secs: u64,

    /// Seconds each worker gets to honor its stop signal
    pub grace_period_secs: u64,

    /// Largest memory request allowed, as a fraction of total RAM
    pub memory_ceiling_fraction: f64,

    /// Directory for disk scratch files (system temp dir if unset)
    pub scratch_dir: Option<PathBuf>,

    /// Disk write/verify unit, in MiB
    pub disk_chunk_mib: u64,

    /// Per-request network timeout in seconds
    pub network_timeout_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            cpu_workers: 0,
            memory_mib: 0,
            disk_mib: 0,
            duration_secs: 60,
            monitor_interval_secs: 2,
            network_target: None,
            gpu_enabled: false,
            gpu_simulate: false,
            gpu_thermal_secs: 0,
            grace_period_secs: 5,
            memory_ceiling_fraction: 0.9,
            scratch_dir: None,
            disk_chunk_mib: 4,
            network_timeout_secs: 5,
        }
    }
}

impl RunConfig {
    /// Memory request rounded down to whole GiB.
    pub fn memory_gib(&self) -> u64 {
        self.memory_mib / 1024
    }

    /// Disk request rounded down to whole GiB.
    pub fn disk_gib(&self) -> u64 {
        self.disk_mib / 1024
    }

    pub fn memory_bytes(&self) -> u64 {
        self.memory_mib.saturating_mul(MIB)
    }

    pub fn disk_bytes(&self) -> u64 {
        self.disk_mib.saturating_mul(MIB)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    pub fn gpu_thermal(&self) -> Duration {
        Duration::from_secs(self.gpu_thermal_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }

    /// Directory where the disk worker creates its scratch file.
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Returns true if at least one stress worker would be started.
    pub fn requests_workers(&self) -> bool {
        self.cpu_workers > 0
            || self.memory_mib > 0
            || self.disk_mib > 0
            || self.network_target.is_some()
            || self.gpu_enabled
    }

    /// Monitor-only runs sample metrics without stressing anything.
    pub fn is_monitor_only(&self) -> bool {
        !self.requests_workers()
    }
}

/// Parses a size string into MiB.
///
/// Recognizes `GB`, `G`, `MB` and `M` suffixes, case-insensitive.
/// A bare number is taken as GB. Fractions are allowed (`1.5G`).
///
/// # Example
///
/// ```
/// use hwstress::config::parse_size;
///
/// assert_eq!(parse_size("2GB").unwrap(), 2048);
/// assert_eq!(parse_size("512m").unwrap(), 512);
/// ```
pub fn parse_size(input: &str) -> Result<u64> {
    let text = input.trim().to_ascii_uppercase();

    let (number, mib_per_unit) = if let Some(n) = text.strip_suffix("GB") {
        (n, 1024.0)
    } else if let Some(n) = text.strip_suffix('G') {
        (n, 1024.0)
    } else if let Some(n) = text.strip_suffix("MB") {
        (n, 1.0)
    } else if let Some(n) = text.strip_suffix('M') {
        (n, 1.0)
    } else {
        (text.as_str(), 1024.0)
    };

    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| StressError::Config(format!("invalid size '{}'", input.trim())))?;

    if !value.is_finite() || value < 0.0 {
        return Err(StressError::Config(format!(
            "size must be a non-negative number: '{}'",
            input.trim()
        )));
    }

    Ok((value * mib_per_unit) as u64)
}

/// Deserializes a size given either as a size string or a plain number of GB.
fn size_field<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    match val {
        Value::Null => Ok(0),
        Value::String(s) => parse_size(&s).map_err(de::Error::custom),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| de::Error::custom("Expected a size"))
            .and_then(|gb| parse_size(&gb.to_string()).map_err(de::Error::custom)),
        _ => Err(de::Error::custom("Expected size string or number")),
    }
}
