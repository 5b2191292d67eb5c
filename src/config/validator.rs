//! Configuration Validation
//!
//! Checks a [`RunConfig`] before anything is spawned. All problems are
//! collected and reported together as one [`StressError::Config`].

use log::{info, warn};
use reqwest::Url;

use super::model::{RunConfig, MIB};
use crate::error::{Result, StressError};

/// Individual validation problems, for user-friendly messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    ZeroMonitorInterval,
    ZeroDuration,
    ZeroGracePeriod,
    ZeroDiskChunk,
    InvalidCeiling(f64),
    MemoryAboveCeiling { requested_mib: u64, ceiling_mib: u64 },
    InvalidNetworkTarget { url: String, reason: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroMonitorInterval => write!(f, "monitor interval must be at least 1 second"),
            Self::ZeroDuration => {
                write!(f, "duration must be greater than 0 when stress workers are requested")
            }
            Self::ZeroGracePeriod => write!(f, "grace period must be at least 1 second"),
            Self::ZeroDiskChunk => write!(f, "disk chunk size must be at least 1 MiB"),
            Self::InvalidCeiling(fraction) => {
                write!(f, "memory ceiling fraction {} is outside (0, 1]", fraction)
            }
            Self::MemoryAboveCeiling {
                requested_mib,
                ceiling_mib,
            } => write!(
                f,
                "memory request of {} MiB exceeds the safety ceiling of {} MiB",
                requested_mib, ceiling_mib
            ),
            Self::InvalidNetworkTarget { url, reason } => {
                write!(f, "network target '{}' is not usable: {}", url, reason)
            }
        }
    }
}

/// Validates a run configuration against the machine's total memory.
///
/// A `total_memory_bytes` of 0 means "unknown" and skips the memory
/// ceiling check.
pub fn validate_config(config: &RunConfig, total_memory_bytes: u64) -> Result<()> {
    let errors = collect_errors(config, total_memory_bytes);

    if !errors.is_empty() {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        return Err(StressError::Config(messages.join("; ")));
    }

    if config.cpu_workers > num_cpus::get() {
        warn!(
            "{} CPU workers requested but only {} logical cores are available",
            config.cpu_workers,
            num_cpus::get()
        );
    }

    if config.gpu_thermal_secs > 0 && !config.gpu_enabled {
        warn!("GPU thermal run requested without a GPU worker; it will not run");
    }

    if config.is_monitor_only() {
        info!("No stress workers requested - running in monitor-only mode");
    }

    Ok(())
}

fn collect_errors(config: &RunConfig, total_memory_bytes: u64) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.monitor_interval_secs == 0 {
        errors.push(ValidationError::ZeroMonitorInterval);
    }

    if config.duration_secs == 0 && config.requests_workers() {
        errors.push(ValidationError::ZeroDuration);
    }

    if config.grace_period_secs == 0 {
        errors.push(ValidationError::ZeroGracePeriod);
    }

    if config.disk_mib > 0 && config.disk_chunk_mib == 0 {
        errors.push(ValidationError::ZeroDiskChunk);
    }

    let fraction = config.memory_ceiling_fraction;
    if !(fraction > 0.0 && fraction <= 1.0) {
        errors.push(ValidationError::InvalidCeiling(fraction));
    } else if config.memory_mib > 0 && total_memory_bytes > 0 {
        let ceiling_mib = ((total_memory_bytes as f64 * fraction) as u64) / MIB;
        if config.memory_mib > ceiling_mib {
            errors.push(ValidationError::MemoryAboveCeiling {
                requested_mib: config.memory_mib,
                ceiling_mib,
            });
        }
    }

    if let Some(ref target) = config.network_target {
        if let Err(reason) = check_network_target(target) {
            errors.push(ValidationError::InvalidNetworkTarget {
                url: target.clone(),
                reason,
            });
        }
    }

    errors
}

fn check_network_target(target: &str) -> std::result::Result<(), String> {
    let url = Url::parse(target).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("unsupported scheme '{}'", other)),
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EIGHT_GIB: u64 = 8 * 1024 * MIB;

    fn cpu_config() -> RunConfig {
        RunConfig {
            cpu_workers: 2,
            duration_secs: 5,
            monitor_interval_secs: 1,
            ..RunConfig::default()
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&cpu_config(), EIGHT_GIB).is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = RunConfig {
            monitor_interval_secs: 0,
            ..cpu_config()
        };
        let err = validate_config(&config, EIGHT_GIB).unwrap_err();
        assert!(err.to_string().contains("monitor interval"));
    }

    #[test]
    fn test_zero_duration_needs_monitor_only() {
        let with_workers = RunConfig {
            duration_secs: 0,
            ..cpu_config()
        };
        assert!(validate_config(&with_workers, EIGHT_GIB).is_err());

        let monitor_only = RunConfig {
            duration_secs: 0,
            ..RunConfig::default()
        };
        assert!(validate_config(&monitor_only, EIGHT_GIB).is_ok());
    }

    #[test]
    fn test_memory_above_ceiling() {
        let config = RunConfig {
            memory_mib: 8 * 1024,
            ..cpu_config()
        };
        let err = validate_config(&config, EIGHT_GIB).unwrap_err();
        assert!(matches!(err, StressError::Config(_)));
        assert!(err.to_string().contains("safety ceiling"));
    }

    #[test]
    fn test_memory_ceiling_skipped_when_unknown() {
        let config = RunConfig {
            memory_mib: 1 << 30,
            ..cpu_config()
        };
        assert!(validate_config(&config, 0).is_ok());
    }

    #[test]
    fn test_invalid_ceiling_fraction() {
        let config = RunConfig {
            memory_ceiling_fraction: 1.5,
            ..cpu_config()
        };
        assert!(validate_config(&config, EIGHT_GIB).is_err());
    }

    #[test]
    fn test_network_target_checks() {
        let good = RunConfig {
            network_target: Some("https://example.com/file.bin".to_string()),
            ..cpu_config()
        };
        assert!(validate_config(&good, EIGHT_GIB).is_ok());

        let bad_scheme = RunConfig {
            network_target: Some("ftp://example.com/file.bin".to_string()),
            ..cpu_config()
        };
        assert!(validate_config(&bad_scheme, EIGHT_GIB).is_err());

        let not_a_url = RunConfig {
            network_target: Some("example.com".to_string()),
            ..cpu_config()
        };
        assert!(validate_config(&not_a_url, EIGHT_GIB).is_err());
    }

    #[test]
    fn test_errors_are_collected() {
        let config = RunConfig {
            monitor_interval_secs: 0,
            grace_period_secs: 0,
            ..cpu_config()
        };
        let errors = collect_errors(&config, EIGHT_GIB);
        assert_eq!(errors.len(), 2);
        assert!(errors.contains(&ValidationError::ZeroGracePeriod));
    }
}
