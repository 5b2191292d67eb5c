//! Configuration Loading
//!
//! Reads a [`RunConfig`] from a YAML file. Missing keys take their
//! defaults, so a file only needs the settings it changes.

use std::fs;
use std::path::Path;

use log::{debug, info};

use super::model::RunConfig;
use crate::error::{Result, StressError};

/// Loads a run configuration from a YAML file.
///
/// The result is not validated; call
/// [`validate_config`](super::validate_config) before starting a run.
///
/// # Example
///
/// ```rust,no_run
/// use hwstress::config::load_config;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_config("run.yaml")?;
///     println!("{} CPU workers", config.cpu_workers);
///     Ok(())
/// }
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<RunConfig> {
    let path = path.as_ref();
    info!("Loading run configuration from: {}", path.display());

    let yaml_content = fs::read_to_string(path).map_err(|e| {
        StressError::Config(format!(
            "failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    debug!("YAML content loaded ({} bytes)", yaml_content.len());

    parse_config(&yaml_content)
}

/// Parses a run configuration from YAML text.
pub fn parse_config(yaml_content: &str) -> Result<RunConfig> {
    if yaml_content.trim().is_empty() {
        return Ok(RunConfig::default());
    }

    serde_yaml::from_str(yaml_content)
        .map_err(|e| StressError::Config(format!("failed to parse config YAML: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_config_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.yaml");
        fs::write(
            &path,
            "cpu_workers: 3\nmemory: 512MB\nduration_secs: 30\nnetwork_target: http://127.0.0.1:8080/\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.cpu_workers, 3);
        assert_eq!(config.memory_mib, 512);
        assert_eq!(config.duration_secs, 30);
        assert_eq!(
            config.network_target.as_deref(),
            Some("http://127.0.0.1:8080/")
        );
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("/nonexistent/run.yaml");
        assert!(matches!(result, Err(StressError::Config(_))));
    }

    #[test]
    fn test_parse_config_empty_is_default() {
        let config = parse_config("   \n").unwrap();
        assert_eq!(config, RunConfig::default());
    }

    #[test]
    fn test_parse_config_bad_size() {
        let result = parse_config("memory: plenty\n");
        assert!(matches!(result, Err(StressError::Config(_))));
    }

    #[test]
    fn test_parse_config_unknown_type() {
        let result = parse_config("cpu_workers: many\n");
        assert!(result.is_err());
    }
}
