//! hwstress CLI Entry Point
//!
//! Provides the command-line interface for stress runs.
//!
//! # Usage
//!
//! ```bash
//! # Four CPU burners, 2 GB of memory and a 5 GB disk file for a minute
//! hwstress --cpu 4 --memory 2GB --disk 5GB --duration 60
//!
//! # Monitor only, printing every sample, until Ctrl-C
//! hwstress --duration 0 --live
//!
//! # Settings from a file, with the duration overridden
//! hwstress --config run.yaml --duration 120 --export-csv metrics.csv
//! ```

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc::{channel, Receiver};
use std::thread;

use colored::Colorize;
use log::{error, info, warn};

use hwstress::config::{load_config, parse_size, RunConfig};
use hwstress::execution::Orchestrator;
use hwstress::export::{write_csv, write_json};
use hwstress::monitoring::MetricSample;
use hwstress::{APP_NAME, VERSION};

/// Command-line options. `None` leaves the config-file value alone.
#[derive(Debug, Default)]
struct CliArgs {
    config_path: Option<PathBuf>,
    cpu: Option<usize>,
    memory_mib: Option<u64>,
    disk_mib: Option<u64>,
    duration: Option<u64>,
    monitor_interval: Option<u64>,
    network_url: Option<String>,
    gpu: bool,
    gpu_simulate: bool,
    gpu_thermal: Option<u64>,
    scratch_dir: Option<PathBuf>,
    export_csv: Option<PathBuf>,
    export_json: Option<PathBuf>,
    live: bool,
    verbose: bool,
}

impl CliArgs {
    /// Layers the command-line values over `config`.
    fn apply(&self, mut config: RunConfig) -> RunConfig {
        if let Some(n) = self.cpu {
            config.cpu_workers = n;
        }
        if let Some(mib) = self.memory_mib {
            config.memory_mib = mib;
        }
        if let Some(mib) = self.disk_mib {
            config.disk_mib = mib;
        }
        if let Some(secs) = self.duration {
            config.duration_secs = secs;
        }
        if let Some(secs) = self.monitor_interval {
            config.monitor_interval_secs = secs;
        }
        if let Some(url) = &self.network_url {
            config.network_target = Some(url.clone());
        }
        if self.gpu || self.gpu_simulate {
            config.gpu_enabled = true;
        }
        if self.gpu_simulate {
            config.gpu_simulate = true;
        }
        if let Some(secs) = self.gpu_thermal {
            config.gpu_thermal_secs = secs;
        }
        if let Some(dir) = &self.scratch_dir {
            config.scratch_dir = Some(dir.clone());
        }
        config
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME.bold(), VERSION);
    println!("Multi-resource hardware stress harness");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: hwstress [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --cpu N                 Number of CPU stress workers (default: 0)");
    println!("  --memory SIZE           Memory to hold, e.g. 2GB or 512MB (default: 0)");
    println!("  --disk SIZE             Disk scratch file size, e.g. 5GB (default: 0)");
    println!("  --duration SECS         Run length; 0 with no workers monitors until Ctrl-C (default: 60)");
    println!("  --monitor-interval SECS Seconds between samples (default: 2)");
    println!("  --network-url URL       URL to download repeatedly");
    println!("  --gpu                   Enable the GPU worker");
    println!("  --gpu-simulate          Enable the GPU worker on the host-simulated device");
    println!("  --gpu-thermal SECS      Measure GPU thermal drift for SECS before the compute loop");
    println!("  --scratch-dir DIR       Directory for the disk scratch file");
    println!("  --config FILE           Load settings from a YAML file");
    println!("  --export-csv PATH       Write the metric log as CSV");
    println!("  --export-json PATH      Write the metric log as JSON");
    println!("  --live                  Print every sample as it is taken");
    println!("  --verbose               Enable debug logging");
    println!("  --help                  Show this help message");
    println!("  --version               Show version information");
    println!();
    println!("Sizes accept GB, G, MB or M (case-insensitive); a bare number means GB.");
    println!();
    println!("Examples:");
    println!("  hwstress --cpu 4 --memory 2GB --disk 5GB --duration 60");
    println!("  hwstress --cpu 2 --network-url http://localhost:8080/ --export-json run.json");
}

/// Returns the value following the flag at `*i`.
fn value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{} requires a value", flag))
}

fn number<T: std::str::FromStr>(text: &str, flag: &str) -> Result<T, String> {
    text.parse()
        .map_err(|_| format!("Invalid value for {}: {}", flag, text))
}

/// Parses command-line arguments into a CliArgs struct.
fn parse_arguments(args: &[String]) -> Result<CliArgs, String> {
    let mut cli = CliArgs::default();
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = args[i].as_str();

        match arg {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--verbose" | "-v" => cli.verbose = true,
            "--gpu" => cli.gpu = true,
            "--gpu-simulate" => cli.gpu_simulate = true,
            "--live" => cli.live = true,
            "--cpu" => cli.cpu = Some(number(value(args, &mut i, arg)?, arg)?),
            "--gpu-thermal" => cli.gpu_thermal = Some(number(value(args, &mut i, arg)?, arg)?),
            "--duration" => cli.duration = Some(number(value(args, &mut i, arg)?, arg)?),
            "--monitor-interval" => {
                cli.monitor_interval = Some(number(value(args, &mut i, arg)?, arg)?)
            }
            "--memory" => {
                let text = value(args, &mut i, arg)?;
                cli.memory_mib = Some(parse_size(text).map_err(|e| e.to_string())?);
            }
            "--disk" => {
                let text = value(args, &mut i, arg)?;
                cli.disk_mib = Some(parse_size(text).map_err(|e| e.to_string())?);
            }
            "--network-url" => cli.network_url = Some(value(args, &mut i, arg)?.to_string()),
            "--config" => cli.config_path = Some(PathBuf::from(value(args, &mut i, arg)?)),
            "--scratch-dir" => cli.scratch_dir = Some(PathBuf::from(value(args, &mut i, arg)?)),
            "--export-csv" => cli.export_csv = Some(PathBuf::from(value(args, &mut i, arg)?)),
            "--export-json" => cli.export_json = Some(PathBuf::from(value(args, &mut i, arg)?)),
            other => return Err(format!("Unknown option: {}", other)),
        }
        i += 1;
    }

    Ok(cli)
}

/// Prints each live sample on one line until the run's feed closes.
fn spawn_live_printer(feed: Receiver<MetricSample>) -> Option<thread::JoinHandle<()>> {
    let spawned = thread::Builder::new()
        .name("hwstress-live".to_string())
        .spawn(move || {
            for sample in feed {
                println!(
                    "{}  cpu {}  ram {}  disk {}  net tx {} rx {}",
                    sample.timestamp.format("%H:%M:%S"),
                    percent(sample.cpu_percent),
                    percent(sample.memory_percent),
                    percent(sample.disk_percent),
                    sample.net_bytes_sent,
                    sample.net_bytes_recv
                );
            }
        });

    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Live display unavailable: {}", e);
            None
        }
    }
}

fn percent(value: f64) -> colored::ColoredString {
    let text = format!("{:5.1}%", value);
    if value >= 90.0 {
        text.red()
    } else if value >= 70.0 {
        text.yellow()
    } else {
        text.green()
    }
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let cli = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    // Setup logging
    setup_logging(cli.verbose);

    // Print banner
    print_banner();

    let base = match &cli.config_path {
        Some(path) => {
            info!("Loading configuration: {}", path.display());
            load_config(path).map_err(|e| {
                error!("Failed to load configuration: {}", e);
                e
            })?
        }
        None => RunConfig::default(),
    };
    let config = cli.apply(base);

    info!(
        "Starting stress test: CPU={}, Memory={}MB, Disk={}MB, Duration={}s, Network={}, GPU={}",
        config.cpu_workers,
        config.memory_mib,
        config.disk_mib,
        config.duration_secs,
        config.network_target.is_some(),
        config.gpu_enabled
    );

    let mut orchestrator = Orchestrator::new();
    orchestrator.set_handle_signals(true);

    let printer = if cli.live {
        let (tx, rx) = channel();
        orchestrator.set_live_feed(tx);
        spawn_live_printer(rx)
    } else {
        None
    };

    let mut handle = orchestrator.start(config)?;
    let deadline = handle.deadline();
    if deadline.is_none() {
        info!("Monitoring until interrupted (Ctrl-C)");
    }
    let report = handle.await_completion(deadline).clone();
    drop(handle);

    if let Some(printer) = printer {
        let _ = printer.join();
    }

    println!();
    println!("{}", report.render());

    if let Some(path) = &cli.export_csv {
        write_csv(&report.metrics, path)?;
        println!("Monitoring log exported to {}", path.display());
    }
    if let Some(path) = &cli.export_json {
        write_json(&report.metrics, path)?;
        println!("Monitoring log exported to {}", path.display());
    }

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("hwstress")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_full_command_line() {
        let cli = parse_arguments(&args(&[
            "--cpu", "4", "--memory", "2GB", "--disk", "512M", "--duration", "30",
            "--monitor-interval", "1", "--network-url", "http://localhost/", "--gpu-simulate",
            "--gpu-thermal", "5", "--export-csv", "out.csv", "--live",
        ]))
        .unwrap();

        assert_eq!(cli.cpu, Some(4));
        assert_eq!(cli.memory_mib, Some(2048));
        assert_eq!(cli.disk_mib, Some(512));
        assert_eq!(cli.duration, Some(30));
        assert_eq!(cli.export_csv, Some(PathBuf::from("out.csv")));
        assert!(cli.live);

        let config = cli.apply(RunConfig::default());
        assert!(config.gpu_enabled && config.gpu_simulate);
        assert_eq!(config.gpu_thermal_secs, 5);
        assert_eq!(config.monitor_interval_secs, 1);
        assert_eq!(config.network_target.as_deref(), Some("http://localhost/"));
    }

    #[test]
    fn test_cli_overrides_only_given_fields() {
        let base = RunConfig {
            cpu_workers: 8,
            duration_secs: 300,
            ..RunConfig::default()
        };
        let cli = parse_arguments(&args(&["--duration", "10"])).unwrap();
        let config = cli.apply(base);
        assert_eq!(config.cpu_workers, 8);
        assert_eq!(config.duration_secs, 10);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_arguments(&args(&["--cpu"])).is_err());
        assert!(parse_arguments(&args(&["--cpu", "many"])).is_err());
        assert!(parse_arguments(&args(&["--memory", "lots"])).is_err());
        assert!(parse_arguments(&args(&["--bogus"])).is_err());
    }
}
