// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! Every flag also has an environment-variable alias so the exporter can be
//! configured entirely through the environment when run as a service or in a
//! container.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::monitor::MonitorConfig;

/// Command-line arguments for `file-exporter`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "file-exporter",
    version,
    about = "Export file modification time, permissions and content hash as Prometheus metrics.",
    long_about = None
)]
pub struct CliArgs {
    /// Host and port to listen on for metric scrapes.
    #[arg(
        long = "telemetry.addr",
        env = "TELEMETRY_ADDR",
        value_name = "ADDR",
        default_value = "0.0.0.0:9183"
    )]
    pub telemetry_addr: String,

    /// URL path the metrics are exposed on.
    #[arg(
        long = "telemetry.path",
        env = "TELEMETRY_PATH",
        value_name = "PATH",
        default_value = "/metrics"
    )]
    pub telemetry_path: String,

    /// Path to monitor, will not be recursed. Repeatable.
    #[arg(long = "path", short = 'p', env = "SINGLE_PATH", value_name = "PATH")]
    pub path: Vec<String>,

    /// Paths to monitor, comma separated (will not be recursed).
    #[arg(long = "paths", env = "PATHS", value_name = "PATHS", hide = true)]
    pub paths: Option<String>,

    /// Path to monitor with recursion. Repeatable.
    #[arg(long = "recursive-path", env = "RECURSIVE_PATH", value_name = "PATH")]
    pub recursive_path: Vec<String>,

    /// Paths to monitor recursively, comma separated.
    #[arg(
        long = "recursive-paths",
        env = "RECURSIVE_PATHS",
        value_name = "PATHS",
        hide = true
    )]
    pub recursive_paths: Option<String>,

    /// Location of the root fs. Prepended when resolving paths and stripped
    /// from the metric labels.
    #[arg(long, env = "ROOTFS", value_name = "DIR", default_value = "")]
    pub rootfs: String,

    /// Only watch files whose name matches this regex.
    #[arg(long, env = "REGEX", value_name = "REGEX")]
    pub regex: Option<String>,

    /// Match the regex against the full path instead of just the file name.
    #[arg(long = "regex-fullpath", env = "REGEX_FULLPATH")]
    pub regex_fullpath: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `FILE_EXPORTER_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

impl CliArgs {
    /// Collapse the four path flag forms into a `MonitorConfig`.
    pub fn monitor_config(&self) -> MonitorConfig {
        let mut paths = self.path.clone();
        paths.extend(split_joined(self.paths.as_deref()));

        let mut recursive_paths = self.recursive_path.clone();
        recursive_paths.extend(split_joined(self.recursive_paths.as_deref()));

        MonitorConfig {
            rootfs: PathBuf::from(&self.rootfs),
            paths,
            recursive_paths,
            regex: self.regex.clone(),
            regex_fullpath: self.regex_fullpath,
            retry_interval: Duration::from_secs(30),
        }
    }
}

/// Split a comma-joined path list, dropping empty entries.
fn split_joined(joined: Option<&str>) -> Vec<String> {
    joined
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
