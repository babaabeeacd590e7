//! Configuration for the benchmark harness
//!
//! Values come from three layers with strict precedence:
//! command line > TOML config file > built-in defaults. The file
//! carries `[allocator]`, `[testing]` and `[output]` tables; every key
//! is optional and falls back to the built-in default, so a partial
//! file is fine and a missing file is only a warning.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::Parser;
use log::warn;
use serde::Deserialize;

use crate::buddy::MAX_SUPPORTED_ORDER;
use crate::logger::OutputFormat;

/// Typed view of the TOML config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub allocator: AllocatorConfig,

    #[serde(default)]
    pub testing: TestingConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllocatorConfig {
    #[serde(default = "default_min_order")]
    pub min_order: u32,

    #[serde(default = "default_max_order")]
    pub max_order: u32,

    #[serde(default = "default_alignment")]
    pub alignment: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestingConfig {
    #[serde(default = "default_ops")]
    pub num_operations: u64,

    #[serde(default = "default_duration")]
    pub duration_seconds: f64,

    #[serde(default)]
    pub random_seed: Option<u64>,

    #[serde(default = "default_threads")]
    pub threads: usize,

    #[serde(default = "default_block_size")]
    pub block_size: usize,

    #[serde(default = "default_min_block_size")]
    pub min_block_size: usize,

    #[serde(default = "default_max_block_size")]
    pub max_block_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_out_dir")]
    pub directory: PathBuf,

    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            min_order: default_min_order(),
            max_order: default_max_order(),
            alignment: default_alignment(),
        }
    }
}

impl Default for TestingConfig {
    fn default() -> Self {
        Self {
            num_operations: default_ops(),
            duration_seconds: default_duration(),
            random_seed: None,
            threads: default_threads(),
            block_size: default_block_size(),
            min_block_size: default_min_block_size(),
            max_block_size: default_max_block_size(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_out_dir(),
            format: default_format(),
        }
    }
}

fn default_min_order() -> u32 {
    6
}
fn default_max_order() -> u32 {
    20
}
fn default_alignment() -> usize {
    8
}
fn default_ops() -> u64 {
    1000
}
fn default_duration() -> f64 {
    10.0
}
fn default_threads() -> usize {
    1
}
fn default_block_size() -> usize {
    64
}
fn default_min_block_size() -> usize {
    32
}
fn default_max_block_size() -> usize {
    512
}
fn default_out_dir() -> PathBuf {
    PathBuf::from("reports")
}
fn default_format() -> String {
    "csv".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config '{}': {}", path.display(), e))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("failed to parse config: {}", e))
    }

    /// Load the file if present, warn and fall back to defaults
    /// otherwise. A broken or absent config file never aborts a run on
    /// its own; only the merged settings are validated.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            warn!("config file '{}' not found, using defaults", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{}; continuing with defaults", e);
                Self::default()
            }
        }
    }
}

/// Workload selector for `--test`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestKind {
    Sequential,
    Random,
    Mixed,
    Throughput,
}

impl FromStr for TestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(TestKind::Sequential),
            "random" => Ok(TestKind::Random),
            "mixed" => Ok(TestKind::Mixed),
            "throughput" => Ok(TestKind::Throughput),
            other => Err(format!(
                "invalid test type '{}' (expected sequential, random, mixed or throughput)",
                other
            )),
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TestKind::Sequential => "sequential",
            TestKind::Random => "random",
            TestKind::Mixed => "mixed",
            TestKind::Throughput => "throughput",
        };
        f.write_str(name)
    }
}

/// Command-line options. Every workload knob is optional here so that
/// absent flags fall through to the config file.
#[derive(Parser, Debug, Default)]
#[command(
    name = "buddy-bench",
    about = "Buddy allocator benchmark harness",
    long_about = "Drives synthetic workloads (sequential, random, mixed, throughput) against a \
                  fixed-capacity buddy allocator and records per-operation telemetry."
)]
pub struct Cli {
    /// Workload to run: sequential, random, mixed or throughput
    #[arg(long)]
    pub test: Option<String>,

    /// Number of allocate/deallocate operations
    #[arg(long)]
    pub ops: Option<u64>,

    /// Block size in bytes for fixed-size workloads
    #[arg(long)]
    pub block_size: Option<usize>,

    /// Minimum block size in bytes for the random workload
    #[arg(long)]
    pub min_block_size: Option<usize>,

    /// Maximum block size in bytes for the random workload
    #[arg(long)]
    pub max_block_size: Option<usize>,

    /// Minimum buddy order (smallest block is 2^min-order bytes)
    #[arg(long)]
    pub min_order: Option<u32>,

    /// Maximum buddy order (pool size is 2^max-order bytes)
    #[arg(long)]
    pub max_order: Option<u32>,

    /// Memory alignment in bytes (must be a power of two)
    #[arg(long)]
    pub alignment: Option<usize>,

    /// Number of worker threads sharing the pool
    #[arg(long)]
    pub threads: Option<usize>,

    /// Duration in seconds for the throughput workload
    #[arg(long)]
    pub duration: Option<f64>,

    /// Random seed for reproducible workloads
    #[arg(long)]
    pub seed: Option<u64>,

    /// Output directory for telemetry reports
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Telemetry format: csv or json
    #[arg(long)]
    pub format: Option<String>,

    /// Path to the TOML config file
    #[arg(long, default_value = "config/default.toml")]
    pub config: PathBuf,
}

/// Fully resolved, validated run parameters.
#[derive(Debug, Clone)]
pub struct Settings {
    pub test: TestKind,
    pub ops: u64,
    pub block_size: usize,
    pub min_block_size: usize,
    pub max_block_size: usize,
    pub min_order: u32,
    pub max_order: u32,
    pub alignment: usize,
    pub threads: usize,
    pub duration: f64,
    pub seed: Option<u64>,
    pub out: PathBuf,
    pub format: OutputFormat,
}

impl Settings {
    /// Merge the three layers (CLI > file > defaults) and validate.
    pub fn resolve(cli: &Cli, file: &Config) -> Result<Self, String> {
        let test = match &cli.test {
            Some(name) => name.parse()?,
            None => TestKind::Sequential,
        };
        let format = match &cli.format {
            Some(name) => name.parse()?,
            None => file.output.format.parse()?,
        };

        let settings = Self {
            test,
            ops: cli.ops.unwrap_or(file.testing.num_operations),
            block_size: cli.block_size.unwrap_or(file.testing.block_size),
            min_block_size: cli.min_block_size.unwrap_or(file.testing.min_block_size),
            max_block_size: cli.max_block_size.unwrap_or(file.testing.max_block_size),
            min_order: cli.min_order.unwrap_or(file.allocator.min_order),
            max_order: cli.max_order.unwrap_or(file.allocator.max_order),
            alignment: cli.alignment.unwrap_or(file.allocator.alignment),
            threads: cli.threads.unwrap_or(file.testing.threads),
            duration: cli.duration.unwrap_or(file.testing.duration_seconds),
            seed: cli.seed.or(file.testing.random_seed),
            out: cli
                .out
                .clone()
                .unwrap_or_else(|| file.output.directory.clone()),
            format,
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), String> {
        if self.min_order == 0 {
            return Err("min-order must be greater than zero".to_string());
        }
        if self.min_order >= self.max_order {
            return Err("min-order must be less than max-order".to_string());
        }
        if self.max_order > MAX_SUPPORTED_ORDER {
            return Err(format!(
                "max-order too large (limit {})",
                MAX_SUPPORTED_ORDER
            ));
        }
        if !self.alignment.is_power_of_two() {
            return Err("alignment must be a power of two".to_string());
        }
        if self.threads == 0 {
            return Err("threads must be at least 1".to_string());
        }
        if self.min_block_size > self.max_block_size {
            return Err("min-block-size must not exceed max-block-size".to_string());
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err("duration must be a positive number of seconds".to_string());
        }
        Ok(())
    }
}
