//! Telemetry sink for allocator benchmarks
//!
//! A thread-safe, append-only tabular writer. Every record carries the
//! same ten columns; summary rows reuse the per-operation columns for
//! throughput figures, a shape kept bit-exact for compatibility with
//! downstream report tooling.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::str::FromStr;

use log::info;
use parking_lot::Mutex;
use serde::Serialize;

/// Column header emitted once into a fresh CSV file.
const CSV_HEADER: &str =
    "Timestamp,Operation,BlockSize,Time,Fragmentation,Source,CallStack,MemoryAddress,ThreadID,AllocationID";

/// Output encoding of the telemetry stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Comma-separated rows with a single header row.
    Csv,
    /// One JSON object per line, same field names as the CSV columns.
    Json,
}

impl OutputFormat {
    /// File extension conventionally used for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format '{}'", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// One telemetry row.
///
/// For `Operation` values `"Allocation"`/`"Deallocation"` the fields
/// mean what their names say; for `"Summary"` rows `time` carries the
/// allocation throughput (ops/sec), `fragmentation` the deallocation
/// throughput, `source` the free-space ratio, and `call_stack` the
/// summary description.
#[derive(Debug, Clone, Serialize)]
pub struct OperationRecord {
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "Operation")]
    pub operation: String,
    #[serde(rename = "BlockSize")]
    pub block_size: usize,
    #[serde(rename = "Time")]
    pub time: f64,
    #[serde(rename = "Fragmentation")]
    pub fragmentation: f64,
    #[serde(rename = "Source")]
    pub source: String,
    #[serde(rename = "CallStack")]
    pub call_stack: String,
    #[serde(rename = "MemoryAddress")]
    pub memory_address: String,
    #[serde(rename = "ThreadID")]
    pub thread_id: String,
    #[serde(rename = "AllocationID")]
    pub allocation_id: String,
}

impl OperationRecord {
    fn csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{},{}",
            self.timestamp,
            self.operation,
            self.block_size,
            self.time,
            self.fragmentation,
            self.source,
            self.call_stack,
            self.memory_address,
            self.thread_id,
            self.allocation_id
        )
    }
}

/// Thread-safe append-only telemetry writer.
pub struct DataLogger {
    file: Mutex<File>,
    format: OutputFormat,
}

impl DataLogger {
    /// Open (or create) the log file in append mode.
    ///
    /// For CSV output the column header row is written only when the
    /// file is new or empty, so repeated runs append cleanly.
    pub fn create(path: &Path, format: OutputFormat) -> io::Result<Self> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if format == OutputFormat::Csv && file.metadata()?.len() == 0 {
            writeln!(file, "{}", CSV_HEADER)?;
        }
        info!("telemetry sink opened: {}", path.display());
        Ok(Self {
            file: Mutex::new(file),
            format,
        })
    }

    /// Append one per-operation record.
    pub fn log(&self, record: &OperationRecord) -> io::Result<()> {
        let line = match self.format {
            OutputFormat::Csv => record.csv_row(),
            OutputFormat::Json => serde_json::to_string(record).map_err(io::Error::other)?,
        };
        let mut file = self.file.lock();
        writeln!(file, "{}", line)
    }

    /// Append a summary record with aggregate throughput figures.
    ///
    /// `fragmentation` is the pool's free-space ratio, passed through
    /// unscaled — the same unit the per-operation rows carry.
    pub fn log_summary(
        &self,
        description: &str,
        alloc_throughput: f64,
        dealloc_throughput: f64,
        fragmentation: f64,
    ) -> io::Result<()> {
        self.log(&OperationRecord {
            timestamp: timestamp_now(),
            operation: "Summary".to_string(),
            block_size: 0,
            time: alloc_throughput,
            fragmentation: dealloc_throughput,
            source: format!("{}", fragmentation),
            call_stack: description.to_string(),
            memory_address: String::new(),
            thread_id: String::new(),
            allocation_id: String::new(),
        })
    }
}

/// Local wall-clock timestamp in `YYYY-MM-DD HH:MM:SS` form.
pub fn timestamp_now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Rendering of the calling thread's id for the ThreadID column.
pub fn current_thread_id() -> String {
    format!("{:?}", std::thread::current().id())
}
