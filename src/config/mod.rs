//! Configuration module
//!
//! Handles CLI argument parsing, TOML job files, and validation.

pub mod cli;
pub mod toml;
pub mod validator;

use crate::error::SlicesError;
use crate::status::RequestsPerSecond;
use clap::ValueEnum;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Complete job configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub kind: JobKind,
    #[serde(default)]
    pub slices: SlicesSetting,
    #[serde(default)]
    pub requests_per_second: RequestsPerSecond,
    #[serde(default)]
    pub workload: WorkloadConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Kind of bulk-by-scroll job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    #[default]
    Reindex,
    UpdateByQuery,
    DeleteByQuery,
}

impl JobKind {
    /// Index the simulated job writes to
    pub fn destination(&self) -> &'static str {
        match self {
            JobKind::Reindex => "dest",
            JobKind::UpdateByQuery | JobKind::DeleteByQuery => "source",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Reindex => write!(f, "reindex"),
            JobKind::UpdateByQuery => write!(f, "update_by_query"),
            JobKind::DeleteByQuery => write!(f, "delete_by_query"),
        }
    }
}

/// How many slices to split a job into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "SlicesInput")]
pub enum SlicesSetting {
    /// One slice per available CPU
    Auto,
    Count(usize),
}

impl Default for SlicesSetting {
    fn default() -> Self {
        SlicesSetting::Count(1)
    }
}

impl SlicesSetting {
    /// Concrete slice count (always at least 1)
    pub fn resolve(&self) -> usize {
        match self {
            SlicesSetting::Auto => num_cpus::get().max(1),
            SlicesSetting::Count(count) => (*count).max(1),
        }
    }
}

impl fmt::Display for SlicesSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlicesSetting::Auto => write!(f, "auto"),
            SlicesSetting::Count(count) => write!(f, "{}", count),
        }
    }
}

impl FromStr for SlicesSetting {
    type Err = SlicesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("auto") {
            return Ok(SlicesSetting::Auto);
        }
        match trimmed.parse::<usize>() {
            Ok(0) => Err(SlicesError::Zero),
            Ok(count) => Ok(SlicesSetting::Count(count)),
            Err(_) => Err(SlicesError::Unparsable(s.to_string())),
        }
    }
}

impl Serialize for SlicesSetting {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SlicesSetting::Auto => serializer.serialize_str("auto"),
            SlicesSetting::Count(count) => serializer.serialize_u64(*count as u64),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SlicesInput {
    Number(u64),
    Text(String),
}

impl TryFrom<SlicesInput> for SlicesSetting {
    type Error = SlicesError;

    fn try_from(input: SlicesInput) -> Result<Self, Self::Error> {
        match input {
            SlicesInput::Number(0) => Err(SlicesError::Zero),
            SlicesInput::Number(count) => Ok(SlicesSetting::Count(count as usize)),
            SlicesInput::Text(text) => text.parse(),
        }
    }
}

/// What to do when a document changed between scroll and bulk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ConflictMode {
    /// Stop the slice and report the conflict as a bulk failure
    #[default]
    Abort,
    /// Count the conflict and keep going
    Proceed,
}

/// Simulated workload each slice runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Documents each slice scrolls through
    #[serde(default = "default_docs_per_slice")]
    pub docs_per_slice: u64,
    /// Documents per scroll batch / bulk request
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// Simulated time one batch takes before throttling
    #[serde(default = "default_batch_latency_ms")]
    pub batch_latency_ms: u64,
    /// Probability (0.0-1.0) that a document hits a version conflict
    #[serde(default)]
    pub version_conflict_rate: f64,
    #[serde(default)]
    pub conflicts: ConflictMode,
    /// Slices that fail with an engine error
    #[serde(default)]
    pub failing_slices: Vec<usize>,
    /// Batches a failing slice completes before it fails
    #[serde(default = "default_fail_after_batches")]
    pub fail_after_batches: u64,
    /// Seed for reproducible runs (per slice: seed + slice id)
    pub seed: Option<u64>,
}

fn default_docs_per_slice() -> u64 {
    1000
}

fn default_batch_size() -> u64 {
    100
}

fn default_batch_latency_ms() -> u64 {
    5
}

fn default_fail_after_batches() -> u64 {
    1
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            docs_per_slice: default_docs_per_slice(),
            batch_size: default_batch_size(),
            batch_latency_ms: default_batch_latency_ms(),
            version_conflict_rate: 0.0,
            conflicts: ConflictMode::default(),
            failing_slices: Vec::new(),
            fail_after_batches: default_fail_after_batches(),
            seed: None,
        }
    }
}

/// Mid-run management actions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Interval between live status lines
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
    /// Rethrottle this long after start
    pub rethrottle_after_ms: Option<u64>,
    /// New job-wide rate for the rethrottle
    pub rethrottle_to: Option<RequestsPerSecond>,
    /// Cancel this long after start
    pub cancel_after_ms: Option<u64>,
    #[serde(default = "default_cancel_reason")]
    pub cancel_reason: String,
}

fn default_status_interval_ms() -> u64 {
    500
}

fn default_cancel_reason() -> String {
    "by user request".to_string()
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            status_interval_ms: default_status_interval_ms(),
            rethrottle_after_ms: None,
            rethrottle_to: None,
            cancel_after_ms: None,
            cancel_reason: default_cancel_reason(),
        }
    }
}

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    /// Also write the final response as JSON to this file
    pub json_output: Option<PathBuf>,
    /// Suppress live status lines
    #[serde(default)]
    pub quiet: bool,
}
