//! CLI argument parsing using clap

use super::{ConflictMode, JobKind, OutputFormat, SlicesSetting};
use crate::status::RequestsPerSecond;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

/// bulkslice - run a sliced bulk-by-scroll job against a simulated index
#[derive(Parser, Debug)]
#[command(name = "bulkslice")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// TOML job file; command-line options override it
    #[arg(short = 'c', long, env = "BULKSLICE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Kind of job to simulate
    #[arg(short = 'k', long, value_enum)]
    pub kind: Option<JobKind>,

    /// Number of slices, or "auto" for one per CPU
    #[arg(short = 's', long)]
    pub slices: Option<SlicesSetting>,

    /// Job-wide requests per second, or "unlimited"
    #[arg(short = 'r', long)]
    pub requests_per_second: Option<RequestsPerSecond>,

    // === Workload Options ===
    /// Documents each slice processes
    #[arg(long)]
    pub docs_per_slice: Option<u64>,

    /// Documents per batch
    #[arg(short = 'b', long)]
    pub batch_size: Option<u64>,

    /// Simulated time per batch in milliseconds
    #[arg(long)]
    pub batch_latency_ms: Option<u64>,

    /// Probability (0.0-1.0) of a version conflict per document
    #[arg(long)]
    pub conflict_rate: Option<f64>,

    /// Conflict handling
    #[arg(long, value_enum)]
    pub conflicts: Option<ConflictMode>,

    /// Slice ordinal that should fail (repeatable)
    #[arg(long = "fail-slice")]
    pub fail_slices: Vec<usize>,

    /// Random seed for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,

    // === Control Options ===
    /// Rethrottle the job this many milliseconds after start
    #[arg(long, requires = "rethrottle_to")]
    pub rethrottle_after_ms: Option<u64>,

    /// New requests per second for the rethrottle, or "unlimited"
    #[arg(long, requires = "rethrottle_after_ms")]
    pub rethrottle_to: Option<RequestsPerSecond>,

    /// Cancel the job this many milliseconds after start
    #[arg(long)]
    pub cancel_after_ms: Option<u64>,

    /// Milliseconds between live status lines
    #[arg(long)]
    pub status_interval_ms: Option<u64>,

    // === Output Options ===
    /// Output format for the final response
    #[arg(short = 'o', long, value_enum)]
    pub output: Option<OutputFormat>,

    /// Also write the final response as JSON to this file
    #[arg(long)]
    pub json_output: Option<PathBuf>,

    /// Suppress live status lines
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Validate the configuration and exit
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Checks clap cannot express
    pub fn validate(&self) -> Result<()> {
        if let Some(rate) = self.conflict_rate {
            if !(0.0..=1.0).contains(&rate) {
                anyhow::bail!("--conflict-rate must be between 0.0 and 1.0, got {}", rate);
            }
        }
        if self.batch_size == Some(0) {
            anyhow::bail!("--batch-size must be at least 1");
        }
        Ok(())
    }
}
