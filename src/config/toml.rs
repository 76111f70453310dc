//! TOML job file parsing

use super::cli::Cli;
use super::*;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML job file
pub fn parse_toml_file(path: &Path) -> Result<JobConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML job configuration from string
pub fn parse_toml_string(contents: &str) -> Result<JobConfig> {
    let config: JobConfig = ::toml::from_str(contents)
        .context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Build the job configuration: job file (if any) overridden by the CLI
pub fn build_config(cli: &Cli) -> Result<JobConfig> {
    let config = match &cli.config {
        Some(path) => parse_toml_file(path)?,
        None => JobConfig::default(),
    };
    merge_cli_with_config(cli, config)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, mut config: JobConfig) -> Result<JobConfig> {
    if let Some(kind) = cli.kind {
        config.kind = kind;
    }
    if let Some(slices) = cli.slices {
        config.slices = slices;
    }
    if let Some(rps) = cli.requests_per_second {
        config.requests_per_second = rps;
    }

    // Workload
    if let Some(docs) = cli.docs_per_slice {
        config.workload.docs_per_slice = docs;
    }
    if let Some(batch_size) = cli.batch_size {
        config.workload.batch_size = batch_size;
    }
    if let Some(latency) = cli.batch_latency_ms {
        config.workload.batch_latency_ms = latency;
    }
    if let Some(rate) = cli.conflict_rate {
        config.workload.version_conflict_rate = rate;
    }
    if let Some(conflicts) = cli.conflicts {
        config.workload.conflicts = conflicts;
    }
    if !cli.fail_slices.is_empty() {
        config.workload.failing_slices = cli.fail_slices.clone();
    }
    if cli.seed.is_some() {
        config.workload.seed = cli.seed;
    }

    // Control
    if cli.rethrottle_after_ms.is_some() {
        config.control.rethrottle_after_ms = cli.rethrottle_after_ms;
        config.control.rethrottle_to = cli.rethrottle_to;
    }
    if cli.cancel_after_ms.is_some() {
        config.control.cancel_after_ms = cli.cancel_after_ms;
    }
    if let Some(interval) = cli.status_interval_ms {
        config.control.status_interval_ms = interval;
    }

    // Output
    if let Some(format) = cli.output {
        config.output.format = format;
    }
    if cli.json_output.is_some() {
        config.output.json_output = cli.json_output.clone();
    }
    config.output.quiet |= cli.quiet;

    Ok(config)
}
