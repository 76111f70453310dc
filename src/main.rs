//! bulkslice CLI entry point

use anyhow::{Context, Result};
use bulkslice::config::{cli::Cli, JobConfig, JobKind, OutputFormat};
use bulkslice::coordinator::{ParentTask, TaskRegistry};
use bulkslice::output::json::{response_to_json, task_status_to_json, write_json_file, JobOutput};
use bulkslice::output::text::{print_results, print_status_line};
use bulkslice::worker::{spawn_slices, SimulatedSlice};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

fn main() -> Result<()> {
    bulkslice::logging::init_tracing();

    // Parse CLI arguments
    let cli = Cli::parse_args();
    cli.validate()?;

    let config = bulkslice::config::toml::build_config(&cli)?;
    bulkslice::config::validator::validate_config(&config)
        .context("Configuration validation failed")?;

    let text = config.output.format == OutputFormat::Text;
    if text {
        println!("bulkslice v{}", env!("CARGO_PKG_VERSION"));
        println!();
        print_configuration(&config);
    }

    if cli.dry_run {
        if text {
            println!();
            println!("Dry run mode - configuration validated successfully");
        }
        return Ok(());
    }

    let runtime = tokio::runtime::Runtime::new()
        .context("Failed to create tokio runtime")?;

    let success = runtime.block_on(run_job(&config))?;
    if !success {
        std::process::exit(1);
    }
    Ok(())
}

/// Run one sliced job to completion; returns whether it succeeded
async fn run_job(config: &JobConfig) -> Result<bool> {
    let registry = TaskRegistry::new();
    let slices = config.slices.resolve();
    let description = describe(config.kind, slices);

    let (task, receiver) = ParentTask::new(description, slices, config.requests_per_second)
        .context("Failed to create parent task")?;
    let id = registry.register(Arc::clone(&task));
    for (registered, description) in registry.list() {
        info!(id = registered, %description, "task registered");
    }

    let kind = config.kind;
    let workload = config.workload.clone();
    spawn_slices(&task, move |ctx| {
        SimulatedSlice::new(kind, &workload, ctx.slice_id()).run(ctx)
    })
    .context("Failed to start slices")?;

    let started = Instant::now();
    let control = &config.control;

    let completion = registry.wait_for_completion(id, receiver);
    tokio::pin!(completion);

    let mut ticker = tokio::time::interval(Duration::from_millis(control.status_interval_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await;

    let mut rethrottle_to = control.rethrottle_to;
    let rethrottle_timer = after_ms(control.rethrottle_after_ms);
    tokio::pin!(rethrottle_timer);

    let mut cancel_pending = control.cancel_after_ms.is_some();
    let cancel_timer = after_ms(control.cancel_after_ms);
    tokio::pin!(cancel_timer);

    let mut interrupt_pending = true;
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    let response = loop {
        tokio::select! {
            result = &mut completion => break result?,

            _ = ticker.tick() => {
                if config.output.quiet {
                    continue;
                }
                match config.output.format {
                    OutputFormat::Text => print_status_line(&registry.status(id)?, started.elapsed()),
                    OutputFormat::Json => eprintln!("{}", task_status_to_json(id, &*registry.get(id)?)?),
                }
            }

            _ = &mut rethrottle_timer, if rethrottle_to.is_some() => {
                if let Some(requests_per_second) = rethrottle_to.take() {
                    let assigned = registry.rethrottle(id, requests_per_second)?;
                    info!(
                        %requests_per_second,
                        slices = assigned.len(),
                        "rethrottle requested"
                    );
                }
            }

            _ = &mut cancel_timer, if cancel_pending => {
                cancel_pending = false;
                registry.cancel(id, control.cancel_reason.clone())?;
            }

            signal = &mut interrupt, if interrupt_pending => {
                interrupt_pending = false;
                match signal {
                    Ok(()) => registry.cancel(id, "interrupted")?,
                    Err(e) => warn!("failed to listen for interrupt: {}", e),
                }
            }
        }
    };

    let output = JobOutput {
        id,
        description: task.description(),
        start_time: task.started_at(),
        response: &response,
    };

    match config.output.format {
        OutputFormat::Text => print_results(task.description(), &response),
        OutputFormat::Json => println!("{}", response_to_json(&output)?),
    }

    if let Some(path) = &config.output.json_output {
        write_json_file(&output, path)?;
        if config.output.format == OutputFormat::Text {
            println!("JSON results written to {}", path.display());
        }
    }

    Ok(response.is_success())
}

/// Sleep for `ms` milliseconds, or forever when unset
async fn after_ms(ms: Option<u64>) {
    match ms {
        Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
        None => std::future::pending().await,
    }
}

fn describe(kind: JobKind, slices: usize) -> String {
    let job = match kind {
        JobKind::Reindex => format!("reindex from [source] to [{}]", kind.destination()),
        JobKind::UpdateByQuery | JobKind::DeleteByQuery => {
            format!("{} [{}]", kind, kind.destination())
        }
    };
    format!("{} ({} slices)", job, slices)
}

fn print_configuration(config: &JobConfig) {
    println!("Configuration:");
    println!("  Job:");
    println!("    Kind: {}", config.kind);
    println!("    Slices: {} ({} resolved)", config.slices, config.slices.resolve());
    println!("    Requests/s: {}", config.requests_per_second);

    let workload = &config.workload;
    println!("  Workload:");
    println!("    Docs per slice: {}", workload.docs_per_slice);
    println!("    Batch size: {}", workload.batch_size);
    println!("    Batch latency: {}ms", workload.batch_latency_ms);
    if workload.version_conflict_rate > 0.0 {
        println!(
            "    Version conflicts: {:.1}% ({:?})",
            workload.version_conflict_rate * 100.0,
            workload.conflicts
        );
    }
    if !workload.failing_slices.is_empty() {
        println!(
            "    Failing slices: {:?} (after {} batches)",
            workload.failing_slices, workload.fail_after_batches
        );
    }
    if let Some(seed) = workload.seed {
        println!("    Seed: {}", seed);
    }

    let control = &config.control;
    if let (Some(after), Some(to)) = (control.rethrottle_after_ms, control.rethrottle_to) {
        println!("  Rethrottle: to {} after {}ms", to, after);
    }
    if let Some(after) = control.cancel_after_ms {
        println!("  Cancel: after {}ms ({})", after, control.cancel_reason);
    }
    println!();
}
