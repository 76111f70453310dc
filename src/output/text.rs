//! Human-readable text output

use crate::status::{BulkByScrollResponse, SliceState, Status};
use crate::util::time::{calculate_rate, format_duration, format_number, format_rate};
use std::fmt::Write;
use std::time::Duration;

const RULE: &str = "═══════════════════════════════════════════════════════════";

/// One-line live progress summary
pub fn format_status_line(status: &Status, elapsed: Duration) -> String {
    let (running, finished) = match status.slices() {
        Some(slices) => {
            let running = slices.iter().filter(|s| s.is_running()).count();
            (running, slices.len() - running)
        }
        None => (0, 0),
    };

    let mut line = format!(
        "[{:>7.1}s] {} docs ({} docs/s) | created {} updated {} deleted {} noops {} conflicts {} | slices {}/{} done | rps {}",
        elapsed.as_secs_f64(),
        format_number(status.total()),
        format_rate(calculate_rate(status.total(), elapsed)),
        format_number(status.created()),
        format_number(status.updated()),
        format_number(status.deleted()),
        format_number(status.noops()),
        format_number(status.version_conflicts()),
        finished,
        running + finished,
        status.requests_per_second(),
    );
    if let Some(reason) = status.reason_cancelled() {
        let _ = write!(line, " | cancelling ({})", reason);
    }
    line
}

/// Print a live progress line to stderr so stdout stays clean for results
pub fn print_status_line(status: &Status, elapsed: Duration) {
    eprintln!("{}", format_status_line(status, elapsed));
}

/// Full report of a finished job
pub fn format_response(description: &str, response: &BulkByScrollResponse) -> String {
    let status = response.status();
    let mut out = String::new();

    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "                    JOB RESULTS");
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out);
    let _ = writeln!(out, "Task:      {}", description);
    let _ = writeln!(out, "Took:      {}", format_duration(response.took()));
    let _ = writeln!(
        out,
        "Outcome:   {}",
        if response.is_success() { "success" } else { "completed with failures" }
    );
    if let Some(reason) = status.reason_cancelled() {
        let _ = writeln!(out, "Cancelled: {}", reason);
    }
    if response.is_timed_out() {
        let _ = writeln!(out, "Timed out: yes");
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Documents:");
    let _ = writeln!(
        out,
        "  Total:     {} ({} docs/s)",
        format_number(status.total()),
        format_rate(calculate_rate(status.total(), response.took()))
    );
    let _ = writeln!(out, "  Created:   {}", format_number(status.created()));
    let _ = writeln!(out, "  Updated:   {}", format_number(status.updated()));
    let _ = writeln!(out, "  Deleted:   {}", format_number(status.deleted()));
    let _ = writeln!(out, "  Noops:     {}", format_number(status.noops()));
    let _ = writeln!(out, "  Conflicts: {}", format_number(status.version_conflicts()));
    let _ = writeln!(out, "  Batches:   {}", format_number(status.batches()));
    let _ = writeln!(
        out,
        "  Retries:   {} bulk, {} search",
        status.bulk_retries(),
        status.search_retries()
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "Throttling:");
    let _ = writeln!(out, "  Requests/s: {}", status.requests_per_second());
    let _ = writeln!(out, "  Throttled:  {}", format_duration(status.throttled()));
    let _ = writeln!(out);

    if let Some(slices) = status.slices() {
        let _ = writeln!(out, "Slices:");
        for (id, slice) in slices.iter().enumerate() {
            let _ = writeln!(out, "  {:>3}: {}", id, describe_slice(slice));
        }
        let _ = writeln!(out);
    }

    if !response.slice_failures().is_empty() {
        let _ = writeln!(out, "Slice failures:");
        for failure in response.slice_failures() {
            let _ = writeln!(out, "  slice {}: {}", failure.slice_id, failure.reason);
        }
        let _ = writeln!(out);
    }

    if !response.bulk_failures().is_empty() {
        let _ = writeln!(out, "Bulk failures: {}", response.bulk_failures().len());
        for failure in response.bulk_failures().iter().take(10) {
            let _ = writeln!(
                out,
                "  [{}] {}/{}: {}",
                failure.status, failure.index, failure.id, failure.cause
            );
        }
        let _ = writeln!(out);
    }

    if !response.search_failures().is_empty() {
        let _ = writeln!(out, "Search failures: {}", response.search_failures().len());
        for failure in response.search_failures() {
            let _ = writeln!(out, "  {}", failure.reason);
        }
        let _ = writeln!(out);
    }

    let _ = write!(out, "{}", RULE);
    out
}

/// Print the final report to stdout
pub fn print_results(description: &str, response: &BulkByScrollResponse) {
    println!("{}", format_response(description, response));
}

fn describe_slice(slice: &SliceState) -> String {
    match slice.outcome() {
        None => "running".to_string(),
        Some(outcome) => match (outcome.status(), outcome.failure_reason()) {
            (Some(status), _) => {
                let mut text = format!(
                    "{} docs in {} batches",
                    format_number(status.total()),
                    status.batches()
                );
                if status.reason_cancelled().is_some() {
                    text.push_str(" (cancelled)");
                }
                text
            }
            (None, Some(failure)) => format!("failed: {}", failure),
            (None, None) => "unknown".to_string(),
        },
    }
}
