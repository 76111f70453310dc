//! JSON output formatting
//!
//! Status documents and the final response serialize through their own
//! `Serialize` impls; this module wraps them with the job metadata and
//! handles writing to disk.

use crate::coordinator::ParentTask;
use crate::error::TaskId;
use crate::status::{BulkByScrollResponse, Status};
use crate::Result;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Live status of a registered task: metadata plus its aggregate status
#[derive(Debug, Serialize)]
pub struct TaskStatusOutput<'a> {
    pub id: TaskId,
    pub description: &'a str,
    pub start_time: DateTime<Utc>,
    pub running_time_millis: u64,
    pub cancelled: bool,
    pub status: Status,
}

impl<'a> TaskStatusOutput<'a> {
    pub fn new(id: TaskId, task: &'a ParentTask) -> Self {
        let start_time = task.started_at();
        let running_time_millis = (Utc::now() - start_time).num_milliseconds().max(0) as u64;
        Self {
            id,
            description: task.description(),
            start_time,
            running_time_millis,
            cancelled: task.is_cancelled(),
            status: task.get_status(),
        }
    }
}

/// Final output: task metadata plus the aggregated response
#[derive(Debug, Serialize)]
pub struct JobOutput<'a> {
    pub id: TaskId,
    pub description: &'a str,
    pub start_time: DateTime<Utc>,
    pub response: &'a BulkByScrollResponse,
}

/// Render a task's live status as a single-line JSON document
pub fn task_status_to_json(id: TaskId, task: &ParentTask) -> Result<String> {
    serde_json::to_string(&TaskStatusOutput::new(id, task)).context("Failed to serialize status")
}

/// Render the final response as pretty JSON
pub fn response_to_json(output: &JobOutput<'_>) -> Result<String> {
    serde_json::to_string_pretty(output).context("Failed to serialize response")
}

/// Write the final response to a JSON file
pub fn write_json_file(output: &JobOutput<'_>, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create JSON output file: {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), output)
        .with_context(|| format!("Failed to write JSON output: {}", path.display()))?;
    Ok(())
}
