//! bulkslice - slice coordination for bulk-by-scroll jobs
//!
//! A bulk-by-scroll job (reindex, update-by-query, delete-by-query) can be
//! split into slices that run in parallel. A parent task owns the slices:
//! it aggregates their live progress, fans rethrottle and cancel requests
//! out to them, and delivers one combined response once every slice has
//! reported.
//!
//! # Architecture
//!
//! - **status**: immutable progress snapshots, rates and responses
//! - **stats**: slot table and order-independent aggregation
//! - **coordinator**: the parent task, rethrottle fan-out and task registry
//! - **worker**: slice contexts, throttling and the simulated slice workload
//! - **config / output**: CLI, TOML job files and result formatting

pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod output;
pub mod stats;
pub mod status;
pub mod util;
pub mod worker;

// Re-export commonly used types
pub use config::JobConfig;
pub use coordinator::{ParentTask, TaskRegistry};
pub use error::{CoordinationError, RegistryError, TaskId};
pub use status::{BulkByScrollResponse, RequestsPerSecond, Status};

/// Result type used throughout bulkslice
pub type Result<T> = anyhow::Result<T>;
