//! Progress status model
//!
//! Immutable value types describing the progress of a bulk-by-scroll job:
//!
//! - [`Counters`]: the additive tallies a slice accumulates while it works
//! - [`Status`]: a snapshot of one slice, or the aggregate over all slices
//! - [`Outcome`]: a slice's terminal result, success status or failure cause
//! - [`SliceState`]: a per-slice entry of the aggregate, `Running` until the
//!   slice reports
//!
//! # Example
//!
//! ```
//! use bulkslice::status::{Counters, Status};
//!
//! let counters = Counters { total: 100, created: 60, updated: 30, deleted: 10, ..Default::default() };
//! let status = Status::for_slice(0, counters);
//!
//! assert_eq!(status.slice_id(), Some(0));
//! assert!(status.is_consistent());
//! ```

pub mod rate;
pub mod response;

pub use rate::RequestsPerSecond;
pub use response::{BulkByScrollResponse, BulkFailure, SearchFailure, SliceFailureEntry, SliceResponse};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;
use std::ops::AddAssign;
use std::time::Duration;

/// Additive progress counters
///
/// Every field sums across slices, which is what makes aggregation
/// independent of the order in which slices report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub total: u64,
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
    pub noops: u64,
    pub version_conflicts: u64,
    pub batches: u64,
    pub search_retries: u64,
    pub bulk_retries: u64,
    /// Time spent sleeping to honour the throttle
    pub throttled: Duration,
}

impl Counters {
    /// Documents accounted for by an outcome (created, updated, deleted or noop)
    pub fn processed(&self) -> u64 {
        self.created + self.updated + self.deleted + self.noops
    }
}

impl AddAssign<&Counters> for Counters {
    fn add_assign(&mut self, other: &Counters) {
        self.total += other.total;
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.noops += other.noops;
        self.version_conflicts += other.version_conflicts;
        self.batches += other.batches;
        self.search_retries += other.search_retries;
        self.bulk_retries += other.bulk_retries;
        self.throttled += other.throttled;
    }
}

/// Immutable progress snapshot
///
/// A per-slice status carries `slice_id`; the aggregate status of a parent
/// task carries `slices` instead, one [`SliceState`] per slice ordinal.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    slice_id: Option<usize>,
    counters: Counters,
    requests_per_second: RequestsPerSecond,
    throttled_until: Duration,
    reason_cancelled: Option<String>,
    slices: Option<Vec<SliceState>>,
}

impl Status {
    /// Status of a single slice with unlimited rate and nothing pending
    pub fn for_slice(slice_id: usize, counters: Counters) -> Self {
        Self {
            slice_id: Some(slice_id),
            counters,
            requests_per_second: RequestsPerSecond::Unlimited,
            throttled_until: Duration::ZERO,
            reason_cancelled: None,
            slices: None,
        }
    }

    /// Status of an unsliced worker
    pub fn unsliced(counters: Counters) -> Self {
        Self {
            slice_id: None,
            ..Self::for_slice(0, counters)
        }
    }

    /// Aggregate status of a parent task
    pub(crate) fn aggregate(
        counters: Counters,
        requests_per_second: RequestsPerSecond,
        throttled_until: Duration,
        reason_cancelled: Option<String>,
        slices: Vec<SliceState>,
    ) -> Self {
        Self {
            slice_id: None,
            counters,
            requests_per_second,
            throttled_until,
            reason_cancelled,
            slices: Some(slices),
        }
    }

    pub fn with_requests_per_second(mut self, requests_per_second: RequestsPerSecond) -> Self {
        self.requests_per_second = requests_per_second;
        self
    }

    pub fn with_throttled_until(mut self, throttled_until: Duration) -> Self {
        self.throttled_until = throttled_until;
        self
    }

    pub fn with_reason_cancelled(mut self, reason: impl Into<String>) -> Self {
        self.reason_cancelled = Some(reason.into());
        self
    }

    pub(crate) fn with_slice_id(mut self, slice_id: usize) -> Self {
        self.slice_id = Some(slice_id);
        self
    }

    pub fn slice_id(&self) -> Option<usize> {
        self.slice_id
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn total(&self) -> u64 {
        self.counters.total
    }

    pub fn created(&self) -> u64 {
        self.counters.created
    }

    pub fn updated(&self) -> u64 {
        self.counters.updated
    }

    pub fn deleted(&self) -> u64 {
        self.counters.deleted
    }

    pub fn noops(&self) -> u64 {
        self.counters.noops
    }

    pub fn version_conflicts(&self) -> u64 {
        self.counters.version_conflicts
    }

    pub fn batches(&self) -> u64 {
        self.counters.batches
    }

    pub fn search_retries(&self) -> u64 {
        self.counters.search_retries
    }

    pub fn bulk_retries(&self) -> u64 {
        self.counters.bulk_retries
    }

    pub fn throttled(&self) -> Duration {
        self.counters.throttled
    }

    pub fn requests_per_second(&self) -> RequestsPerSecond {
        self.requests_per_second
    }

    pub fn throttled_until(&self) -> Duration {
        self.throttled_until
    }

    pub fn reason_cancelled(&self) -> Option<&str> {
        self.reason_cancelled.as_deref()
    }

    /// Per-slice breakdown; present only on a parent task's aggregate
    pub fn slices(&self) -> Option<&[SliceState]> {
        self.slices.as_deref()
    }

    /// Whether every processed document is accounted for
    /// (`created + updated + deleted + noops == total`).
    ///
    /// Holds for terminal slice statuses; in-flight statuses may lag.
    pub fn is_consistent(&self) -> bool {
        self.counters.processed() == self.counters.total
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Retries {
            bulk: u64,
            search: u64,
        }

        let c = &self.counters;
        let mut map = serializer.serialize_map(None)?;
        if let Some(slice_id) = self.slice_id {
            map.serialize_entry("slice_id", &slice_id)?;
        }
        map.serialize_entry("total", &c.total)?;
        map.serialize_entry("updated", &c.updated)?;
        map.serialize_entry("created", &c.created)?;
        map.serialize_entry("deleted", &c.deleted)?;
        map.serialize_entry("batches", &c.batches)?;
        map.serialize_entry("version_conflicts", &c.version_conflicts)?;
        map.serialize_entry("noops", &c.noops)?;
        map.serialize_entry(
            "retries",
            &Retries {
                bulk: c.bulk_retries,
                search: c.search_retries,
            },
        )?;
        map.serialize_entry("throttled_millis", &(c.throttled.as_millis() as u64))?;
        map.serialize_entry("requests_per_second", &self.requests_per_second)?;
        if let Some(reason) = &self.reason_cancelled {
            map.serialize_entry("canceled", reason)?;
        }
        map.serialize_entry(
            "throttled_until_millis",
            &(self.throttled_until.as_millis() as u64),
        )?;
        if let Some(slices) = &self.slices {
            map.serialize_entry("slices", slices)?;
        }
        map.end()
    }
}

/// Terminal failure cause of a slice
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SliceFailure {
    reason: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    timed_out: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    cancelled: bool,
}

impl SliceFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            timed_out: false,
            cancelled: false,
        }
    }

    /// Slice gave up because a search or bulk request timed out
    pub fn timed_out(reason: impl Into<String>) -> Self {
        Self {
            timed_out: true,
            ..Self::new(reason)
        }
    }

    /// Slice was stopped before it could report a status
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self {
            cancelled: true,
            ..Self::new(reason)
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn is_timed_out(&self) -> bool {
        self.timed_out
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl fmt::Display for SliceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)?;
        if self.timed_out {
            write!(f, " (timed out)")?;
        }
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}

/// Terminal result of one slice: exactly one of status or failure
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    Status(Box<Status>),
    Failure { reason: SliceFailure },
}

impl Outcome {
    pub fn success(status: Status) -> Self {
        Outcome::Status(Box::new(status))
    }

    pub fn failure(reason: SliceFailure) -> Self {
        Outcome::Failure { reason }
    }

    pub fn status(&self) -> Option<&Status> {
        match self {
            Outcome::Status(status) => Some(status),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&SliceFailure> {
        match self {
            Outcome::Status(_) => None,
            Outcome::Failure { reason } => Some(reason),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Status(_))
    }
}

/// Per-slice entry of an aggregate status
///
/// Renders as `null` while running, then as the slice's outcome.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum SliceState {
    #[default]
    Running,
    Finished(Outcome),
}

impl SliceState {
    pub fn is_running(&self) -> bool {
        matches!(self, SliceState::Running)
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        match self {
            SliceState::Running => None,
            SliceState::Finished(outcome) => Some(outcome),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn counters(total: u64, created: u64, updated: u64, deleted: u64, noops: u64) -> Counters {
        Counters {
            total,
            created,
            updated,
            deleted,
            noops,
            ..Default::default()
        }
    }

    #[test]
    fn test_counters_add() {
        let mut sum = Counters::default();
        sum += &Counters {
            version_conflicts: 2,
            throttled: Duration::from_millis(5),
            ..counters(10, 4, 3, 2, 1)
        };
        sum += &Counters {
            batches: 3,
            throttled: Duration::from_millis(7),
            ..counters(5, 5, 0, 0, 0)
        };

        assert_eq!(sum.total, 15);
        assert_eq!(sum.created, 9);
        assert_eq!(sum.version_conflicts, 2);
        assert_eq!(sum.batches, 3);
        assert_eq!(sum.throttled, Duration::from_millis(12));
        assert_eq!(sum.processed(), 15);
    }

    #[test]
    fn test_consistency_check() {
        assert!(Status::for_slice(0, counters(10, 4, 3, 2, 1)).is_consistent());
        assert!(!Status::for_slice(0, counters(10, 4, 3, 2, 0)).is_consistent());
    }

    #[test]
    fn test_unsliced_has_no_slice_id() {
        let status = Status::unsliced(counters(1, 1, 0, 0, 0));
        assert_eq!(status.slice_id(), None);
        assert!(status.slices().is_none());
    }

    #[test]
    fn test_slice_status_json() {
        let status = Status::for_slice(2, counters(10, 4, 3, 2, 1))
            .with_requests_per_second(RequestsPerSecond::Limited(50.0))
            .with_throttled_until(Duration::from_millis(250));

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["slice_id"], 2);
        assert_eq!(value["total"], 10);
        assert_eq!(value["retries"], json!({ "bulk": 0, "search": 0 }));
        assert_eq!(value["requests_per_second"], 50.0);
        assert_eq!(value["throttled_until_millis"], 250);
        assert!(value.get("slices").is_none());
        assert!(value.get("canceled").is_none());
    }

    #[test]
    fn test_aggregate_json_renders_every_slice_state() {
        let done = Status::for_slice(0, counters(3, 3, 0, 0, 0));
        let status = Status::aggregate(
            counters(3, 3, 0, 0, 0),
            RequestsPerSecond::Unlimited,
            Duration::ZERO,
            Some("by user request".to_string()),
            vec![
                SliceState::Finished(Outcome::success(done)),
                SliceState::Running,
                SliceState::Finished(Outcome::failure(SliceFailure::timed_out("search timed out"))),
            ],
        );

        let value = serde_json::to_value(&status).unwrap();
        assert!(value.get("slice_id").is_none());
        assert_eq!(value["requests_per_second"], -1.0);
        assert_eq!(value["canceled"], "by user request");
        assert_eq!(value["slices"][0]["slice_id"], 0);
        assert_eq!(value["slices"][1], serde_json::Value::Null);
        assert_eq!(
            value["slices"][2],
            json!({ "reason": { "reason": "search timed out", "timed_out": true } })
        );
    }

    #[test]
    fn test_outcome_accessors() {
        let ok = Outcome::success(Status::for_slice(1, Counters::default()));
        assert!(ok.is_success());
        assert_eq!(ok.status().and_then(Status::slice_id), Some(1));
        assert!(ok.failure_reason().is_none());

        let failed = Outcome::failure(SliceFailure::cancelled("stopped"));
        assert!(!failed.is_success());
        assert!(failed.failure_reason().map(SliceFailure::is_cancelled).unwrap_or(false));
        assert_eq!(failed.failure_reason().unwrap().to_string(), "stopped (cancelled)");
    }

    #[test]
    fn test_slice_state_defaults_to_running() {
        let state = SliceState::default();
        assert!(state.is_running());
        assert!(state.outcome().is_none());
    }
}
