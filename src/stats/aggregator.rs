//! Statistics aggregation
//!
//! The aggregator folds each slice's terminal result into a running total as
//! it arrives. It is the only writer of aggregate state; the parent task keeps
//! it behind its lock.
//!
//! # Features
//!
//! - **Incremental sums**: counters are added once, when the slice reports
//! - **Order independent**: every tracked value is a sum, a max, a min or an OR
//! - **Partial failures**: failed slices add nothing but are kept for the response
//! - **Cheap snapshots**: a snapshot copies the running totals and the slot table
//!
//! # Example
//!
//! ```
//! use bulkslice::stats::Aggregator;
//! use bulkslice::status::{Counters, RequestsPerSecond, SliceResponse, Status};
//! use std::time::Duration;
//!
//! let mut aggregator = Aggregator::new(2);
//! let counters = Counters { total: 10, created: 10, ..Default::default() };
//! let response = SliceResponse::new(Duration::from_millis(5), Status::for_slice(0, counters));
//!
//! assert_eq!(aggregator.record_slice(0, Ok(response)), Ok(false));
//!
//! let status = aggregator.snapshot(RequestsPerSecond::Unlimited, None);
//! assert_eq!(status.total(), 10);
//! assert!(status.slices().unwrap()[1].is_running());
//! ```

use super::SlotTable;
use crate::error::CoordinationError;
use crate::status::{
    BulkByScrollResponse, BulkFailure, Counters, Outcome, RequestsPerSecond, SearchFailure, SliceFailure,
    SliceFailureEntry, SliceResponse, Status,
};
use std::time::Duration;

/// What a slice hands back when it stops: its final report or why it failed
pub type SliceResult = Result<SliceResponse, SliceFailure>;

/// Running aggregate over the slices of one parent task
#[derive(Debug)]
pub struct Aggregator {
    slots: SlotTable,

    /// Sum of the counters of every successful slice
    counters: Counters,

    /// Smallest throttled_until among successful slices
    throttled_until: Option<Duration>,

    /// Longest took among successful slices
    took: Duration,

    /// OR of every slice's timed-out flag
    timed_out: bool,

    bulk_failures: Vec<BulkFailure>,
    search_failures: Vec<SearchFailure>,
    slice_failures: Vec<SliceFailureEntry>,
}

impl Aggregator {
    pub fn new(num_slices: usize) -> Self {
        Self {
            slots: SlotTable::new(num_slices),
            counters: Counters::default(),
            throttled_until: None,
            took: Duration::ZERO,
            timed_out: false,
            bulk_failures: Vec::new(),
            search_failures: Vec::new(),
            slice_failures: Vec::new(),
        }
    }

    /// Record the terminal result of slice `index`.
    ///
    /// Returns `true` if this filled the last unset slot. Defects (out of
    /// range, already reported) leave the aggregate untouched.
    pub fn record_slice(&mut self, index: usize, result: SliceResult) -> Result<bool, CoordinationError> {
        self.slots.check_unset(index)?;

        let outcome = match result {
            Ok(response) => {
                let (took, status, bulk_failures, search_failures, timed_out) = response.into_parts();
                self.counters += status.counters();
                self.throttled_until = Some(match self.throttled_until {
                    Some(current) => current.min(status.throttled_until()),
                    None => status.throttled_until(),
                });
                self.took = self.took.max(took);
                self.timed_out |= timed_out;
                self.bulk_failures.extend(bulk_failures);
                self.search_failures.extend(search_failures);
                Outcome::success(status.with_slice_id(index))
            }
            Err(failure) => {
                self.timed_out |= failure.is_timed_out();
                self.slice_failures.push(SliceFailureEntry {
                    slice_id: index,
                    reason: failure.clone(),
                });
                Outcome::failure(failure)
            }
        };

        self.slots.set(index, outcome)
    }

    pub fn slots(&self) -> &SlotTable {
        &self.slots
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn remaining(&self) -> usize {
        self.slots.remaining()
    }

    pub fn is_complete(&self) -> bool {
        self.slots.is_complete()
    }

    /// Current aggregate status, running slices shown as `Running`
    pub fn snapshot(&self, requests_per_second: RequestsPerSecond, reason_cancelled: Option<&str>) -> Status {
        Status::aggregate(
            self.counters,
            requests_per_second,
            self.throttled_until.unwrap_or(Duration::ZERO),
            reason_cancelled.map(str::to_string),
            self.slots.states().to_vec(),
        )
    }

    /// Build the final response.
    ///
    /// Moves the collected failure lists into the response; counters and
    /// slots stay so later snapshots still show the final totals.
    pub fn finish(
        &mut self,
        requests_per_second: RequestsPerSecond,
        reason_cancelled: Option<&str>,
    ) -> BulkByScrollResponse {
        let status = self.snapshot(requests_per_second, reason_cancelled);
        BulkByScrollResponse::new(
            self.took,
            status,
            std::mem::take(&mut self.bulk_failures),
            std::mem::take(&mut self.search_failures),
            std::mem::take(&mut self.slice_failures),
            self.timed_out,
        )
    }
}
