//! Slice and job responses
//!
//! [`SliceResponse`] is what a successful slice hands to its parent when it
//! finishes. [`BulkByScrollResponse`] is the single aggregated response the
//! parent delivers once every slice has reported.

use super::{SliceFailure, Status};
use crate::util::time::millis;
use serde::Serialize;
use std::time::Duration;

/// A document the bulk request could not mutate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkFailure {
    pub index: String,
    pub id: String,
    pub cause: String,
    /// HTTP-style status code of the failed item (409 for version conflicts)
    pub status: u16,
}

impl BulkFailure {
    pub fn new(index: impl Into<String>, id: impl Into<String>, cause: impl Into<String>, status: u16) -> Self {
        Self {
            index: index.into(),
            id: id.into(),
            cause: cause.into(),
            status,
        }
    }
}

/// A shard the scroll could not read
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchFailure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    pub reason: String,
}

impl SearchFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            shard: None,
            node: None,
            reason: reason.into(),
        }
    }
}

/// Final report of a slice that ran to completion (or stopped on cancellation)
#[derive(Debug, Clone, PartialEq)]
pub struct SliceResponse {
    took: Duration,
    status: Status,
    bulk_failures: Vec<BulkFailure>,
    search_failures: Vec<SearchFailure>,
    timed_out: bool,
}

impl SliceResponse {
    pub fn new(took: Duration, status: Status) -> Self {
        Self {
            took,
            status,
            bulk_failures: Vec::new(),
            search_failures: Vec::new(),
            timed_out: false,
        }
    }

    pub fn with_bulk_failures(mut self, failures: Vec<BulkFailure>) -> Self {
        self.bulk_failures = failures;
        self
    }

    pub fn with_search_failures(mut self, failures: Vec<SearchFailure>) -> Self {
        self.search_failures = failures;
        self
    }

    pub fn with_timed_out(mut self, timed_out: bool) -> Self {
        self.timed_out = timed_out;
        self
    }

    pub fn took(&self) -> Duration {
        self.took
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn bulk_failures(&self) -> &[BulkFailure] {
        &self.bulk_failures
    }

    pub fn search_failures(&self) -> &[SearchFailure] {
        &self.search_failures
    }

    pub fn is_timed_out(&self) -> bool {
        self.timed_out
    }

    /// Split into the parts the parent keeps separately
    pub(crate) fn into_parts(self) -> (Duration, Status, Vec<BulkFailure>, Vec<SearchFailure>, bool) {
        (
            self.took,
            self.status,
            self.bulk_failures,
            self.search_failures,
            self.timed_out,
        )
    }
}

/// A failed slice in the aggregated response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SliceFailureEntry {
    pub slice_id: usize,
    pub reason: SliceFailure,
}

/// Aggregated response of a sliced job, delivered exactly once
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkByScrollResponse {
    #[serde(rename = "took_millis", with = "millis")]
    took: Duration,
    timed_out: bool,
    #[serde(flatten)]
    status: Status,
    bulk_failures: Vec<BulkFailure>,
    search_failures: Vec<SearchFailure>,
    slice_failures: Vec<SliceFailureEntry>,
}

impl BulkByScrollResponse {
    pub(crate) fn new(
        took: Duration,
        status: Status,
        bulk_failures: Vec<BulkFailure>,
        search_failures: Vec<SearchFailure>,
        slice_failures: Vec<SliceFailureEntry>,
        timed_out: bool,
    ) -> Self {
        Self {
            took,
            timed_out,
            status,
            bulk_failures,
            search_failures,
            slice_failures,
        }
    }

    /// Longest `took` among the slices
    pub fn took(&self) -> Duration {
        self.took
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn bulk_failures(&self) -> &[BulkFailure] {
        &self.bulk_failures
    }

    pub fn search_failures(&self) -> &[SearchFailure] {
        &self.search_failures
    }

    pub fn slice_failures(&self) -> &[SliceFailureEntry] {
        &self.slice_failures
    }

    /// True if any slice timed out
    pub fn is_timed_out(&self) -> bool {
        self.timed_out
    }

    /// No slice failed, no document failed, nothing timed out
    pub fn is_success(&self) -> bool {
        self.slice_failures.is_empty()
            && self.bulk_failures.is_empty()
            && self.search_failures.is_empty()
            && !self.timed_out
    }
}
