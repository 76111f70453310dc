//! Simulated worker slice
//!
//! Stands in for the scroll + bulk pipeline: walks through a fixed number of
//! synthetic documents in batches, sorts each document into created /
//! updated / deleted / noop according to the job kind, injects version
//! conflicts and failures on request, and honours throttling and
//! cancellation between batches.

use super::SliceContext;
use crate::config::{ConflictMode, JobKind, WorkloadConfig};
use crate::stats::aggregator::SliceResult;
use crate::status::{BulkFailure, Counters, SliceFailure, SliceResponse, Status};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Synthetic mutation workload for one slice
#[derive(Debug)]
pub struct SimulatedSlice {
    kind: JobKind,
    slice_id: usize,
    docs: u64,
    batch_size: u64,
    batch_latency: Duration,
    conflict_rate: f64,
    conflicts: ConflictMode,
    /// Fail with an engine error once this many batches have run
    fail_after_batches: Option<u64>,
    rng: StdRng,
}

impl SimulatedSlice {
    pub fn new(kind: JobKind, workload: &WorkloadConfig, slice_id: usize) -> Self {
        let rng = match workload.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(slice_id as u64)),
            None => StdRng::from_entropy(),
        };
        let fail_after_batches = workload
            .failing_slices
            .contains(&slice_id)
            .then_some(workload.fail_after_batches);

        Self {
            kind,
            slice_id,
            docs: workload.docs_per_slice,
            batch_size: workload.batch_size.max(1),
            batch_latency: Duration::from_millis(workload.batch_latency_ms),
            conflict_rate: workload.version_conflict_rate.clamp(0.0, 1.0),
            conflicts: workload.conflicts,
            fail_after_batches,
            rng,
        }
    }

    /// Run the slice to completion, failure or cancellation
    pub async fn run(mut self, mut ctx: SliceContext) -> SliceResult {
        let started = Instant::now();
        let mut counters = Counters::default();
        let mut bulk_failures = Vec::new();
        let mut processed = 0u64;
        let mut cancelled = false;

        while processed < self.docs {
            if ctx.is_cancelled() {
                cancelled = true;
                break;
            }
            if self.fail_after_batches == Some(counters.batches) {
                debug!(slice = self.slice_id, batches = counters.batches, "injecting slice failure");
                return Err(SliceFailure::new(format!(
                    "simulated engine failure in slice {} after {} batches",
                    self.slice_id, counters.batches
                )));
            }

            let batch_started = Instant::now();
            let size = self.batch_size.min(self.docs - processed);

            tokio::select! {
                _ = ctx.cancellation_token().cancelled() => {
                    cancelled = true;
                    break;
                }
                _ = tokio::time::sleep(self.batch_latency) => {}
            }

            let mut aborted = false;
            for offset in 0..size {
                if self.conflict_rate > 0.0 && self.rng.gen_bool(self.conflict_rate) {
                    counters.version_conflicts += 1;
                    if self.conflicts == ConflictMode::Abort {
                        bulk_failures.push(BulkFailure::new(
                            self.kind.destination(),
                            format!("{}-{}", self.slice_id, processed + offset),
                            "version conflict, document already exists",
                            409,
                        ));
                        aborted = true;
                        break;
                    }
                    continue;
                }
                self.apply_one(&mut counters);
            }

            counters.batches += 1;
            processed += size;
            trace!(slice = self.slice_id, processed, "batch done");

            if aborted {
                break;
            }

            counters.throttled += ctx.throttle(size, batch_started).await;
        }

        let mut status = Status::for_slice(self.slice_id, counters)
            .with_requests_per_second(ctx.requests_per_second());
        if cancelled {
            status = status.with_reason_cancelled("cancelled by parent task");
        }

        Ok(SliceResponse::new(started.elapsed(), status).with_bulk_failures(bulk_failures))
    }

    fn apply_one(&mut self, counters: &mut Counters) {
        counters.total += 1;
        match self.kind {
            JobKind::Reindex => {
                if self.rng.gen_bool(0.8) {
                    counters.created += 1;
                } else {
                    counters.updated += 1;
                }
            }
            JobKind::UpdateByQuery => {
                if self.rng.gen_bool(0.9) {
                    counters.updated += 1;
                } else {
                    counters.noops += 1;
                }
            }
            JobKind::DeleteByQuery => counters.deleted += 1,
        }
    }
}
