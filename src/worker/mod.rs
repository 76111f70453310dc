//! Worker slices
//!
//! A worker slice is one autonomous unit of a sliced job. It receives a
//! [`SliceContext`] when it registers with its parent, works through its part
//! of the source data, and reports exactly once.
//!
//! The context gives the slice:
//! - its ordinal and the total slice count
//! - a child cancellation token, cancelled when the parent is cancelled
//! - its current share of the job's rate, updated by rethrottles
//!
//! [`spawn_slices`] runs one tokio task per slice and routes every terminal
//! result (including a panic) into [`ParentTask::on_slice_response`].
//!
//! # Example
//!
//! ```
//! use bulkslice::coordinator::ParentTask;
//! use bulkslice::status::{Counters, RequestsPerSecond, SliceResponse, Status};
//! use bulkslice::worker::spawn_slices;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (parent, rx) = ParentTask::new("reindex", 3, RequestsPerSecond::Unlimited).unwrap();
//!
//! spawn_slices(&parent, |ctx| async move {
//!     let counters = Counters { total: 10, created: 10, ..Default::default() };
//!     Ok(SliceResponse::new(Duration::ZERO, Status::for_slice(ctx.slice_id(), counters)))
//! })
//! .unwrap();
//!
//! let response = rx.await.unwrap();
//! assert_eq!(response.status().total(), 30);
//! # }
//! ```

pub mod simulated;

pub use simulated::SimulatedSlice;

use crate::coordinator::ParentTask;
use crate::error::CoordinationError;
use crate::stats::aggregator::SliceResult;
use crate::status::{RequestsPerSecond, SliceFailure};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// What a worker slice gets from its parent when it registers
#[derive(Debug, Clone)]
pub struct SliceContext {
    slice_id: usize,
    total_slices: usize,
    cancel: CancellationToken,
    rate: watch::Receiver<RequestsPerSecond>,
}

impl SliceContext {
    pub(crate) fn new(
        slice_id: usize,
        total_slices: usize,
        cancel: CancellationToken,
        rate: watch::Receiver<RequestsPerSecond>,
    ) -> Self {
        Self {
            slice_id,
            total_slices,
            cancel,
            rate,
        }
    }

    pub fn slice_id(&self) -> usize {
        self.slice_id
    }

    pub fn total_slices(&self) -> usize {
        self.total_slices
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// This slice's current share of the job rate
    pub fn requests_per_second(&self) -> RequestsPerSecond {
        *self.rate.borrow()
    }

    /// Sleep long enough that a batch of `batch_size` requests started at
    /// `batch_started` averages out to the current rate.
    ///
    /// A rethrottle during the wait recomputes the delay against the new
    /// rate. Cancellation ends the wait early. Returns the time spent waiting.
    pub async fn throttle(&mut self, batch_size: u64, batch_started: Instant) -> Duration {
        let began = Instant::now();

        loop {
            let delay = self
                .requests_per_second()
                .batch_delay(batch_size, batch_started.elapsed());
            if delay.is_zero() || self.cancel.is_cancelled() {
                break;
            }

            let rate_source_gone = tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => break,
                changed = self.rate.changed() => changed.is_err(),
            };

            if rate_source_gone {
                // Parent is gone; finish the wait at the last known rate
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
                break;
            }
        }

        began.elapsed()
    }
}

/// Spawn one task per slice of `parent`, each running `work` with its own
/// context, and report every result to the parent.
///
/// A slice task that panics is reported as a failed slice so the parent can
/// still complete. A coordination defect while reporting aborts the reporting
/// task with a panic.
pub fn spawn_slices<F, Fut>(parent: &Arc<ParentTask>, mut work: F) -> Result<Vec<JoinHandle<()>>, CoordinationError>
where
    F: FnMut(SliceContext) -> Fut,
    Fut: Future<Output = SliceResult> + Send + 'static,
{
    let mut handles = Vec::with_capacity(parent.num_slices());

    for index in 0..parent.num_slices() {
        let context = parent.slice_context(index)?;
        let slice = tokio::spawn(work(context));
        let parent = Arc::clone(parent);

        handles.push(tokio::spawn(async move {
            let result = match slice.await {
                Ok(result) => result,
                Err(join) if join.is_cancelled() => Err(SliceFailure::cancelled("slice task was aborted")),
                Err(join) => Err(SliceFailure::new(format!("slice task panicked: {}", join))),
            };

            if let Err(defect) = parent.on_slice_response(index, result) {
                panic!("slice {} broke the coordination contract: {}", index, defect);
            }
        }));
    }

    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{Counters, SliceResponse, Status};

    fn done(slice: usize, total: u64) -> SliceResult {
        Ok(SliceResponse::new(
            Duration::ZERO,
            Status::for_slice(slice, Counters { total, created: total, ..Default::default() }),
        ))
    }

    #[tokio::test]
    async fn test_spawn_slices_aggregates() {
        let (parent, rx) = ParentTask::new("reindex", 4, RequestsPerSecond::Unlimited).unwrap();

        let handles = spawn_slices(&parent, |ctx| async move {
            let slice = ctx.slice_id();
            done(slice, (slice as u64 + 1) * 10)
        })
        .unwrap();

        let response = rx.await.unwrap();
        assert_eq!(response.status().total(), 100);
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_panicking_slice_becomes_failure() {
        let (parent, rx) = ParentTask::new("reindex", 2, RequestsPerSecond::Unlimited).unwrap();

        spawn_slices(&parent, |ctx| async move {
            if ctx.slice_id() == 1 {
                panic!("mutation pipeline exploded");
            }
            done(ctx.slice_id(), 5)
        })
        .unwrap();

        let response = rx.await.unwrap();
        assert_eq!(response.status().total(), 5);
        assert_eq!(response.slice_failures().len(), 1);
        assert_eq!(response.slice_failures()[0].slice_id, 1);
        assert!(response.slice_failures()[0].reason.reason().contains("panicked"));
    }

    #[tokio::test]
    async fn test_cancellation_reaches_running_slices() {
        let (parent, rx) = ParentTask::new("reindex", 3, RequestsPerSecond::Unlimited).unwrap();

        spawn_slices(&parent, |ctx| async move {
            ctx.cancellation_token().cancelled().await;
            Err(SliceFailure::cancelled("stopped"))
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!parent.is_completed());
        parent.cancel("shutting down");

        let response = rx.await.unwrap();
        assert_eq!(response.slice_failures().len(), 3);
        assert!(response.slice_failures().iter().all(|f| f.reason.is_cancelled()));
        assert_eq!(response.status().reason_cancelled(), Some("shutting down"));
    }

    #[tokio::test]
    async fn test_throttle_waits_for_rate() {
        let (parent, _rx) = ParentTask::new("reindex", 1, RequestsPerSecond::Limited(100.0)).unwrap();
        let mut ctx = parent.slice_context(0).unwrap();

        // 5 requests at 100/s => 50ms
        let waited = ctx.throttle(5, Instant::now()).await;
        assert!(waited >= Duration::from_millis(40), "waited {:?}", waited);
    }

    #[tokio::test]
    async fn test_rethrottle_shortens_wait() {
        let (parent, _rx) = ParentTask::new("reindex", 1, RequestsPerSecond::Limited(1.0)).unwrap();
        let mut ctx = parent.slice_context(0).unwrap();

        let speedup = {
            let parent = Arc::clone(&parent);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                parent.rethrottle(RequestsPerSecond::Unlimited);
            })
        };

        // 10 requests at 1/s would be 10s
        let waited = ctx.throttle(10, Instant::now()).await;
        speedup.await.unwrap();
        assert!(waited < Duration::from_secs(5), "waited {:?}", waited);
    }

    #[tokio::test]
    async fn test_tiny_rethrottle_keeps_slices_alive() {
        let (parent, rx) = ParentTask::new("reindex", 2, RequestsPerSecond::Limited(1.0)).unwrap();

        spawn_slices(&parent, |mut ctx| async move {
            let waited = ctx.throttle(1000, Instant::now()).await;
            let counters = Counters { total: 1, created: 1, throttled: waited, ..Default::default() };
            Ok(SliceResponse::new(Duration::ZERO, Status::for_slice(ctx.slice_id(), counters)))
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        let assigned = parent.rethrottle(RequestsPerSecond::limited(1e-20).unwrap());
        assert_eq!(assigned.len(), 2);
        tokio::time::sleep(Duration::from_millis(10)).await;
        parent.cancel("stop");

        let response = rx.await.unwrap();
        assert!(response.slice_failures().is_empty(), "{:?}", response.slice_failures());
        assert_eq!(response.status().total(), 2);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_throttle() {
        let (parent, _rx) = ParentTask::new("reindex", 2, RequestsPerSecond::Limited(1.0)).unwrap();
        let mut ctx = parent.slice_context(0).unwrap();
        parent.cancel("stop");

        let waited = ctx.throttle(100, Instant::now()).await;
        assert!(waited < Duration::from_secs(1));
    }
}
