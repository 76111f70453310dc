//! Coordinator module
//!
//! The [`ParentTask`] coordinates the slices of one bulk-by-scroll job. Worker
//! slices report their terminal result through
//! [`ParentTask::on_slice_response`]; the parent keeps a live aggregate status,
//! splits rethrottle requests across the slices still running, cancels them
//! on request, and delivers the merged [`BulkByScrollResponse`] exactly once,
//! when the last slice reports.
//!
//! # Concurrency
//!
//! All mutation happens under one lock per parent task: recording a slice,
//! computing the running set for a rethrottle, and taking the completion
//! sink. Only one caller can ever see the last-slot condition, and a
//! rethrottle never works from a stale remaining count. The lock is held for
//! in-memory work only; the response is sent after it is released.
//!
//! ```text
//! slice 0 ──┐
//! slice 1 ──┼─► on_slice_response ─► [lock] Aggregator ─► last? ─► oneshot ─► caller
//! slice N ──┘                               ▲
//! get_status ───────────────────────────────┤ (copy)
//! rethrottle ───────────────────────────────┘ (running set ─► watch per slice)
//! cancel ─────► CancellationToken (children: one per slice)
//! ```

pub mod registry;
pub mod rethrottle;

pub use registry::TaskRegistry;
pub use rethrottle::{RethrottleDistributor, SliceRethrottle};

use crate::error::CoordinationError;
use crate::stats::aggregator::{Aggregator, SliceResult};
use crate::status::{BulkByScrollResponse, RequestsPerSecond, Status};
use crate::worker::SliceContext;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Receives the aggregated response of a parent task
pub type ResponseReceiver = oneshot::Receiver<BulkByScrollResponse>;

/// Effect of one slice report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceIntake {
    /// Recorded; other slices are still running
    Recorded { remaining: usize },
    /// This report was the last one and the response has been delivered
    Completed,
}

#[derive(Debug)]
struct ParentState {
    aggregator: Aggregator,
    rethrottle: RethrottleDistributor,
    /// Taken exactly once, by the report that fills the last slot
    sink: Option<oneshot::Sender<BulkByScrollResponse>>,
    reason_cancelled: Option<String>,
}

/// Parent of a sliced bulk-by-scroll job
#[derive(Debug)]
pub struct ParentTask {
    description: String,
    num_slices: usize,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
    state: Mutex<ParentState>,
}

impl ParentTask {
    /// Create the parent of a job split into `num_slices` slices.
    ///
    /// `requests_per_second` is the job-wide starting rate; each slice starts
    /// with an even share of it.
    pub fn new(
        description: impl Into<String>,
        num_slices: usize,
        requests_per_second: RequestsPerSecond,
    ) -> Result<(Arc<Self>, ResponseReceiver), CoordinationError> {
        if num_slices == 0 {
            return Err(CoordinationError::NoSlices);
        }

        let (sink, receiver) = oneshot::channel();
        let task = Self {
            description: description.into(),
            num_slices,
            started_at: Utc::now(),
            cancel: CancellationToken::new(),
            state: Mutex::new(ParentState {
                aggregator: Aggregator::new(num_slices),
                rethrottle: RethrottleDistributor::new(num_slices, requests_per_second),
                sink: Some(sink),
                reason_cancelled: None,
            }),
        };

        Ok((Arc::new(task), receiver))
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn num_slices(&self) -> usize {
        self.num_slices
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Live aggregate status. Never waits for a slice to finish.
    pub fn get_status(&self) -> Status {
        let state = self.lock();
        state
            .aggregator
            .snapshot(state.rethrottle.current(), state.reason_cancelled.as_deref())
    }

    /// Registration hook for worker slice `index`.
    ///
    /// The context carries a child of the parent's cancellation token and a
    /// receiver for the slice's rate share.
    pub fn slice_context(&self, index: usize) -> Result<SliceContext, CoordinationError> {
        let state = self.lock();
        state.aggregator.slots().check_unset(index)?;
        let rate = state
            .rethrottle
            .subscribe(index)
            .ok_or(CoordinationError::SliceOutOfRange {
                index,
                slices: self.num_slices,
            })?;

        Ok(SliceContext::new(index, self.num_slices, self.cancel.child_token(), rate))
    }

    /// Intake for the terminal result of slice `index`.
    ///
    /// The report that fills the last slot builds the aggregated response
    /// and delivers it. A report for an unknown or already finished slice is
    /// a coordination defect: it is logged, rejected, and changes nothing.
    ///
    /// A returned `CoordinationError` is a programming error in the caller.
    /// [`spawn_slices`](crate::worker::spawn_slices) escalates it with a
    /// panic; callers that report slices themselves must escalate it too
    /// rather than retry.
    pub fn on_slice_response(&self, index: usize, result: SliceResult) -> Result<SliceIntake, CoordinationError> {
        let succeeded = result.is_ok();

        let recorded = {
            let mut guard = self.lock();
            let state = &mut *guard;

            match state.aggregator.record_slice(index, result) {
                Err(defect) => Err(defect),
                Ok(false) => Ok((state.aggregator.remaining(), None)),
                Ok(true) => {
                    let response = state
                        .aggregator
                        .finish(state.rethrottle.current(), state.reason_cancelled.as_deref());
                    Ok((0, state.sink.take().map(|sink| (sink, response))))
                }
            }
        };

        let (remaining, delivery) = match recorded {
            Ok(recorded) => recorded,
            Err(defect) => {
                error!(
                    task = %self.description,
                    slice = index,
                    defect = defect.as_label(),
                    "rejected slice report: {}",
                    defect
                );
                return Err(defect);
            }
        };

        debug!(task = %self.description, slice = index, succeeded, remaining, "slice reported");

        if remaining > 0 {
            return Ok(SliceIntake::Recorded { remaining });
        }

        if let Some((sink, response)) = delivery {
            info!(
                task = %self.description,
                slices = self.num_slices,
                total = response.status().total(),
                failed_slices = response.slice_failures().len(),
                "all slices reported"
            );
            if sink.send(response).is_err() {
                warn!(task = %self.description, "response receiver dropped before completion");
            }
        }

        Ok(SliceIntake::Completed)
    }

    /// Set a new job-wide rate and split it evenly across running slices.
    ///
    /// Returns the share handed to each running slice; finished slices are
    /// left out.
    pub fn rethrottle(&self, requests_per_second: RequestsPerSecond) -> Vec<SliceRethrottle> {
        let assigned = {
            let mut guard = self.lock();
            let state = &mut *guard;
            state
                .rethrottle
                .rethrottle(requests_per_second, state.aggregator.slots())
        };

        info!(
            task = %self.description,
            %requests_per_second,
            running = assigned.len(),
            "rethrottled"
        );
        assigned
    }

    /// Ask every running slice to stop.
    ///
    /// Idempotent: only the first reason is kept. Slices still report
    /// normally afterwards and the response is delivered once the last one
    /// has. Cancelling a completed task does nothing.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let completed = {
            let mut state = self.lock();
            if state.reason_cancelled.is_some() {
                return;
            }
            let completed = state.aggregator.is_complete();
            if !completed {
                state.reason_cancelled = Some(reason.clone());
            }
            completed
        };
        if completed {
            debug!(task = %self.description, "cancel ignored, all slices already reported");
            return;
        }

        warn!(task = %self.description, %reason, "cancelling running slices");
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn reason_cancelled(&self) -> Option<String> {
        self.lock().reason_cancelled.clone()
    }

    /// True once every slice has reported
    pub fn is_completed(&self) -> bool {
        self.lock().aggregator.is_complete()
    }

    /// Last accepted job-wide rate
    pub fn requests_per_second(&self) -> RequestsPerSecond {
        self.lock().rethrottle.current()
    }

    /// Ordinals of slices that have not reported yet
    pub fn running_slices(&self) -> Vec<usize> {
        self.lock().aggregator.slots().running_slices().collect()
    }

    fn lock(&self) -> MutexGuard<'_, ParentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{Counters, SliceFailure, SliceResponse, SliceState};
    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;
    use tokio::sync::oneshot::error::TryRecvError;

    fn limited(rate: f32) -> RequestsPerSecond {
        RequestsPerSecond::limited(rate).unwrap()
    }

    fn report(slice: usize, counters: Counters) -> SliceResult {
        Ok(SliceResponse::new(
            Duration::from_millis(10),
            Status::for_slice(slice, counters),
        ))
    }

    #[test]
    fn test_zero_slices_rejected() {
        let err = ParentTask::new("reindex", 0, RequestsPerSecond::Unlimited).unwrap_err();
        assert_eq!(err, CoordinationError::NoSlices);
    }

    #[test]
    fn test_initial_status() {
        let (task, _rx) = ParentTask::new("reindex", 5, RequestsPerSecond::Unlimited).unwrap();
        let status = task.get_status();

        assert_eq!(status.counters(), &Counters::default());
        assert_eq!(status.slice_id(), None);
        assert_eq!(status.slices().map(<[_]>::len), Some(5));
        assert!(status.slices().unwrap().iter().all(SliceState::is_running));
        assert!(!task.is_completed());
    }

    #[test]
    fn test_three_slice_scenario() {
        let (task, mut rx) = ParentTask::new("update_by_query", 3, RequestsPerSecond::Unlimited).unwrap();

        let intake = task
            .on_slice_response(0, report(0, Counters { total: 100, created: 60, updated: 30, deleted: 10, ..Default::default() }))
            .unwrap();
        assert_eq!(intake, SliceIntake::Recorded { remaining: 2 });
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
        assert_eq!(task.get_status().total(), 100);

        task.on_slice_response(1, report(1, Counters { total: 50, noops: 50, ..Default::default() }))
            .unwrap();
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);

        let intake = task
            .on_slice_response(2, report(2, Counters { total: 200, created: 200, ..Default::default() }))
            .unwrap();
        assert_eq!(intake, SliceIntake::Completed);

        let response = rx.try_recv().unwrap();
        let status = response.status();
        assert_eq!(status.total(), 350);
        assert_eq!(status.created(), 260);
        assert_eq!(status.updated(), 30);
        assert_eq!(status.deleted(), 10);
        assert_eq!(status.noops(), 50);
        assert!(response.is_success());
        assert_eq!(task.get_status().counters(), status.counters());
        assert!(task.is_completed());
    }

    #[test]
    fn test_partial_failure_scenario() {
        let (task, mut rx) = ParentTask::new("delete_by_query", 2, RequestsPerSecond::Unlimited).unwrap();

        task.on_slice_response(0, Err(SliceFailure::new("index closed"))).unwrap();
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
        assert_eq!(task.get_status().total(), 0);

        task.on_slice_response(1, report(1, Counters { total: 75, deleted: 75, ..Default::default() }))
            .unwrap();

        let response = rx.try_recv().unwrap();
        assert_eq!(response.status().total(), 75);
        assert_eq!(response.slice_failures().len(), 1);
        assert_eq!(response.slice_failures()[0].reason.reason(), "index closed");
        assert!(!response.is_success());

        let slices = task.get_status();
        let slices = slices.slices().unwrap();
        assert!(slices[0].outcome().and_then(|o| o.failure_reason()).is_some());
        assert!(slices[1].outcome().map(|o| o.is_success()).unwrap_or(false));
    }

    #[test]
    fn test_double_report_is_defect() {
        let (task, mut rx) = ParentTask::new("reindex", 2, RequestsPerSecond::Unlimited).unwrap();
        let counters = Counters { total: 10, created: 10, ..Default::default() };

        task.on_slice_response(0, report(0, counters)).unwrap();
        let err = task.on_slice_response(0, report(0, counters)).unwrap_err();

        assert_eq!(err, CoordinationError::SliceAlreadyReported { index: 0 });
        assert_eq!(task.get_status().total(), 10);
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
    }

    #[test]
    fn test_out_of_range_is_defect() {
        let (task, _rx) = ParentTask::new("reindex", 2, RequestsPerSecond::Unlimited).unwrap();
        let err = task.on_slice_response(2, Err(SliceFailure::new("?"))).unwrap_err();
        assert_eq!(err, CoordinationError::SliceOutOfRange { index: 2, slices: 2 });
        assert!(matches!(
            task.slice_context(9),
            Err(CoordinationError::SliceOutOfRange { index: 9, slices: 2 })
        ));
    }

    #[test]
    fn test_report_after_completion_is_defect() {
        let (task, mut rx) = ParentTask::new("reindex", 1, RequestsPerSecond::Unlimited).unwrap();
        task.on_slice_response(0, report(0, Counters::default())).unwrap();
        assert!(rx.try_recv().is_ok());

        let err = task.on_slice_response(0, report(0, Counters::default())).unwrap_err();
        assert_eq!(err, CoordinationError::SliceAlreadyReported { index: 0 });
    }

    #[test]
    fn test_concurrent_reports_complete_once() {
        const SLICES: usize = 32;
        let (task, mut rx) = ParentTask::new("reindex", SLICES, RequestsPerSecond::Unlimited).unwrap();

        let completions: usize = thread::scope(|scope| {
            let handles: Vec<_> = (0..SLICES)
                .map(|slice| {
                    let task = Arc::clone(&task);
                    scope.spawn(move || {
                        let counters = Counters { total: slice as u64, created: slice as u64, ..Default::default() };
                        let intake = task.on_slice_response(slice, report(slice, counters)).unwrap();
                        // Status queries race with completions
                        let _ = task.get_status();
                        intake == SliceIntake::Completed
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap() as usize).sum()
        });

        assert_eq!(completions, 1);
        let response = rx.try_recv().unwrap();
        assert_eq!(response.status().total(), (0..SLICES as u64).sum::<u64>());
    }

    #[test]
    fn test_rethrottle_splits_across_running_slices() {
        let (task, _rx) = ParentTask::new("reindex", 4, limited(400.0)).unwrap();
        let contexts: Vec<SliceContext> = (0..4).map(|i| task.slice_context(i).unwrap()).collect();
        assert!(contexts.iter().all(|c| c.requests_per_second() == limited(100.0)));

        task.on_slice_response(2, report(2, Counters::default())).unwrap();
        let assigned = task.rethrottle(limited(90.0));

        assert_eq!(assigned.len(), 3);
        assert!(assigned.iter().all(|r| r.requests_per_second == limited(30.0)));
        assert!(assigned.iter().all(|r| r.slice_id != 2));
        assert_eq!(contexts[0].requests_per_second(), limited(30.0));
        assert_eq!(contexts[2].requests_per_second(), limited(100.0));
        assert_eq!(task.requests_per_second(), limited(90.0));
        assert_eq!(task.get_status().requests_per_second(), limited(90.0));
    }

    #[test]
    fn test_rethrottle_races_slice_reports() {
        const SLICES: usize = 24;
        const REPORTERS: usize = 4;
        let rate = limited(960.0);
        let (task, mut rx) = ParentTask::new("reindex", SLICES, limited(240.0)).unwrap();
        let reported: Vec<AtomicBool> = (0..SLICES).map(|_| AtomicBool::new(false)).collect();

        thread::scope(|scope| {
            for reporter in 0..REPORTERS {
                let task = &task;
                let reported = &reported;
                scope.spawn(move || {
                    for slice in (reporter..SLICES).step_by(REPORTERS) {
                        task.on_slice_response(slice, report(slice, Counters::default()))
                            .unwrap();
                        reported[slice].store(true, Ordering::Release);
                    }
                });
            }

            let task = &task;
            let reported = &reported;
            scope.spawn(move || {
                while !task.is_completed() {
                    let reported_before: Vec<usize> = (0..SLICES)
                        .filter(|&slice| reported[slice].load(Ordering::Acquire))
                        .collect();
                    let assigned = task.rethrottle(rate);
                    let running_after: Vec<usize> = task
                        .get_status()
                        .slices()
                        .unwrap()
                        .iter()
                        .enumerate()
                        .filter(|(_, state)| state.is_running())
                        .map(|(slice, _)| slice)
                        .collect();

                    // Even split over the slices running at the time; one slice left gets it all
                    let share = rate.split(assigned.len());
                    for r in &assigned {
                        assert_eq!(r.requests_per_second, share);
                        assert!(
                            !reported_before.contains(&r.slice_id),
                            "slice {} got a share after it reported",
                            r.slice_id
                        );
                    }
                    for slice in running_after {
                        assert!(
                            assigned.iter().any(|r| r.slice_id == slice),
                            "running slice {} got no share",
                            slice
                        );
                    }
                }
            });
        });

        assert!(rx.try_recv().is_ok());
        assert!(task.rethrottle(rate).is_empty());
    }

    /// Writer that checks, on every log line, that the task state can still
    /// be locked from another thread.
    #[derive(Clone)]
    struct StatusCheckingWriter {
        task: Arc<ParentTask>,
        lines: Arc<AtomicUsize>,
        blocked: Arc<AtomicUsize>,
    }

    impl io::Write for StatusCheckingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.lines.fetch_add(1, Ordering::SeqCst);
            let task = Arc::clone(&self.task);
            let (done, wait) = mpsc::channel();
            thread::spawn(move || {
                let _ = task.get_status();
                let _ = done.send(());
            });
            if wait.recv_timeout(Duration::from_secs(1)).is_err() {
                self.blocked.fetch_add(1, Ordering::SeqCst);
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_logging_happens_outside_the_lock() {
        let (task, _rx) = ParentTask::new("reindex", 2, RequestsPerSecond::Unlimited).unwrap();
        let writer = StatusCheckingWriter {
            task: Arc::clone(&task),
            lines: Arc::new(AtomicUsize::new(0)),
            blocked: Arc::new(AtomicUsize::new(0)),
        };
        let subscriber = {
            let writer = writer.clone();
            tracing_subscriber::fmt()
                .with_max_level(tracing::Level::DEBUG)
                .with_writer(move || writer.clone())
                .finish()
        };

        tracing::subscriber::with_default(subscriber, || {
            task.on_slice_response(0, report(0, Counters::default())).unwrap();
            assert!(task.on_slice_response(0, report(0, Counters::default())).is_err());
            assert!(task.on_slice_response(7, report(7, Counters::default())).is_err());
            task.rethrottle(limited(10.0));
            task.cancel("stop");
            task.on_slice_response(1, report(1, Counters::default())).unwrap();
            task.cancel("again");
        });

        assert!(writer.lines.load(Ordering::SeqCst) >= 5);
        assert_eq!(writer.blocked.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rethrottle_single_slice_undivided() {
        let (task, _rx) = ParentTask::new("reindex", 1, RequestsPerSecond::Unlimited).unwrap();
        let context = task.slice_context(0).unwrap();

        let assigned = task.rethrottle(limited(12.0));
        assert_eq!(
            assigned,
            vec![SliceRethrottle { slice_id: 0, requests_per_second: limited(12.0) }]
        );
        assert_eq!(context.requests_per_second(), limited(12.0));
    }

    #[test]
    fn test_late_registration_sees_latest_share() {
        let (task, _rx) = ParentTask::new("reindex", 2, RequestsPerSecond::Unlimited).unwrap();
        task.on_slice_response(0, report(0, Counters::default())).unwrap();
        task.rethrottle(limited(50.0));

        let context = task.slice_context(1).unwrap();
        assert_eq!(context.requests_per_second(), limited(50.0));
        assert!(matches!(
            task.slice_context(0),
            Err(CoordinationError::SliceAlreadyReported { index: 0 })
        ));
    }

    #[test]
    fn test_cancel_keeps_first_reason_and_waits_for_slices() {
        let (task, mut rx) = ParentTask::new("reindex", 2, RequestsPerSecond::Unlimited).unwrap();
        let first = task.slice_context(0).unwrap();
        let second = task.slice_context(1).unwrap();

        task.cancel("by user request");
        task.cancel("again");

        assert!(task.is_cancelled());
        assert!(first.is_cancelled() && second.is_cancelled());
        assert_eq!(task.reason_cancelled().as_deref(), Some("by user request"));
        assert_eq!(task.get_status().reason_cancelled(), Some("by user request"));
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);

        // Slices keep their progress when they stop
        let partial = Counters { total: 40, created: 40, ..Default::default() };
        task.on_slice_response(0, report(0, partial)).unwrap();
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
        task.on_slice_response(1, Err(SliceFailure::cancelled("stopped before first batch"))).unwrap();

        let response = rx.try_recv().unwrap();
        assert_eq!(response.status().total(), 40);
        assert_eq!(response.status().reason_cancelled(), Some("by user request"));
    }

    #[test]
    fn test_cancel_after_completion_is_noop() {
        let (task, mut rx) = ParentTask::new("reindex", 1, RequestsPerSecond::Unlimited).unwrap();
        task.on_slice_response(0, report(0, Counters::default())).unwrap();

        task.cancel("too late");
        assert!(!task.is_cancelled());
        assert_eq!(task.reason_cancelled(), None);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_dropped_receiver_does_not_fail_intake() {
        let (task, rx) = ParentTask::new("reindex", 1, RequestsPerSecond::Unlimited).unwrap();
        drop(rx);
        assert_eq!(
            task.on_slice_response(0, report(0, Counters::default())),
            Ok(SliceIntake::Completed)
        );
    }
}
