//! Rethrottle distribution
//!
//! Splits a job-wide requests-per-second target evenly across the slices that
//! are still running. Each slice owns a `watch` channel that carries its
//! current share; a worker slice reads it between batches.

use crate::stats::SlotTable;
use crate::status::RequestsPerSecond;
use tokio::sync::watch;

/// Rate assigned to one running slice by a rethrottle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliceRethrottle {
    pub slice_id: usize,
    pub requests_per_second: RequestsPerSecond,
}

/// Computes and publishes per-slice rate targets
#[derive(Debug)]
pub struct RethrottleDistributor {
    current: RequestsPerSecond,
    senders: Vec<watch::Sender<RequestsPerSecond>>,
}

impl RethrottleDistributor {
    /// Every slice starts with an even share of `initial`
    pub fn new(num_slices: usize, initial: RequestsPerSecond) -> Self {
        let share = initial.split(num_slices);
        let senders = (0..num_slices).map(|_| watch::Sender::new(share)).collect();
        Self {
            current: initial,
            senders,
        }
    }

    /// Last accepted job-wide target
    pub fn current(&self) -> RequestsPerSecond {
        self.current
    }

    /// Share of the current target for each of `remaining` slices.
    ///
    /// A job with a single slice always gets the whole target.
    pub fn share(&self, remaining: usize) -> RequestsPerSecond {
        if self.senders.len() == 1 {
            self.current
        } else {
            self.current.split(remaining)
        }
    }

    /// Receiver for the rate of slice `index`, holding its latest share
    pub fn subscribe(&self, index: usize) -> Option<watch::Receiver<RequestsPerSecond>> {
        self.senders.get(index).map(watch::Sender::subscribe)
    }

    /// Accept a new job-wide target and hand each running slice its share.
    ///
    /// The running set comes from `slots` on every call, so the caller must
    /// hold the same lock that guards slice completion. Finished slices get
    /// nothing.
    pub fn rethrottle(&mut self, requests_per_second: RequestsPerSecond, slots: &SlotTable) -> Vec<SliceRethrottle> {
        self.current = requests_per_second;

        let running: Vec<usize> = slots.running_slices().collect();
        let share = self.share(running.len());

        running
            .into_iter()
            .map(|slice_id| {
                self.senders[slice_id].send_replace(share);
                SliceRethrottle {
                    slice_id,
                    requests_per_second: share,
                }
            })
            .collect()
    }
}
