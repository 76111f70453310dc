//! Per-slice result bookkeeping
//!
//! The [`SlotTable`] holds one write-once entry per slice ordinal. The
//! [`Aggregator`](aggregator::Aggregator) owns a slot table and keeps the
//! running sum of every successful slice's counters, so a status snapshot
//! never has to re-sum the slices.
//!
//! # Example
//!
//! ```
//! use bulkslice::stats::SlotTable;
//! use bulkslice::status::{Counters, Outcome, SliceFailure, Status};
//!
//! let mut slots = SlotTable::new(2);
//! assert_eq!(slots.remaining(), 2);
//!
//! let last = slots.set(1, Outcome::failure(SliceFailure::new("engine error"))).unwrap();
//! assert!(!last);
//!
//! let last = slots.set(0, Outcome::success(Status::for_slice(0, Counters::default()))).unwrap();
//! assert!(last);
//! assert!(slots.is_complete());
//! ```

pub mod aggregator;

pub use aggregator::Aggregator;

use crate::error::CoordinationError;
use crate::status::{Outcome, SliceState};

/// Fixed-size table of per-slice results, all `Running` at first
#[derive(Debug, Clone)]
pub struct SlotTable {
    slots: Vec<SliceState>,
    unset: usize,
}

impl SlotTable {
    pub fn new(num_slices: usize) -> Self {
        Self {
            slots: vec![SliceState::Running; num_slices],
            unset: num_slices,
        }
    }

    /// Number of slices that have not reported yet
    pub fn remaining(&self) -> usize {
        self.unset
    }

    pub fn is_complete(&self) -> bool {
        self.unset == 0
    }

    /// Check that `index` names a slice that has not reported yet
    pub fn check_unset(&self, index: usize) -> Result<(), CoordinationError> {
        match self.slots.get(index) {
            None => Err(CoordinationError::SliceOutOfRange {
                index,
                slices: self.slots.len(),
            }),
            Some(SliceState::Finished(_)) => Err(CoordinationError::SliceAlreadyReported { index }),
            Some(SliceState::Running) => Ok(()),
        }
    }

    /// Ordinals of the slices still running, ascending
    pub fn running_slices(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, state)| state.is_running())
            .map(|(index, _)| index)
    }

    /// Record the terminal outcome of slice `index`.
    ///
    /// Returns `true` when this call filled the last unset slot. An
    /// out-of-range index or a second outcome for the same slot is rejected
    /// and leaves the table untouched.
    pub fn set(&mut self, index: usize, outcome: Outcome) -> Result<bool, CoordinationError> {
        self.check_unset(index)?;
        self.slots[index] = SliceState::Finished(outcome);
        self.unset -= 1;
        Ok(self.unset == 0)
    }

    pub fn states(&self) -> &[SliceState] {
        &self.slots
    }
}
