//! Error types used by the slice coordinator and its registry.
//!
//! - [`CoordinationError`]: a broken caller contract between worker slices and
//!   their parent task. These are defects, never data problems.
//! - [`RegistryError`]: lookups against the [`TaskRegistry`](crate::coordinator::TaskRegistry).
//! - [`RateError`] / [`SlicesError`]: invalid user input for rates and slice counts.
//!
//! Data-level slice failures are not errors at this layer: they travel as
//! [`SliceFailure`](crate::status::SliceFailure) outcomes and end up in the final response.

use thiserror::Error;

/// Identifier assigned to a parent task by the registry.
pub type TaskId = u64;

/// A worker slice violated the coordination contract.
///
/// The slot table is never mutated when one of these is returned.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinationError {
    /// A parent task was created with zero slices.
    #[error("a sliced task needs at least one slice")]
    NoSlices,

    /// The slice index does not exist in this task.
    #[error("slice {index} is out of range for a task with {slices} slices")]
    SliceOutOfRange {
        /// Reported slice ordinal.
        index: usize,
        /// Number of slices the task was created with.
        slices: usize,
    },

    /// The slice already delivered its terminal result.
    #[error("slice {index} already reported its result")]
    SliceAlreadyReported {
        /// Reported slice ordinal.
        index: usize,
    },
}

impl CoordinationError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            CoordinationError::NoSlices => "no_slices",
            CoordinationError::SliceOutOfRange { .. } => "slice_out_of_range",
            CoordinationError::SliceAlreadyReported { .. } => "slice_already_reported",
        }
    }
}

/// Errors raised by task registry lookups.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No task is registered under this id (never existed or already retired).
    #[error("no task registered under id {0}")]
    NotFound(TaskId),

    /// The parent task was dropped before it delivered its response.
    #[error("task {0} was dropped before delivering its response")]
    Abandoned(TaskId),
}

/// Invalid requests-per-second input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RateError {
    /// Zero, negative (other than the `-1` sentinel) or NaN.
    #[error("requests_per_second must be greater than 0 or -1 for unlimited, got {0}")]
    NotPositive(f32),

    /// Neither a number nor `unlimited`.
    #[error("unable to parse requests_per_second [{0}]: expected a number or \"unlimited\"")]
    Unparsable(String),
}

/// Invalid slice count input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlicesError {
    /// Slice count of zero.
    #[error("slices must be at least 1 or \"auto\"")]
    Zero,

    /// Neither a number nor `auto`.
    #[error("unable to parse slices [{0}]: expected a positive number or \"auto\"")]
    Unparsable(String),
}
