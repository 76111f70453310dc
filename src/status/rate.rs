//! Requests-per-second throttle values
//!
//! A rate is either a positive, finite number of requests per second or
//! `Unlimited`. The rethrottle endpoint accepts a number, `-1`, or the string
//! `unlimited`; the status document renders `Unlimited` as `-1`.
//!
//! # Example
//!
//! ```
//! use bulkslice::status::RequestsPerSecond;
//! use std::time::Duration;
//!
//! let rps: RequestsPerSecond = "300".parse().unwrap();
//! assert_eq!(rps.split(3), RequestsPerSecond::limited(100.0).unwrap());
//!
//! // A batch of 50 docs at 100/s must take 500ms; 200ms already went by.
//! let delay = RequestsPerSecond::limited(100.0).unwrap()
//!     .batch_delay(50, Duration::from_millis(200));
//! assert_eq!(delay, Duration::from_millis(300));
//! ```

use crate::error::RateError;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Target request rate for a whole job or a single slice
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(try_from = "RateInput")]
pub enum RequestsPerSecond {
    /// No throttling
    #[default]
    Unlimited,
    /// At most this many requests per second (always > 0 and finite)
    Limited(f32),
}

impl RequestsPerSecond {
    /// Build a rate from a raw float.
    ///
    /// `-1` and positive infinity map to [`RequestsPerSecond::Unlimited`];
    /// anything else must be strictly positive.
    pub fn new(value: f32) -> Result<Self, RateError> {
        if value == -1.0 || value == f32::INFINITY {
            return Ok(RequestsPerSecond::Unlimited);
        }
        Self::limited(value)
    }

    /// Build a finite rate; rejects zero, negatives, NaN and infinity
    pub fn limited(value: f32) -> Result<Self, RateError> {
        if value.is_finite() && value > 0.0 {
            Ok(RequestsPerSecond::Limited(value))
        } else {
            Err(RateError::NotPositive(value))
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, RequestsPerSecond::Unlimited)
    }

    /// Rate as a float, with `Unlimited` as positive infinity
    pub fn as_f32(&self) -> f32 {
        match self {
            RequestsPerSecond::Unlimited => f32::INFINITY,
            RequestsPerSecond::Limited(rate) => *rate,
        }
    }

    /// Rate as rendered in status documents (`-1` for unlimited)
    pub fn rendered(&self) -> f32 {
        match self {
            RequestsPerSecond::Unlimited => -1.0,
            RequestsPerSecond::Limited(rate) => *rate,
        }
    }

    /// Even share of this rate across `ways` slices.
    ///
    /// `Unlimited` stays unlimited and a split one way (or zero ways) returns
    /// the rate untouched. A share never drops below `f32::MIN_POSITIVE`.
    pub fn split(self, ways: usize) -> Self {
        match self {
            RequestsPerSecond::Unlimited => RequestsPerSecond::Unlimited,
            RequestsPerSecond::Limited(rate) if ways > 1 => {
                RequestsPerSecond::Limited((rate / ways as f32).max(f32::MIN_POSITIVE))
            }
            limited => limited,
        }
    }

    /// How long a slice must still wait after a batch of `batch_size`
    /// requests that took `elapsed` to run, so that the batch averages out to
    /// this rate.
    ///
    /// Saturates at `Duration::MAX` when the rate is too small to express the
    /// wait as a `Duration`.
    pub fn batch_delay(&self, batch_size: u64, elapsed: Duration) -> Duration {
        match self {
            RequestsPerSecond::Unlimited => Duration::ZERO,
            RequestsPerSecond::Limited(rate) => {
                let target = Duration::try_from_secs_f64(batch_size as f64 / *rate as f64)
                    .unwrap_or(Duration::MAX);
                target.saturating_sub(elapsed)
            }
        }
    }
}

impl fmt::Display for RequestsPerSecond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestsPerSecond::Unlimited => write!(f, "unlimited"),
            RequestsPerSecond::Limited(rate) => write!(f, "{}", rate),
        }
    }
}

impl FromStr for RequestsPerSecond {
    type Err = RateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("unlimited") {
            return Ok(RequestsPerSecond::Unlimited);
        }
        let value: f32 = trimmed
            .parse()
            .map_err(|_| RateError::Unparsable(s.to_string()))?;
        Self::new(value)
    }
}

impl Serialize for RequestsPerSecond {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f32(self.rendered())
    }
}

/// Raw form accepted in config files: a number or a string
#[derive(Deserialize)]
#[serde(untagged)]
enum RateInput {
    Number(f32),
    Text(String),
}

impl TryFrom<RateInput> for RequestsPerSecond {
    type Error = RateError;

    fn try_from(input: RateInput) -> Result<Self, Self::Error> {
        match input {
            RateInput::Number(value) => Self::new(value),
            RateInput::Text(text) => text.parse(),
        }
    }
}
