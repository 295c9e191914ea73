use std::time::Duration;

use crate::args::PositiveUsize;
use crate::error::ValidationError;

/// Cadence and concurrency ceiling of a client run. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadConfig {
    concurrent_requests: PositiveUsize,
    delay: Duration,
}

impl WorkloadConfig {
    /// Builds a workload description.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::DurationZero`] when `delay` is zero.
    pub fn new(concurrent_requests: PositiveUsize, delay: Duration) -> Result<Self, ValidationError> {
        if delay.is_zero() {
            return Err(ValidationError::DurationZero);
        }
        Ok(Self {
            concurrent_requests,
            delay,
        })
    }

    #[must_use]
    pub const fn concurrent_requests(&self) -> PositiveUsize {
        self.concurrent_requests
    }

    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Capacity of the outcome intake queue: twice the concurrency ceiling.
    #[must_use]
    pub const fn intake_capacity(&self) -> usize {
        self.concurrent_requests.get().saturating_mul(2)
    }
}
