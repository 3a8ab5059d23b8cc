//! Capped exponential backoff for transient accept failures.
//!
//! The first failure waits [`Backoff::initial`], every following failure
//! doubles the previous wait until [`Backoff::max`] is reached. A successful
//! accept resets the caller's state to `None`, which starts the sequence over.
//!
//! Sleeping is cancellable through a [`CancellationToken`]; a cancelled sleep
//! returns [`Cancelled`], which means "shutdown requested" and is never a
//! timer fault.

use std::time::Duration;
use thiserror::Error;
use tokio::select;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(5);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_millis(1000);

/// The backoff sleep was interrupted by its cancellation token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("backoff sleep cancelled")]
pub struct Cancelled;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF)
    }
}

impl Backoff {
    /// Creates a backoff; `max` is raised to `initial` if it is smaller.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max: max.max(initial) }
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Returns the delay to wait after the failure following `previous`.
    pub fn next(&self, previous: Option<Duration>) -> Duration {
        match previous {
            None => self.initial,
            Some(previous) => previous.saturating_mul(2).min(self.max),
        }
    }

    /// Sleeps for `delay` unless `cancel` fires first.
    pub async fn sleep(&self, delay: Duration, cancel: &CancellationToken) -> Result<(), Cancelled> {
        select! {
            biased;
            () = cancel.cancelled() => Err(Cancelled),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
