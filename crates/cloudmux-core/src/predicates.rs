// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Polling predicates
//!
//! Cloud control planes answer mutating calls with a handle (an operation, an
//! action, a copy id) and finish the work later. A [`Predicate`] checks the
//! handle once, refreshing it in place; [`RetryablePredicate`] keeps checking
//! with a geometric backoff until it holds or the deadline passes.

use crate::error::{CloudError, CloudResult};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// One check of a condition over a mutable handle
#[async_trait]
pub trait Predicate<T: Send>: Send + Sync {
    /// Refresh `input` if needed and report whether the condition holds
    async fn test(&self, input: &mut T) -> CloudResult<bool>;
}

/// Timing of a polling loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSettings {
    /// Give up after this long
    pub timeout: Duration,
    /// Sleep after the first failed check
    pub initial_period: Duration,
    /// Longest sleep between checks
    pub max_period: Duration,
    /// Growth factor applied to the sleep after every failed check
    pub backoff_factor: f64,
}

impl Default for PollSettings {
    fn default() -> Self {
        PollSettings {
            timeout: Duration::from_secs(600),
            initial_period: Duration::from_millis(100),
            max_period: Duration::from_secs(5),
            backoff_factor: 1.5,
        }
    }
}

impl PollSettings {
    /// Settings with the given timeout and default periods
    pub fn with_timeout(timeout: Duration) -> Self {
        PollSettings {
            timeout,
            ..Default::default()
        }
    }

    /// Set the period bounds
    pub fn with_periods(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_period = initial;
        self.max_period = max.max(initial);
        self
    }

    /// Sleep to use after `current`
    pub fn next_period(&self, current: Duration) -> Duration {
        let factor = if self.backoff_factor.is_finite() && self.backoff_factor >= 1.0 {
            self.backoff_factor
        } else {
            1.0
        };
        current.mul_f64(factor).min(self.max_period)
    }
}

/// Repeats a predicate until it holds or times out
#[derive(Debug, Clone)]
pub struct RetryablePredicate<P> {
    predicate: P,
    settings: PollSettings,
}

impl<P> RetryablePredicate<P> {
    /// Wrap `predicate` with the given timing
    pub fn new(predicate: P, settings: PollSettings) -> Self {
        RetryablePredicate {
            predicate,
            settings,
        }
    }

    /// Timing in use
    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Inner predicate
    pub fn inner(&self) -> &P {
        &self.predicate
    }

    /// Poll until the predicate holds; `Ok(false)` on timeout
    ///
    /// Transient errors (transport, 5xx) count as "not yet"; any other error
    /// stops the loop and is returned.
    pub async fn apply<T: Send>(&self, input: &mut T) -> CloudResult<bool>
    where
        P: Predicate<T>,
    {
        let deadline = Instant::now() + self.settings.timeout;
        let mut period = self.settings.initial_period;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            match self.predicate.test(input).await {
                Ok(true) => {
                    debug!(attempts, "predicate satisfied");
                    return Ok(true);
                }
                Ok(false) => trace!(attempts, "predicate not yet satisfied"),
                Err(e) if e.is_retryable() => {
                    debug!(attempts, "transient error while polling: {}", e);
                }
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(attempts, "predicate timed out after {:?}", self.settings.timeout);
                return Ok(false);
            }

            tokio::time::sleep(period.min(deadline - now)).await;
            period = self.settings.next_period(period);
        }
    }

    /// Like [`apply`](Self::apply) but a timeout is an error
    pub async fn await_true<T: Send>(&self, input: &mut T, what: &str) -> CloudResult<()>
    where
        P: Predicate<T>,
    {
        if self.apply(input).await? {
            Ok(())
        } else {
            Err(CloudError::timeout(format!(
                "{} did not complete within {:?}",
                what, self.settings.timeout
            )))
        }
    }
}
