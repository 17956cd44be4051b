// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Retry backoff policy.
//
// Exponential backoff with random jitter.  The delay holds only the
// worker that handled the failing task; the dispatch loop and the other
// workers keep draining the queue while one worker waits out its delay.

use std::time::Duration;

use rand::Rng;

use spulwerk_core::config::SpoolConfig;

/// What happens after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue, then hold this worker for the delay.
    RetryAfter(Duration),
    /// Retries exhausted — the task stays terminally Failed.
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Failed attempts allowed before giving up.
    pub max_retry: u32,
    /// Base delay, doubled per retry.
    pub base: Duration,
    /// Cap on a single delay.
    pub max: Duration,
    /// Jitter ceiling; each delay gets a random addition in `[0, jitter)`.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retry: 3,
            base: Duration::from_secs(1),
            max: Duration::from_secs(120),
            jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &SpoolConfig) -> Self {
        Self {
            max_retry: config.max_retry,
            base: config.backoff_base(),
            max: config.backoff_max(),
            jitter: config.backoff_jitter(),
        }
    }

    /// Decide what happens after a failed attempt.
    ///
    /// `retry_count` is the task's count before this failure is charged, so
    /// a task is attempted `max_retry + 1` times in total and its count
    /// never exceeds `max_retry`.
    pub fn decide(&self, retry_count: u32) -> RetryDecision {
        if retry_count < self.max_retry {
            RetryDecision::RetryAfter(self.backoff(retry_count + 1))
        } else {
            RetryDecision::Exhausted
        }
    }

    /// delay = min(base * 2^retry_count + jitter, max).
    ///
    /// Jitter spreads simultaneous retries apart so a burst of failures
    /// does not come back as a synchronized storm.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let base_ms = self.base.as_millis() as u64;
        let exp_ms = base_ms.saturating_mul(1u64 << retry_count.min(10));
        let total_ms = exp_ms
            .saturating_add(self.jitter_ms())
            .min(self.max.as_millis() as u64);
        Duration::from_millis(total_ms)
    }

    fn jitter_ms(&self) -> u64 {
        let ceiling = self.jitter.as_millis() as u64;
        if ceiling == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..ceiling)
        }
    }
}
