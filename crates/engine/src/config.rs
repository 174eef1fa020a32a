// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine and sleep service tuning

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Consumer loop settings, shared by every namespace
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum events read per batch
    pub batch_size: usize,
    /// Upper bound on idle waiting when no append is observed
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// First delay after a failed batch
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,
    /// Ceiling for the doubling retry delay
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            poll_interval: Duration::from_secs(1),
            retry_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_retry_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.retry_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    /// Delay to use after `delay` failed again
    pub(crate) fn next_backoff(&self, delay: Duration) -> Duration {
        delay.saturating_mul(2).min(self.max_backoff)
    }
}

/// Sleep service settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SleepConfig {
    /// How often pending sleeps are checked against their deadline
    #[serde(with = "humantime_serde")]
    pub poll_period: Duration,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            poll_period: Duration::from_secs(1),
        }
    }
}
