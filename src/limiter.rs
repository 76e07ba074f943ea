//! Per-user fixed-window request rate limiter.
//!
//! Each user gets a counter that lives for one window. The first request
//! opens the window; a request arriving at or after the reset time replaces
//! the counter with a fresh window instead of resetting it in place. A
//! periodic sweep drops counters whose window has elapsed, so memory is
//! bounded by the number of users active in the current window.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::telemetry;

/// Default requests allowed per window.
pub const DEFAULT_RATE_LIMIT_MAX: u32 = 100;

/// Default window length.
pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Quota settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_RATE_LIMIT_MAX,
            window: DEFAULT_RATE_LIMIT_WINDOW,
        }
    }
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

/// Outcome of a rate-limit check, including the metadata echoed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window resets.
    pub reset_after: Duration,
}

impl RateLimitDecision {
    /// Whole seconds until reset, rounded up so a caller never retries early.
    pub fn reset_secs(&self) -> u64 {
        let secs = self.reset_after.as_secs();
        if self.reset_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window limiter keyed by numeric user id.
#[derive(Debug, Default)]
pub struct RateLimiter {
    config: RateLimitConfig,
    counters: Mutex<HashMap<u64, Counter>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count one request for `user_id` and decide whether it may proceed.
    ///
    /// The read-increment-decide step happens under a single lock, so
    /// concurrent requests from the same user cannot both observe a stale
    /// count. Rejected requests still count toward the window.
    pub fn check(&self, user_id: u64) -> RateLimitDecision {
        let now = Instant::now();
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);

        let counter = counters
            .entry(user_id)
            .and_modify(|c| {
                if now >= c.reset_at {
                    *c = Counter {
                        count: 0,
                        reset_at: now + self.config.window,
                    };
                }
            })
            .or_insert(Counter {
                count: 0,
                reset_at: now + self.config.window,
            });
        counter.count = counter.count.saturating_add(1);

        let limit = self.config.max_requests;
        let allowed = counter.count <= limit;
        let decision = RateLimitDecision {
            allowed,
            limit,
            remaining: limit.saturating_sub(counter.count),
            reset_after: counter.reset_at.saturating_duration_since(now),
        };
        drop(counters);

        if !allowed {
            metrics::counter!(telemetry::RATE_LIMITED_TOTAL).increment(1);
            debug!(user_id, reset_after_ms = decision.reset_after.as_millis() as u64, "rate limited");
        }
        decision
    }

    /// Drop counters whose window has elapsed. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let before = counters.len();
        counters.retain(|_, c| now < c.reset_at);
        before - counters.len()
    }

    /// Users with a live counter.
    pub fn tracked_users(&self) -> usize {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Spawn the periodic sweep. Abort the handle to stop it.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = self.sweep();
                if removed > 0 {
                    debug!(removed, "swept expired rate-limit windows");
                }
            }
        })
    }
}
