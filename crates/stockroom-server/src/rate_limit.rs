//! Per-client fixed-window rate limiting for the catch-up endpoint.
//!
//! Each client identity gets an independent counter inside the current
//! window; the limiter never interacts with the assignment retry logic.

use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window counter per client identity.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    /// Register one request for `client`.
    ///
    /// Returns `Err(retry_after)` when the client is over its window budget.
    pub fn check(&self, client: &str) -> Result<(), Duration> {
        if !self.config.enabled {
            return Ok(());
        }
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: &str, now: Instant) -> Result<(), Duration> {
        let mut entry = self
            .windows
            .entry(client.to_string())
            .or_insert(Window { started: now, count: 0 });

        let elapsed = now.duration_since(entry.started);
        if elapsed >= self.config.window {
            entry.started = now;
            entry.count = 0;
        }

        if entry.count >= self.config.requests_per_window {
            return Err(self.config.window.saturating_sub(elapsed));
        }

        entry.count += 1;
        Ok(())
    }
}
