//! Sliding-window rate limiter for attachment downloads.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Allows at most `quota` calls in any `window`; excess callers wait.
pub struct RateLimiter {
    quota: usize,
    window: Duration,
    calls: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(quota: usize, window: Duration) -> Self {
        Self {
            quota: quota.max(1),
            window,
            calls: VecDeque::with_capacity(quota),
        }
    }

    /// Wait until a call is allowed, then record it.
    pub async fn acquire(&mut self) {
        loop {
            let now = Instant::now();
            while let Some(&oldest) = self.calls.front() {
                if now.duration_since(oldest) >= self.window {
                    self.calls.pop_front();
                } else {
                    break;
                }
            }

            if self.calls.len() < self.quota {
                self.calls.push_back(now);
                return;
            }

            // Window is full; sleep until the oldest call ages out
            if let Some(&oldest) = self.calls.front() {
                let ready_at = oldest + self.window;
                debug!("Rate limiting: waiting {:?}", ready_at - now);
                sleep_until(ready_at).await;
            }
        }
    }
}
