//! Fixed-window rate limiter.
//!
//! One [`RateWindow`] per client. The window map is a `DashMap`, so the
//! shard lock taken by `entry()` is held across the reset-check-increment
//! sequence for a key; concurrent requests from one client serialize there.
//!
//! The map is bounded by `max_clients`. When a new client arrives at
//! capacity, windows that have already expired are dropped first; if the
//! map is still full the window with the oldest start is evicted. An evicted
//! client simply starts a fresh window on its next request.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::security::identity::ClientKey;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub window: Duration,
    pub reset_at: Instant,
}

impl Decision {
    /// Time until the current window ends.
    pub fn retry_after(&self, now: Instant) -> Duration {
        self.reset_at.saturating_duration_since(now)
    }

    /// Whole seconds until the window ends, rounded up.
    pub fn retry_after_secs(&self, now: Instant) -> u64 {
        let wait = self.retry_after(now);
        wait.as_secs() + u64::from(wait.subsec_nanos() > 0)
    }
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    window_start: Instant,
}

/// In-memory per-client request counter.
pub struct RateLimiter {
    windows: DashMap<ClientKey, RateWindow>,
    max_clients: usize,
}

impl RateLimiter {
    pub fn new(max_clients: usize) -> Self {
        Self {
            windows: DashMap::new(),
            max_clients: max_clients.max(1),
        }
    }

    /// Admit or reject one request from `key`.
    pub fn admit(&self, key: &ClientKey, limit: u32, window: Duration) -> Decision {
        self.admit_at(key, limit, window, Instant::now())
    }

    /// [`admit`](Self::admit) against an explicit clock reading.
    pub fn admit_at(&self, key: &ClientKey, limit: u32, window: Duration, now: Instant) -> Decision {
        if !self.windows.contains_key(key) && self.windows.len() >= self.max_clients {
            self.evict(window, now);
        }

        let mut entry = self.windows.entry(key.clone()).or_insert(RateWindow {
            count: 0,
            window_start: now,
        });
        let state = entry.value_mut();

        if now.saturating_duration_since(state.window_start) >= window {
            state.count = 0;
            state.window_start = now;
        }

        let reset_at = state.window_start + window;
        if state.count >= limit {
            return Decision {
                allowed: false,
                limit,
                remaining: 0,
                window,
                reset_at,
            };
        }

        state.count += 1;
        Decision {
            allowed: true,
            limit,
            remaining: limit - state.count,
            window,
            reset_at,
        }
    }

    /// Number of clients currently holding a window.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    fn evict(&self, window: Duration, now: Instant) {
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.window_start) < window);

        if self.windows.len() < self.max_clients {
            return;
        }

        let oldest = self
            .windows
            .iter()
            .min_by_key(|entry| entry.value().window_start)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            tracing::debug!(client = %key, "Evicting oldest rate-limit window");
            self.windows.remove(&key);
        }
    }
}
