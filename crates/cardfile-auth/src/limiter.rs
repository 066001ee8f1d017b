//! Rate-limit gate.
//!
//! The gate is a capability: callers present a route key, a client key, and
//! the limit/window policy, and get back either an allowance or a
//! retry-after duration. Counting is fixed-window and approximate; bursts
//! straddling a window boundary are an accepted tradeoff for O(1)
//! bookkeeping per (route, client) pair.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Shared counter consulted before any rate-sensitive work.
pub trait RateLimiterGate: Send + Sync {
    /// Ask for an allowance for one request.
    ///
    /// # Errors
    ///
    /// Returns the duration the client should wait before retrying when the
    /// window's budget is exhausted.
    fn allow(
        &self,
        route_key: &str,
        client_key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<(), Duration>;
}

/// Per-(route, client) window state.
#[derive(Debug)]
struct WindowEntry {
    count: u32,
    window_start: Instant,
    window: Duration,
}

impl WindowEntry {
    fn new(window: Duration) -> Self {
        Self {
            count: 0,
            window_start: Instant::now(),
            window,
        }
    }

    fn reset(&mut self, window: Duration) {
        self.count = 0;
        self.window_start = Instant::now();
        self.window = window;
    }
}

/// In-process fixed-window implementation of [`RateLimiterGate`].
#[derive(Debug, Default)]
pub struct FixedWindowGate {
    entries: RwLock<HashMap<String, WindowEntry>>,
}

impl FixedWindowGate {
    /// Create an empty gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop entries whose window expired long enough ago that they cannot
    /// influence any future decision. Call periodically.
    pub fn cleanup(&self) {
        let Ok(mut entries) = self.entries.write() else {
            tracing::warn!("rate gate lock poisoned, skipping cleanup");
            return;
        };
        entries.retain(|_, entry| entry.window_start.elapsed() < entry.window * 2);
    }
}

impl RateLimiterGate for FixedWindowGate {
    fn allow(
        &self,
        route_key: &str,
        client_key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<(), Duration> {
        let Ok(mut entries) = self.entries.write() else {
            // Fail closed: an unreadable counter must not wave traffic through
            // on auth-sensitive routes.
            tracing::warn!("rate gate lock poisoned, denying request");
            return Err(window);
        };

        let key = format!("{route_key}:{client_key}");
        let entry = entries
            .entry(key)
            .or_insert_with(|| WindowEntry::new(window));

        if entry.window_start.elapsed() >= entry.window {
            entry.reset(window);
        }

        if entry.count >= limit {
            let remaining = entry.window.saturating_sub(entry.window_start.elapsed());
            return Err(remaining);
        }

        entry.count += 1;
        Ok(())
    }
}
