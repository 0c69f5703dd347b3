//! Per-peer sliding-window rate limiting for blocked-call audit lines.
//!
//! The limiter only gates log emission, never the access decision itself.
//! State is keyed by peer id and is not evicted; long-running deployments
//! with unbounded peer churn should wrap the limiter in an external LRU.

use std::collections::HashMap;
use std::sync::Mutex;

pub const AUDIT_WINDOW_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy)]
struct PeerAuditWindow {
    window_start_ms: u64,
    logged: u32,
    suppressed: u64,
}

impl PeerAuditWindow {
    fn new(now_ms: u64) -> Self {
        Self {
            window_start_ms: now_ms,
            logged: 0,
            suppressed: 0,
        }
    }

    fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.window_start_ms) >= AUDIT_WINDOW_MS
    }
}

#[derive(Debug)]
/// Sliding-window audit limiter, at most `max_logged_per_window` log
/// emissions per peer per 60 s window.
pub struct AuditRateLimiter {
    max_logged_per_window: u32,
    state: Mutex<HashMap<String, PeerAuditWindow>>,
}

impl AuditRateLimiter {
    pub fn new(max_logged_per_window: u32) -> Self {
        Self {
            max_logged_per_window,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Counts one blocked event for `peer_id` and reports whether the
    /// caller should emit its audit line.
    pub fn should_log(&self, peer_id: &str, now_ms: u64) -> bool {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = state
            .entry(peer_id.to_string())
            .or_insert_with(|| PeerAuditWindow::new(now_ms));
        if entry.is_expired(now_ms) {
            *entry = PeerAuditWindow::new(now_ms);
        }
        if entry.logged < self.max_logged_per_window {
            entry.logged = entry.logged.saturating_add(1);
            return true;
        }
        entry.suppressed = entry.suppressed.saturating_add(1);
        false
    }

    /// Suppressed count inside the current window; zero once the window
    /// has rolled over. Callers emit the one-time "rate limit exceeded"
    /// notice when this first reaches one.
    pub fn suppressed_in_window(&self, peer_id: &str, now_ms: u64) -> u64 {
        let state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(entry) = state.get(peer_id) else {
            return 0;
        };
        if entry.is_expired(now_ms) {
            return 0;
        }
        entry.suppressed
    }
}
