use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tracing::warn;

/// Default sliding window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Per-peer sliding-window rate limiter.
///
/// Each check evicts timestamps that have aged out of the window and, if the
/// peer is under its limit, records the current request.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    requests: HashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            requests: HashMap::new(),
        }
    }

    /// Limiter allowing `max_requests` per minute.
    pub fn per_minute(max_requests: usize) -> Self {
        Self::new(max_requests, DEFAULT_WINDOW)
    }

    /// Record a request from `peer`. Returns `false` when over the limit.
    pub fn check(&mut self, peer: &str) -> bool {
        self.check_at(peer, Instant::now())
    }

    /// [`check`](Self::check) against an explicit clock reading.
    pub fn check_at(&mut self, peer: &str, now: Instant) -> bool {
        let window = self.window;
        let timestamps = self.requests.entry(peer.to_string()).or_default();
        evict(timestamps, now, window);

        if timestamps.len() >= self.max_requests {
            warn!(peer_id = %peer, violation = "rate_limited", "rate limit exceeded");
            return false;
        }
        timestamps.push_back(now);
        true
    }

    /// Evict expired timestamps for every peer and forget idle peers.
    pub fn cleanup_old_entries(&mut self) {
        self.cleanup_at(Instant::now());
    }

    pub fn cleanup_at(&mut self, now: Instant) {
        let window = self.window;
        self.requests.retain(|_, timestamps| {
            evict(timestamps, now, window);
            !timestamps.is_empty()
        });
    }

    /// Number of peers with requests inside the window.
    pub fn tracked_peers(&self) -> usize {
        self.requests.len()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }
}

fn evict(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while timestamps
        .front()
        .is_some_and(|ts| now.saturating_duration_since(*ts) >= window)
    {
        timestamps.pop_front();
    }
}
