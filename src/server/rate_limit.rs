// Per-client sliding-window rate limiter for the scrape endpoint.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::RateLimitConfig;

pub struct ClientRateLimiter {
    max_requests: usize,
    window: Duration,
    requests: Mutex<HashMap<IpAddr, VecDeque<Instant>>>,
}

impl ClientRateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: config.window,
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request from `ip`. Returns the time until a slot frees up when
    /// the client is over its budget.
    pub fn check(&self, ip: IpAddr) -> Result<(), Duration> {
        let now = Instant::now();
        let mut requests = self.requests.lock();
        let recent = requests.entry(ip).or_default();

        while let Some(oldest) = recent.front() {
            if now.duration_since(*oldest) >= self.window {
                recent.pop_front();
            } else {
                break;
            }
        }

        if recent.len() >= self.max_requests {
            let oldest = recent.front().copied().unwrap_or(now);
            return Err(self.window.saturating_sub(now.duration_since(oldest)));
        }

        recent.push_back(now);
        Ok(())
    }

    /// Forget clients with no request inside the current window.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut requests = self.requests.lock();
        let before = requests.len();
        requests.retain(|_, recent| {
            recent
                .back()
                .is_some_and(|last| now.duration_since(*last) < self.window)
        });
        before - requests.len()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn tracked_clients(&self) -> usize {
        self.requests.lock().len()
    }
}
