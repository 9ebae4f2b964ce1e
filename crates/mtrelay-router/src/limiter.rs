//! Fixed-window, per-wall-clock-second rate limiter (C7). Used for both the
//! ingress accept-rate limiter and the DH-handshake-rate limiter.

use std::sync::Mutex;

struct Window {
    second: u64,
    count: u64,
}

/// `allow(now)` returns true iff, counted together with earlier allowed
/// calls within the same Unix second, the total is still within `limit`.
/// `limit <= 0` means unlimited. Thread-safe; `now` is injected so tests
/// don't depend on wall-clock time.
pub struct RateLimiter {
    limit: i64,
    window: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(limit: i64) -> Self {
        Self {
            limit,
            window: Mutex::new(Window { second: 0, count: 0 }),
        }
    }

    pub fn allow(&self, now_unix_secs: u64) -> bool {
        if self.limit <= 0 {
            return true;
        }

        let mut window = self.window.lock().unwrap();
        if window.second != now_unix_secs {
            window.second = now_unix_secs;
            window.count = 0;
        }

        if window.count < self.limit as u64 {
            window.count += 1;
            true
        } else {
            false
        }
    }
}
