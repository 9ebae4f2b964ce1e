//! Counters for the runtime's `Forward` seam — distinct from the data
//! plane's own packet counters, since `forward_*` in §6 tracks the
//! router-resolution step specifically (attempts, successes, default-cluster
//! fallbacks, payload volume), not packet classification.

use std::sync::atomic::AtomicU64;
use std::sync::Mutex;

#[derive(Default)]
pub struct ForwardCounters {
    pub total: AtomicU64,
    pub successful: AtomicU64,
    pub failed: AtomicU64,
    pub used_default: AtomicU64,
    pub bytes: AtomicU64,
    pub last_error: Mutex<Option<String>>,
}

impl ForwardCounters {
    pub fn record_success(&self, used_default: bool, payload_len: usize) {
        use std::sync::atomic::Ordering::Relaxed;
        self.total.fetch_add(1, Relaxed);
        self.successful.fetch_add(1, Relaxed);
        if used_default {
            self.used_default.fetch_add(1, Relaxed);
        }
        self.bytes.fetch_add(payload_len as u64, Relaxed);
    }

    pub fn record_failure(&self, reason: String) {
        use std::sync::atomic::Ordering::Relaxed;
        self.total.fetch_add(1, Relaxed);
        self.failed.fetch_add(1, Relaxed);
        *self.last_error.lock().unwrap() = Some(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering::Relaxed;

    #[test]
    fn tracks_success_and_default_fallback() {
        let counters = ForwardCounters::default();
        counters.record_success(true, 128);
        counters.record_success(false, 64);

        assert_eq!(counters.total.load(Relaxed), 2);
        assert_eq!(counters.successful.load(Relaxed), 2);
        assert_eq!(counters.used_default.load(Relaxed), 1);
        assert_eq!(counters.bytes.load(Relaxed), 192);
    }

    #[test]
    fn tracks_failure_and_last_error() {
        let counters = ForwardCounters::default();
        counters.record_failure("no healthy targets".to_string());

        assert_eq!(counters.failed.load(Relaxed), 1);
        assert_eq!(
            counters.last_error.lock().unwrap().as_deref(),
            Some("no healthy targets")
        );
    }
}
