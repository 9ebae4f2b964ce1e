//! One `AtomicU64`/`AtomicI64` per `ingress_*` stats key in §6.

use std::sync::atomic::{AtomicI64, AtomicU64};

#[derive(Default)]
pub struct IngressCounters {
    pub active: AtomicI64,
    pub accepted: AtomicU64,
    pub accept_rate_limited: AtomicU64,
    pub closed: AtomicU64,
    pub frames_received: AtomicU64,
    pub frames_handled: AtomicU64,
    pub frames_returned: AtomicU64,
    pub frames_failed: AtomicU64,
    pub bytes_received: AtomicU64,
    pub bytes_returned: AtomicU64,
    pub read_errors: AtomicU64,
    pub write_errors: AtomicU64,
    pub invalid_frames: AtomicU64,
}
