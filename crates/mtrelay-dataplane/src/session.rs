//! Per-connection session state. Created lazily on first packet; only the
//! data plane mutates it.

use mtrelay_protocol::SessionState;

/// Opaque connection identifier, assigned by the ingress layer.
pub type ConnId = u64;

#[derive(Debug, Clone)]
pub struct Session {
    pub state: SessionState,
    pub last_seen_unix_secs: u64,
    pub packet_count: u64,
}

impl Session {
    pub fn new(now_unix_secs: u64) -> Self {
        Self {
            state: SessionState::Init,
            last_seen_unix_secs: now_unix_secs,
            packet_count: 0,
        }
    }

    pub fn touch(&mut self, now_unix_secs: u64) {
        self.last_seen_unix_secs = now_unix_secs;
        self.packet_count += 1;
    }

    pub fn is_idle(&self, idle_secs: u64, now_unix_secs: u64) -> bool {
        now_unix_secs.saturating_sub(self.last_seen_unix_secs) >= idle_secs
    }
}
