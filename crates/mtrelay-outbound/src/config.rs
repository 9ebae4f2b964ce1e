//! Deadlines and limits for the outbound pool, each overridable by an
//! environment variable (§6 "Environment").

use std::time::Duration;

const DEFAULT_CONNECT_MS: u64 = 3_000;
const DEFAULT_WRITE_MS: u64 = 5_000;
const DEFAULT_READ_MS: u64 = 250;
const DEFAULT_IDLE_MS: u64 = 90_000;
const DEFAULT_MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

/// Pool-wide deadlines and the maximum frame size, read once at startup.
#[derive(Debug, Clone, Copy)]
pub struct OutboundConfig {
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    pub read_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_frame_size: usize,
}

impl OutboundConfig {
    /// Build from defaults, applying any `MTPROXY_GO_OUTBOUND_*` overrides
    /// present in the environment.
    pub fn from_env() -> Self {
        Self {
            connect_timeout: env_duration_ms(
                "MTPROXY_GO_OUTBOUND_CONNECT_TIMEOUT_MS",
                DEFAULT_CONNECT_MS,
            ),
            write_timeout: env_duration_ms(
                "MTPROXY_GO_OUTBOUND_WRITE_TIMEOUT_MS",
                DEFAULT_WRITE_MS,
            ),
            read_timeout: env_duration_ms("MTPROXY_GO_OUTBOUND_READ_TIMEOUT_MS", DEFAULT_READ_MS),
            idle_timeout: env_duration_ms("MTPROXY_GO_OUTBOUND_IDLE_TIMEOUT_MS", DEFAULT_IDLE_MS),
            max_frame_size: std::env::var("MTPROXY_GO_OUTBOUND_MAX_FRAME_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_FRAME_SIZE),
        }
    }
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_MS),
            write_timeout: Duration::from_millis(DEFAULT_WRITE_MS),
            read_timeout: Duration::from_millis(DEFAULT_READ_MS),
            idle_timeout: Duration::from_millis(DEFAULT_IDLE_MS),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

fn env_duration_ms(key: &str, default_ms: u64) -> Duration {
    let ms = std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default_ms);
    Duration::from_millis(ms)
}
