//! The outbound proxy (C9): one pooled TCP connection per `(host, port)`
//! upstream, serialized per-target behind its own mutex.

pub mod config;
pub mod pool;

pub use config::OutboundConfig;
pub use pool::{OutboundCounters, OutboundPool};

#[derive(Debug, thiserror::Error)]
pub enum OutboundError {
    #[error("outbound-payload-too-large: {len} exceeds max frame size {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("dial-failed: {0}")]
    DialFailed(String),

    #[error("send-failed: {0}")]
    SendFailed(String),

    #[error("response-read-failed: {0}")]
    ResponseReadFailed(String),
}

pub type Result<T> = std::result::Result<T, OutboundError>;
