//! Client ingress (C10): accept loop, transport detection, per-connection
//! frame loop.

pub mod config;
pub mod connection;
pub mod counters;
pub mod listener;

pub use config::IngressConfig;
pub use counters::IngressCounters;
pub use listener::Ingress;

#[derive(Debug, thiserror::Error)]
pub enum IngressError {
    #[error("invalid obfuscated2 header")]
    InvalidFrames,

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),
}

pub type Result<T> = std::result::Result<T, IngressError>;
