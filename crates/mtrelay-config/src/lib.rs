//! # mtrelay-config
//!
//! The backend config grammar (C4) — a small line-oriented directive
//! language for clusters, targets and limits, distinct from any TOML/serde
//! settings file — and the config manager (C5) that owns the current
//! snapshot and reloads it on demand.

pub mod manager;
pub mod parser;

pub use manager::ConfigManager;
pub use parser::parse;

/// Errors from parsing or loading the backend config.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("statement missing trailing ';'")]
    MissingSemicolon,

    #[error("unknown directive {0:?}")]
    UnknownDirective(String),

    #[error("directive {0:?} requires an argument")]
    MissingArgument(&'static str),

    #[error("invalid integer for {0:?}: {1:?}")]
    InvalidInteger(&'static str, String),

    #[error("invalid host:port {0:?}")]
    InvalidHostPort(String),

    #[error("no proxy directive in config")]
    NoProxyDirective,

    #[error("proxy_for {0} groups are not contiguous")]
    IntermixedClusterGroup(i16),

    #[error("target count {0} exceeds maximum of 4096")]
    TooManyTargets(usize),

    #[error("cluster count {0} exceeds maximum of 1024")]
    TooManyClusters(usize),

    #[error("min_connections {min} exceeds max_connections {max}")]
    MinExceedsMax { min: u32, max: u32 },

    #[error("timeout {0}ms outside the allowed range [10, 30000]")]
    TimeoutOutOfRange(u32),

    #[error("failed to read config file {path:?}: {reason}")]
    Io { path: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
