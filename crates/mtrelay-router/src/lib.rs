//! Per-cluster target selection (C6) and the fixed-window rate limiter (C7).

pub mod limiter;
pub mod rand_source;
pub mod router;

pub use limiter::RateLimiter;
pub use rand_source::{RandSource, SequenceRandSource, ThreadRandSource};
pub use router::{Decision, Router};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("cluster {0} has no targets")]
    ClusterAbsent(i16),

    #[error("no healthy targets")]
    NoHealthyTargets,
}

pub type Result<T> = std::result::Result<T, RouterError>;
