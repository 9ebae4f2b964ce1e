//! The data-plane (C8): per-connection session bookkeeping and the
//! `handle_packet` procedure that ties classification, routing and
//! outbound delivery together.
//!
//! `Forwarder` and `OutboundSender` are narrow capability traits rather than
//! direct dependencies on `mtrelay-router` / `mtrelay-outbound`: the data
//! plane only needs "give me a target" and "send this and get a response
//! back", and keeping those as local trait seams means this crate (and its
//! tests) never has to know how routing or pooling are actually implemented.

pub mod forwarder;
pub mod plane;
pub mod session;

pub use forwarder::{Forwarder, OutboundSender, RouteDecision};
pub use plane::{DataPlane, DataPlaneCounters};
pub use session::{ConnId, Session};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum DataPlaneError {
    #[error("bad frame: {0}")]
    BadFrame(String),

    #[error("connection-limit-reached")]
    ConnectionLimitReached,

    #[error("dh-rate-exceeded")]
    DhRateExceeded,

    #[error("route failed: {0}")]
    RouteFailed(String),

    #[error("outbound failed: {0}")]
    OutboundFailed(String),
}

pub type Result<T> = std::result::Result<T, DataPlaneError>;
