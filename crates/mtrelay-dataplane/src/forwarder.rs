//! Capability seams the data plane calls through, implemented elsewhere
//! (the daemon crate wires `mtrelay-router::Router` and
//! `mtrelay-outbound::OutboundPool` in behind them).

use mtrelay_types::Target;

/// The result of resolving `(target_dc, auth_key_id)` to a concrete
/// upstream target.
#[derive(Debug, Clone)]
pub struct RouteDecision {
    pub target: Target,
    pub used_default: bool,
}

/// Resolves a target DC id to a concrete upstream target.
pub trait Forwarder: Send + Sync {
    fn route(
        &self,
        target_dc: i16,
        auth_key_id: u64,
        payload_len: usize,
    ) -> impl std::future::Future<Output = std::result::Result<RouteDecision, String>> + Send;
}

/// Sends a payload to a resolved target and returns its response, if any.
pub trait OutboundSender: Send + Sync {
    fn exchange(
        &self,
        target: &Target,
        payload: &[u8],
    ) -> impl std::future::Future<Output = std::result::Result<Vec<u8>, String>> + Send;
}
