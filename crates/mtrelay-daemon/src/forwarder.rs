//! Adapters wiring `mtrelay-router::Router` and `mtrelay-outbound::OutboundPool`
//! in behind the data plane's narrow `Forwarder`/`OutboundSender` seams, so
//! `mtrelay-dataplane` never depends on either crate directly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use mtrelay_dataplane::{Forwarder, OutboundSender, RouteDecision};
use mtrelay_outbound::OutboundPool;
use mtrelay_router::{Router, ThreadRandSource};
use mtrelay_stats::ForwardCounters;
use mtrelay_types::{Target, TargetHealthMap};

/// Resolves a target DC to a concrete upstream target via the router,
/// recording the `forward_*` stats counters around every attempt.
pub struct RuntimeForwarder {
    router: Arc<RwLock<Router>>,
    health: TargetHealthMap,
    pub counters: Arc<ForwardCounters>,
}

impl RuntimeForwarder {
    pub fn new(router: Arc<RwLock<Router>>, health: TargetHealthMap) -> Self {
        Self {
            router,
            health,
            counters: Arc::new(ForwardCounters::default()),
        }
    }
}

impl Forwarder for RuntimeForwarder {
    async fn route(
        &self,
        target_dc: i16,
        _auth_key_id: u64,
        payload_len: usize,
    ) -> Result<RouteDecision, String> {
        let mut rand = ThreadRandSource;
        let router = self.router.read().await;
        match router
            .choose_proxy_target(target_dc, None, &self.health, &mut rand)
            .await
        {
            Ok(decision) => {
                self.counters
                    .record_success(decision.used_default, payload_len);
                Ok(RouteDecision {
                    target: decision.target,
                    used_default: decision.used_default,
                })
            }
            Err(err) => {
                let reason = err.to_string();
                self.counters.record_failure(reason.clone());
                Err(reason)
            }
        }
    }
}

/// Sends a payload through the outbound pool, supplying the wall-clock
/// second the pool's idle eviction and reconnect bookkeeping need.
pub struct RuntimeOutbound {
    pool: Arc<OutboundPool>,
    clock: AtomicU64,
}

impl RuntimeOutbound {
    pub fn new(pool: Arc<OutboundPool>) -> Self {
        Self {
            pool,
            clock: AtomicU64::new(0),
        }
    }

    /// Called once per exchange by the daemon's clock tick, or simply reads
    /// the wall clock directly when no injected clock is configured.
    pub fn tick(&self, now_unix_secs: u64) {
        self.clock.store(now_unix_secs, Ordering::Relaxed);
    }

    pub fn pool(&self) -> &Arc<OutboundPool> {
        &self.pool
    }
}

impl OutboundSender for RuntimeOutbound {
    async fn exchange(&self, target: &Target, payload: &[u8]) -> Result<Vec<u8>, String> {
        let now = now_unix_secs();
        self.clock.store(now, Ordering::Relaxed);
        self.pool
            .exchange(target, payload, now)
            .await
            .map_err(|e| e.to_string())
    }
}

fn now_unix_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtrelay_types::{Cluster, Config};

    fn config_with_target() -> Config {
        let mut cluster = Cluster::new(1);
        cluster.targets.push(Target {
            cluster_id: 1,
            host: "127.0.0.1".to_string(),
            port: 1,
            min_connections: 1,
            max_connections: 1,
        });
        Config {
            default_min_connections: 1,
            default_max_connections: 1,
            timeout_ms: 1000,
            default_cluster_id: 0,
            have_proxy: true,
            targets: cluster.targets.clone(),
            clusters: vec![cluster],
        }
    }

    #[tokio::test]
    async fn records_successful_route_and_bytes() {
        let cfg = config_with_target();
        let router = Arc::new(RwLock::new(Router::new(&cfg)));
        let health = TargetHealthMap::new();
        let forwarder = RuntimeForwarder::new(router, health);

        let decision = forwarder.route(1, 0, 64).await.unwrap();
        assert_eq!(decision.target.host, "127.0.0.1");
        assert_eq!(
            forwarder.counters.successful.load(Ordering::Relaxed),
            1
        );
        assert_eq!(forwarder.counters.bytes.load(Ordering::Relaxed), 64);
    }

    #[tokio::test]
    async fn records_failure_when_cluster_absent() {
        let cfg = config_with_target();
        let router = Arc::new(RwLock::new(Router::new(&cfg)));
        let health = TargetHealthMap::new();
        let forwarder = RuntimeForwarder::new(router, health);

        let err = forwarder.route(9, 0, 10).await.unwrap_err();
        assert!(!err.is_empty());
        assert_eq!(forwarder.counters.failed.load(Ordering::Relaxed), 1);
    }
}
