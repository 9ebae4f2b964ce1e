//! The accept loop: binds a listener, applies the accept-rate limiter, and
//! spawns one task per accepted connection to run [`crate::connection::run_connection`].

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use mtrelay_dataplane::{ConnId, DataPlane, Forwarder, OutboundSender};
use mtrelay_router::RateLimiter;

use crate::config::IngressConfig;
use crate::connection::run_connection;
use crate::counters::IngressCounters;

/// Owns the accept-rate limiter and connection counters; holds no listener
/// of its own so the caller controls bind address and shutdown timing.
pub struct Ingress {
    config: IngressConfig,
    accept_limiter: RateLimiter,
    counters: Arc<IngressCounters>,
    next_conn_id: std::sync::atomic::AtomicU64,
}

impl Ingress {
    pub fn new(config: IngressConfig) -> Self {
        let accept_limiter = RateLimiter::new(config.accept_rate_limit);
        Self {
            config,
            accept_limiter,
            counters: Arc::new(IngressCounters::default()),
            next_conn_id: std::sync::atomic::AtomicU64::new(1),
        }
    }

    pub fn counters(&self) -> Arc<IngressCounters> {
        self.counters.clone()
    }

    /// Accept connections from `listener` until `shutdown` fires, dispatching
    /// each to its own task against `data_plane`. `now_fn` is shared with
    /// every spawned connection so a single injectable clock drives the
    /// whole ingress layer.
    pub async fn serve<F, O>(
        &self,
        listener: TcpListener,
        data_plane: Arc<DataPlane<F, O>>,
        now_fn: Arc<dyn Fn() -> u64 + Send + Sync>,
        mut shutdown: broadcast::Receiver<()>,
    ) where
        F: Forwarder + 'static,
        O: OutboundSender + 'static,
    {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => self.dispatch(stream, &data_plane, &now_fn),
                        Err(err) => {
                            tracing::warn!(error = %err, "ingress accept failed");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("ingress accept loop shutting down");
                    return;
                }
            }
        }
    }

    fn dispatch<F, O>(
        &self,
        stream: TcpStream,
        data_plane: &Arc<DataPlane<F, O>>,
        now_fn: &Arc<dyn Fn() -> u64 + Send + Sync>,
    ) where
        F: Forwarder + 'static,
        O: OutboundSender + 'static,
    {
        self.counters.accepted.fetch_add(1, Ordering::Relaxed);

        let now = (now_fn)();
        if !self.accept_limiter.allow(now) {
            self.counters
                .accept_rate_limited
                .fetch_add(1, Ordering::Relaxed);
            return;
        }

        let conn_id: ConnId = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let config = self.config.clone();
        let data_plane = data_plane.clone();
        let counters = self.counters.clone();
        let now_fn = now_fn.clone();

        counters.active.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(async move {
            let result = run_connection(stream, conn_id, &config, &data_plane, &counters, now_fn.as_ref()).await;
            if let Err(err) = result {
                tracing::debug!(conn_id, error = %err, "ingress connection ended with error");
            }
            data_plane.close_connection(conn_id).await;
            counters.active.fetch_sub(1, Ordering::Relaxed);
            counters.closed.fetch_add(1, Ordering::Relaxed);
        });
    }
}
