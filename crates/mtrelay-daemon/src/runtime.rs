//! The runtime (C11): composes the config manager, router, data plane,
//! outbound pool and ingress layer, owns the target-health map, and runs
//! the signal loop that drives reload, log-reopen and shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{broadcast, RwLock};

use mtrelay_config::ConfigManager;
use mtrelay_dataplane::DataPlane;
use mtrelay_ingress::{Ingress, IngressConfig};
use mtrelay_outbound::{OutboundConfig, OutboundPool};
use mtrelay_router::Router;
use mtrelay_stats::{ForwardCounters, StatsView};
use mtrelay_types::TargetHealthMap;

use crate::forwarder::{RuntimeForwarder, RuntimeOutbound};

/// A reopenable log sink. `None` means the runtime was started without one
/// (e.g. logging straight to stderr), in which case SIGUSR1 is a no-op that
/// still gets logged as "skipped".
pub trait LogReopener: Send + Sync {
    fn reopen(&self) -> std::io::Result<()>;
}

fn now_unix_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub struct Runtime {
    config_manager: Arc<ConfigManager>,
    router: Arc<RwLock<Router>>,
    health: TargetHealthMap,
    data_plane: Arc<DataPlane<RuntimeForwarder, RuntimeOutbound>>,
    forward_counters: Arc<ForwardCounters>,
    outbound_pool: Arc<OutboundPool>,
    ingress: Arc<Ingress>,
    log_reopener: Option<Box<dyn LogReopener>>,
    bootstrap_warnings: Vec<String>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Runtime {
    pub async fn new(
        config_path: impl AsRef<std::path::Path>,
        ingress_config: IngressConfig,
        session_limit: usize,
        dh_rate_limit: i64,
        log_reopener: Option<Box<dyn LogReopener>>,
    ) -> anyhow::Result<Self> {
        let config_manager = Arc::new(ConfigManager::load(config_path)?);
        let snapshot = config_manager.current();

        let router = Arc::new(RwLock::new(Router::new(&snapshot.config)));
        let health = TargetHealthMap::new();
        health.reconcile(&snapshot.config.targets).await;

        let outbound_pool = Arc::new(OutboundPool::new(OutboundConfig::from_env()));
        let forwarder = RuntimeForwarder::new(router.clone(), health.clone());
        let forward_counters = forwarder.counters.clone();
        let outbound = RuntimeOutbound::new(outbound_pool.clone());
        let data_plane = Arc::new(DataPlane::new(
            forwarder,
            outbound,
            health.clone(),
            session_limit,
            dh_rate_limit,
        ));

        let ingress = Arc::new(Ingress::new(ingress_config));

        tracing::info!(
            targets = snapshot.config.targets.len(),
            clusters = snapshot.config.clusters.len(),
            bytes = snapshot.byte_count,
            md5 = %snapshot.md5_hex,
            "config loaded"
        );

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config_manager,
            router,
            health,
            data_plane,
            forward_counters,
            outbound_pool,
            ingress,
            log_reopener,
            bootstrap_warnings: Vec::new(),
            shutdown_tx,
        })
    }

    pub fn data_plane(&self) -> &Arc<DataPlane<RuntimeForwarder, RuntimeOutbound>> {
        &self.data_plane
    }

    pub fn ingress(&self) -> &Arc<Ingress> {
        &self.ingress
    }

    /// Subscribe to the runtime's shutdown broadcast — used by collaborator
    /// tasks spawned outside `run` (the stats HTTP responder) that need to
    /// stop in step with SIGTERM/SIGINT.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Trigger the same shutdown path as SIGTERM/SIGINT — used by the
    /// orphan watchdog when a supervised worker's parent pid changes.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    async fn reload(&self) {
        match self.config_manager.reload() {
            Ok(()) => {
                let snapshot = self.config_manager.current();
                self.router.write().await.update(&snapshot.config);
                self.health.reconcile(&snapshot.config.targets).await;
                tracing::info!(
                    targets = snapshot.config.targets.len(),
                    clusters = snapshot.config.clusters.len(),
                    md5 = %snapshot.md5_hex,
                    "config re-read"
                );
            }
            Err(err) => {
                tracing::warn!(error = %err, "config reload failed, keeping previous config");
            }
        }
    }

    fn reopen_log(&self) {
        match &self.log_reopener {
            Some(reopener) => match reopener.reopen() {
                Ok(()) => tracing::info!("log file reopened"),
                Err(err) => tracing::warn!(error = %err, "log file reopen failed"),
            },
            None => tracing::info!("log reopen requested, no reopenable sink configured; skipped"),
        }
    }

    /// Render the `/stats` body from a fresh snapshot of every component.
    pub async fn render_stats(&self) -> String {
        let router = self.router.read().await;
        let active_sessions = self.data_plane.active_sessions().await;
        let active_conns = self.outbound_pool.active_conns().await;

        mtrelay_stats::render(StatsView {
            now_unix_secs: now_unix_secs(),
            config_manager: &self.config_manager,
            router: &router,
            health: &self.health,
            forward: &self.forward_counters,
            dataplane: &self.data_plane.counters,
            active_sessions,
            session_limit: self.data_plane.session_limit(),
            outbound: &self.outbound_pool.counters,
            active_conns,
            ingress: &self.ingress.counters(),
            bootstrap_warnings: &self.bootstrap_warnings,
        })
        .await
    }

    /// Drive the signal loop: SIGHUP reloads, SIGUSR1 reopens the log,
    /// SIGTERM/SIGINT shut down gracefully. Runs the ingress accept loop
    /// concurrently until shutdown. `listener` is `None` on workers other
    /// than worker 0, which serve no ingress traffic.
    pub async fn run(self: Arc<Self>, listener: Option<TcpListener>) -> anyhow::Result<()> {
        let mut sighup = signal(SignalKind::hangup())?;
        let mut sigusr1 = signal(SignalKind::user_defined1())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        let now_fn: Arc<dyn Fn() -> u64 + Send + Sync> = Arc::new(now_unix_secs);
        let mut external_shutdown = self.shutdown_tx.subscribe();

        let ingress_handle = listener.map(|listener| {
            let ingress = self.ingress.clone();
            let data_plane = self.data_plane.clone();
            let now_fn = now_fn.clone();
            let shutdown_rx = self.shutdown_tx.subscribe();
            tokio::spawn(async move {
                ingress.serve(listener, data_plane, now_fn, shutdown_rx).await;
            })
        });

        let terminated_by = loop {
            tokio::select! {
                _ = sighup.recv() => self.reload().await,
                _ = sigusr1.recv() => self.reopen_log(),
                _ = sigterm.recv() => break "SIGTERM",
                _ = sigint.recv() => break "SIGINT",
                _ = external_shutdown.recv() => break "orphan watchdog",
            }
        };
        tracing::info!("Terminated by {terminated_by}.");

        let _ = self.shutdown_tx.send(());
        if let Some(handle) = ingress_handle {
            let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
        }
        self.outbound_pool.close().await;
        Ok(())
    }
}
