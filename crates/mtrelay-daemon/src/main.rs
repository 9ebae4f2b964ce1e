use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use mtrelay_daemon::cli::Cli;
use mtrelay_daemon::daemon_config::DaemonConfig;
use mtrelay_daemon::runtime::Runtime;
use mtrelay_daemon::{stats_server, supervisor};
use mtrelay_ingress::IngressConfig;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

fn worker_id() -> u16 {
    std::env::var(supervisor::ENV_WORKER_ID)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

fn is_supervised_worker() -> bool {
    std::env::var(supervisor::ENV_SUPERVISED_WORKER).as_deref() == Ok("1")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let daemon_config = DaemonConfig::load(cli.daemon_config.as_deref())?;
    let workers = if cli.workers > 0 { cli.workers } else { daemon_config.workers };

    if workers > 0 && !is_supervised_worker() {
        let args: Vec<String> = std::env::args().skip(1).collect();
        if let Err(err) = supervisor::run(workers, &args).await {
            tracing::error!(error = %err, "supervisor exiting");
            std::process::exit(1);
        }
        return Ok(());
    }

    let id = worker_id();
    let secrets = cli.parsed_secrets()?;

    let ingress_config = IngressConfig {
        idle_timeout: std::time::Duration::from_secs(90),
        default_target_dc: cli.default_dc,
        secrets,
        accept_rate_limit: cli.max_accept_rate,
    };

    let log_reopener: Option<Box<dyn mtrelay_daemon::LogReopener>> = None;
    let runtime = Arc::new(
        Runtime::new(
            &cli.config,
            ingress_config,
            cli.session_limit,
            cli.max_dh_accept_rate,
            log_reopener,
        )
        .await?,
    );

    if is_supervised_worker() {
        if let Ok(supervisor_pid) = std::env::var(supervisor::ENV_SUPERVISOR_PID) {
            if let Ok(pid) = supervisor_pid.parse::<u32>() {
                let watchdog_runtime = runtime.clone();
                tokio::spawn(async move {
                    supervisor::watch_parent(pid, move || watchdog_runtime.request_shutdown()).await;
                });
            }
        }
    }

    if id != 0 {
        tracing::info!(worker = id, "only worker 0 serves ingress, outbound and stats; idling");
        return runtime.run(None).await;
    }

    let listener = TcpListener::bind((daemon_config.bind_addr.as_str(), cli.port)).await?;
    tracing::info!(addr = %daemon_config.bind_addr, port = cli.port, "ingress listening");

    let stats_port = cli.http_stats_port.or(daemon_config.stats_port);
    if let Some(stats_port) = stats_port {
        let stats_shutdown = runtime.subscribe_shutdown();
        let stats_runtime = runtime.clone();
        tokio::spawn(async move {
            if let Err(err) = stats_server::serve(stats_port, stats_runtime, stats_shutdown).await {
                tracing::error!(error = %err, "stats server exited with error");
            }
        });
    }

    runtime.run(Some(listener)).await
}
