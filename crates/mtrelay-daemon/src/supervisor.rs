//! The supervisor (C12): spawns N worker children re-executing this same
//! binary, forwards SIGHUP/SIGUSR1 to all of them, and treats any
//! unexpected child exit as fatal — best-effort SIGTERM to the rest, then a
//! non-zero exit.

use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{bail, Context};
use tokio::process::Command;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinSet;

pub const ENV_SUPERVISED_WORKER: &str = "MTPROXY_GO_SUPERVISED_WORKER";
pub const ENV_WORKER_ID: &str = "MTPROXY_GO_WORKER_ID";
pub const ENV_SUPERVISOR_PID: &str = "MTPROXY_GO_SUPERVISOR_PID";

/// How long the supervisor waits for children to exit on their own after
/// forwarding the shutdown signal before it escalates to `SIGKILL`.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

/// Re-exec this binary `count` times with the worker env vars set, forward
/// SIGHUP/SIGUSR1 to all of them, and exit non-zero the moment any one of
/// them exits unexpectedly.
pub async fn run(count: u16, args: &[String]) -> anyhow::Result<()> {
    let exe = std::env::current_exe().context("resolving own executable path")?;
    let my_pid = std::process::id();

    let mut pids = Vec::with_capacity(count as usize);
    let mut waiters: JoinSet<(u16, std::io::Result<ExitStatus>)> = JoinSet::new();

    for id in 0..count {
        let mut child = Command::new(&exe)
            .args(args)
            .env(ENV_SUPERVISED_WORKER, "1")
            .env(ENV_WORKER_ID, id.to_string())
            .env(ENV_SUPERVISOR_PID, my_pid.to_string())
            .stdin(Stdio::null())
            .spawn()
            .with_context(|| format!("spawning worker {id}"))?;
        let pid = child.id().unwrap_or(0);
        tracing::info!(worker = id, pid, "worker spawned");
        pids.push((id, pid));
        waiters.spawn(async move { (id, child.wait().await) });
    }

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let result = loop {
        tokio::select! {
            _ = sighup.recv() => forward_to_all(&pids, libc::SIGHUP),
            _ = sigusr1.recv() => forward_to_all(&pids, libc::SIGUSR1),
            _ = sigterm.recv() => { forward_to_all(&pids, libc::SIGTERM); break Ok(()); }
            _ = sigint.recv() => { forward_to_all(&pids, libc::SIGTERM); break Ok(()); }
            Some(joined) = waiters.join_next() => {
                let (worker_id, status) = match joined {
                    Ok(pair) => pair,
                    Err(err) => {
                        tracing::error!(error = %err, "worker wait task panicked");
                        forward_to_all(&pids, libc::SIGTERM);
                        break Err(err).context("worker wait task panicked");
                    }
                };
                match status {
                    Ok(status) => {
                        tracing::error!(worker = worker_id, code = ?status.code(), "worker exited unexpectedly");
                    }
                    Err(err) => {
                        tracing::error!(worker = worker_id, error = %err, "failed to wait on worker");
                    }
                }
                forward_to_all(&pids, libc::SIGTERM);
                break bail_worker(worker_id);
            }
        }
    };

    drain_with_deadline(waiters, &pids).await;
    result
}

/// Waits up to `SHUTDOWN_DRAIN` for every still-running child to exit on its
/// own; any that miss the deadline get `SIGKILL`ed before returning.
async fn drain_with_deadline(mut waiters: JoinSet<(u16, std::io::Result<ExitStatus>)>, pids: &[(u16, u32)]) {
    let mut remaining: HashMap<u16, u32> = pids.iter().copied().collect();
    let deadline = tokio::time::Instant::now() + SHUTDOWN_DRAIN;

    while !remaining.is_empty() {
        let left = deadline.saturating_duration_since(tokio::time::Instant::now());
        if left.is_zero() {
            break;
        }
        match tokio::time::timeout(left, waiters.join_next()).await {
            Ok(Some(Ok((id, _status)))) => {
                remaining.remove(&id);
            }
            Ok(Some(Err(err))) => {
                tracing::error!(error = %err, "worker wait task panicked during shutdown");
            }
            Ok(None) => break,
            Err(_) => break,
        }
    }

    for (id, pid) in remaining {
        tracing::warn!(worker = id, pid, "worker did not exit within drain deadline, sending SIGKILL");
        if pid != 0 {
            unsafe {
                libc::kill(pid as i32, libc::SIGKILL);
            }
        }
    }

    waiters.shutdown().await;
}

fn bail_worker(worker_id: u16) -> anyhow::Result<()> {
    bail!("worker {worker_id} exited unexpectedly")
}

fn forward_to_all(pids: &[(u16, u32)], sig: i32) {
    for (_, pid) in pids {
        if *pid != 0 {
            unsafe {
                libc::kill(*pid as i32, sig);
            }
        }
    }
}

/// A supervised worker polls its parent's pid at ~2 Hz; if the observed
/// parent no longer matches `SUPERVISOR_PID`, the supervisor died and this
/// worker should shut down rather than become an orphan. Runs until
/// `on_orphaned` is called once.
pub async fn watch_parent(supervisor_pid: u32, on_orphaned: impl Fn()) {
    let mut interval = tokio::time::interval(std::time::Duration::from_millis(500));
    loop {
        interval.tick().await;
        let current_parent = unsafe { libc::getppid() } as u32;
        if current_parent != supervisor_pid {
            tracing::warn!(
                expected = supervisor_pid,
                actual = current_parent,
                "supervisor pid changed, shutting down"
            );
            on_orphaned();
            return;
        }
    }
}
