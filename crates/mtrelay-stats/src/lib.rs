//! The stats renderer (C13): produces the `GET /stats` text payload
//! (`<key>\t<value>\n` lines) from a snapshot of every other component.
//!
//! Only the content lives here — the HTTP plumbing that serves it is a
//! thin collaborator owned by `mtrelay-daemon`.

pub mod forward;

pub use forward::ForwardCounters;

use std::sync::atomic::Ordering;

use mtrelay_config::ConfigManager;
use mtrelay_dataplane::DataPlaneCounters;
use mtrelay_ingress::IngressCounters;
use mtrelay_outbound::OutboundCounters;
use mtrelay_router::Router;
use mtrelay_types::TargetHealthMap;

/// Everything the renderer needs a live read of. Borrowed, not owned: the
/// runtime composes this from its own fields each time `/stats` is served.
pub struct StatsView<'a> {
    pub now_unix_secs: u64,
    pub config_manager: &'a ConfigManager,
    pub router: &'a Router,
    pub health: &'a TargetHealthMap,
    pub forward: &'a ForwardCounters,
    pub dataplane: &'a DataPlaneCounters,
    pub active_sessions: usize,
    pub session_limit: usize,
    pub outbound: &'a OutboundCounters,
    pub active_conns: usize,
    pub ingress: &'a IngressCounters,
    pub bootstrap_warnings: &'a [String],
}

fn line(out: &mut String, key: &str, value: impl std::fmt::Display) {
    out.push_str(key);
    out.push('\t');
    out.push_str(&value.to_string());
    out.push('\n');
}

/// Render the full `text/plain; charset=utf-8` body for `GET /stats`.
pub async fn render(view: StatsView<'_>) -> String {
    let mut out = String::new();

    line(&mut out, "stats_generated_at", view.now_unix_secs);

    let snapshot = view.config_manager.current();
    let has_config = !snapshot.source_path.is_empty() && snapshot.byte_count > 0;
    line(&mut out, "has_current_config", has_config);
    line(&mut out, "config_filename", &snapshot.source_path);
    line(&mut out, "config_loaded_at", snapshot.loaded_at_unix_secs);
    line(&mut out, "config_size", snapshot.byte_count);
    line(&mut out, "config_md5", &snapshot.md5_hex);
    line(
        &mut out,
        "config_auth_clusters",
        snapshot.config.clusters.len(),
    );

    line(
        &mut out,
        "router_default_cluster",
        view.router.default_cluster_id(),
    );
    line(&mut out, "router_clusters", view.router.cluster_count());
    line(&mut out, "router_targets", view.router.target_count());

    let health_snapshot = view.health.snapshot().await;
    let healthy = health_snapshot.values().filter(|v| **v).count();
    let unhealthy = health_snapshot.len() - healthy;
    line(&mut out, "targets_healthy", healthy);
    line(&mut out, "targets_unhealthy", unhealthy);

    line(
        &mut out,
        "bootstrap_warnings",
        view.bootstrap_warnings.len(),
    );

    line(
        &mut out,
        "config_check_calls",
        view.config_manager.check_calls(),
    );
    line(
        &mut out,
        "config_reload_calls",
        view.config_manager.reload_calls(),
    );
    line(
        &mut out,
        "config_reload_success",
        view.config_manager.reload_success(),
    );
    line(
        &mut out,
        "config_reload_last_error",
        view.config_manager.last_error().unwrap_or_default(),
    );

    let forward_total = view.forward.total.load(Ordering::Relaxed);
    let forward_bytes = view.forward.bytes.load(Ordering::Relaxed);
    line(&mut out, "forward_total", forward_total);
    line(
        &mut out,
        "forward_successful",
        view.forward.successful.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "forward_failed",
        view.forward.failed.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "forward_used_default",
        view.forward.used_default.load(Ordering::Relaxed),
    );
    line(&mut out, "forward_bytes", forward_bytes);
    let avg_payload = if forward_total > 0 {
        forward_bytes / forward_total
    } else {
        0
    };
    line(&mut out, "forward_avg_payload_bytes", avg_payload);
    line(
        &mut out,
        "forward_last_error",
        view.forward.last_error.lock().unwrap().clone().unwrap_or_default(),
    );

    line(&mut out, "dataplane_active_sessions", view.active_sessions);
    line(&mut out, "dataplane_session_limit", view.session_limit);
    line(
        &mut out,
        "dataplane_sessions_created",
        view.dataplane.sessions_created.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "dataplane_sessions_closed",
        view.dataplane.sessions_closed.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "dataplane_packets_total",
        view.dataplane.packets_total.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "dataplane_packets_encrypted",
        view.dataplane.packets_encrypted.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "dataplane_packets_handshake",
        view.dataplane.packets_handshake.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "dataplane_packets_dropped",
        view.dataplane.dropped.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "dataplane_packets_parse_errors",
        view.dataplane.parse_errors.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "dataplane_packets_route_errors",
        view.dataplane.route_errors.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "dataplane_packets_rejected_limit",
        view.dataplane.rejected_by_limit.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "dataplane_packets_rejected_dh_rate",
        view.dataplane.rejected_by_dh.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "dataplane_packets_outbound_errors",
        view.dataplane.outbound_errors.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "dataplane_bytes_total",
        view.dataplane.bytes_total.load(Ordering::Relaxed),
    );

    line(&mut out, "outbound_dials", view.outbound.dials.load(Ordering::Relaxed));
    line(
        &mut out,
        "outbound_dial_errors",
        view.outbound.dial_errors.load(Ordering::Relaxed),
    );
    line(&mut out, "outbound_sends", view.outbound.sends.load(Ordering::Relaxed));
    line(
        &mut out,
        "outbound_send_errors",
        view.outbound.send_errors.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "outbound_bytes_sent",
        view.outbound.bytes_sent.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "outbound_responses",
        view.outbound.responses.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "outbound_response_errors",
        view.outbound.response_errors.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "outbound_response_bytes",
        view.outbound.response_bytes.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "outbound_active_sends",
        view.outbound.active_sends.load(Ordering::Relaxed),
    );
    line(&mut out, "outbound_active_conns", view.active_conns);
    line(
        &mut out,
        "outbound_pool_hits",
        view.outbound.pool_hits.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "outbound_pool_misses",
        view.outbound.pool_misses.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "outbound_reconnects",
        view.outbound.reconnects.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "outbound_idle_evictions",
        view.outbound.idle_evictions.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "outbound_closed_after_send",
        view.outbound.closed_after_send.load(Ordering::Relaxed),
    );

    line(
        &mut out,
        "ingress_active",
        view.ingress.active.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "ingress_accepted",
        view.ingress.accepted.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "ingress_accept_rate_limited",
        view.ingress.accept_rate_limited.load(Ordering::Relaxed),
    );
    line(&mut out, "ingress_closed", view.ingress.closed.load(Ordering::Relaxed));
    line(
        &mut out,
        "ingress_frames_received",
        view.ingress.frames_received.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "ingress_frames_handled",
        view.ingress.frames_handled.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "ingress_frames_returned",
        view.ingress.frames_returned.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "ingress_frames_failed",
        view.ingress.frames_failed.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "ingress_bytes_received",
        view.ingress.bytes_received.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "ingress_bytes_returned",
        view.ingress.bytes_returned.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "ingress_read_errors",
        view.ingress.read_errors.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "ingress_write_errors",
        view.ingress.write_errors.load(Ordering::Relaxed),
    );
    line(
        &mut out,
        "ingress_invalid_frames",
        view.ingress.invalid_frames.load(Ordering::Relaxed),
    );

    out
}
