//! Thin flag surface. The full CLI described in §6 (usage text, every
//! `mtproto-proxy`-compatible flag) is explicitly out of scope; this exposes
//! only what the core needs from it: where the backend config lives, how
//! many workers to run, which port to listen on, and the handful of limits
//! and secrets the data plane and ingress layer are parameterized by.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "mtrelay-daemon", about = "MTProto-obfuscation-aware relay")]
pub struct Cli {
    /// Path to the backend config file (clusters, targets, limits).
    #[arg(short = 'c', long = "config")]
    pub config: PathBuf,

    /// Path to the daemon-level TOML settings file (worker count default,
    /// bind address, stats port). Falls back to `MTPROXY_GO_DAEMON_CONFIG`
    /// or compiled-in defaults when omitted.
    #[arg(long = "daemon-config")]
    pub daemon_config: Option<PathBuf>,

    /// Ingress listen port.
    #[arg(short = 'p', long = "port", default_value_t = 8443)]
    pub port: u16,

    /// Worker processes to supervise. 0 runs in-process with no supervisor.
    #[arg(short = 'M', long = "workers", default_value_t = 0)]
    pub workers: u16,

    /// Maximum live sessions (0 = unlimited).
    #[arg(long = "max-special-connections", default_value_t = 0)]
    pub session_limit: usize,

    /// Maximum accepted connections per second (0 = unlimited).
    #[arg(long = "max-accept-rate", default_value_t = 0)]
    pub max_accept_rate: i64,

    /// Maximum DH handshakes per second (0 = unlimited).
    #[arg(long = "max-dh-accept-rate", default_value_t = 0)]
    pub max_dh_accept_rate: i64,

    /// Obfuscation secrets, 32 hex characters (16 bytes) each.
    #[arg(short = 'S', long = "secret")]
    pub secrets: Vec<String>,

    /// Fallback target DC for plaintext transports.
    #[arg(short = 'D', long = "default-dc", default_value_t = 0)]
    pub default_dc: i16,

    /// Serve `/stats` on loopback at this port; omit to disable.
    #[arg(long = "http-stats")]
    pub http_stats_port: Option<u16>,
}

impl Cli {
    pub fn parsed_secrets(&self) -> anyhow::Result<Vec<Vec<u8>>> {
        self.secrets
            .iter()
            .map(|s| {
                hex::decode(s)
                    .map_err(|e| anyhow::anyhow!("invalid secret hex {s:?}: {e}"))
            })
            .collect()
    }
}
