//! Daemon-level settings that sit outside the backend-cluster grammar
//! (§4.4's `proxy`/`default_cluster`/`socket_stats` lines live in
//! `mtrelay-config`): default worker count, the ingress bind address, and
//! the stats responder's default port. Loaded from an optional TOML file,
//! following the teacher's `DaemonConfig` pattern; CLI flags override
//! whatever this file sets.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Worker count when `-M`/`--workers` isn't given on the CLI.
    #[serde(default)]
    pub workers: u16,
    /// Host the ingress listener binds, e.g. `0.0.0.0` or `::`.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Stats port used when `--http-stats` isn't given on the CLI. The
    /// responder always binds loopback regardless of this file.
    #[serde(default)]
    pub stats_port: Option<u16>,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            bind_addr: default_bind_addr(),
            stats_port: None,
        }
    }
}

impl DaemonConfig {
    /// Loads `path` if given, else `MTPROXY_GO_DAEMON_CONFIG` if set, else
    /// falls back to defaults. A path that doesn't exist is an error; an
    /// absent path (neither argument) is not.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let resolved: Option<PathBuf> = path.map(PathBuf::from).or_else(|| {
            std::env::var("MTPROXY_GO_DAEMON_CONFIG")
                .ok()
                .map(PathBuf::from)
        });

        match resolved {
            Some(path) => {
                let content = std::fs::read_to_string(&path)
                    .map_err(|e| anyhow::anyhow!("reading daemon config {path:?}: {e}"))?;
                toml::from_str(&content)
                    .map_err(|e| anyhow::anyhow!("parsing daemon config {path:?}: {e}"))
            }
            None => Ok(Self::default()),
        }
    }
}
