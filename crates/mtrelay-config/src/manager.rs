//! Owns the currently installed [`mtrelay_types::Snapshot`] and reloads it
//! from disk on demand, keeping the previous snapshot in effect if a reload
//! fails.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use mtrelay_crypto::hash::md5;
use mtrelay_types::Snapshot;

use crate::{parser, ConfigError, Result};

fn md5_hex(bytes: &[u8]) -> String {
    md5(bytes).iter().map(|b| format!("{b:02x}")).collect()
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Reads, parses and owns the backend config. `check` never mutates the
/// currently installed snapshot; only `reload` does, and only on success.
pub struct ConfigManager {
    path: PathBuf,
    current: RwLock<Arc<Snapshot>>,
    check_calls: AtomicU64,
    reload_calls: AtomicU64,
    reload_success: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl ConfigManager {
    /// Build a manager around `path`, performing an initial blocking load.
    /// Fails if the first load fails — there is no prior snapshot to fall
    /// back on.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let manager = Self {
            current: RwLock::new(Arc::new(Snapshot {
                config: mtrelay_types::Config {
                    default_min_connections: 1,
                    default_max_connections: 1,
                    timeout_ms: 1_000,
                    default_cluster_id: 0,
                    have_proxy: false,
                    targets: Vec::new(),
                    clusters: Vec::new(),
                },
                loaded_at_unix_secs: 0,
                source_path: path.to_string_lossy().into_owned(),
                byte_count: 0,
                md5_hex: String::new(),
            })),
            path,
            check_calls: AtomicU64::new(0),
            reload_calls: AtomicU64::new(0),
            reload_success: AtomicU64::new(0),
            last_error: Mutex::new(None),
        };
        let snapshot = manager.check()?;
        *manager.current.write().unwrap() = Arc::new(snapshot);
        Ok(manager)
    }

    /// Re-read and re-parse the file without installing the result.
    pub fn check(&self) -> Result<Snapshot> {
        self.check_calls.fetch_add(1, Ordering::Relaxed);
        let bytes = std::fs::read(&self.path).map_err(|e| ConfigError::Io {
            path: self.path.to_string_lossy().into_owned(),
            reason: e.to_string(),
        })?;
        let text = String::from_utf8_lossy(&bytes);
        let config = parser::parse(&text)?;
        Ok(Snapshot {
            config,
            loaded_at_unix_secs: now_unix_secs(),
            source_path: self.path.to_string_lossy().into_owned(),
            byte_count: bytes.len() as u64,
            md5_hex: md5_hex(&bytes),
        })
    }

    /// Re-read, re-parse and, only on success, install the new snapshot.
    /// On failure the previously installed snapshot remains current.
    pub fn reload(&self) -> Result<()> {
        self.reload_calls.fetch_add(1, Ordering::Relaxed);
        match self.check() {
            Ok(snapshot) => {
                *self.current.write().unwrap() = Arc::new(snapshot);
                self.reload_success.fetch_add(1, Ordering::Relaxed);
                *self.last_error.lock().unwrap() = None;
                tracing::info!(path = %self.path.display(), "config reloaded");
                Ok(())
            }
            Err(err) => {
                *self.last_error.lock().unwrap() = Some(err.to_string());
                tracing::warn!(path = %self.path.display(), error = %err, "config reload failed, keeping previous snapshot");
                Err(err)
            }
        }
    }

    /// The currently installed snapshot.
    pub fn current(&self) -> Arc<Snapshot> {
        self.current.read().unwrap().clone()
    }

    pub fn check_calls(&self) -> u64 {
        self.check_calls.load(Ordering::Relaxed)
    }

    pub fn reload_calls(&self) -> u64 {
        self.reload_calls.load(Ordering::Relaxed)
    }

    pub fn reload_success(&self) -> u64 {
        self.reload_success.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn unique_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        let pid = std::process::id();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .subsec_nanos();
        path.push(format!("mtrelay-config-test-{name}-{pid}-{nanos}.conf"));
        path
    }

    fn write_file(path: &Path, contents: &str) {
        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn loads_and_exposes_snapshot() {
        let path = unique_path("load");
        write_file(&path, "proxy 127.0.0.1:443;");

        let manager = ConfigManager::load(&path).unwrap();
        let snapshot = manager.current();
        assert_eq!(snapshot.config.targets.len(), 1);
        assert_eq!(manager.check_calls(), 1);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn reload_keeps_previous_snapshot_on_parse_failure() {
        let path = unique_path("reload-fail");
        write_file(&path, "proxy 127.0.0.1:443;");
        let manager = ConfigManager::load(&path).unwrap();
        let good = manager.current();

        write_file(&path, "this is not valid");
        let err = manager.reload().unwrap_err();
        assert_eq!(err, ConfigError::MissingSemicolon);

        assert_eq!(manager.current().md5_hex, good.md5_hex);
        assert_eq!(manager.reload_calls(), 1);
        assert_eq!(manager.reload_success(), 0);
        assert!(manager.last_error().is_some());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn reload_installs_new_snapshot_and_clears_last_error() {
        let path = unique_path("reload-ok");
        write_file(&path, "this is not valid");
        // The initial load must succeed for the manager to exist at all, so
        // seed it with a valid file, break it, then fix it again.
        write_file(&path, "proxy a:1;");
        let manager = ConfigManager::load(&path).unwrap();

        write_file(&path, "this is not valid");
        manager.reload().unwrap_err();
        assert!(manager.last_error().is_some());

        write_file(&path, "proxy b:2;");
        manager.reload().unwrap();
        assert!(manager.last_error().is_none());
        assert_eq!(manager.current().config.targets[0].host, "b");
        assert_eq!(manager.reload_success(), 1);

        std::fs::remove_file(&path).ok();
    }
}
