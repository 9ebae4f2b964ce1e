//! Target-health map: `(cluster-id, host, port) → healthy?`.
//!
//! Defaults to healthy on first observation. [`TargetHealthMap::reconcile`]
//! is how the runtime applies a freshly loaded config: targets that vanished
//! are dropped, new targets start healthy, and targets that persisted keep
//! whatever health value they already had.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::target::{Target, TargetKey};

/// Shared, cloneable handle to the health map. Cloning shares the same
/// underlying table (it wraps an `Arc`), mirroring the way the runtime hands
/// the same state out to the router, data-plane and outbound pool.
#[derive(Clone)]
pub struct TargetHealthMap {
    inner: Arc<RwLock<HashMap<TargetKey, bool>>>,
}

impl TargetHealthMap {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Healthy unless explicitly marked otherwise; an unseen key is
    /// healthy by definition.
    pub async fn is_healthy(&self, key: &TargetKey) -> bool {
        self.inner.read().await.get(key).copied().unwrap_or(true)
    }

    pub async fn mark_healthy(&self, key: &TargetKey) {
        self.inner.write().await.insert(key.clone(), true);
    }

    pub async fn mark_unhealthy(&self, key: &TargetKey) {
        self.inner.write().await.insert(key.clone(), false);
    }

    /// Reconcile against the targets of a freshly applied config.
    pub async fn reconcile(&self, targets: &[Target]) {
        let mut guard = self.inner.write().await;
        let mut next = HashMap::with_capacity(targets.len());
        for target in targets {
            let key = target.key();
            let healthy = guard.get(&key).copied().unwrap_or(true);
            next.insert(key, healthy);
        }
        *guard = next;
    }

    /// Snapshot of the current table, for the stats renderer.
    pub async fn snapshot(&self) -> HashMap<TargetKey, bool> {
        self.inner.read().await.clone()
    }
}

impl Default for TargetHealthMap {
    fn default() -> Self {
        Self::new()
    }
}
