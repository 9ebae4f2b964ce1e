//! `Router`: per-cluster round-robin pointer plus random-with-health
//! selection.

use std::collections::HashMap;
use std::sync::Mutex;

use mtrelay_types::{Config, Target, TargetHealthMap};

use crate::rand_source::RandSource;
use crate::{Result, RouterError};

const DEFAULT_ATTEMPTS: usize = 5;

/// The outcome of [`Router::choose_proxy_target`].
#[derive(Debug, Clone)]
pub struct Decision {
    pub target: Target,
    pub used_default: bool,
}

struct State {
    clusters: HashMap<i16, Vec<Target>>,
    default_cluster_id: i16,
    round_robin: Mutex<HashMap<i16, usize>>,
}

/// Selects upstream targets for a cluster. Cheap to clone: swap the whole
/// instance on config reload rather than mutating one in place.
pub struct Router {
    state: State,
}

impl Router {
    pub fn new(cfg: &Config) -> Self {
        Self {
            state: build_state(cfg),
        }
    }

    /// Replace the router's view of the world. Round-robin pointers reset:
    /// there is no guarantee the old cluster shape still makes sense.
    pub fn update(&mut self, cfg: &Config) {
        self.state = build_state(cfg);
    }

    /// Round-robin pick for administrative probing. Errors if the cluster
    /// has no targets.
    pub fn select(&self, cluster_id: i16) -> Result<Target> {
        let targets = self
            .state
            .clusters
            .get(&cluster_id)
            .filter(|targets| !targets.is_empty())
            .ok_or(RouterError::ClusterAbsent(cluster_id))?;

        let mut pointers = self.state.round_robin.lock().unwrap();
        let pointer = pointers.entry(cluster_id).or_insert(0);
        let target = targets[*pointer % targets.len()].clone();
        *pointer = (*pointer + 1) % targets.len();
        Ok(target)
    }

    /// Random-with-health pick used on the data-plane's hot path. Falls back
    /// to the default cluster (with `used_default = true`) when the
    /// requested cluster has no targets, per Testable Property 5.
    pub async fn choose_proxy_target(
        &self,
        cluster_id: i16,
        attempts: Option<usize>,
        health: &TargetHealthMap,
        rand: &mut dyn RandSource,
    ) -> Result<Decision> {
        let attempts = attempts.unwrap_or(DEFAULT_ATTEMPTS).max(1);
        let (resolved_id, used_default) = self.resolve_cluster(cluster_id)?;
        let targets = self
            .state
            .clusters
            .get(&resolved_id)
            .expect("resolve_cluster only returns clusters that exist");

        for _ in 0..attempts {
            let idx = rand.intn(targets.len());
            let candidate = &targets[idx];
            if health.is_healthy(&candidate.key()).await {
                return Ok(Decision {
                    target: candidate.clone(),
                    used_default,
                });
            }
        }

        Err(RouterError::NoHealthyTargets)
    }

    /// Number of clusters currently known to the router, for the stats
    /// renderer.
    pub fn cluster_count(&self) -> usize {
        self.state.clusters.len()
    }

    /// Total target count across all clusters, for the stats renderer.
    pub fn target_count(&self) -> usize {
        self.state.clusters.values().map(|t| t.len()).sum()
    }

    pub fn default_cluster_id(&self) -> i16 {
        self.state.default_cluster_id
    }

    fn resolve_cluster(&self, cluster_id: i16) -> Result<(i16, bool)> {
        let requested_present = self
            .state
            .clusters
            .get(&cluster_id)
            .is_some_and(|targets| !targets.is_empty());
        if requested_present {
            return Ok((cluster_id, false));
        }

        let default_id = self.state.default_cluster_id;
        let default_present = self
            .state
            .clusters
            .get(&default_id)
            .is_some_and(|targets| !targets.is_empty());
        if default_present {
            return Ok((default_id, true));
        }

        Err(RouterError::ClusterAbsent(cluster_id))
    }
}

fn build_state(cfg: &Config) -> State {
    let mut clusters: HashMap<i16, Vec<Target>> = HashMap::new();
    for cluster in &cfg.clusters {
        clusters.insert(cluster.id, cluster.targets.clone());
    }
    State {
        clusters,
        default_cluster_id: cfg.default_cluster_id,
        round_robin: Mutex::new(HashMap::new()),
    }
}
