//! One upstream endpoint and the key that identifies it.

/// Identity of a [`Target`]: the triple that must be unique within a config
/// and that the health map and outbound pool key their state by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetKey {
    pub cluster_id: i16,
    pub host: String,
    pub port: u16,
}

/// An upstream endpoint, immutable once parsed. `min_connections` and
/// `max_connections` are the pool bounds in effect at the config directive
/// that introduced this target, not the config's current defaults.
#[derive(Debug, Clone)]
pub struct Target {
    pub cluster_id: i16,
    pub host: String,
    pub port: u16,
    pub min_connections: u32,
    pub max_connections: u32,
}

impl Target {
    pub fn key(&self) -> TargetKey {
        TargetKey {
            cluster_id: self.cluster_id,
            host: self.host.clone(),
            port: self.port,
        }
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.cluster_id == other.cluster_id && self.host == other.host && self.port == other.port
    }
}

impl Eq for Target {}
