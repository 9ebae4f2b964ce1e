//! Config plus the provenance of the file it was loaded from.

use crate::config::Config;

/// Produced by a successful reload only. Carries enough provenance to print
/// the runtime's startup line and to detect no-op reloads.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub config: Config,
    pub loaded_at_unix_secs: u64,
    pub source_path: String,
    pub byte_count: u64,
    pub md5_hex: String,
}
