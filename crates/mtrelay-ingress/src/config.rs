//! Ingress-side configuration: idle deadline and configured obfuscation
//! secrets.

use std::time::Duration;

const DEFAULT_IDLE_TIMEOUT_MS: u64 = 90_000;

#[derive(Debug, Clone)]
pub struct IngressConfig {
    pub idle_timeout: Duration,
    pub default_target_dc: i16,
    /// 16-byte obfuscated2 secrets, tried in order. Empty means "no
    /// secrets configured" (unhashed derivation, per §4.10).
    pub secrets: Vec<Vec<u8>>,
    pub accept_rate_limit: i64,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_millis(DEFAULT_IDLE_TIMEOUT_MS),
            default_target_dc: 0,
            secrets: Vec::new(),
            accept_rate_limit: 0,
        }
    }
}
