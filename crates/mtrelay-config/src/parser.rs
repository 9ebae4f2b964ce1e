//! The backend config grammar: a small line-oriented directive language.
//!
//! Each line is stripped of anything from a `#` onward, then the remaining
//! text is split into semicolon-terminated statements. A statement's first
//! whitespace-separated token names the directive; the rest are its
//! arguments.

use mtrelay_types::{Cluster, Config, Target};

use crate::{ConfigError, Result};

const MAX_TARGETS: usize = 4096;
const MAX_CLUSTERS: usize = 1024;
const MIN_TIMEOUT_MS: u32 = 10;
const MAX_TIMEOUT_MS: u32 = 30_000;
const DEFAULT_CLUSTER_ID: i16 = 0;

struct ParseState {
    timeout_ms: u32,
    default_cluster_id: i16,
    current_min: u32,
    current_max: u32,
    have_proxy: bool,
    targets: Vec<Target>,
    clusters: Vec<Cluster>,
    last_proxy_for_id: Option<i16>,
    seen_proxy_for_ids: std::collections::HashSet<i16>,
}

impl ParseState {
    fn new() -> Self {
        Self {
            timeout_ms: 1_000,
            default_cluster_id: DEFAULT_CLUSTER_ID,
            current_min: 1,
            current_max: 1,
            have_proxy: false,
            targets: Vec::new(),
            clusters: Vec::new(),
            last_proxy_for_id: None,
            seen_proxy_for_ids: std::collections::HashSet::new(),
        }
    }

    fn cluster_mut(&mut self, id: i16) -> &mut Cluster {
        if let Some(idx) = self.clusters.iter().position(|c| c.id == id) {
            &mut self.clusters[idx]
        } else {
            self.clusters.push(Cluster::new(id));
            self.clusters.last_mut().unwrap()
        }
    }

    fn push_target(&mut self, cluster_id: i16, host: String, port: u16) -> Result<()> {
        if self.current_min > self.current_max {
            return Err(ConfigError::MinExceedsMax {
                min: self.current_min,
                max: self.current_max,
            });
        }
        let target = Target {
            cluster_id,
            host,
            port,
            min_connections: self.current_min,
            max_connections: self.current_max,
        };
        self.targets.push(target.clone());
        self.cluster_mut(cluster_id).targets.push(target);
        if self.targets.len() > MAX_TARGETS {
            return Err(ConfigError::TooManyTargets(self.targets.len()));
        }
        if self.clusters.len() > MAX_CLUSTERS {
            return Err(ConfigError::TooManyClusters(self.clusters.len()));
        }
        Ok(())
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn split_host_port(s: &str) -> Result<(String, u16)> {
    let s = s.trim();
    if let Some(rest) = s.strip_prefix('[') {
        let close = rest
            .find(']')
            .ok_or_else(|| ConfigError::InvalidHostPort(s.to_string()))?;
        let host = &rest[..close];
        let after = &rest[close + 1..];
        let port_str = after
            .strip_prefix(':')
            .ok_or_else(|| ConfigError::InvalidHostPort(s.to_string()))?;
        let port: u16 = port_str
            .parse()
            .map_err(|_| ConfigError::InvalidHostPort(s.to_string()))?;
        if host.is_empty() {
            return Err(ConfigError::InvalidHostPort(s.to_string()));
        }
        Ok((host.to_string(), port))
    } else {
        let idx = s
            .rfind(':')
            .ok_or_else(|| ConfigError::InvalidHostPort(s.to_string()))?;
        let host = &s[..idx];
        let port_str = &s[idx + 1..];
        let port: u16 = port_str
            .parse()
            .map_err(|_| ConfigError::InvalidHostPort(s.to_string()))?;
        if host.is_empty() {
            return Err(ConfigError::InvalidHostPort(s.to_string()));
        }
        Ok((host.to_string(), port))
    }
}

fn parse_u32_arg(name: &'static str, raw: Option<&str>) -> Result<u32> {
    let raw = raw.ok_or(ConfigError::MissingArgument(name))?;
    raw.parse::<u32>()
        .map_err(|_| ConfigError::InvalidInteger(name, raw.to_string()))
}

fn parse_i16_arg(name: &'static str, raw: Option<&str>) -> Result<i16> {
    let raw = raw.ok_or(ConfigError::MissingArgument(name))?;
    raw.parse::<i16>()
        .map_err(|_| ConfigError::InvalidInteger(name, raw.to_string()))
}

fn apply_statement(state: &mut ParseState, statement: &str) -> Result<()> {
    let mut tokens = statement.split_whitespace();
    let Some(directive) = tokens.next() else {
        return Ok(());
    };

    match directive {
        "timeout" => {
            let ms = parse_u32_arg("timeout", tokens.next())?;
            if ms < MIN_TIMEOUT_MS || ms > MAX_TIMEOUT_MS {
                return Err(ConfigError::TimeoutOutOfRange(ms));
            }
            state.timeout_ms = ms;
        }
        "min_connections" => {
            state.current_min = parse_u32_arg("min_connections", tokens.next())?;
            if state.current_min > state.current_max {
                return Err(ConfigError::MinExceedsMax {
                    min: state.current_min,
                    max: state.current_max,
                });
            }
        }
        "max_connections" => {
            state.current_max = parse_u32_arg("max_connections", tokens.next())?;
            if state.current_min > state.current_max {
                return Err(ConfigError::MinExceedsMax {
                    min: state.current_min,
                    max: state.current_max,
                });
            }
        }
        "default" => {
            state.default_cluster_id = parse_i16_arg("default", tokens.next())?;
        }
        "proxy" => {
            let raw = tokens.next().ok_or(ConfigError::MissingArgument("proxy"))?;
            let (host, port) = split_host_port(raw)?;
            state.have_proxy = true;
            state.push_target(0, host, port)?;
        }
        "proxy_for" => {
            let id = parse_i16_arg("proxy_for", tokens.next())?;
            let raw = tokens
                .next()
                .ok_or(ConfigError::MissingArgument("proxy_for"))?;
            let (host, port) = split_host_port(raw)?;

            if state.last_proxy_for_id != Some(id) && state.seen_proxy_for_ids.contains(&id) {
                return Err(ConfigError::IntermixedClusterGroup(id));
            }
            state.seen_proxy_for_ids.insert(id);
            state.last_proxy_for_id = Some(id);

            state.have_proxy = true;
            state.push_target(id, host, port)?;
        }
        other => return Err(ConfigError::UnknownDirective(other.to_string())),
    }

    Ok(())
}

/// Parse the backend config grammar from `text`, returning a fully validated
/// [`Config`] or the first rejection encountered.
pub fn parse(text: &str) -> Result<Config> {
    let mut stripped = String::new();
    for line in text.lines() {
        stripped.push_str(strip_comment(line));
        stripped.push(' ');
    }

    let mut state = ParseState::new();
    let mut rest = stripped.as_str();
    loop {
        let trimmed = rest.trim_start();
        if trimmed.is_empty() {
            break;
        }
        match trimmed.find(';') {
            Some(idx) => {
                let statement = trimmed[..idx].trim();
                if !statement.is_empty() {
                    apply_statement(&mut state, statement)?;
                }
                rest = &trimmed[idx + 1..];
            }
            None => {
                if !trimmed.trim().is_empty() {
                    return Err(ConfigError::MissingSemicolon);
                }
                break;
            }
        }
    }

    if !state.have_proxy {
        return Err(ConfigError::NoProxyDirective);
    }

    Ok(Config {
        default_min_connections: 1,
        default_max_connections: 1,
        timeout_ms: state.timeout_ms,
        default_cluster_id: state.default_cluster_id,
        have_proxy: state.have_proxy,
        targets: state.targets,
        clusters: state.clusters,
    })
}
