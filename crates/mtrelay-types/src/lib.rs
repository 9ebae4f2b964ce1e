//! # mtrelay-types
//!
//! Shared domain types for the MTProto relay: targets, clusters, config
//! snapshots, and the target-health map. These are value types passed
//! between the config, router, data-plane, and outbound crates; none of
//! them owns any I/O.

pub mod cluster;
pub mod config;
pub mod health;
pub mod snapshot;
pub mod target;

pub use cluster::Cluster;
pub use config::Config;
pub use health::TargetHealthMap;
pub use snapshot::Snapshot;
pub use target::{Target, TargetKey};
