//! The daemon binary's supporting modules, exposed as a library so the
//! integration-tests crate can drive a full `Runtime` in-process.

pub mod cli;
pub mod daemon_config;
pub mod forwarder;
pub mod runtime;
pub mod stats_server;
pub mod supervisor;

pub use cli::Cli;
pub use daemon_config::DaemonConfig;
pub use runtime::{LogReopener, Runtime};
