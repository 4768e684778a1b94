//! Minion - local service lifecycle daemon.
//!
//! Services are independently built executables answering a fixed set of
//! subcommands. The daemon installs and removes them, forwards lifecycle
//! calls over JSON-RPC and publishes their stats as server-sent events.

pub mod config;
pub mod daemon;
pub mod logging;
pub mod validation;

pub use config::DaemonConfig;
