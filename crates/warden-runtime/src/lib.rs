//! Host-facing runtime surface for the Warden RBAC engine.
//!
//! Wires the decision engine into the host's before-tool-call,
//! message-received, and message-sending hooks, owns the plugin lifecycle
//! (registration, hot reload, diagnostics), and defines the host logger
//! and event contracts.

pub mod host_contract;
pub mod rbac_plugin;
pub mod time_utils;

pub use host_contract::*;
pub use rbac_plugin::*;
pub use time_utils::current_unix_timestamp_ms;

#[cfg(test)]
mod tests;
