//! scriptsync core library.
//!
//! This crate provides the building blocks for one-way reconciliation of a
//! GitLab repository into a Tactical RMM script library: configuration,
//! backend clients, record normalization, drift detection, planning, and the
//! sync engine that ties them together.

pub mod config;
pub mod diff;
pub mod engine;
pub mod errors;
pub mod gitlab;
pub mod models;
pub mod normalize;
pub mod ports;
pub mod reconcile;
pub mod retry;
pub mod rmm;

#[cfg(test)]
mod test_support;

// Re-exports for convenience.
pub use config::AppConfig;
pub use engine::SyncEngine;
pub use gitlab::GitLabClient;
pub use models::{ScriptRecord, ScriptSet, SyncReport};
pub use ports::{ScriptLibrary, ScriptSource};
pub use rmm::RmmClient;
