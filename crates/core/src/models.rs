//! Domain model types used throughout ScriptSync.
//!
//! These types bridge the two backend clients, the reconciler, and the
//! report rendered by the CLI.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{Side, SyncError};

/// Hex SHA-256 digest of a script body. Used identically for both sides.
pub fn content_hash(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Script record
// ---------------------------------------------------------------------------

/// Script metadata carried through unchanged. `None` means the side that
/// produced the record does not define the field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptMetadata {
    pub shell: Option<String>,
    pub run_as_user: Option<bool>,
    pub default_timeout: Option<u64>,
    pub args: Option<Vec<String>>,
    pub env_vars: Option<Vec<String>>,
    pub description: Option<String>,
    pub supported_platforms: Option<Vec<String>>,
    pub category: Option<String>,
}

impl ScriptMetadata {
    /// Start from `self` and overwrite every field `over` defines.
    pub fn overlay(&self, over: &ScriptMetadata) -> ScriptMetadata {
        ScriptMetadata {
            shell: over.shell.clone().or_else(|| self.shell.clone()),
            run_as_user: over.run_as_user.or(self.run_as_user),
            default_timeout: over.default_timeout.or(self.default_timeout),
            args: over.args.clone().or_else(|| self.args.clone()),
            env_vars: over.env_vars.clone().or_else(|| self.env_vars.clone()),
            description: over.description.clone().or_else(|| self.description.clone()),
            supported_platforms: over
                .supported_platforms
                .clone()
                .or_else(|| self.supported_platforms.clone()),
            category: over.category.clone().or_else(|| self.category.clone()),
        }
    }
}

/// Normalized, comparable representation of one script.
///
/// The body is private so that `content_hash` can only ever be derived from
/// it: there is no way to construct a record with a hash supplied by a
/// backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRecord {
    pub name: String,
    body: String,
    content_hash: String,
    pub metadata: ScriptMetadata,
    /// Set only for records that already exist in the RMM library.
    pub remote_id: Option<u64>,
    /// Repository path, for records read from GitLab.
    pub path: Option<String>,
}

impl ScriptRecord {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        let body = body.into();
        let content_hash = content_hash(&body);
        Self {
            name: name.into(),
            body,
            content_hash,
            metadata: ScriptMetadata::default(),
            remote_id: None,
            path: None,
        }
    }

    pub fn with_metadata(mut self, metadata: ScriptMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_remote_id(mut self, id: u64) -> Self {
        self.remote_id = Some(id);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Replace the body, recomputing the hash.
    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = body.into();
        self.content_hash = content_hash(&self.body);
    }

    /// Build the record an update should send: `remote` with every field
    /// defined by `self` written over it. The remote id is kept.
    pub fn merged_onto(&self, remote: &ScriptRecord) -> ScriptRecord {
        let mut merged = remote.clone();
        merged.name = self.name.clone();
        merged.set_body(self.body.clone());
        merged.metadata = remote.metadata.overlay(&self.metadata);
        if self.path.is_some() {
            merged.path = self.path.clone();
        }
        merged
    }
}

// ---------------------------------------------------------------------------
// Script sets
// ---------------------------------------------------------------------------

/// Run-scoped snapshot of the scripts on one side.
#[derive(Debug, Clone)]
pub struct ScriptSet {
    side: Side,
    records: Vec<ScriptRecord>,
    /// Names that were listed but whose content could not be fetched.
    unreadable: Vec<String>,
}

impl ScriptSet {
    pub fn new(side: Side, records: Vec<ScriptRecord>) -> Self {
        Self {
            side,
            records,
            unreadable: Vec::new(),
        }
    }

    pub fn with_unreadable(mut self, names: Vec<String>) -> Self {
        self.unreadable = names;
        self
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn records(&self) -> &[ScriptRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Exact, case-sensitive lookup.
    pub fn get(&self, name: &str) -> Option<&ScriptRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    pub fn names(&self) -> HashSet<&str> {
        self.records.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn unreadable(&self) -> &[String] {
        &self.unreadable
    }

    /// True if `name` exists on this side but its content is unknown.
    pub fn is_unreadable(&self, name: &str) -> bool {
        self.unreadable.iter().any(|n| n == name)
    }

    /// Reject sets where a name repeats, counting unreadable entries too.
    pub fn ensure_unique(&self) -> Result<(), SyncError> {
        let mut seen = HashSet::new();
        let names = self
            .records
            .iter()
            .map(|r| r.name.as_str())
            .chain(self.unreadable.iter().map(String::as_str));
        for name in names {
            if !seen.insert(name) {
                return Err(SyncError::DuplicateName {
                    side: self.side,
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

/// Per-script classification as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptStatus {
    Same,
    Different,
    New,
    Skipped,
}

impl std::fmt::Display for ScriptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Same => write!(f, "same"),
            Self::Different => write!(f, "different"),
            Self::New => write!(f, "new"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Outcome line for one script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptOutcome {
    pub name: String,
    pub status: ScriptStatus,
    /// Whether the queued effect reached the RMM successfully.
    pub applied: bool,
    pub error: Option<String>,
}

/// Statistics and outcomes from a single sync run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub dry_run: bool,
    pub source_count: usize,
    pub remote_count: usize,
    pub unchanged: usize,
    pub updated: usize,
    pub created: usize,
    pub failed: usize,
    pub scripts: Vec<ScriptOutcome>,
    pub started_at: String,
    pub completed_at: Option<String>,
}

impl SyncReport {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}
