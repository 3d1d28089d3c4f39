//! Name matching and classification of source scripts against the RMM.
//!
//! Given the two run-scoped snapshots, [`plan`] decides for every source
//! script whether it is unchanged, changed (queue an update) or new (queue a
//! create). Remote-only scripts are never touched.

use std::collections::HashSet;

use tracing::{info, warn};
use uuid::Uuid;

use crate::diff::{differs, Mismatch};
use crate::errors::{Side, SyncError};
use crate::models::{ScriptRecord, ScriptSet, ScriptStatus};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Classification of one source script.
#[derive(Debug, Clone)]
pub enum MatchResult {
    /// Present on both sides with no drift.
    Unchanged { name: String },
    /// Present on both sides and drifted; `merged` is what gets sent.
    Changed {
        remote_id: u64,
        mismatch: Mismatch,
        merged: ScriptRecord,
    },
    /// Present only in the repository.
    New { record: ScriptRecord },
}

impl MatchResult {
    pub fn name(&self) -> &str {
        match self {
            Self::Unchanged { name } => name,
            Self::Changed { merged, .. } => &merged.name,
            Self::New { record } => &record.name,
        }
    }

    pub fn status(&self) -> ScriptStatus {
        match self {
            Self::Unchanged { .. } => ScriptStatus::Same,
            Self::Changed { .. } => ScriptStatus::Different,
            Self::New { .. } => ScriptStatus::New,
        }
    }
}

/// A write against the RMM.
#[derive(Debug, Clone, Copy)]
pub enum Effect<'a> {
    Update { id: u64, record: &'a ScriptRecord },
    Create { record: &'a ScriptRecord },
}

impl<'a> Effect<'a> {
    pub fn record(&self) -> &'a ScriptRecord {
        match self {
            Self::Update { record, .. } | Self::Create { record } => record,
        }
    }
}

/// Outcome of matching one source snapshot against one remote snapshot.
#[derive(Debug, Default)]
pub struct Plan {
    pub results: Vec<MatchResult>,
    /// Pairs that could not be resolved; logged and left out of `results`.
    pub skipped: Vec<SyncError>,
}

impl Plan {
    /// All queued writes: every update, then every create.
    pub fn effects(&self) -> impl Iterator<Item = Effect<'_>> {
        let updates = self.results.iter().filter_map(|r| match r {
            MatchResult::Changed {
                remote_id, merged, ..
            } => Some(Effect::Update {
                id: *remote_id,
                record: merged,
            }),
            _ => None,
        });
        let creates = self.results.iter().filter_map(|r| match r {
            MatchResult::New { record } => Some(Effect::Create { record }),
            _ => None,
        });
        updates.chain(creates)
    }

    pub fn count(&self, status: ScriptStatus) -> usize {
        self.results.iter().filter(|r| r.status() == status).count()
    }

    pub fn is_noop(&self) -> bool {
        self.effects().next().is_none()
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Classify every source script against the remote library.
///
/// Fails without planning anything if either snapshot is empty or contains
/// a repeated name. A source script whose remote counterpart was listed but
/// could not be read is skipped, never created.
pub fn plan(source: &ScriptSet, remote: &ScriptSet) -> Result<Plan, SyncError> {
    if remote.is_empty() {
        return Err(SyncError::FetchEmpty { side: Side::Remote });
    }
    if source.is_empty() {
        return Err(SyncError::FetchEmpty { side: Side::Source });
    }
    source.ensure_unique()?;
    remote.ensure_unique()?;

    info!(
        source_count = source.len(),
        remote_count = remote.len(),
        "reconciling scripts"
    );

    let remote_names = remote.names();
    let common: HashSet<&str> = source
        .names()
        .intersection(&remote_names)
        .copied()
        .collect();

    let mut result = Plan::default();
    for record in source.records() {
        if common.contains(record.name.as_str()) {
            match classify_pair(&record.name, source, remote) {
                Ok(m) => result.results.push(m),
                Err(e) => {
                    warn!(error = %e, "error matching script, skipping");
                    result.skipped.push(e);
                }
            }
        } else if remote.is_unreadable(&record.name) {
            let e = SyncError::Unreadable {
                side: Side::Remote,
                name: record.name.clone(),
            };
            warn!(error = %e, "remote content unknown, skipping");
            result.skipped.push(e);
        } else {
            let record = with_name(record.clone());
            info!(script = %record.name, "script is new");
            result.results.push(MatchResult::New { record });
        }
    }

    info!(
        same = result.count(ScriptStatus::Same),
        different = result.count(ScriptStatus::Different),
        new = result.count(ScriptStatus::New),
        skipped = result.skipped.len(),
        "reconciliation planned"
    );
    Ok(result)
}

fn classify_pair(
    name: &str,
    source: &ScriptSet,
    remote: &ScriptSet,
) -> Result<MatchResult, SyncError> {
    let unmatched = |side| SyncError::Unmatched {
        side,
        name: name.to_string(),
    };
    let src = source.get(name).ok_or_else(|| unmatched(Side::Source))?;
    let rem = remote.get(name).ok_or_else(|| unmatched(Side::Remote))?;
    let remote_id = rem.remote_id.ok_or_else(|| unmatched(Side::Remote))?;

    match differs(src, rem) {
        Some(mismatch) => {
            info!(script = %name, reason = %mismatch, "script is different");
            Ok(MatchResult::Changed {
                remote_id,
                mismatch,
                merged: src.merged_onto(rem),
            })
        }
        None => {
            info!(script = %name, "script is same");
            Ok(MatchResult::Unchanged {
                name: name.to_string(),
            })
        }
    }
}

/// Give a nameless record a unique placeholder so the RMM accepts it.
fn with_name(mut record: ScriptRecord) -> ScriptRecord {
    if record.name.trim().is_empty() {
        record.name = format!("unnamed script - {}", Uuid::new_v4());
        warn!(placeholder = %record.name, "source script has no name");
    }
    record
}
