//! Field-by-field comparison of a source record against a remote record.
//!
//! The walk covers only what the source defines, so fields the RMM adds on
//! its own (category, timeouts set in the UI, ...) never register as drift
//! unless the repository also says something about them.

use std::fmt::Debug;

use serde::Serialize;
use tracing::debug;

use crate::models::ScriptRecord;

/// Fields of [`ScriptRecord`] in comparison order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptField {
    Name,
    Body,
    Shell,
    RunAsUser,
    DefaultTimeout,
    Args,
    EnvVars,
    Description,
    SupportedPlatforms,
    Category,
}

impl std::fmt::Display for ScriptField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name => write!(f, "name"),
            Self::Body => write!(f, "script_body"),
            Self::Shell => write!(f, "shell"),
            Self::RunAsUser => write!(f, "run_as_user"),
            Self::DefaultTimeout => write!(f, "default_timeout"),
            Self::Args => write!(f, "args"),
            Self::EnvVars => write!(f, "env_vars"),
            Self::Description => write!(f, "description"),
            Self::SupportedPlatforms => write!(f, "supported_platforms"),
            Self::Category => write!(f, "category"),
        }
    }
}

/// The first difference found between two records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mismatch {
    /// Content hashes disagree; nothing else was compared.
    Hash { source: String, remote: String },
    /// The source defines a field the remote record lacks.
    Missing { field: ScriptField },
    /// Both define the field with different values.
    Value {
        field: ScriptField,
        source: String,
        remote: String,
    },
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hash { .. } => write!(f, "hash mismatch"),
            Self::Missing { field } => write!(f, "{} missing on remote", field),
            Self::Value {
                field,
                source,
                remote,
            } => write!(f, "{} differs [{}] [{}]", field, source, remote),
        }
    }
}

/// Compare `source` against `remote`. `None` means no drift.
///
/// Short-circuits on the first mismatch: a hash difference first, then the
/// source-defined fields in [`ScriptField`] order.
pub fn differs(source: &ScriptRecord, remote: &ScriptRecord) -> Option<Mismatch> {
    if source.content_hash() != remote.content_hash() {
        debug!(name = %source.name, "hash mismatch");
        return Some(Mismatch::Hash {
            source: source.content_hash().to_string(),
            remote: remote.content_hash().to_string(),
        });
    }

    let s = &source.metadata;
    let r = &remote.metadata;
    let mismatch = compare(ScriptField::Name, Some(&source.name), Some(&remote.name))
        .or_else(|| compare(ScriptField::Body, Some(source.body()), Some(remote.body())))
        .or_else(|| compare(ScriptField::Shell, s.shell.as_ref(), r.shell.as_ref()))
        .or_else(|| compare(ScriptField::RunAsUser, s.run_as_user.as_ref(), r.run_as_user.as_ref()))
        .or_else(|| {
            compare(
                ScriptField::DefaultTimeout,
                s.default_timeout.as_ref(),
                r.default_timeout.as_ref(),
            )
        })
        .or_else(|| compare(ScriptField::Args, s.args.as_ref(), r.args.as_ref()))
        .or_else(|| compare(ScriptField::EnvVars, s.env_vars.as_ref(), r.env_vars.as_ref()))
        .or_else(|| {
            compare(
                ScriptField::Description,
                s.description.as_ref(),
                r.description.as_ref(),
            )
        })
        .or_else(|| {
            compare(
                ScriptField::SupportedPlatforms,
                s.supported_platforms.as_ref(),
                r.supported_platforms.as_ref(),
            )
        })
        .or_else(|| compare(ScriptField::Category, s.category.as_ref(), r.category.as_ref()));

    if let Some(ref m) = mismatch {
        debug!(name = %source.name, mismatch = %m, "property mismatch");
    }
    mismatch
}

/// Sequences compare as whole values.
fn compare<T: PartialEq + Debug + ?Sized>(
    field: ScriptField,
    source: Option<&T>,
    remote: Option<&T>,
) -> Option<Mismatch> {
    let source = source?;
    match remote {
        None => Some(Mismatch::Missing { field }),
        Some(remote) if remote != source => Some(Mismatch::Value {
            field,
            source: format!("{:?}", source),
            remote: format!("{:?}", remote),
        }),
        Some(_) => None,
    }
}
