//! Mapping between backend-native script shapes and [`ScriptRecord`].
//!
//! Inbound: RMM listing entries and GitLab tree entries become records.
//! Outbound: records become the JSON payload the RMM accepts on create and
//! update.

use crate::config::CreateDefaults;
use crate::gitlab::TreeEntry;
use crate::models::{ScriptMetadata, ScriptRecord};
use crate::rmm::{RmmScript, ScriptPayload};

/// Only user-defined scripts explicitly marked as not hidden are managed.
/// Built-in scripts and entries without a `hidden` flag are left alone.
pub fn is_syncable(entry: &RmmScript) -> bool {
    entry.script_type == "userdefined" && entry.hidden == Some(false)
}

/// Build a record from a listing entry and its separately fetched body.
pub fn from_remote(entry: RmmScript, body: String) -> ScriptRecord {
    let metadata = ScriptMetadata {
        shell: entry.shell,
        run_as_user: entry.run_as_user,
        default_timeout: entry.default_timeout,
        args: entry.args,
        env_vars: entry.env_vars,
        description: entry.description,
        supported_platforms: entry.supported_platforms,
        category: entry.category,
    };
    ScriptRecord::new(entry.name, body)
        .with_metadata(metadata)
        .with_remote_id(entry.id)
}

/// Build a record from a blob entry and its raw content. The record is named
/// after the file name; repository files carry no metadata of their own.
pub fn from_source(entry: &TreeEntry, content: String) -> ScriptRecord {
    ScriptRecord::new(entry.name.clone(), content).with_path(entry.path.clone())
}

/// Shell implied by a file extension, if any.
pub fn infer_shell(path: &str) -> Option<&'static str> {
    let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "ps1" | "psm1" => Some("powershell"),
        "py" => Some("python"),
        "sh" | "bash" => Some("shell"),
        "bat" | "cmd" => Some("cmd"),
        "nu" => Some("nushell"),
        "ts" | "deno" => Some("deno"),
        _ => None,
    }
}

/// Wire payload for a record. Fields the record leaves undefined are filled
/// from `defaults`; the shell is inferred from the file name first.
pub fn to_payload(record: &ScriptRecord, defaults: &CreateDefaults) -> ScriptPayload {
    let meta = &record.metadata;
    let shell = meta.shell.clone().unwrap_or_else(|| {
        let file = record.path.as_deref().unwrap_or(&record.name);
        infer_shell(file)
            .map(str::to_string)
            .unwrap_or_else(|| defaults.shell.clone())
    });
    ScriptPayload {
        name: record.name.clone(),
        shell,
        default_timeout: meta.default_timeout.unwrap_or(defaults.timeout),
        args: meta.args.clone().unwrap_or_default(),
        script_body: record.body().to_string(),
        run_as_user: meta.run_as_user.unwrap_or(defaults.run_as_user),
        env_vars: meta.env_vars.clone().unwrap_or_default(),
        description: meta.description.clone().unwrap_or_default(),
        supported_platforms: meta
            .supported_platforms
            .clone()
            .unwrap_or_else(|| defaults.platforms.clone()),
        category: meta.category.clone(),
    }
}
