//! Error types for the ScriptSync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Rmm(#[from] RmmError),

    #[error(transparent)]
    GitLab(#[from] GitLabError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Tactical RMM errors
// ---------------------------------------------------------------------------

/// Errors from the Tactical RMM script API.
#[derive(Debug, Error)]
pub enum RmmError {
    /// Every attempt failed at the connection or TLS level.
    #[error("RMM unavailable after {attempts} attempts: {detail}")]
    Unavailable { attempts: u32, detail: String },

    /// The API answered with a non-success status. Never retried.
    #[error("RMM API error (HTTP {status}) on {operation}")]
    Status { status: u16, operation: String },

    /// Any other transport failure (body read, redirect loop, ...).
    #[error("RMM HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The response body did not match the expected shape.
    #[error("RMM response parse error: {0}")]
    ParseError(String),

    /// The configured base URL or a derived URL is malformed.
    #[error("invalid RMM URL '{0}'")]
    InvalidUrl(String),

    /// The API key cannot be sent as a header value.
    #[error("invalid RMM API key: {0}")]
    InvalidApiKey(String),
}

// ---------------------------------------------------------------------------
// GitLab errors
// ---------------------------------------------------------------------------

/// Errors from the GitLab repository API.
#[derive(Debug, Error)]
pub enum GitLabError {
    /// Every attempt failed at the connection or TLS level.
    #[error("GitLab unavailable after {attempts} attempts: {detail}")]
    Unavailable { attempts: u32, detail: String },

    /// The API answered with a non-success status.
    #[error("GitLab API error (HTTP {status}) on {operation}")]
    Status { status: u16, operation: String },

    /// Token rejected.
    #[error("GitLab authentication failed: {0}")]
    AuthenticationFailed(String),

    /// HTTP-level transport error.
    #[error("GitLab HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// JSON deserialization failure.
    #[error("GitLab response parse error: {0}")]
    ParseError(String),

    /// The configured base URL or a derived URL is malformed.
    #[error("invalid GitLab URL '{0}'")]
    InvalidUrl(String),

    /// The token cannot be sent as a header value.
    #[error("invalid GitLab token: {0}")]
    InvalidToken(String),
}

// ---------------------------------------------------------------------------
// Sync errors
// ---------------------------------------------------------------------------

/// Which backend a record set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Source,
    Remote,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// Errors from the reconciliation run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A backend produced zero usable scripts. Fatal: nothing is applied.
    #[error("no scripts retrieved from {side}")]
    FetchEmpty { side: Side },

    /// The same script name appears twice on one side. Fatal.
    #[error("duplicate script name '{name}' in {side} set")]
    DuplicateName { side: Side, name: String },

    /// A name classified as common could not be resolved on one side.
    #[error("script '{name}' could not be matched on the {side} side")]
    Unmatched { side: Side, name: String },

    /// The script is listed on one side but its content could not be fetched,
    /// so it can be neither compared nor safely created.
    #[error("script '{name}' exists on the {side} side but its content could not be fetched")]
    Unreadable { side: Side, name: String },

    /// The RMM script listing could not be retrieved.
    #[error("sync RMM error: {0}")]
    RmmError(#[from] RmmError),

    /// The repository tree could not be listed.
    #[error("sync GitLab error: {0}")]
    GitLabError(#[from] GitLabError),
}

impl SyncError {
    /// The script a per-item error refers to, if any.
    pub fn script_name(&self) -> Option<&str> {
        match self {
            Self::Unmatched { name, .. } | Self::Unreadable { name, .. } => Some(name),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A required value was supplied neither by flag, environment nor file.
    #[error("missing required setting '{field}' (flag {flag} or environment variable {env})")]
    Missing {
        field: String,
        flag: String,
        env: String,
    },

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
