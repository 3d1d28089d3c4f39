//! Configuration for a ScriptSync run.
//!
//! Values are layered: an optional TOML file, then the well-known
//! environment variables, then explicit command-line overrides. The result
//! is validated once and handed to the clients by value; nothing is global.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;
use crate::retry::{RetryPolicy, DEFAULT_ATTEMPTS};

pub const ENV_RMM_TOKEN: &str = "TRMM_TOKEN";
pub const ENV_RMM_URL: &str = "TRMM_URL";
pub const ENV_GITLAB_TOKEN: &str = "GITLAB_TOKEN";
pub const ENV_GITLAB_URL: &str = "GITLAB_URL";
pub const ENV_GITLAB_PROJECT_ID: &str = "GITLAB_PROJECT_ID";
pub const ENV_GITLAB_REF: &str = "GITLAB_REF";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Tactical RMM API settings.
    #[serde(default)]
    pub rmm: RmmConfig,

    /// GitLab repository settings.
    #[serde(default)]
    pub gitlab: GitLabConfig,

    /// Sync behaviour settings.
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Tactical RMM connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RmmConfig {
    /// API base URL (e.g. `https://api.rmm.example.com`).
    #[serde(default)]
    pub url: String,

    /// API key sent as `X-API-KEY`.
    #[serde(default)]
    pub api_key: String,
}

/// GitLab connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabConfig {
    /// Instance base URL (e.g. `https://gitlab.example.com`).
    #[serde(default)]
    pub url: String,

    /// Personal or project access token sent as `PRIVATE-TOKEN`.
    #[serde(default)]
    pub token: String,

    /// Numeric id or `namespace/project` path.
    #[serde(default)]
    pub project_id: String,

    /// Branch, tag or commit to read scripts from.
    #[serde(default = "default_git_ref")]
    pub git_ref: String,
}

fn default_git_ref() -> String {
    "main".into()
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            project_id: String::new(),
            git_ref: default_git_ref(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sync behaviour
// ---------------------------------------------------------------------------

/// Values used for payload fields a new script does not define.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDefaults {
    /// Shell when the file extension does not imply one.
    #[serde(default = "default_shell")]
    pub shell: String,

    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_platforms")]
    pub platforms: Vec<String>,

    #[serde(default)]
    pub run_as_user: bool,
}

fn default_shell() -> String {
    "powershell".into()
}
fn default_timeout() -> u64 {
    90
}
fn default_platforms() -> Vec<String> {
    vec!["windows".into()]
}

impl Default for CreateDefaults {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            timeout: default_timeout(),
            platforms: default_platforms(),
            run_as_user: false,
        }
    }
}

/// Sync behaviour configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Attempts per HTTP call on connection failure.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Fixed pause between attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Script bodies fetched concurrently (1 = strictly sequential).
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,

    /// Compute and report the plan without applying it.
    #[serde(default)]
    pub dry_run: bool,

    #[serde(default)]
    pub defaults: CreateDefaults,
}

fn default_retry_attempts() -> u32 {
    DEFAULT_ATTEMPTS
}
fn default_retry_delay_ms() -> u64 {
    500
}
fn default_fetch_concurrency() -> usize {
    1
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            fetch_concurrency: default_fetch_concurrency(),
            dry_run: false,
            defaults: CreateDefaults::default(),
        }
    }
}

impl SyncConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

/// Values given explicitly on the command line. They win over everything.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub rmm_api_key: Option<String>,
    pub rmm_url: Option<String>,
    pub gitlab_token: Option<String>,
    pub gitlab_url: Option<String>,
    pub gitlab_project_id: Option<String>,
    pub git_ref: Option<String>,
    pub fetch_concurrency: Option<usize>,
    pub dry_run: bool,
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Overlay the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Overlay values from `lookup`; unset or empty variables are ignored.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| {
            let value = lookup(name).filter(|v| !v.trim().is_empty());
            if value.is_some() {
                debug!(env_name = name, "resolved env var");
            }
            value
        };
        if let Some(v) = get(ENV_RMM_TOKEN) {
            self.rmm.api_key = v;
        }
        if let Some(v) = get(ENV_RMM_URL) {
            self.rmm.url = v;
        }
        if let Some(v) = get(ENV_GITLAB_TOKEN) {
            self.gitlab.token = v;
        }
        if let Some(v) = get(ENV_GITLAB_URL) {
            self.gitlab.url = v;
        }
        if let Some(v) = get(ENV_GITLAB_PROJECT_ID) {
            self.gitlab.project_id = v;
        }
        if let Some(v) = get(ENV_GITLAB_REF) {
            self.gitlab.git_ref = v;
        }
    }

    /// Overlay explicit command-line values.
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(v) = overrides.rmm_api_key {
            self.rmm.api_key = v;
        }
        if let Some(v) = overrides.rmm_url {
            self.rmm.url = v;
        }
        if let Some(v) = overrides.gitlab_token {
            self.gitlab.token = v;
        }
        if let Some(v) = overrides.gitlab_url {
            self.gitlab.url = v;
        }
        if let Some(v) = overrides.gitlab_project_id {
            self.gitlab.project_id = v;
        }
        if let Some(v) = overrides.git_ref {
            self.gitlab.git_ref = v;
        }
        if let Some(n) = overrides.fetch_concurrency {
            self.sync.fetch_concurrency = n;
        }
        if overrides.dry_run {
            self.sync.dry_run = true;
        }
    }

    /// Trim whitespace and trailing slashes off URLs.
    fn normalize(&mut self) {
        self.rmm.url = self.rmm.url.trim().trim_end_matches('/').to_string();
        self.gitlab.url = self.gitlab.url.trim().trim_end_matches('/').to_string();
        self.gitlab.project_id = self.gitlab.project_id.trim().to_string();
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(&self.rmm.api_key, "rmm.api_key", "-k", ENV_RMM_TOKEN)?;
        require(&self.rmm.url, "rmm.url", "-u", ENV_RMM_URL)?;
        require(&self.gitlab.token, "gitlab.token", "-t", ENV_GITLAB_TOKEN)?;
        require(&self.gitlab.url, "gitlab.url", "-g", ENV_GITLAB_URL)?;
        require(
            &self.gitlab.project_id,
            "gitlab.project_id",
            "-p",
            ENV_GITLAB_PROJECT_ID,
        )?;

        check_http_url(&self.rmm.url, "rmm.url")?;
        check_http_url(&self.gitlab.url, "gitlab.url")?;

        if self.gitlab.git_ref.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "gitlab.git_ref".into(),
                detail: "ref must not be empty".into(),
            });
        }
        if self.sync.retry_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sync.retry_attempts".into(),
                detail: "at least one attempt is required".into(),
            });
        }
        if self.sync.fetch_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sync.fetch_concurrency".into(),
                detail: "concurrency must be > 0".into(),
            });
        }
        Ok(())
    }

    /// Convenience: load (if a file is given), layer env and overrides, and
    /// validate in one call.
    pub fn resolve(file: Option<&Path>, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let mut config = match file {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.apply_overrides(overrides);
        config.normalize();
        config.validate()?;
        Ok(config)
    }
}

fn require(value: &str, field: &str, flag: &str, env: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Missing {
            field: field.into(),
            flag: flag.into(),
            env: env.into(),
        });
    }
    Ok(())
}

fn check_http_url(value: &str, field: &str) -> Result<(), ConfigError> {
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(ConfigError::InvalidValue {
            field: field.into(),
            detail: format!("'{}' is not an http(s) URL", value),
        });
    }
    Ok(())
}
