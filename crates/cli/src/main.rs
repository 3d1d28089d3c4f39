//! ScriptSync command-line tool.
//!
//! Runs one reconciliation pass from a GitLab repository into a Tactical RMM
//! script library and prints what happened.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use tracing::info;
use tracing_subscriber::EnvFilter;

use scriptsync_core::config::{AppConfig, ConfigOverrides};
use scriptsync_core::errors::ConfigError;
use scriptsync_core::models::{ScriptStatus, SyncReport};
use scriptsync_core::{GitLabClient, RmmClient, SyncEngine};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Push scripts from a GitLab repository into a Tactical RMM script library.
#[derive(Parser, Debug)]
#[command(
    name = "scriptsync",
    version,
    about = "Sync scripts from GitLab into Tactical RMM"
)]
struct Cli {
    /// Tactical RMM API key [env: TRMM_TOKEN]
    #[arg(short = 'k', long = "api-key", value_name = "KEY")]
    api_key: Option<String>,

    /// Tactical RMM API URL [env: TRMM_URL]
    #[arg(short = 'u', long = "rmm-url", value_name = "URL")]
    rmm_url: Option<String>,

    /// GitLab access token [env: GITLAB_TOKEN]
    #[arg(short = 't', long = "gitlab-token", value_name = "TOKEN")]
    gitlab_token: Option<String>,

    /// GitLab base URL [env: GITLAB_URL]
    #[arg(short = 'g', long = "gitlab-url", value_name = "URL")]
    gitlab_url: Option<String>,

    /// GitLab project id [env: GITLAB_PROJECT_ID]
    #[arg(short = 'p', long = "project-id", value_name = "ID")]
    project_id: Option<String>,

    /// Branch, tag or commit to read scripts from [env: GITLAB_REF]
    #[arg(long = "ref", value_name = "REF")]
    git_ref: Option<String>,

    /// Optional TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Show what would change without writing to the RMM.
    #[arg(long)]
    dry_run: bool,

    /// Print the run report as JSON instead of a table.
    #[arg(long)]
    json: bool,

    /// Number of script bodies fetched at once.
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Log filter, e.g. `debug` or `scriptsync_core=trace` (default: RUST_LOG, then info).
    #[arg(long, value_name = "FILTER")]
    log_level: Option<String>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            rmm_api_key: self.api_key.clone(),
            rmm_url: self.rmm_url.clone(),
            gitlab_token: self.gitlab_token.clone(),
            gitlab_url: self.gitlab_url.clone(),
            gitlab_project_id: self.project_id.clone(),
            git_ref: self.git_ref.clone(),
            fetch_concurrency: self.concurrency,
            dry_run: self.dry_run,
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.log_level.as_deref() {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match AppConfig::resolve(cli.config.as_deref(), cli.overrides()) {
        Ok(config) => config,
        Err(e) => {
            let err = usage_error(&e);
            let _ = err.print();
            return ExitCode::from(err.exit_code() as u8);
        }
    };

    match run(&cli, config).await {
        Ok(report) if report.has_failures() => {
            eprintln!("Error: {} change(s) could not be applied", report.failed);
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Missing or malformed settings are reported like argument errors.
fn usage_error(err: &ConfigError) -> clap::Error {
    let kind = match err {
        ConfigError::Missing { .. } => ErrorKind::MissingRequiredArgument,
        _ => ErrorKind::InvalidValue,
    };
    Cli::command().error(kind, err.to_string())
}

async fn run(cli: &Cli, config: AppConfig) -> Result<SyncReport> {
    let retry = config.sync.retry_policy();
    let rmm = RmmClient::new(&config.rmm.url, &config.rmm.api_key, retry)
        .context("failed to create RMM client")?;
    let gitlab = GitLabClient::new(
        &config.gitlab.url,
        &config.gitlab.token,
        &config.gitlab.project_id,
        &config.gitlab.git_ref,
        retry,
    )
    .context("failed to create GitLab client")?;

    info!(
        rmm = %config.rmm.url,
        gitlab = %config.gitlab.url,
        project = %config.gitlab.project_id,
        git_ref = %config.gitlab.git_ref,
        "starting sync"
    );

    let engine = SyncEngine::new(rmm, gitlab, config.sync);
    let report = engine.run().await.context("sync failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("failed to encode report")?;
        println!("{}", json);
    } else {
        print_report(&report);
    }
    Ok(report)
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_report(report: &SyncReport) {
    if !report.scripts.is_empty() {
        println!("{}", report_table(report));
    }

    println!();
    if report.dry_run {
        println!("Dry run: nothing was written.");
    }
    println!(
        "  Source scripts : {}  Remote scripts : {}",
        report.source_count, report.remote_count
    );
    println!(
        "  Unchanged : {}  Updated : {}  Created : {}  Failed : {}",
        report.unchanged, report.updated, report.created, report.failed
    );
    println!("done");
}

fn report_table(report: &SyncReport) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Script", "Status", "Result"]);

    for outcome in &report.scripts {
        let status_cell = match outcome.status {
            ScriptStatus::Same => Cell::new("same"),
            ScriptStatus::Different => Cell::new("different").fg(Color::Yellow),
            ScriptStatus::New => Cell::new("new").fg(Color::Cyan),
            ScriptStatus::Skipped => Cell::new("skipped").fg(Color::DarkGrey),
        };
        let result_cell = match (&outcome.error, outcome.applied) {
            (Some(e), _) => Cell::new(format!("✗ {}", e)).fg(Color::Red),
            (None, true) => Cell::new("✓ applied").fg(Color::Green),
            (None, false) if outcome.status == ScriptStatus::Same => Cell::new("—"),
            (None, false) => Cell::new("pending"),
        };
        table.add_row(vec![Cell::new(&outcome.name), status_cell, result_cell]);
    }
    table
}
