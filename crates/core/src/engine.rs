//! One-way GitLab -> Tactical RMM sync run.
//!
//! The [`SyncEngine`] orchestrates a run:
//!
//! 1. Fetch the RMM listing, keep user-defined visible scripts, fetch bodies.
//! 2. Fetch the GitLab tree, keep blobs, fetch raw contents.
//! 3. Plan: classify every repository script as same / different / new.
//! 4. Apply updates, then creates (skipped on a dry run).
//!
//! Every run rebuilds both snapshots from scratch; nothing is cached.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::errors::{Side, SyncError};
use crate::models::{ScriptOutcome, ScriptRecord, ScriptSet, ScriptStatus, SyncReport};
use crate::normalize;
use crate::ports::{ScriptLibrary, ScriptSource};
use crate::reconcile::{self, Effect, Plan};

/// Reconciles a [`ScriptSource`] into a [`ScriptLibrary`].
pub struct SyncEngine<L, S> {
    library: L,
    source: S,
    config: SyncConfig,
}

impl<L: ScriptLibrary, S: ScriptSource> SyncEngine<L, S> {
    pub fn new(library: L, source: S, config: SyncConfig) -> Self {
        info!(
            fetch_concurrency = config.fetch_concurrency,
            dry_run = config.dry_run,
            "initializing sync engine"
        );
        Self {
            library,
            source,
            config,
        }
    }

    pub fn library(&self) -> &L {
        &self.library
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    // -----------------------------------------------------------------------
    // Main entry point
    // -----------------------------------------------------------------------

    /// Execute one full run.
    ///
    /// Fatal conditions (a listing call failing, an empty or duplicated
    /// snapshot) return `Err` before anything is written. Individual fetch or
    /// apply failures are logged and recorded in the report instead.
    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        let started_at = Utc::now().to_rfc3339();

        let remote = self.fetch_remote().await?;
        if remote.is_empty() {
            return Err(SyncError::FetchEmpty { side: Side::Remote });
        }
        let source = self.fetch_source().await?;
        let plan = reconcile::plan(&source, &remote)?;

        let mut report = SyncReport {
            dry_run: self.config.dry_run,
            source_count: source.len(),
            remote_count: remote.len(),
            unchanged: plan.count(ScriptStatus::Same),
            started_at,
            ..Default::default()
        };
        report.scripts = plan
            .results
            .iter()
            .map(|r| ScriptOutcome {
                name: r.name().to_string(),
                status: r.status(),
                applied: false,
                error: None,
            })
            .collect();
        for skipped in &plan.skipped {
            if let Some(name) = skipped.script_name() {
                report.scripts.push(ScriptOutcome {
                    name: name.to_string(),
                    status: ScriptStatus::Skipped,
                    applied: false,
                    error: Some(skipped.to_string()),
                });
            }
        }

        if self.config.dry_run {
            info!(
                pending = plan.effects().count(),
                "dry run, no changes applied"
            );
        } else {
            self.apply(&plan, &mut report).await;
        }

        report.completed_at = Some(Utc::now().to_rfc3339());
        info!(
            unchanged = report.unchanged,
            updated = report.updated,
            created = report.created,
            failed = report.failed,
            "done"
        );
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Fetching
    // -----------------------------------------------------------------------

    /// Snapshot of the RMM library, restricted to user-defined visible
    /// scripts. A script whose body cannot be fetched keeps only its name, in
    /// the set's unreadable list.
    pub async fn fetch_remote(&self) -> Result<ScriptSet, SyncError> {
        let listing = self.library.list_scripts().await?;
        let total = listing.len();
        let eligible: Vec<_> = listing
            .into_iter()
            .filter(|entry| normalize::is_syncable(entry))
            .collect();
        debug!(total, eligible = eligible.len(), "filtered RMM listing");

        let fetched: Vec<Result<ScriptRecord, String>> = stream::iter(eligible)
            .map(|entry| async move {
                match self.library.get_script_content(entry.id).await {
                    Ok(body) => Ok(normalize::from_remote(entry, body)),
                    Err(e) => {
                        warn!(script = %entry.name, id = entry.id, error = %e, "failed to fetch script content, skipping");
                        Err(entry.name)
                    }
                }
            })
            .buffered(self.concurrency())
            .collect()
            .await;

        let mut records = Vec::new();
        let mut unreadable = Vec::new();
        for item in fetched {
            match item {
                Ok(record) => records.push(record),
                Err(name) => unreadable.push(name),
            }
        }
        info!(
            count = records.len(),
            unreadable = unreadable.len(),
            "fetched RMM scripts"
        );
        Ok(ScriptSet::new(Side::Remote, records).with_unreadable(unreadable))
    }

    /// Snapshot of every blob in the repository. A file whose content cannot
    /// be fetched is left out.
    pub async fn fetch_source(&self) -> Result<ScriptSet, SyncError> {
        let tree = self.source.list_repository_tree().await?;
        let total = tree.len();
        let blobs: Vec<_> = tree.into_iter().filter(|entry| entry.is_blob()).collect();
        debug!(total, blobs = blobs.len(), "filtered repository tree");

        let fetched: Vec<Option<ScriptRecord>> = stream::iter(blobs)
            .map(|entry| async move {
                match self.source.get_raw_file(&entry.path).await {
                    Ok(content) => Some(normalize::from_source(&entry, content)),
                    Err(e) => {
                        warn!(path = %entry.path, error = %e, "failed to fetch repository file, skipping");
                        None
                    }
                }
            })
            .buffered(self.concurrency())
            .collect()
            .await;

        let records: Vec<ScriptRecord> = fetched.into_iter().flatten().collect();
        info!(count = records.len(), "fetched repository scripts");
        Ok(ScriptSet::new(Side::Source, records))
    }

    fn concurrency(&self) -> usize {
        self.config.fetch_concurrency.max(1)
    }

    // -----------------------------------------------------------------------
    // Applying
    // -----------------------------------------------------------------------

    /// Send every queued effect, one at a time. A failure is recorded and the
    /// remaining effects still run.
    async fn apply(&self, plan: &Plan, report: &mut SyncReport) {
        for effect in plan.effects() {
            let record = effect.record();
            let payload = normalize::to_payload(record, &self.config.defaults);
            let result = match effect {
                Effect::Update { id, .. } => self.library.update_script(id, &payload).await,
                Effect::Create { .. } => self.library.create_script(&payload).await,
            };

            let outcome = report.scripts.iter_mut().find(|o| o.name == record.name);
            match result {
                Ok(()) => {
                    match effect {
                        Effect::Update { .. } => report.updated += 1,
                        Effect::Create { .. } => report.created += 1,
                    }
                    if let Some(o) = outcome {
                        o.applied = true;
                    }
                }
                Err(e) => {
                    error!(script = %record.name, error = %e, "failed to apply change");
                    report.failed += 1;
                    if let Some(o) = outcome {
                        o.error = Some(e.to_string());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RmmError;
    use crate::gitlab::TreeEntry;
    use crate::ports::{MockScriptLibrary, MockScriptSource};
    use crate::rmm::RmmScript;

    fn listing(id: u64, name: &str) -> RmmScript {
        RmmScript {
            id,
            name: name.to_string(),
            script_type: "userdefined".to_string(),
            hidden: Some(false),
            shell: None,
            default_timeout: None,
            args: None,
            run_as_user: None,
            env_vars: None,
            description: None,
            supported_platforms: None,
            category: None,
        }
    }

    fn blob(path: &str) -> TreeEntry {
        TreeEntry {
            name: path.to_string(),
            path: path.to_string(),
            kind: "blob".to_string(),
        }
    }

    fn not_found() -> RmmError {
        RmmError::Status {
            status: 404,
            operation: "get_script_content".to_string(),
        }
    }

    fn no_writes(library: &mut MockScriptLibrary) {
        library.expect_create_script().never();
        library.expect_update_script().never();
    }

    #[tokio::test]
    async fn test_listing_failure_stops_before_source() {
        let mut library = MockScriptLibrary::new();
        library.expect_list_scripts().returning(|| {
            Err(RmmError::Unavailable {
                attempts: 10,
                detail: "connection refused".to_string(),
            })
        });
        no_writes(&mut library);
        let mut source = MockScriptSource::new();
        source.expect_list_repository_tree().never();

        let engine = SyncEngine::new(library, source, SyncConfig::default());
        let err = engine.run().await.unwrap_err();

        assert!(matches!(err, SyncError::RmmError(RmmError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_empty_remote_never_lists_source() {
        let mut library = MockScriptLibrary::new();
        library.expect_list_scripts().returning(|| Ok(vec![]));
        no_writes(&mut library);
        let mut source = MockScriptSource::new();
        source.expect_list_repository_tree().never();
        source.expect_get_raw_file().never();

        let engine = SyncEngine::new(library, source, SyncConfig::default());
        let err = engine.run().await.unwrap_err();

        assert!(matches!(err, SyncError::FetchEmpty { side: Side::Remote }));
    }

    #[tokio::test]
    async fn test_all_bodies_unreadable_is_empty_remote() {
        let mut library = MockScriptLibrary::new();
        library
            .expect_list_scripts()
            .returning(|| Ok(vec![listing(1, "A")]));
        library
            .expect_get_script_content()
            .returning(|_| Err(not_found()));
        no_writes(&mut library);
        let mut source = MockScriptSource::new();
        source.expect_list_repository_tree().never();

        let engine = SyncEngine::new(library, source, SyncConfig::default());
        let err = engine.run().await.unwrap_err();

        assert!(matches!(err, SyncError::FetchEmpty { side: Side::Remote }));
    }

    #[tokio::test]
    async fn test_unreadable_remote_body_is_skipped_not_created() {
        let mut library = MockScriptLibrary::new();
        library
            .expect_list_scripts()
            .returning(|| Ok(vec![listing(1, "A"), listing(2, "B")]));
        library
            .expect_get_script_content()
            .returning(|id| if id == 2 { Err(not_found()) } else { Ok("x".to_string()) });
        no_writes(&mut library);
        let mut source = MockScriptSource::new();
        source
            .expect_list_repository_tree()
            .times(1)
            .returning(|| Ok(vec![blob("A"), blob("B")]));
        source
            .expect_get_raw_file()
            .returning(|_| Ok("x".to_string()));

        let engine = SyncEngine::new(library, source, SyncConfig::default());
        let report = engine.run().await.unwrap();

        assert_eq!(report.remote_count, 1);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.created, 0);
        let b: Vec<_> = report.scripts.iter().filter(|o| o.name == "B").collect();
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].status, ScriptStatus::Skipped);
        assert!(!b[0].applied);
    }
}
