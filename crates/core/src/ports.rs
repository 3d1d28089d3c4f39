//! Backend seams used by the sync engine.
//!
//! The engine only talks to these traits, so tests can drive it with
//! in-memory fakes instead of live servers.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::errors::{GitLabError, RmmError};
use crate::gitlab::{GitLabClient, TreeEntry};
use crate::rmm::{RmmClient, RmmScript, ScriptPayload};

/// The RMM script library being reconciled.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ScriptLibrary: Send + Sync {
    async fn list_scripts(&self) -> Result<Vec<RmmScript>, RmmError>;
    async fn get_script_content(&self, id: u64) -> Result<String, RmmError>;
    async fn create_script(&self, payload: &ScriptPayload) -> Result<(), RmmError>;
    async fn update_script(&self, id: u64, payload: &ScriptPayload) -> Result<(), RmmError>;
}

#[async_trait]
impl ScriptLibrary for RmmClient {
    async fn list_scripts(&self) -> Result<Vec<RmmScript>, RmmError> {
        self.list_scripts().await
    }

    async fn get_script_content(&self, id: u64) -> Result<String, RmmError> {
        self.get_script_content(id).await
    }

    async fn create_script(&self, payload: &ScriptPayload) -> Result<(), RmmError> {
        self.create_script(payload).await
    }

    async fn update_script(&self, id: u64, payload: &ScriptPayload) -> Result<(), RmmError> {
        self.update_script(id, payload).await
    }
}

/// The repository holding the source of truth.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ScriptSource: Send + Sync {
    async fn list_repository_tree(&self) -> Result<Vec<TreeEntry>, GitLabError>;
    async fn get_raw_file(&self, path: &str) -> Result<String, GitLabError>;
}

#[async_trait]
impl ScriptSource for GitLabClient {
    async fn list_repository_tree(&self) -> Result<Vec<TreeEntry>, GitLabError> {
        self.list_repository_tree().await
    }

    async fn get_raw_file(&self, path: &str) -> Result<String, GitLabError> {
        self.get_raw_file(path).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::retry::RetryPolicy;

    #[tokio::test]
    async fn test_impls_forward_errors() {
        let retry = RetryPolicy {
            attempts: 1,
            delay: Duration::ZERO,
        };
        let rmm = RmmClient::new("http://127.0.0.1:1", "key", retry).unwrap();
        let library: &dyn ScriptLibrary = &rmm;
        assert!(library.list_scripts().await.is_err());

        let gitlab = GitLabClient::new("http://127.0.0.1:1", "token", "1", "main", retry).unwrap();
        let source: &dyn ScriptSource = &gitlab;
        assert!(source.list_repository_tree().await.is_err());
    }
}
