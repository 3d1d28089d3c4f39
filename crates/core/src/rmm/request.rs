//! Typed request builders for the Tactical RMM script endpoints.
//!
//! Each operation the sync needs is one variant; the variant alone decides
//! method, path, query and body.

use reqwest::{Client, Method, RequestBuilder, Url};

use super::client::ScriptPayload;
use crate::errors::RmmError;

#[derive(Debug, Clone, Copy)]
pub enum RmmRequest<'a> {
    ListScripts,
    ScriptContent { id: u64 },
    CreateScript { payload: &'a ScriptPayload },
    UpdateScript { id: u64, payload: &'a ScriptPayload },
}

impl<'a> RmmRequest<'a> {
    /// Short name used in logs and errors.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::ListScripts => "list_scripts",
            Self::ScriptContent { .. } => "get_script_content",
            Self::CreateScript { .. } => "create_script",
            Self::UpdateScript { .. } => "update_script",
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Self::ListScripts | Self::ScriptContent { .. } => Method::GET,
            Self::CreateScript { .. } => Method::POST,
            Self::UpdateScript { .. } => Method::PUT,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Self::ListScripts | Self::CreateScript { .. } => "/scripts/".to_string(),
            Self::ScriptContent { id } => format!("/scripts/{}/download/", id),
            Self::UpdateScript { id, .. } => format!("/scripts/{}/", id),
        }
    }

    fn query(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::ScriptContent { .. } => &[("with_snippets", "false")],
            _ => &[],
        }
    }

    pub fn payload(&self) -> Option<&'a ScriptPayload> {
        match self {
            Self::CreateScript { payload } | Self::UpdateScript { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// Resolve against a base URL that has no trailing slash.
    pub fn url(&self, base_url: &str) -> Result<Url, RmmError> {
        let raw = format!("{}{}", base_url, self.path());
        let mut url = Url::parse(&raw).map_err(|_| RmmError::InvalidUrl(raw.clone()))?;
        let query = self.query();
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }
        Ok(url)
    }

    /// A fresh builder; called once per attempt.
    pub fn builder(&self, http: &Client, url: Url) -> RequestBuilder {
        let req = http.request(self.method(), url);
        match self.payload() {
            Some(payload) => req.json(payload),
            None => req,
        }
    }
}
