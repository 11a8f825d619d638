//! Apps Script API source
//!
//! `GET {base}/v1/projects/{scriptId}/content` with the caller's bearer token.
//! A single authenticated request; no paging, no retries.

use std::future::Future;
use std::pin::Pin;

use common::Secret;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::{ProjectContentSource, Result, ScriptFile, SourceError};

/// Production base URL of the Apps Script API
pub const APPS_SCRIPT_API: &str = "https://script.googleapis.com";

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    files: Vec<ScriptFile>,
}

/// Project source backed by the Apps Script REST API.
pub struct AppsScriptSource {
    http: reqwest::Client,
    base_url: String,
}

impl AppsScriptSource {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_base_url(http, APPS_SCRIPT_API)
    }

    /// Point the source at a different API host (tests, proxies).
    pub fn with_base_url(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn content_url(&self, project_id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            SourceError::Http(format!("invalid API base URL {}: {e}", self.base_url))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                SourceError::Http(format!("API base URL cannot be a base: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(["v1", "projects", project_id, "content"]);
        Ok(url)
    }

    async fn fetch(
        &self,
        project_id: &str,
        access_token: &Secret<String>,
    ) -> Result<Vec<ScriptFile>> {
        let url = self.content_url(project_id)?;
        debug!(%url, "fetching project content");

        let response = self
            .http
            .get(url)
            .bearer_auth(access_token.expose())
            .send()
            .await
            .map_err(|e| SourceError::Http(format!("project content request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(match status.as_u16() {
                401 => SourceError::Unauthorized(body),
                404 => SourceError::NotFound(project_id.to_owned()),
                code => SourceError::Api { status: code, body },
            });
        }

        let content = response
            .json::<ContentResponse>()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))?;
        info!(
            project_id,
            files = content.files.len(),
            "fetched project content"
        );
        Ok(content.files)
    }
}

impl ProjectContentSource for AppsScriptSource {
    fn id(&self) -> &str {
        "apps-script"
    }

    fn get<'a>(
        &'a self,
        project_id: &'a str,
        access_token: &'a Secret<String>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ScriptFile>>> + Send + 'a>> {
        Box::pin(self.fetch(project_id, access_token))
    }
}
