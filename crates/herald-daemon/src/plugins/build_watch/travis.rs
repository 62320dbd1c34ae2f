//! Travis CI API v3 client

use super::http::{build_client, check_status, parse_json, read_json, request_error};
use super::provider::CiClient;
use super::types::{BuildRecord, BuildState};
use crate::plugin::PluginError;
use serde::Deserialize;
use tracing::{debug, warn};

const API_VERSION: &str = "3";

#[derive(Debug, Deserialize)]
struct BuildsPage {
    #[serde(default)]
    builds: Vec<RawBuild>,
}

#[derive(Debug, Deserialize)]
struct RawBuild {
    id: u64,
    #[serde(default)]
    number: String,
    state: String,
    finished_at: Option<String>,
    repository: RawRepository,
    branch: Option<RawNamed>,
    tag: Option<RawNamed>,
    commit: Option<RawCommit>,
    created_by: Option<RawUser>,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    slug: String,
}

#[derive(Debug, Deserialize)]
struct RawNamed {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawCommit {
    #[serde(default)]
    sha: String,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    login: String,
}

/// Lists builds through the Travis v3 REST API
#[derive(Clone)]
pub struct TravisClient {
    endpoint: String,
    web_url: String,
    token: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for TravisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TravisClient")
            .field("endpoint", &self.endpoint)
            .field("web_url", &self.web_url)
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl TravisClient {
    pub fn new(
        endpoint: impl Into<String>,
        web_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            web_url: web_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client: build_client(),
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{path}", self.endpoint))
            .header("Travis-API-Version", API_VERSION)
            .header("Authorization", format!("token {}", self.token))
    }

    /// Convert a v3 `builds` payload; builds in unknown states are dropped
    fn parse_builds(&self, body: &[u8]) -> Result<Vec<BuildRecord>, PluginError> {
        let page: BuildsPage = parse_json("Travis builds", body)?;
        Ok(page
            .builds
            .into_iter()
            .filter_map(|raw| self.convert(raw))
            .collect())
    }

    fn convert(&self, raw: RawBuild) -> Option<BuildRecord> {
        let Some(state) = BuildState::parse(&raw.state) else {
            warn!("Skipping Travis build {} with unknown state '{}'", raw.id, raw.state);
            return None;
        };
        let slug = raw.repository.slug;
        let (commit_sha, commit_message) = raw
            .commit
            .map(|c| (c.sha, c.message))
            .unwrap_or_default();

        Some(BuildRecord {
            id: raw.id,
            number: raw.number,
            url: format!("{}/{slug}/builds/{}", self.web_url, raw.id),
            repo_slug: slug,
            branch: raw.branch.map(|b| b.name).unwrap_or_default(),
            state,
            commit_sha,
            commit_message,
            triggered_by: raw
                .created_by
                .map(|u| u.login)
                .unwrap_or_else(|| "unknown".to_string()),
            finished_at: raw.finished_at,
            tag: raw.tag.map(|t| t.name),
        })
    }
}

impl CiClient for TravisClient {
    async fn list_builds(&self, limit: u32) -> Result<Vec<BuildRecord>, PluginError> {
        let response = self
            .get("/builds")
            .query(&[
                ("limit", limit.to_string()),
                ("sort_by", "finished_at:desc".to_string()),
            ])
            .send()
            .await
            .map_err(|e| request_error("Travis builds", e))?;
        let response = check_status("Travis builds", response).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| request_error("Travis builds", e))?;
        let builds = self.parse_builds(&body)?;
        debug!("Travis returned {} build(s)", builds.len());
        Ok(builds)
    }

    async fn verify(&self) -> Result<(), PluginError> {
        let response = self
            .get("/user")
            .send()
            .await
            .map_err(|e| request_error("Travis user", e))?;
        let response = check_status("Travis user", response).await?;
        let user: RawUser = read_json("Travis user", response).await?;
        debug!("Authenticated to Travis as {}", user.login);
        Ok(())
    }

    fn provider_name(&self) -> &str {
        "Travis CI"
    }
}
