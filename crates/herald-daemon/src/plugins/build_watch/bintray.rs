//! Bintray artifact listing client

use super::http::{build_client, check_status, parse_json, request_error};
use super::provider::ArtifactClient;
use super::types::ArtifactFile;
use crate::plugin::PluginError;
use reqwest::StatusCode;
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Deserialize)]
struct RawFile {
    name: String,
    path: String,
}

/// Lists files published to one Bintray repository
#[derive(Clone)]
pub struct BintrayClient {
    endpoint: String,
    download_url: String,
    subject: String,
    repo: String,
    credentials: Option<(String, String)>,
    client: reqwest::Client,
}

impl fmt::Debug for BintrayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BintrayClient")
            .field("endpoint", &self.endpoint)
            .field("subject", &self.subject)
            .field("repo", &self.repo)
            .field("authenticated", &self.credentials.is_some())
            .finish_non_exhaustive()
    }
}

impl BintrayClient {
    pub fn new(
        endpoint: impl Into<String>,
        download_url: impl Into<String>,
        subject: impl Into<String>,
        repo: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            download_url: download_url.into().trim_end_matches('/').to_string(),
            subject: subject.into(),
            repo: repo.into(),
            credentials: None,
            client: build_client(),
        }
    }

    /// Authenticate requests with an API user and key
    pub fn with_credentials(mut self, user: impl Into<String>, key: impl Into<String>) -> Self {
        self.credentials = Some((user.into(), key.into()));
        self
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(format!("{}{path}", self.endpoint));
        match &self.credentials {
            Some((user, key)) => request.basic_auth(user, Some(key)),
            None => request,
        }
    }

    fn files_path(&self, package: &str, version: &str) -> String {
        format!(
            "/packages/{}/{}/{package}/versions/{version}/files",
            self.subject, self.repo
        )
    }

    fn parse_files(&self, body: &[u8]) -> Result<Vec<ArtifactFile>, PluginError> {
        let raw: Vec<RawFile> = parse_json("Bintray files", body)?;
        Ok(raw
            .into_iter()
            .map(|file| ArtifactFile {
                url: format!(
                    "{}/{}/{}/{}",
                    self.download_url,
                    self.subject,
                    self.repo,
                    file.path.trim_start_matches('/')
                ),
                name: file.name,
                path: file.path,
            })
            .collect())
    }
}

impl ArtifactClient for BintrayClient {
    async fn list_files(
        &self,
        package: &str,
        version: &str,
    ) -> Result<Vec<ArtifactFile>, PluginError> {
        let response = self
            .get(&self.files_path(package, version))
            .send()
            .await
            .map_err(|e| request_error("Bintray files", e))?;
        // The version does not exist until the deploy step creates it
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let response = check_status("Bintray files", response).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| request_error("Bintray files", e))?;
        self.parse_files(&body)
    }

    async fn verify(&self) -> Result<(), PluginError> {
        let response = self
            .get(&format!("/users/{}", self.subject))
            .send()
            .await
            .map_err(|e| request_error("Bintray user", e))?;
        check_status("Bintray user", response).await?;
        Ok(())
    }

    fn provider_name(&self) -> &str {
        "Bintray"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> BintrayClient {
        BintrayClient::new(
            "https://api.example",
            "https://dl.example/",
            "acme",
            "maven",
        )
    }

    #[test]
    fn test_files_path() {
        assert_eq!(
            client().files_path("widget", "1.4.0"),
            "/packages/acme/maven/widget/versions/1.4.0/files"
        );
    }

    #[test]
    fn test_parse_files_builds_download_links() {
        let body = br#"[
          {"name": "widget-1.4.0.jar", "path": "com/acme/widget/1.4.0/widget-1.4.0.jar", "size": 1024},
          {"name": "widget-1.4.0.pom", "path": "/com/acme/widget/1.4.0/widget-1.4.0.pom"}
        ]"#;
        let files = client().parse_files(body).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "widget-1.4.0.jar");
        assert_eq!(
            files[0].url,
            "https://dl.example/acme/maven/com/acme/widget/1.4.0/widget-1.4.0.jar"
        );
        assert_eq!(
            files[1].url,
            "https://dl.example/acme/maven/com/acme/widget/1.4.0/widget-1.4.0.pom"
        );
    }

    #[test]
    fn test_parse_files_malformed() {
        assert!(client().parse_files(br#"{"message": "nope"}"#).is_err());
    }

    #[test]
    fn test_debug_hides_credentials() {
        let debug = format!("{:?}", client().with_credentials("bot", "hunter2"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("authenticated: true"));
    }
}
