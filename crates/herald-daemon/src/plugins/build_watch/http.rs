//! HTTP plumbing shared by the backend clients

use crate::plugin::PluginError;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("ci-herald/", env!("CARGO_PKG_VERSION"));

/// Client with the shared timeout and user agent
pub fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(DEFAULT_REQUEST_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

pub fn request_error(what: &str, e: reqwest::Error) -> PluginError {
    let message = if e.is_timeout() {
        format!("{what} timed out")
    } else {
        format!("{what} request failed: {e}")
    };
    PluginError::Provider {
        message,
        source: Some(Box::new(e)),
    }
}

/// Pass successful responses through; turn anything else into a provider
/// error carrying the backend's message when it sent one.
pub async fn check_status(what: &str, response: Response) -> Result<Response, PluginError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.bytes().await.unwrap_or_default();
    let detail = error_detail(&body);
    let message = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            format!("{what} rejected credentials ({status}): {detail}")
        }
        _ => format!("{what} failed ({status}): {detail}"),
    };
    Err(PluginError::provider(message))
}

/// Decode a JSON body; malformed payloads are provider errors
pub async fn read_json<T: DeserializeOwned>(what: &str, response: Response) -> Result<T, PluginError> {
    let body = response
        .bytes()
        .await
        .map_err(|e| request_error(what, e))?;
    parse_json(what, &body)
}

pub fn parse_json<T: DeserializeOwned>(what: &str, body: &[u8]) -> Result<T, PluginError> {
    serde_json::from_slice(body).map_err(|e| PluginError::Provider {
        message: format!("invalid {what} response: {e}"),
        source: Some(Box::new(e)),
    })
}

fn error_detail(body: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "error_message"]
                .iter()
                .find_map(|key| value.get(key).and_then(|v| v.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string())
}
