//! Release check against the project's GitHub releases feed.
//!
//! Failures never reach the user: callers log them and carry on.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::ai::client::TransportError;

const OWNER: &str = "mesumbinshaukat";
const REPO: &str = "MAIIDE";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn latest_release_api_url() -> String {
    format!("https://api.github.com/repos/{OWNER}/{REPO}/releases/latest")
}

pub fn latest_release_page() -> String {
    format!("https://github.com/{OWNER}/{REPO}/releases/latest")
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseInfo {
    #[serde(default)]
    pub tag_name: String,
    #[serde(default)]
    pub html_url: Option<String>,
}

impl ReleaseInfo {
    pub fn page_url(&self) -> String {
        self.html_url.clone().unwrap_or_else(latest_release_page)
    }
}

pub fn normalize_version(version: &str) -> &str {
    let version = version.trim();
    version.strip_prefix('v').unwrap_or(version)
}

/// Leading digits of a version component; anything else counts as 0.
fn component(part: &str) -> u64 {
    let digits = part
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map_or("", |(i, c)| &part[..i + c.len_utf8()]);
    digits.parse().unwrap_or(0)
}

/// Dotted numeric comparison; missing components are 0.
pub fn is_newer(remote: &str, local: &str) -> bool {
    let remote: Vec<u64> = normalize_version(remote).split('.').map(component).collect();
    let local: Vec<u64> = normalize_version(local).split('.').map(component).collect();
    let len = remote.len().max(local.len());
    for i in 0..len {
        let r = remote.get(i).copied().unwrap_or(0);
        let l = local.get(i).copied().unwrap_or(0);
        if r != l {
            return r > l;
        }
    }
    false
}

pub struct UpdateChecker {
    http: Client,
    url: String,
}

impl UpdateChecker {
    pub fn new() -> Result<Self, TransportError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("maiide/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            url: latest_release_api_url(),
        })
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub async fn latest(&self) -> Result<ReleaseInfo, TransportError> {
        let response = self
            .http
            .get(&self.url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                operation: "release check",
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// The latest release when it is newer than `current`.
    pub async fn check(&self, current: &str) -> Result<Option<ReleaseInfo>, TransportError> {
        let release = self.latest().await?;
        if release.tag_name.trim().is_empty() {
            debug!("Latest release has no tag");
            return Ok(None);
        }
        if is_newer(&release.tag_name, current) {
            info!(latest = %release.tag_name, current, "Update available");
            Ok(Some(release))
        } else {
            debug!(latest = %release.tag_name, current, "Up to date");
            Ok(None)
        }
    }
}
