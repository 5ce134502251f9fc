//! Release metadata resolution against the GitHub releases API.

use std::time::Duration;

use regex::Regex;
use semver::Version;
use serde::Deserialize;
use tracing::debug;

use super::FetchError;

/// Timeout for the metadata request. The archive download itself is
/// unbounded; callers impose their own deadline if they need one.
const METADATA_TIMEOUT_SECS: u64 = 10;

const USER_AGENT: &str = concat!("rigsup/", env!("CARGO_PKG_VERSION"));

/// Release API response, minimal fields.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

impl Release {
    /// Semantic version parsed from the tag, tolerating a leading `v`.
    pub fn version(&self) -> Option<Version> {
        Version::parse(self.tag_name.trim_start_matches('v')).ok()
    }
}

/// HTTP client for release metadata and archive downloads.
pub fn http_client() -> Result<reqwest::Client, FetchError> {
    Ok(reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()?)
}

/// Fetch the latest release for `repo` (`owner/name`).
pub async fn latest_release(client: &reqwest::Client, repo: &str) -> Result<Release, FetchError> {
    let url = format!("https://api.github.com/repos/{repo}/releases/latest");
    let response = client
        .get(&url)
        .timeout(Duration::from_secs(METADATA_TIMEOUT_SECS))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            status: status.as_u16(),
            url,
        });
    }

    let release: Release = response.json().await?;
    debug!(repo, tag = %release.tag_name, assets = release.assets.len(), "resolved release");
    Ok(release)
}

/// Select the single asset whose name matches `pattern`.
///
/// No match means the platform is unsupported by this release; the fetcher
/// fails rather than guessing a binary.
pub fn select_asset<'a>(
    release: &'a Release,
    pattern: &str,
) -> Result<&'a ReleaseAsset, FetchError> {
    let regex = Regex::new(pattern).map_err(|e| FetchError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })?;
    release
        .assets
        .iter()
        .find(|asset| regex.is_match(&asset.name))
        .ok_or_else(|| FetchError::NoMatchingAsset {
            pattern: pattern.to_string(),
        })
}
