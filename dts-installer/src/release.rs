use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{io_err, InstallError};

pub const LATEST_RELEASE_API: &str =
    "https://api.github.com/repos/drawthingsai/draw-things-community/releases/latest";
pub const RELEASE_DOWNLOAD_BASE: &str =
    "https://github.com/drawthingsai/draw-things-community/releases/download";
pub const ASSET_NAME: &str = "gRPCServerCLI-macOS";

/// Pinned release used when the GitHub API cannot be reached.
pub const FALLBACK_VERSION: &str = "v1.20250225.0";

const API_TIMEOUT: Duration = Duration::from_secs(15);

/// Where the server binary comes from.
pub trait ReleaseSource {
    fn latest_download_url(&self) -> Result<String, InstallError>;

    /// Download `url` into `dest`, replacing it.
    fn download(&self, url: &str, dest: &Path) -> Result<(), InstallError>;
}

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

/// [`ReleaseSource`] backed by the draw-things-community GitHub releases.
pub struct GithubReleases {
    agent: ureq::Agent,
}

impl Default for GithubReleases {
    fn default() -> Self {
        Self::new()
    }
}

impl GithubReleases {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .user_agent(concat!("dts-util/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }

    fn latest_tag(&self) -> Result<String, String> {
        let response = self
            .agent
            .get(LATEST_RELEASE_API)
            .set("Accept", "application/vnd.github+json")
            .timeout(API_TIMEOUT)
            .call()
            .map_err(|e| e.to_string())?;
        let release: Release = response.into_json().map_err(|e| e.to_string())?;
        Ok(release.tag_name)
    }
}

impl ReleaseSource for GithubReleases {
    fn latest_download_url(&self) -> Result<String, InstallError> {
        let tag = match self.latest_tag() {
            Ok(tag) => tag,
            Err(reason) => {
                tracing::warn!(
                    error = %reason,
                    fallback = FALLBACK_VERSION,
                    "could not fetch latest release, using pinned version"
                );
                FALLBACK_VERSION.to_string()
            }
        };
        tracing::info!(version = %tag, "resolved server release");
        Ok(asset_url(&tag))
    }

    fn download(&self, url: &str, dest: &Path) -> Result<(), InstallError> {
        let failed = |reason: String| InstallError::Download {
            url: url.to_string(),
            reason,
        };

        let response = self.agent.get(url).call().map_err(|e| failed(e.to_string()))?;
        let mut file = File::create(dest).map_err(|e| io_err(dest, e))?;
        let written = io::copy(&mut response.into_reader(), &mut file)
            .map_err(|e| failed(e.to_string()))?;

        if written == 0 {
            let _ = fs::remove_file(dest);
            return Err(failed("server returned an empty file".to_string()));
        }
        tracing::info!(bytes = written, dest = %dest.display(), "downloaded server binary");
        Ok(())
    }
}

/// Download URL of the macOS server binary for release `tag`.
pub fn asset_url(tag: &str) -> String {
    format!("{RELEASE_DOWNLOAD_BASE}/{tag}/{ASSET_NAME}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_url_points_at_the_macos_binary() {
        assert_eq!(
            asset_url(FALLBACK_VERSION),
            "https://github.com/drawthingsai/draw-things-community/releases/download/v1.20250225.0/gRPCServerCLI-macOS"
        );
    }

    #[test]
    fn release_metadata_only_needs_the_tag() {
        let release: Release =
            serde_json::from_str(r#"{"tag_name": "v1.20250301.0", "name": "March", "assets": []}"#)
                .expect("parse");
        assert_eq!(release.tag_name, "v1.20250301.0");
    }
}
