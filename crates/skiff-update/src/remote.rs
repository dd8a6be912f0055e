// SPDX-License-Identifier: MIT
//
// Remote update endpoint client.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use skiff_core::error::{Result, SkiffError};
use tracing::{info, instrument};

use crate::layout::BundleLayout;

/// Budget for the lightweight version check.
const CHECK_TIMEOUT: Duration = Duration::from_secs(10);
/// Budget for pulling the archive itself.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Answer from `GET <endpoint>?installed=<version>`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateCheck {
    #[serde(rename = "upToDate")]
    pub up_to_date: bool,
    /// Present when an update is available.
    pub download_url: Option<String>,
    /// Latest version the endpoint knows about.
    pub current_version: Option<String>,
}

/// HTTP client for the configured update endpoint.
pub struct UpdateClient {
    http: reqwest::Client,
    endpoint: String,
}

impl UpdateClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("skiff/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SkiffError::DownloadFailed(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    /// Ask the endpoint whether `installed` is current.
    #[instrument(skip(self))]
    pub async fn check(&self, installed: &str) -> Result<UpdateCheck> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("installed", installed)])
            .timeout(CHECK_TIMEOUT)
            .send()
            .await
            .map_err(|e| SkiffError::DownloadFailed(format!("update check failed: {e}")))?;
        let response = response
            .error_for_status()
            .map_err(|e| SkiffError::DownloadFailed(format!("update check rejected: {e}")))?;
        let check: UpdateCheck = response
            .json()
            .await
            .map_err(|e| SkiffError::DownloadFailed(format!("malformed update check body: {e}")))?;
        info!(up_to_date = check.up_to_date, latest = ?check.current_version, "update check complete");
        Ok(check)
    }

    /// Pull an update archive into the layout's updates directory and return
    /// its path.
    #[instrument(skip(self, layout))]
    pub async fn download(
        &self,
        layout: &BundleLayout,
        url: &str,
        version: &str,
    ) -> Result<PathBuf> {
        let response = self
            .http
            .get(url)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await
            .map_err(|e| SkiffError::DownloadFailed(format!("download failed: {e}")))?;
        let response = response
            .error_for_status()
            .map_err(|e| SkiffError::DownloadFailed(format!("download rejected: {e}")))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SkiffError::DownloadFailed(format!("download interrupted: {e}")))?;

        std::fs::create_dir_all(layout.updates_dir())?;
        let dest = layout.update_archive_path(version);
        std::fs::write(&dest, &bytes)?;
        let digest = archive_digest(&dest)?;
        info!(
            bytes = bytes.len(),
            sha256 = %digest,
            dest = %dest.display(),
            "update archive downloaded"
        );
        Ok(dest)
    }
}

/// Digest helper for logging which archive a device actually received.
pub fn archive_digest(path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};
    let bytes = std::fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_check_deserializes_endpoint_shape() {
        let check: UpdateCheck = serde_json::from_str(
            r#"{"upToDate": false, "download_url": "https://cdn.example.com/u.zip", "current_version": "1.4.0"}"#,
        )
        .unwrap();
        assert!(!check.up_to_date);
        assert_eq!(check.download_url.as_deref(), Some("https://cdn.example.com/u.zip"));
        assert_eq!(check.current_version.as_deref(), Some("1.4.0"));
    }

    #[test]
    fn up_to_date_answer_may_omit_url() {
        let check: UpdateCheck = serde_json::from_str(r#"{"upToDate": true}"#).unwrap();
        assert!(check.up_to_date);
        assert!(check.download_url.is_none());
        assert!(check.current_version.is_none());
    }

    #[test]
    fn digest_is_stable_hex() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"abc").unwrap();
        let digest = archive_digest(file.path()).unwrap();
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
