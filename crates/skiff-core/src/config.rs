// SPDX-License-Identifier: MIT
//
// Shell configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the embedded app shell.
///
/// Defaults mirror the layout the backend bundle is built against; hosts
/// normally only override `platform`, `update_endpoint`, and `app_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Reserved scheme for the pseudo-origin (e.g. "skiff").
    pub scheme: String,
    /// Reserved host for the pseudo-origin.
    pub host: String,
    /// Path prefix served directly from the bundle's public directory.
    pub asset_prefix: String,
    /// Front controller script, relative to the installed bundle root.
    pub front_controller: PathBuf,
    /// Console entry script for administrative commands, relative to the
    /// installed bundle root.
    pub console_entry: PathBuf,
    /// Platform marker exposed to the backend ("ios", "android", "desktop").
    pub platform: String,
    /// Base URL of the update-check service. None disables remote updates.
    pub update_endpoint: Option<String>,
    /// Application identifier at the update service.
    pub app_id: Option<String>,
    /// Redirect hop bound for a single intercepted request.
    pub max_redirects: u32,
    /// Files larger than this many bytes are streamed rather than loaded.
    pub stream_threshold: u64,
    /// Chunk size for streamed asset reads.
    pub stream_chunk_size: usize,
}

impl ShellConfig {
    /// The pseudo-origin, e.g. `skiff://127.0.0.1`.
    pub fn origin(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }

    /// Absolute asset base URL, e.g. `skiff://127.0.0.1/_assets/`.
    pub fn asset_url(&self) -> String {
        format!("{}{}", self.origin(), self.asset_prefix)
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            scheme: "skiff".into(),
            host: "127.0.0.1".into(),
            asset_prefix: "/_assets/".into(),
            front_controller: PathBuf::from("vendor/skiff/bootstrap/native.main"),
            console_entry: PathBuf::from("vendor/skiff/bootstrap/console.main"),
            platform: "desktop".into(),
            update_endpoint: None,
            app_id: None,
            max_redirects: 10,
            stream_threshold: 10_000_000,
            stream_chunk_size: 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_and_asset_url() {
        let config = ShellConfig::default();
        assert_eq!(config.origin(), "skiff://127.0.0.1");
        assert_eq!(config.asset_url(), "skiff://127.0.0.1/_assets/");
    }
}
