// SPDX-License-Identifier: MIT
//
// On-disk layout of the bundle area inside the app's data directory.
//
// ```text
// <root>/
//   app/                      the live bundle the gateway serves from
//   installed.version         version of the live bundle
//   bundled.version           version last seeded from the app package
//   extracted_<uuid>/         staging area for an extraction in progress
//   updates/
//     update_<v>_<epoch>.zip  downloaded archives
//     backup_<epoch>/         previous bundle, one retained
// ```

use std::path::{Path, PathBuf};

use chrono::Utc;
use skiff_core::error::Result;
use uuid::Uuid;

const BACKUP_PREFIX: &str = "backup_";
const STAGING_PREFIX: &str = "extracted_";

#[derive(Debug, Clone)]
pub struct BundleLayout {
    root: PathBuf,
}

impl BundleLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The live bundle directory.
    pub fn app_dir(&self) -> PathBuf {
        self.root.join("app")
    }

    pub fn installed_marker(&self) -> PathBuf {
        self.root.join("installed.version")
    }

    /// Fast marker recording which packaged bundle was last seeded, so
    /// launches can skip re-extraction without opening the archive.
    pub fn bundled_marker(&self) -> PathBuf {
        self.root.join("bundled.version")
    }

    pub fn updates_dir(&self) -> PathBuf {
        self.root.join("updates")
    }

    /// A fresh, unique staging directory for one extraction.
    pub fn new_staging_dir(&self) -> PathBuf {
        self.root.join(format!("{STAGING_PREFIX}{}", Uuid::new_v4()))
    }

    /// Timestamped destination for the outgoing bundle, kept alongside the
    /// pending archives.
    pub fn new_backup_dir(&self) -> PathBuf {
        self.updates_dir()
            .join(format!("{BACKUP_PREFIX}{}", Utc::now().timestamp()))
    }

    /// Download destination for an update archive.
    pub fn update_archive_path(&self, version: &str) -> PathBuf {
        self.updates_dir()
            .join(format!("update_{version}_{}.zip", Utc::now().timestamp()))
    }

    /// Existing backup directories, oldest first.
    pub fn backups(&self) -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        let updates_dir = self.updates_dir();
        if !updates_dir.exists() {
            return Ok(found);
        }
        for entry in std::fs::read_dir(&updates_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(BACKUP_PREFIX) && entry.path().is_dir() {
                found.push(entry.path());
            }
        }
        // Epoch suffixes sort lexicographically within the same digit count;
        // compare numerically to be safe across the 9->10 digit boundary.
        found.sort_by_key(|p| backup_epoch(p).unwrap_or(0));
        Ok(found)
    }

    /// Delete all but the newest backup.
    pub fn prune_backups(&self) -> Result<()> {
        let backups = self.backups()?;
        for stale in backups.iter().rev().skip(1) {
            tracing::debug!(path = %stale.display(), "removing stale backup");
            std::fs::remove_dir_all(stale)?;
        }
        Ok(())
    }

    /// Remove leftover staging directories from interrupted extractions.
    pub fn sweep_staging(&self) -> Result<()> {
        if !self.root.exists() {
            return Ok(());
        }
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(STAGING_PREFIX) && entry.path().is_dir() {
                tracing::debug!(path = %name, "removing abandoned staging dir");
                std::fs::remove_dir_all(entry.path())?;
            }
        }
        Ok(())
    }
}

fn backup_epoch(path: &Path) -> Option<i64> {
    path.file_name()?
        .to_str()?
        .strip_prefix(BACKUP_PREFIX)?
        .parse()
        .ok()
}
