// SPDX-License-Identifier: MIT
//
// Bundle install orchestration.

use std::path::{Path, PathBuf};

use skiff_core::error::{Result, SkiffError};
use skiff_core::{
    is_compatible_upgrade, EventBus, LifecycleEvent, ShellConfig, DEBUG_VERSION,
};
use tracing::{debug, info, instrument, warn};

use crate::archive::extract_archive;
use crate::layout::BundleLayout;


/// Owns the live bundle directory and every transition it goes through.
pub struct UpdateManager {
    layout: BundleLayout,
    config: ShellConfig,
    events: EventBus,
    /// Development builds always reseed from the packaged archive and skip
    /// the compatibility gate.
    debug: bool,
}

impl UpdateManager {
    pub fn new(layout: BundleLayout, config: ShellConfig, events: EventBus, debug: bool) -> Self {
        Self {
            layout,
            config,
            events,
            debug,
        }
    }

    pub fn layout(&self) -> &BundleLayout {
        &self.layout
    }

    /// Version of the live bundle.
    ///
    /// Resolution order: the installed marker, then the bundle's `.env`
    /// APP_VERSION line. With no record anywhere the bundle is treated as a
    /// development build, which remote checks never offer updates to. Debug
    /// builds report the debug version unconditionally.
    pub fn installed_version(&self) -> String {
        if self.debug {
            return DEBUG_VERSION.to_string();
        }
        if let Ok(marker) = std::fs::read_to_string(self.layout.installed_marker()) {
            let marker = marker.trim();
            if !marker.is_empty() {
                return marker.to_string();
            }
        }
        if let Some(version) = env_version(&self.layout.app_dir().join(".env")) {
            return version;
        }
        DEBUG_VERSION.to_string()
    }

    /// Make sure a usable bundle exists, seeding from the packaged archive
    /// when needed. Returns the live bundle directory.
    ///
    /// Release builds skip the work when the fast marker says this exact
    /// packaged version was already seeded and the bundle still validates.
    /// Debug builds reseed every launch so code changes show up.
    #[instrument(skip(self, packaged_archive))]
    pub fn ensure_app_exists(
        &self,
        packaged_archive: &Path,
        packaged_version: &str,
    ) -> Result<PathBuf> {
        let app_dir = self.layout.app_dir();

        if !self.debug && self.seeded_version().as_deref() == Some(packaged_version) {
            if self.validate_bundle(&app_dir).is_ok() {
                debug!(version = packaged_version, "packaged bundle already seeded");
                return Ok(app_dir);
            }
            warn!("seeded bundle failed validation, reseeding");
        }

        info!(version = packaged_version, "seeding bundle from packaged archive");
        self.layout.sweep_staging()?;
        let staging = self.layout.new_staging_dir();
        extract_archive(packaged_archive, &staging)?;
        if let Err(e) = self.validate_bundle(&staging) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e);
        }

        if app_dir.exists() {
            std::fs::remove_dir_all(&app_dir)?;
        }
        std::fs::rename(&staging, &app_dir)?;
        self.write_markers(packaged_version, true)?;
        Ok(app_dir)
    }

    /// Apply the newest pending update archive left in the updates
    /// directory, if any. Called at boot to finish a download whose install
    /// never ran (app was killed between download and install). Returns the
    /// installed version. Archives that fail to install are deleted so they
    /// cannot wedge every subsequent launch.
    pub fn apply_pending_update(&self) -> Result<Option<String>> {
        let updates_dir = self.layout.updates_dir();
        if !updates_dir.exists() {
            return Ok(None);
        }

        let mut pending: Vec<(i64, String, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(&updates_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some((version, epoch)) = parse_update_name(name) {
                pending.push((epoch, version, entry.path()));
            }
        }
        pending.sort();

        let Some((_, version, path)) = pending.pop() else {
            return Ok(None);
        };
        // Older leftovers are superseded either way.
        for (_, _, stale) in pending {
            let _ = std::fs::remove_file(stale);
        }

        info!(%version, "applying pending update from previous session");
        match self.install_update(&path, &version) {
            Ok(()) => Ok(Some(version)),
            Err(e) => {
                warn!(error = %e, %version, "pending update unusable, discarding");
                let _ = std::fs::remove_file(&path);
                Ok(None)
            }
        }
    }

    /// Install a downloaded update archive atomically.
    ///
    /// The archive is extracted and validated off to the side; only then is
    /// the live bundle moved to a backup and the new tree moved into place.
    /// If that final move fails the backup is restored, so the app is never
    /// left without a bundle.
    #[instrument(skip(self, archive))]
    pub fn install_update(&self, archive: &Path, new_version: &str) -> Result<()> {
        let installed = self.installed_version();
        if !self.debug && !is_compatible_upgrade(&installed, new_version) {
            return Err(SkiffError::InstallFailed(format!(
                "version {new_version} is not a compatible upgrade from {installed}"
            )));
        }

        let staging = self.layout.new_staging_dir();
        extract_archive(archive, &staging)?;
        if let Err(e) = self.validate_bundle(&staging) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e);
        }

        let app_dir = self.layout.app_dir();
        let backup = self.layout.new_backup_dir();
        let had_previous = app_dir.exists();
        if had_previous {
            std::fs::create_dir_all(self.layout.updates_dir())?;
            std::fs::rename(&app_dir, &backup)?;
        }

        if let Err(e) = std::fs::rename(&staging, &app_dir) {
            warn!(error = %e, "bundle swap failed, restoring previous bundle");
            let _ = std::fs::remove_dir_all(&staging);
            if had_previous {
                std::fs::rename(&backup, &app_dir)?;
            }
            return Err(SkiffError::Io(e));
        }

        self.write_markers(new_version, false)?;
        self.layout.prune_backups()?;
        if let Err(e) = std::fs::remove_file(archive) {
            debug!(error = %e, "could not remove consumed update archive");
        }

        info!(from = %installed, to = new_version, "update installed");
        self.events.emit(LifecycleEvent::UpdateInstalled {
            version: new_version.to_string(),
            at: chrono::Utc::now(),
        });
        Ok(())
    }

    /// A bundle directory is usable when its environment file, dependency
    /// tree, public directory and front controller are all present.
    pub fn validate_bundle(&self, dir: &Path) -> Result<()> {
        let mut missing = Vec::new();
        if !dir.join(".env").is_file() {
            missing.push(".env".to_string());
        }
        if !dir.join("vendor").is_dir() {
            missing.push("vendor/".to_string());
        }
        if !dir.join("public").is_dir() {
            missing.push("public/".to_string());
        }
        if !dir.join(&self.config.front_controller).is_file() {
            missing.push(self.config.front_controller.display().to_string());
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SkiffError::InvalidBundleStructure(missing.join(", ")))
        }
    }

    fn seeded_version(&self) -> Option<String> {
        std::fs::read_to_string(self.layout.bundled_marker())
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Record `version` in the marker files and in the bundle's `.env`.
    fn write_markers(&self, version: &str, seeded: bool) -> Result<()> {
        std::fs::create_dir_all(self.layout.root())?;
        std::fs::write(self.layout.installed_marker(), version)?;
        if seeded {
            std::fs::write(self.layout.bundled_marker(), version)?;
        }
        rewrite_env_version(&self.layout.app_dir().join(".env"), version)?;
        Ok(())
    }
}

/// `update_<version>_<epoch>.zip` → (version, epoch).
fn parse_update_name(name: &str) -> Option<(String, i64)> {
    let stem = name.strip_prefix("update_")?.strip_suffix(".zip")?;
    let (version, epoch) = stem.rsplit_once('_')?;
    Some((version.to_string(), epoch.parse().ok()?))
}

/// Read APP_VERSION from an env file.
fn env_version(env_path: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(env_path).ok()?;
    contents.lines().find_map(|line| {
        line.strip_prefix("APP_VERSION=")
            .map(|v| v.trim().trim_matches('"').to_string())
            .filter(|v| !v.is_empty())
    })
}

/// Replace (or add) the APP_VERSION line in an env file. A missing env file
/// is left missing; validation already decided whether that is acceptable.
fn rewrite_env_version(env_path: &Path, version: &str) -> Result<()> {
    let Ok(contents) = std::fs::read_to_string(env_path) else {
        return Ok(());
    };
    let mut lines: Vec<String> = Vec::new();
    let mut replaced = false;
    for line in contents.lines() {
        if line.starts_with("APP_VERSION=") {
            lines.push(format!("APP_VERSION={version}"));
            replaced = true;
        } else {
            lines.push(line.to_string());
        }
    }
    if !replaced {
        lines.push(format!("APP_VERSION={version}"));
    }
    std::fs::write(env_path, lines.join("\n") + "\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn bundle_zip(version: &str, extra: &[(&str, &str)]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut writer = zip::ZipWriter::new(file.reopen().unwrap());
        let options = SimpleFileOptions::default();

        let env = format!("APP_NAME=demo\nAPP_VERSION={version}\n");
        let front = ShellConfig::default().front_controller;
        let mut entries: Vec<(String, String)> = vec![
            (".env".into(), env),
            ("public/index.html".into(), "<html></html>".into()),
            (front.to_str().unwrap().into(), "entry".into()),
        ];
        for (name, content) in extra {
            entries.push((name.to_string(), content.to_string()));
        }
        for (name, content) in entries {
            writer.start_file(&*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
        file
    }

    fn manager(root: &Path, debug: bool) -> UpdateManager {
        UpdateManager::new(
            BundleLayout::new(root),
            ShellConfig::default(),
            EventBus::default(),
            debug,
        )
    }

    #[test]
    fn first_launch_seeds_and_records_version() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), false);
        let zip = bundle_zip("1.0.0", &[]);

        let app = manager.ensure_app_exists(zip.path(), "1.0.0").unwrap();
        assert!(app.join("public/index.html").is_file());
        assert_eq!(manager.installed_version(), "1.0.0");
        assert_eq!(
            std::fs::read_to_string(manager.layout.bundled_marker()).unwrap(),
            "1.0.0"
        );
    }

    #[test]
    fn matching_seed_marker_skips_re_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), false);
        let zip = bundle_zip("1.0.0", &[]);
        manager.ensure_app_exists(zip.path(), "1.0.0").unwrap();

        // Plant a sentinel; reseeding would wipe it.
        let sentinel = manager.layout.app_dir().join("sentinel.txt");
        std::fs::write(&sentinel, "still here").unwrap();
        manager.ensure_app_exists(zip.path(), "1.0.0").unwrap();
        assert!(sentinel.is_file());
    }

    #[test]
    fn debug_builds_always_reseed() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), true);
        let zip = bundle_zip("1.0.0", &[]);
        manager.ensure_app_exists(zip.path(), "1.0.0").unwrap();

        let sentinel = manager.layout.app_dir().join("sentinel.txt");
        std::fs::write(&sentinel, "volatile").unwrap();
        manager.ensure_app_exists(zip.path(), "1.0.0").unwrap();
        assert!(!sentinel.exists());
        assert_eq!(manager.installed_version(), DEBUG_VERSION);
    }

    #[test]
    fn invalid_bundle_is_rejected_and_staging_cleaned() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), false);

        // Archive without .env or front controller.
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut writer = zip::ZipWriter::new(file.reopen().unwrap());
        writer
            .start_file("public/index.html", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"<html></html>").unwrap();
        writer.finish().unwrap();

        let err = manager.ensure_app_exists(file.path(), "1.0.0").unwrap_err();
        assert!(matches!(err, SkiffError::InvalidBundleStructure(_)));
        // No staging leftovers.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("extracted_"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn install_swaps_bundle_and_emits_event() {
        let dir = tempfile::tempdir().unwrap();
        let events = EventBus::default();
        let manager = UpdateManager::new(
            BundleLayout::new(dir.path()),
            ShellConfig::default(),
            events.clone(),
            false,
        );
        let seed = bundle_zip("1.2.0", &[("old.txt", "old")]);
        manager.ensure_app_exists(seed.path(), "1.2.0").unwrap();

        let mut rx = events.subscribe();
        let update = bundle_zip("1.3.0", &[("new.txt", "new")]);
        let update_path = update.path().to_path_buf();
        manager.install_update(&update_path, "1.3.0").unwrap();

        assert_eq!(manager.installed_version(), "1.3.0");
        let app = manager.layout.app_dir();
        assert!(app.join("new.txt").is_file());
        assert!(!app.join("old.txt").exists());
        // Old bundle preserved as the single backup.
        let backups = manager.layout.backups().unwrap();
        assert_eq!(backups.len(), 1);
        assert!(backups[0].join("old.txt").is_file());
        // Env file rewritten to the new version.
        assert_eq!(
            env_version(&app.join(".env")).as_deref(),
            Some("1.3.0")
        );

        match rx.try_recv().unwrap() {
            LifecycleEvent::UpdateInstalled { version, .. } => assert_eq!(version, "1.3.0"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn incompatible_versions_are_gated() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), false);
        let seed = bundle_zip("1.2.0", &[]);
        manager.ensure_app_exists(seed.path(), "1.2.0").unwrap();

        let major_bump = bundle_zip("2.0.0", &[]);
        let err = manager.install_update(major_bump.path(), "2.0.0").unwrap_err();
        assert!(matches!(err, SkiffError::InstallFailed(_)));
        assert_eq!(manager.installed_version(), "1.2.0");

        let downgrade = bundle_zip("1.1.0", &[]);
        assert!(manager.install_update(downgrade.path(), "1.1.0").is_err());
    }

    #[test]
    fn pending_update_is_applied_at_boot_and_stale_ones_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), false);
        let seed = bundle_zip("1.0.0", &[]);
        manager.ensure_app_exists(seed.path(), "1.0.0").unwrap();

        let updates = manager.layout.updates_dir();
        std::fs::create_dir_all(&updates).unwrap();
        let newer = bundle_zip("1.2.0", &[]);
        std::fs::copy(newer.path(), updates.join("update_1.2.0_1700000100.zip")).unwrap();
        let older = bundle_zip("1.1.0", &[]);
        std::fs::copy(older.path(), updates.join("update_1.1.0_1700000000.zip")).unwrap();

        let applied = manager.apply_pending_update().unwrap();
        assert_eq!(applied.as_deref(), Some("1.2.0"));
        assert_eq!(manager.installed_version(), "1.2.0");
        // Both archives gone: the applied one consumed, the stale one swept.
        let zips: Vec<_> = std::fs::read_dir(&updates)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".zip"))
            .collect();
        assert!(zips.is_empty());
        // The replaced bundle sits next to the archives.
        let backups = manager.layout.backups().unwrap();
        assert_eq!(backups.len(), 1);
        assert!(backups[0].starts_with(&updates));
    }

    #[test]
    fn unusable_pending_update_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), false);
        let seed = bundle_zip("1.0.0", &[]);
        manager.ensure_app_exists(seed.path(), "1.0.0").unwrap();

        let updates = manager.layout.updates_dir();
        std::fs::create_dir_all(&updates).unwrap();
        std::fs::write(updates.join("update_1.1.0_1700000000.zip"), b"not a zip").unwrap();

        assert_eq!(manager.apply_pending_update().unwrap(), None);
        assert_eq!(manager.installed_version(), "1.0.0");
        assert!(!updates.join("update_1.1.0_1700000000.zip").exists());
    }

    #[test]
    fn version_resolution_falls_back_to_env_then_debug() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), false);
        assert_eq!(manager.installed_version(), DEBUG_VERSION);

        let app = manager.layout.app_dir();
        std::fs::create_dir_all(&app).unwrap();
        std::fs::write(app.join(".env"), "APP_VERSION=3.4.5\n").unwrap();
        assert_eq!(manager.installed_version(), "3.4.5");

        std::fs::write(manager.layout.installed_marker(), "3.5.0\n").unwrap();
        assert_eq!(manager.installed_version(), "3.5.0");
    }
}
