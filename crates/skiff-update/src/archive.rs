// SPDX-License-Identifier: MIT
//
// Bundle archive extraction.
//
// A bundle archive holds tens of thousands of small files (a dependency
// tree), so extraction is split into phases: entries are read sequentially
// (the archive is one compressed stream and cannot be read in parallel),
// directories are created up front, then file contents are written by a
// small worker pool.

use std::collections::VecDeque;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use skiff_core::error::{Result, SkiffError};
use tracing::{debug, info};
use zip::ZipArchive;

/// Parallel writers for phase three.
const WRITE_WORKERS: usize = 4;

#[cfg(unix)]
const EXEC_MODE_MASK: u32 = 0o111;

struct PendingFile {
    dest: PathBuf,
    bytes: Vec<u8>,
    #[cfg(unix)]
    mode: Option<u32>,
}

/// Extract `archive` into `dest`, which must not already exist.
///
/// Entries whose names would escape `dest` are rejected, failing the whole
/// extraction; a bundle with traversal entries is hostile, not damaged.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    if dest.exists() {
        return Err(SkiffError::InstallFailed(format!(
            "extraction target already exists: {}",
            dest.display()
        )));
    }

    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file)
        .map_err(|e| SkiffError::InstallFailed(format!("unreadable archive: {e}")))?;

    // Phase one: sequential read into memory.
    let mut dirs: Vec<PathBuf> = Vec::new();
    let mut files: Vec<PendingFile> = Vec::with_capacity(zip.len());
    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| SkiffError::InstallFailed(format!("corrupt archive entry: {e}")))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(SkiffError::InstallFailed(format!(
                "archive entry escapes extraction root: {}",
                entry.name()
            )));
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            dirs.push(target);
            continue;
        }
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        if let Some(parent) = target.parent() {
            dirs.push(parent.to_path_buf());
        }
        files.push(PendingFile {
            dest: target,
            bytes,
            #[cfg(unix)]
            mode: entry.unix_mode(),
        });
    }
    debug!(files = files.len(), dirs = dirs.len(), "archive read complete");

    // Phase two: directory skeleton.
    std::fs::create_dir_all(dest)?;
    dirs.sort();
    dirs.dedup();
    for dir in &dirs {
        std::fs::create_dir_all(dir)?;
    }

    // Phase three: parallel file writes.
    let total = files.len();
    let work: Mutex<VecDeque<PendingFile>> = Mutex::new(files.into());
    let failure: Mutex<Option<std::io::Error>> = Mutex::new(None);

    std::thread::scope(|scope| {
        for _ in 0..WRITE_WORKERS {
            scope.spawn(|| loop {
                let Some(pending) = next_pending(&work) else {
                    return;
                };
                if let Err(e) = write_pending(&pending) {
                    let mut slot = match failure.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    slot.get_or_insert(e);
                    return;
                }
            });
        }
    });

    let failed = match failure.into_inner() {
        Ok(slot) => slot,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(e) = failed {
        return Err(SkiffError::Io(e));
    }

    info!(files = total, dest = %dest.display(), "bundle extracted");
    Ok(())
}

/// Read the APP_VERSION line from the archive's `.env` entry without
/// extracting anything else. Used to learn a packaged bundle's version when
/// no marker file shipped alongside it.
pub fn archive_env_version(archive: &Path) -> Result<Option<String>> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file)
        .map_err(|e| SkiffError::InstallFailed(format!("unreadable archive: {e}")))?;
    let mut entry = match zip.by_name(".env") {
        Ok(entry) => entry,
        Err(_) => return Ok(None),
    };
    let mut contents = String::new();
    entry.read_to_string(&mut contents)?;
    Ok(contents.lines().find_map(|line| {
        line.strip_prefix("APP_VERSION=")
            .map(|v| v.trim().trim_matches('"').to_string())
            .filter(|v| !v.is_empty())
    }))
}

fn next_pending(work: &Mutex<VecDeque<PendingFile>>) -> Option<PendingFile> {
    let mut queue = match work.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    queue.pop_front()
}

fn write_pending(pending: &PendingFile) -> std::io::Result<()> {
    std::fs::write(&pending.dest, &pending.bytes)?;
    #[cfg(unix)]
    if let Some(mode) = pending.mode {
        if mode & EXEC_MODE_MASK != 0 {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&pending.dest, std::fs::Permissions::from_mode(mode))?;
        }
    }
    Ok(())
}
