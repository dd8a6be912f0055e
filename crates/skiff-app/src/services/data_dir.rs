// SPDX-License-Identifier: MIT
//
// Platform-aware data directory resolution.

use std::path::PathBuf;

/// Return the application data directory, creating it if needed.
///
/// On desktop this uses a conventional location. On mobile the platform
/// shell provides the app's documents directory through `SKIFF_DATA_DIR`.
pub fn data_dir() -> PathBuf {
    if let Ok(explicit) = std::env::var("SKIFF_DATA_DIR") {
        let dir = PathBuf::from(explicit);
        std::fs::create_dir_all(&dir).ok();
        return dir;
    }
    let dir = dirs_fallback().join("skiff");
    std::fs::create_dir_all(&dir).ok();
    dir
}

fn dirs_fallback() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from("/tmp")
}
