// SPDX-License-Identifier: MIT
//
// Platform-agnostic trait definitions for native capabilities.

use skiff_core::error::Result;

/// Unified shell that groups the native capabilities the bridge builtins
/// need. Platforms that lack one (desktop builds have no keystore) return
/// `SkiffError::PlatformUnavailable` from the stub implementation.
pub trait PlatformShell: NativeBrowser + NativeSecureStore + Send + Sync {
    /// Human-readable platform name (e.g. "iOS 17", "Android 14").
    fn platform_name(&self) -> &str;
}

/// Hand a URL to the operating system's default browser.
pub trait NativeBrowser {
    /// Open the URL outside the app. Returns Ok(()) once the intent or
    /// activity was dispatched; whether the browser actually loads it is
    /// out of our hands.
    fn open_external(&self, url: &str) -> Result<()>;
}

/// Secure key-value storage in the platform keychain / keystore.
pub trait NativeSecureStore {
    /// Store a value under the given key, replacing any previous value.
    fn store(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a value by key. Returns None if not present.
    fn load(&self, key: &str) -> Result<Option<String>>;

    /// Delete a value by key. Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> Result<()>;
}
