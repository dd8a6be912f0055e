// SPDX-License-Identifier: MIT
//
// Stub shell for desktop/CI builds where native mobile APIs are unavailable.
//
// The browser capability returns `PlatformUnavailable` — real
// implementations live in the `ios` and `android` modules. The secure store
// is an in-memory map so desktop development builds keep working, but it is
// not persistent and not secure.

use std::collections::HashMap;
use std::sync::Mutex;

use skiff_core::error::{Result, SkiffError};

use crate::traits::*;

/// Shell returned on non-mobile platforms.
pub struct StubShell {
    secrets: Mutex<HashMap<String, String>>,
}

impl StubShell {
    pub fn new() -> Self {
        Self {
            secrets: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for StubShell {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformShell for StubShell {
    fn platform_name(&self) -> &str {
        "Desktop (stub)"
    }
}

impl NativeBrowser for StubShell {
    fn open_external(&self, url: &str) -> Result<()> {
        tracing::warn!(%url, "NativeBrowser::open_external called on stub shell");
        Err(SkiffError::PlatformUnavailable)
    }
}

impl NativeSecureStore for StubShell {
    fn store(&self, key: &str, value: &str) -> Result<()> {
        let mut secrets = match self.secrets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        secrets.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>> {
        let secrets = match self.secrets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(secrets.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut secrets = match self.secrets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        secrets.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_store_round_trip() {
        let shell = StubShell::new();
        shell.store("token", "abc123").unwrap();
        assert_eq!(shell.load("token").unwrap().as_deref(), Some("abc123"));
        shell.delete("token").unwrap();
        assert_eq!(shell.load("token").unwrap(), None);
    }

    #[test]
    fn browser_is_unavailable() {
        let shell = StubShell::new();
        assert!(matches!(
            shell.open_external("https://example.com"),
            Err(SkiffError::PlatformUnavailable)
        ));
    }
}
