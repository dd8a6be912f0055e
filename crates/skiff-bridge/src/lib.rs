// SPDX-License-Identifier: MIT
//
// Name-addressed native function table.
//
// UI-side code calls native capabilities through a single entry point: a
// dotted function name plus a JSON parameter payload, answered with a JSON
// string. The registry owns dispatch; platform shells (iOS, Android, or a
// desktop stub) supply the actual capability implementations behind traits.

pub mod builtins;
pub mod error;
pub mod registry;
pub mod traits;

#[cfg(target_os = "ios")]
pub mod ios;

#[cfg(target_os = "android")]
pub mod android;

#[cfg(not(any(target_os = "ios", target_os = "android")))]
pub mod stub;

pub use error::{BridgeError, BridgeResult};
pub use registry::{BridgeFunction, BridgeRegistry};
pub use traits::PlatformShell;

use std::sync::Arc;

/// Retrieves the shell implementation for the target operating system.
pub fn platform_shell() -> Arc<dyn traits::PlatformShell> {
    #[cfg(target_os = "ios")]
    {
        Arc::new(ios::IosShell::new())
    }
    #[cfg(target_os = "android")]
    {
        Arc::new(android::AndroidShell::new())
    }
    #[cfg(not(any(target_os = "ios", target_os = "android")))]
    {
        Arc::new(stub::StubShell::new())
    }
}
