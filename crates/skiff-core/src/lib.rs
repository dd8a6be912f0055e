// SPDX-License-Identifier: MIT
//
// Skiff — Core types and error definitions shared across all crates.

pub mod config;
pub mod error;
pub mod events;
pub mod types;
pub mod version;

pub use config::ShellConfig;
pub use error::SkiffError;
pub use events::{EventBus, LifecycleEvent};
pub use types::*;
pub use version::{is_compatible_upgrade, BundleVersion, DEBUG_VERSION};
