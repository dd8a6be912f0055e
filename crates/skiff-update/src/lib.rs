// SPDX-License-Identifier: MIT
//
// Bundle lifecycle: first-launch extraction, over-the-air updates, backups.
//
// The app ships a bundled archive inside its package and keeps the live,
// writable copy in its data directory. This crate owns that copy: seeding it
// on first launch, swapping in downloaded updates atomically, and keeping
// one backup to fall back on.

pub mod archive;
pub mod layout;
pub mod manager;
pub mod remote;

pub use archive::{archive_env_version, extract_archive};
pub use layout::BundleLayout;
pub use manager::UpdateManager;
pub use remote::{UpdateCheck, UpdateClient};
