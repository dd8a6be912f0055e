// SPDX-License-Identifier: MIT
//
// Bundle version parsing and the automatic-update compatibility gate.
//
// Versions are semver-like (major.minor.patch). Partially specified forms
// are normalized by zero-filling ("1.2" -> 1.2.0, "2" -> 2.0.0) and a
// leading "v" is tolerated. The literal DEBUG marker identifies development
// builds and bypasses the gate entirely (handled by the update manager).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Marker version written by development tooling. A bundled DEBUG version is
/// always re-extracted and never participates in remote update checks.
pub const DEBUG_VERSION: &str = "DEBUG";

/// A parsed bundle version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BundleVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl BundleVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for BundleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for BundleVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned = s.trim().strip_prefix('v').unwrap_or(s.trim());
        if cleaned.is_empty() {
            return Err("empty version string".into());
        }

        let mut parts = cleaned.split('.');
        let mut component = |name: &str| -> Result<Option<u32>, String> {
            match parts.next() {
                None => Ok(None),
                Some(p) => p
                    .parse::<u32>()
                    .map(Some)
                    .map_err(|_| format!("non-numeric {name} component in '{s}'")),
            }
        };

        let major = component("major")?.ok_or_else(|| format!("no major component in '{s}'"))?;
        let minor = component("minor")?.unwrap_or(0);
        let patch = component("patch")?.unwrap_or(0);

        if parts.next().is_some() {
            return Err(format!("too many components in '{s}'"));
        }

        Ok(Self::new(major, minor, patch))
    }
}

/// Whether an automatic update from `current` to `new` is allowed.
///
/// Allowed only when the major version is unchanged and (minor, patch) is
/// strictly greater lexicographically. Major bumps require a store release;
/// downgrades and same-version installs are never applied.
///
/// Unparseable version strings default to "allow" so a first-run device with
/// a malformed marker can still recover via an update. This is a deliberately
/// permissive fallback, not a guarantee.
pub fn is_compatible_upgrade(current: &str, new: &str) -> bool {
    let (cur, next) = match (
        current.parse::<BundleVersion>(),
        new.parse::<BundleVersion>(),
    ) {
        (Ok(c), Ok(n)) => (c, n),
        _ => {
            warn!(current, new, "unparseable version strings, allowing update");
            return true;
        }
    };

    if next.major != cur.major {
        return false;
    }

    (next.minor, next.patch) > (cur.minor, cur.patch)
}
