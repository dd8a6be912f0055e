// SPDX-License-Identifier: MIT
//
// Cookie jar for the pseudo-origin.
//
// The webview's own cookie storage never sees our responses (they are
// fabricated, not fetched), so the gateway keeps its own jar and replays it
// into every engine invocation. Cookies are keyed by (name, domain): a
// session cookie for the pseudo-host and one scoped to a subdomain coexist.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use skiff_core::error::Result;
use tracing::{debug, warn};

/// A single stored cookie.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// None means session cookie: kept until the app process exits.
    pub expires: Option<DateTime<Utc>>,
    pub secure: bool,
    pub http_only: bool,
}

impl Cookie {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires, Some(at) if at <= now)
    }

    /// RFC 6265 path-match: exact, or prefix ending at a `/` boundary.
    fn matches_path(&self, request_path: &str) -> bool {
        if self.path == request_path {
            return true;
        }
        if let Some(rest) = request_path.strip_prefix(&self.path) {
            return self.path.ends_with('/') || rest.starts_with('/');
        }
        false
    }
}

/// In-memory cookie store keyed by (name, domain).
#[derive(Debug, Default, Clone)]
pub struct CookieJar {
    cookies: HashMap<(String, String), Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb one `Set-Cookie` header value.
    ///
    /// `default_domain` applies when the attribute list names no Domain,
    /// which is the normal case for the pseudo-host. A missing Path defaults
    /// to `/`. Malformed values are dropped with a warning rather than
    /// failing the response.
    pub fn store(&mut self, set_cookie: &str, default_domain: &str) {
        let Some(cookie) = parse_set_cookie(set_cookie, default_domain) else {
            warn!(header = set_cookie, "discarding unparseable Set-Cookie");
            return;
        };
        // An expiry in the past is how servers delete cookies.
        if cookie.is_expired(Utc::now()) {
            debug!(name = %cookie.name, "cookie expired on arrival, removing");
            self.cookies
                .remove(&(cookie.name.clone(), cookie.domain.clone()));
            return;
        }
        self.cookies
            .insert((cookie.name.clone(), cookie.domain.clone()), cookie);
    }

    /// Build a `Cookie:` request header value for the given host and path,
    /// or None when nothing matches. Expired cookies are pruned as a side
    /// effect.
    pub fn header_for(&mut self, host: &str, path: &str) -> Option<String> {
        let now = Utc::now();
        self.cookies.retain(|_, c| !c.is_expired(now));

        let mut matched: Vec<&Cookie> = self
            .cookies
            .values()
            .filter(|c| domain_matches(host, &c.domain) && c.matches_path(path))
            .collect();
        if matched.is_empty() {
            return None;
        }
        // Longest path first, then name, so the serialization is stable.
        matched.sort_by(|a, b| b.path.len().cmp(&a.path.len()).then(a.name.cmp(&b.name)));
        Some(
            matched
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Look up a cookie value by name for the given host, path-insensitive.
    /// Used for CSRF token extraction.
    pub fn value_of(&self, name: &str, host: &str) -> Option<&str> {
        self.cookies
            .values()
            .find(|c| c.name == name && domain_matches(host, &c.domain))
            .map(|c| c.value.as_str())
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// All cookies, for persistence. Session cookies are included; the
    /// store decides whether to keep them.
    pub fn snapshot(&self) -> Vec<Cookie> {
        self.cookies.values().cloned().collect()
    }

    pub fn restore(cookies: Vec<Cookie>) -> Self {
        let now = Utc::now();
        let cookies = cookies
            .into_iter()
            .filter(|c| !c.is_expired(now))
            .map(|c| ((c.name.clone(), c.domain.clone()), c))
            .collect();
        Self { cookies }
    }
}

/// Host match: exact, or the cookie domain is a parent domain.
fn domain_matches(host: &str, cookie_domain: &str) -> bool {
    let cookie_domain = cookie_domain.trim_start_matches('.');
    host == cookie_domain || host.ends_with(&format!(".{cookie_domain}"))
}

fn parse_set_cookie(value: &str, default_domain: &str) -> Option<Cookie> {
    let mut parts = value.split(';');
    let (name, cookie_value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut cookie = Cookie {
        name: name.to_string(),
        value: cookie_value.trim().to_string(),
        domain: default_domain.to_string(),
        path: "/".to_string(),
        expires: None,
        secure: false,
        http_only: false,
    };

    for attr in parts {
        let attr = attr.trim();
        let (key, val) = match attr.split_once('=') {
            Some((k, v)) => (k.trim(), Some(v.trim())),
            None => (attr, None),
        };
        match key.to_ascii_lowercase().as_str() {
            "domain" => {
                if let Some(v) = val {
                    if !v.is_empty() {
                        cookie.domain = v.trim_start_matches('.').to_string();
                    }
                }
            }
            "path" => {
                if let Some(v) = val {
                    if v.starts_with('/') {
                        cookie.path = v.to_string();
                    }
                }
            }
            // Max-Age wins over Expires in either order: this arm always
            // overwrites, while the expires arm only fills an empty slot.
            "max-age" => {
                if let Some(seconds) = val.and_then(|v| v.parse::<i64>().ok()) {
                    cookie.expires = Some(Utc::now() + Duration::seconds(seconds));
                }
            }
            "expires" => {
                if cookie.expires.is_none() {
                    if let Some(v) = val {
                        if let Ok(at) = DateTime::parse_from_rfc2822(&v.replace("-", " ")) {
                            cookie.expires = Some(at.with_timezone(&Utc));
                        }
                    }
                }
            }
            "secure" => cookie.secure = true,
            "httponly" => cookie.http_only = true,
            _ => {}
        }
    }

    Some(cookie)
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Persistence seam for the jar. The gateway loads once at startup and
/// saves after each response that set cookies.
pub trait CookieStore: Send + Sync {
    fn load(&self) -> Result<Vec<Cookie>>;
    fn save(&self, cookies: &[Cookie]) -> Result<()>;
}

/// JSON-file backed store under the app's data directory.
pub struct JsonFileCookieStore {
    path: PathBuf,
}

impl JsonFileCookieStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CookieStore for JsonFileCookieStore {
    fn load(&self) -> Result<Vec<Cookie>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn save(&self, cookies: &[Cookie]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string(cookies)?;
        // Write-then-rename so a crash mid-write cannot corrupt the jar.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
