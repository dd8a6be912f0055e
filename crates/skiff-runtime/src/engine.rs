// SPDX-License-Identifier: MIT
//
// Script engine contract, per-request environment synthesis, and raw-capture
// normalization.
//
// The embedded interpreter is a black box: given a script path and a
// process-wide environment it produces stdout bytes.  Everything Skiff knows
// about a request is communicated through CGI-style environment variables;
// everything the backend answers comes back as one raw byte capture.

use std::path::{Path, PathBuf};

use skiff_core::error::{Result, SkiffError};
use skiff_core::{HeaderMap, ShellConfig};
use tracing::debug;

/// Partial-navigation headers that the interpreter retains between
/// invocations.  They are explicitly written as empty strings before each
/// request so state from a previous navigation cannot bleed into this one.
pub const STALE_HEADER_ENV: [&str; 5] = [
    "HTTP_X_PARTIAL",
    "HTTP_X_PARTIAL_VERSION",
    "HTTP_X_PARTIAL_DATA",
    "HTTP_X_PARTIAL_COMPONENT",
    "HTTP_X_PARTIAL_EXCEPT",
];

/// One unit of work for the engine: a script to run, the environment to run
/// it under (applied in order, later entries win), optional request body,
/// and console arguments for administrative invocations.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub script: PathBuf,
    pub env: Vec<(String, String)>,
    pub body: Option<String>,
    pub args: Vec<String>,
}

impl Invocation {
    /// Synthesize the environment for a dynamic request against the front
    /// controller.
    ///
    /// `headers` must already carry the gateway's augmentations (cookie
    /// header, CSRF token) — this function maps them mechanically into the
    /// `HTTP_*` namespace.
    pub fn for_request(
        config: &ShellConfig,
        bundle_root: &Path,
        method: &str,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        body: Option<String>,
    ) -> Self {
        let script = bundle_root.join(&config.front_controller);

        let request_uri = match query {
            Some(q) if !q.is_empty() => format!("{path}?{q}"),
            _ => path.to_string(),
        };

        let mut env: Vec<(String, String)> = STALE_HEADER_ENV
            .iter()
            .map(|k| (k.to_string(), String::new()))
            .collect();

        env.push(("REMOTE_ADDR".into(), "0.0.0.0".into()));
        env.push(("REQUEST_METHOD".into(), method.to_uppercase()));
        env.push(("REQUEST_URI".into(), request_uri));
        env.push(("QUERY_STRING".into(), query.unwrap_or("").to_string()));
        env.push(("SCRIPT_FILENAME".into(), script.display().to_string()));
        env.push(("HTTP_HOST".into(), config.host.clone()));
        env.push(("APP_URL".into(), config.origin()));
        env.push(("ASSET_URL".into(), config.asset_url()));
        env.push(("SKIFF_PLATFORM".into(), config.platform.clone()));
        env.push(("SKIFF_RUNNING".into(), "true".into()));

        for (name, value) in headers.iter() {
            let key = format!("HTTP_{}", name.replace('-', "_").to_uppercase());
            env.push((key, value.to_string()));
        }

        Self {
            script,
            env,
            body,
            args: Vec::new(),
        }
    }

    /// Synthesize an administrative invocation (schema migration, cache
    /// clear) against the console entry script.
    pub fn for_command(config: &ShellConfig, bundle_root: &Path, args: &[&str]) -> Self {
        let script = bundle_root.join(&config.console_entry);
        let env = vec![
            ("APP_RUNNING_IN_CONSOLE".into(), "true".into()),
            ("SKIFF_PLATFORM".into(), config.platform.clone()),
            ("SKIFF_RUNNING".into(), "true".into()),
        ];
        Self {
            script,
            env,
            body: None,
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Last-write-wins view of a single environment key.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// The embedded interpreter.
///
/// Implementations are not reentrant — the [`crate::ExecutionQueue`] is the
/// only caller.  `run` blocks until the script has produced its full output.
pub trait ScriptEngine: Send {
    fn run(&mut self, invocation: &Invocation) -> Result<Vec<u8>>;
}

/// Repair a raw engine capture into a full HTTP-shaped response string.
///
/// Some backend execution paths emit a complete header block, some emit a
/// header block without a status line, and some error paths emit a bare JSON
/// object with no headers at all.  One known failure, a CSRF token mismatch,
/// is reported as bare 200 JSON by the backend and is forced to 419 here so
/// the webview's form handling sees the expired-page status it expects.
pub fn normalize_capture(raw: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| SkiffError::EncodingFailure(format!("capture is not UTF-8: {e}")))?;

    let trimmed = text.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
            let message = json.get("message").and_then(|m| m.as_str()).unwrap_or("");
            if message.contains("CSRF token mismatch") {
                debug!("CSRF token mismatch in bare JSON capture, forcing 419");
                return Ok(format!(
                    "HTTP/1.1 419 Page Expired\r\nContent-Type: application/json\r\nX-CSRF-Error: true\r\n\r\n{text}"
                ));
            }
            return Ok(format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{text}"
            ));
        }
        // Looked like JSON but didn't parse: fall through to header checks.
    }

    let lower = text.to_ascii_lowercase();
    if lower.contains("content-type:") || lower.contains("set-cookie:") {
        if !text.starts_with("HTTP/") {
            return Ok(format!("HTTP/1.1 200 OK\r\n{text}"));
        }
        return Ok(text.to_string());
    }

    Ok(format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n{text}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ShellConfig {
        ShellConfig {
            platform: "ios".into(),
            ..ShellConfig::default()
        }
    }

    #[test]
    fn request_env_contains_cgi_variables() {
        let config = test_config();
        let mut headers = HeaderMap::new();
        headers.insert("Accept", "text/html");
        headers.insert("X-Custom-Header", "yes");

        let inv = Invocation::for_request(
            &config,
            Path::new("/data/app"),
            "post",
            "/login",
            Some("next=%2F"),
            &headers,
            Some("email=a".into()),
        );

        assert_eq!(inv.env_value("REQUEST_METHOD"), Some("POST"));
        assert_eq!(inv.env_value("REQUEST_URI"), Some("/login?next=%2F"));
        assert_eq!(inv.env_value("QUERY_STRING"), Some("next=%2F"));
        assert_eq!(inv.env_value("HTTP_HOST"), Some("127.0.0.1"));
        assert_eq!(inv.env_value("APP_URL"), Some("skiff://127.0.0.1"));
        assert_eq!(inv.env_value("ASSET_URL"), Some("skiff://127.0.0.1/_assets/"));
        assert_eq!(inv.env_value("SKIFF_PLATFORM"), Some("ios"));
        assert_eq!(inv.env_value("HTTP_ACCEPT"), Some("text/html"));
        assert_eq!(inv.env_value("HTTP_X_CUSTOM_HEADER"), Some("yes"));
        assert_eq!(inv.body.as_deref(), Some("email=a"));
    }

    #[test]
    fn stale_partial_headers_are_cleared_before_request_headers() {
        let config = test_config();
        let mut headers = HeaderMap::new();
        headers.insert("X-Partial", "true");

        let inv = Invocation::for_request(
            &config,
            Path::new("/data/app"),
            "GET",
            "/",
            None,
            &headers,
            None,
        );

        // The clearing entry comes first, the request header later: applied
        // in order, the request's own value wins.
        let positions: Vec<usize> = inv
            .env
            .iter()
            .enumerate()
            .filter(|(_, (k, _))| k == "HTTP_X_PARTIAL")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(positions.len(), 2);
        assert_eq!(inv.env[positions[0]].1, "");
        assert_eq!(inv.env[positions[1]].1, "true");
        assert_eq!(inv.env_value("HTTP_X_PARTIAL"), Some("true"));

        // Headers absent from the request stay cleared.
        assert_eq!(inv.env_value("HTTP_X_PARTIAL_DATA"), Some(""));
    }

    #[test]
    fn command_invocation_marks_console() {
        let config = test_config();
        let inv = Invocation::for_command(&config, Path::new("/data/app"), &["migrate", "--force"]);
        assert_eq!(inv.env_value("APP_RUNNING_IN_CONSOLE"), Some("true"));
        assert_eq!(inv.args, vec!["migrate", "--force"]);
        assert!(inv.script.ends_with("vendor/skiff/bootstrap/console.main"));
    }

    #[test]
    fn normalize_passes_complete_captures_through() {
        let raw = b"HTTP/1.1 302 Found\r\nLocation: /home\r\nContent-Type: text/html\r\n\r\nredirecting";
        let out = normalize_capture(raw).expect("normalize");
        assert_eq!(out, String::from_utf8_lossy(raw));
    }

    #[test]
    fn normalize_prepends_status_line_when_missing() {
        let raw = b"Content-Type: text/html\r\n\r\n<p>hi</p>";
        let out = normalize_capture(raw).expect("normalize");
        assert!(out.starts_with("HTTP/1.1 200 OK\r\nContent-Type: text/html"));
    }

    #[test]
    fn normalize_wraps_bare_json_as_200() {
        let out = normalize_capture(b"{\"data\":{\"ok\":true}}").expect("normalize");
        assert!(out.starts_with("HTTP/1.1 200 OK\r\nContent-Type: application/json"));
        assert!(out.ends_with("{\"data\":{\"ok\":true}}"));
    }

    #[test]
    fn normalize_forces_419_on_csrf_mismatch() {
        let out = normalize_capture(b"{\"message\":\"CSRF token mismatch.\"}").expect("normalize");
        assert!(out.starts_with("HTTP/1.1 419 Page Expired"));
        assert!(out.contains("X-CSRF-Error: true"));
    }

    #[test]
    fn normalize_wraps_plain_text_as_html() {
        let out = normalize_capture(b"it broke").expect("normalize");
        assert!(out.starts_with("HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\nit broke"));
    }

    #[test]
    fn normalize_rejects_invalid_utf8() {
        let err = normalize_capture(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, SkiffError::EncodingFailure(_)));
    }
}
