// SPDX-License-Identifier: MIT
//
// Core domain types for the Skiff app shell.

/// Case-insensitive header mapping with unique keys.
///
/// Lookup ignores ASCII case; the casing of the first insertion is preserved
/// so headers echoed back to the webview keep their original form. Repeated
/// inserts replace the value (last write wins).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a header. The stored key keeps the casing it had
    /// when first inserted.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            Some((_, v)) => *v = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Add a header without replacing existing entries of the same name.
    /// Needed for multi-valued headers, `Set-Cookie` in practice.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values stored under `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let pos = self
            .entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(pos).1)
    }

    /// Iterate in insertion order, original casing.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S1: Into<String>, S2: Into<String>> FromIterator<(S1, S2)> for HeaderMap {
    fn from_iter<T: IntoIterator<Item = (S1, S2)>>(iter: T) -> Self {
        let mut map = HeaderMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// A navigation or resource request issued by the webview layer.
///
/// `url` is the full URL as issued (e.g. `skiff://127.0.0.1/login?next=%2F`).
/// The gateway decides whether it targets the reserved pseudo-origin.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub url: String,
    pub body: Option<String>,
    pub headers: HeaderMap,
}

impl Request {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// A structured HTTP-shaped response handed back to the webview layer.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("Content-Type")
    }

    /// Whether a `Location` header marks this response as non-terminal.
    pub fn is_redirect(&self) -> bool {
        self.headers.contains("Location")
    }

    /// A response may drive native UI state only when it is a successful
    /// HTML or JSON payload.
    pub fn is_ui_eligible(&self) -> bool {
        if !(200..300).contains(&self.status) {
            return false;
        }
        match self.content_type() {
            Some(ct) => ct.contains("text/html") || ct.contains("application/json"),
            None => false,
        }
    }

    pub fn body_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", "text/html");
        assert_eq!(headers.get("content-type"), Some("text/html"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/html"));
    }

    #[test]
    fn header_insert_is_last_write_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Test", "one");
        headers.insert("x-test", "two");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("X-Test"), Some("two"));
        // Original casing is preserved for iteration.
        let keys: Vec<_> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["X-Test"]);
    }

    #[test]
    fn append_keeps_duplicates_for_multi_valued_headers() {
        let mut headers = HeaderMap::new();
        headers.append("Set-Cookie", "a=1");
        headers.append("Set-Cookie", "b=2");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("set-cookie"), Some("a=1"));
        let all: Vec<_> = headers.get_all("Set-Cookie").collect();
        assert_eq!(all, vec!["a=1", "b=2"]);
    }

    #[test]
    fn ui_eligibility_requires_2xx_and_html_or_json() {
        let mut resp = Response::new(200);
        resp.headers.insert("Content-Type", "text/html; charset=utf-8");
        assert!(resp.is_ui_eligible());

        resp.status = 302;
        assert!(!resp.is_ui_eligible());

        resp.status = 200;
        resp.headers.insert("Content-Type", "image/png");
        assert!(!resp.is_ui_eligible());

        resp.headers.insert("Content-Type", "application/json");
        assert!(resp.is_ui_eligible());
    }

    #[test]
    fn redirect_detection_uses_location_header() {
        let mut resp = Response::new(302);
        assert!(!resp.is_redirect());
        resp.headers.insert("Location", "/dashboard");
        assert!(resp.is_redirect());
    }
}
