// SPDX-License-Identifier: MIT
//
// Pseudo-origin request interception.
//
// The gateway answers every request the webview addresses to the reserved
// origin. Redirect chasing happens here, not in the webview: a login POST
// that bounces through three 302s surfaces as a single final page, so the
// webview never re-issues the POST and never sees an intermediate URL.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use percent_encoding::percent_decode_str;
use skiff_core::error::{Result, SkiffError};
use skiff_core::{EventBus, HeaderMap, LifecycleEvent, Request, Response, ShellConfig};
use skiff_runtime::{normalize_capture, ExecutionQueue, Invocation};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::assets::{self, AssetBody, AssetStream};
use crate::cookies::{CookieJar, CookieStore};
use crate::http::{internal_error_response, parse_engine_response};

/// Session cookie the backend issues for CSRF double-submit.
const CSRF_COOKIE: &str = "XSRF-TOKEN";
/// Request header the backend checks the token against.
const CSRF_HEADER: &str = "X-XSRF-TOKEN";

/// Outcome of an interception attempt.
#[derive(Debug)]
pub enum Intercept {
    /// Fully materialized response, hand it to the webview.
    Response(Response),
    /// Large asset served as a chunked stream.
    Stream(StreamedAsset),
    /// The chain left the pseudo-origin; the host should open the system
    /// browser (an event has already been emitted).
    External { url: String },
    /// Not addressed to the pseudo-origin at all.
    NotHandled,
}

/// Response head plus a body that arrives in chunks.
#[derive(Debug)]
pub struct StreamedAsset {
    pub status: u16,
    pub headers: HeaderMap,
    pub stream: AssetStream,
}

/// The pseudo-origin endpoint.
pub struct RequestGateway {
    config: ShellConfig,
    bundle_root: PathBuf,
    queue: Arc<ExecutionQueue>,
    jar: Mutex<CookieJar>,
    store: Option<Arc<dyn CookieStore>>,
    events: EventBus,
}

impl RequestGateway {
    pub fn new(
        config: ShellConfig,
        bundle_root: PathBuf,
        queue: Arc<ExecutionQueue>,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            bundle_root,
            queue,
            jar: Mutex::new(CookieJar::new()),
            store: None,
            events,
        }
    }

    /// Attach a persistent cookie store. Loads existing cookies eagerly;
    /// a corrupt or unreadable store starts the jar empty rather than
    /// failing startup.
    pub fn with_cookie_store(mut self, store: Arc<dyn CookieStore>) -> Self {
        match store.load() {
            Ok(cookies) => {
                info!(count = cookies.len(), "cookie jar restored");
                self.jar = Mutex::new(CookieJar::restore(cookies));
            }
            Err(e) => warn!(error = %e, "cookie store unreadable, starting empty"),
        }
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// Handle one webview request.
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    pub async fn intercept(&self, request: Request) -> Result<Intercept> {
        let Ok(parsed) = Url::parse(&request.url) else {
            warn!("unparseable request URL");
            return Ok(Intercept::NotHandled);
        };
        if !self.is_pseudo_origin(&parsed) {
            return Ok(Intercept::NotHandled);
        }

        if let Some(asset_path) = parsed.path().strip_prefix(self.config.asset_prefix.as_str()) {
            if let Some(intercept) = self.serve_asset(asset_path, &request)? {
                return Ok(intercept);
            }
            // Not on disk: the backend may still route it.
            debug!(path = asset_path, "asset miss, falling through to engine");
        }

        self.run_chain(request, parsed).await
    }

    /// Run a console command inside the bundle (migrations, cache clears).
    /// Output is the raw captured text, not an HTTP message.
    pub async fn run_command(&self, args: &[&str]) -> Result<String> {
        let invocation = Invocation::for_command(&self.config, &self.bundle_root, args);
        let raw = self.queue.submit(invocation).await?;
        String::from_utf8(raw).map_err(|e| SkiffError::EncodingFailure(e.to_string()))
    }

    fn is_pseudo_origin(&self, url: &Url) -> bool {
        url.scheme() == self.config.scheme && url.host_str() == Some(self.config.host.as_str())
    }

    // -----------------------------------------------------------------------
    // Static assets
    // -----------------------------------------------------------------------

    fn serve_asset(&self, asset_path: &str, request: &Request) -> Result<Option<Intercept>> {
        let public_root = self.bundle_root.join("public");
        let range = request.headers.get("Range");
        let served = assets::serve(
            &public_root,
            asset_path,
            range,
            self.config.stream_threshold,
            self.config.stream_chunk_size,
        )?;

        let Some(served) = served else {
            return Ok(None);
        };

        Ok(Some(match served.body {
            AssetBody::Full(body) => Intercept::Response(Response {
                status: served.status,
                headers: served.headers,
                body,
            }),
            AssetBody::Stream(stream) => Intercept::Stream(StreamedAsset {
                status: served.status,
                headers: served.headers,
                stream,
            }),
        }))
    }

    // -----------------------------------------------------------------------
    // Dynamic requests
    // -----------------------------------------------------------------------

    async fn run_chain(&self, request: Request, mut current: Url) -> Result<Intercept> {
        let mut method = request.method.clone();
        let mut body = request.body.clone();
        let mut base_headers = request.headers.clone();

        let mut hops = 0u32;
        loop {
            let response = self.dispatch(&method, &current, &base_headers, body.take()).await?;

            self.absorb_cookies(&response);

            if !response.is_redirect() {
                return Ok(Intercept::Response(response));
            }

            let location = match response.headers.get("Location") {
                Some(l) => l.to_string(),
                None => return Ok(Intercept::Response(response)),
            };
            let Ok(target) = current.join(&location) else {
                warn!(%location, "unresolvable redirect target");
                return Ok(Intercept::Response(response));
            };

            if !self.is_pseudo_origin(&target) {
                info!(url = %target, "redirect leaves pseudo-origin");
                self.events.emit(LifecycleEvent::NavigateExternal {
                    url: target.to_string(),
                });
                return Ok(Intercept::External {
                    url: target.to_string(),
                });
            }

            hops += 1;
            if hops > self.config.max_redirects {
                return Err(SkiffError::TooManyRedirects(self.config.max_redirects));
            }
            debug!(hop = hops, to = %target, "following internal redirect");

            // Subsequent hops are plain GETs without the original payload.
            method = "GET".to_string();
            base_headers.remove("Content-Type");
            base_headers.remove("Content-Length");
            current = target;
        }
    }

    /// One engine round trip: inject cookies and CSRF token, invoke,
    /// normalize, parse. An engine-level failure becomes a synthesized 500
    /// page instead of aborting the interception.
    async fn dispatch(
        &self,
        method: &str,
        url: &Url,
        base_headers: &HeaderMap,
        body: Option<String>,
    ) -> Result<Response> {
        let path = request_path(url);
        let mut headers = base_headers.clone();
        self.prepare_headers(&mut headers, path);

        let invocation = Invocation::for_request(
            &self.config,
            &self.bundle_root,
            method,
            path,
            url.query(),
            &headers,
            body,
        );

        let raw = match self.queue.submit(invocation).await {
            Ok(raw) => raw,
            Err(SkiffError::Engine(detail)) => {
                warn!(error = %detail, "engine invocation failed");
                return Ok(internal_error_response(&detail));
            }
            Err(other) => return Err(other),
        };

        let text = normalize_capture(&raw)?;
        parse_engine_response(&text)
    }

    /// Replay the jar into the request and mirror the CSRF cookie into the
    /// header the backend verifies. The token is stored percent-encoded in
    /// the cookie but compared decoded.
    fn prepare_headers(&self, headers: &mut HeaderMap, path: &str) {
        let mut jar = lock(&self.jar);
        if let Some(cookie_header) = jar.header_for(&self.config.host, path) {
            headers.insert("Cookie", cookie_header);
        }
        if !headers.contains(CSRF_HEADER) {
            if let Some(token) = jar.value_of(CSRF_COOKIE, &self.config.host) {
                let decoded = percent_decode_str(token)
                    .decode_utf8()
                    .map(|t| t.into_owned())
                    .unwrap_or_else(|_| token.to_string());
                headers.insert(CSRF_HEADER, decoded);
            }
        }
    }

    fn absorb_cookies(&self, response: &Response) {
        let set_cookies: Vec<&str> = response.headers.get_all("Set-Cookie").collect();
        if set_cookies.is_empty() {
            return;
        }
        let snapshot = {
            let mut jar = lock(&self.jar);
            for value in set_cookies {
                jar.store(value, &self.config.host);
            }
            self.store.as_ref().map(|_| jar.snapshot())
        };
        if let (Some(store), Some(snapshot)) = (&self.store, snapshot) {
            if let Err(e) = store.save(&snapshot) {
                warn!(error = %e, "cookie persistence failed");
            }
        }
    }
}

/// A bare `skiff://127.0.0.1` parses with an empty path; the backend
/// expects the root as `/`.
fn request_path(url: &Url) -> &str {
    match url.path() {
        "" => "/",
        path => path,
    }
}

fn lock(jar: &Mutex<CookieJar>) -> std::sync::MutexGuard<'_, CookieJar> {
    match jar.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
