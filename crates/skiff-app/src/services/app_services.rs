// SPDX-License-Identifier: MIT
//
// Central service layer — initialises the bundle, engine queue, gateway,
// bridge registry and update manager, and reacts to lifecycle events.
//
// All fields are cheaply cloneable (Arc-wrapped) so the struct can be passed
// into the webview callbacks and spawned tasks without lifetime issues.

use std::path::PathBuf;
use std::sync::Arc;

use skiff_bridge::builtins::{register_builtins, BuiltinContext};
use skiff_bridge::{platform_shell, BridgeRegistry, PlatformShell};
use skiff_core::error::{Result, SkiffError};
use skiff_core::{EventBus, LifecycleEvent, ShellConfig};
use skiff_gateway::{JsonFileCookieStore, RequestGateway};
use skiff_runtime::{ExecutionQueue, ProcessEngine, ScriptEngine};
use skiff_update::{BundleLayout, UpdateClient, UpdateManager};
use tracing::{error, info, warn};

use super::data_dir;

/// Shared application services for the host shell.
#[derive(Clone)]
pub struct AppServices {
    pub config: ShellConfig,
    pub events: EventBus,
    pub queue: Arc<ExecutionQueue>,
    pub gateway: Arc<RequestGateway>,
    pub registry: Arc<BridgeRegistry>,
    pub updates: Arc<UpdateManager>,
    pub shell: Arc<dyn PlatformShell>,
    data_dir: PathBuf,
}

impl AppServices {
    /// Initialise all services. Call once at app startup.
    ///
    /// Seeds the bundle from the packaged archive when `SKIFF_BUNDLE` (and
    /// `SKIFF_BUNDLE_VERSION`) point at one; otherwise the previously
    /// installed bundle must already be present.
    pub fn init() -> Result<Self> {
        let dir = data_dir::data_dir();
        info!(path = %dir.display(), "initialising app services");

        let mut config = ShellConfig::default();
        config.platform = platform_name().to_string();
        if let Ok(endpoint) = std::env::var("SKIFF_UPDATE_ENDPOINT") {
            config.update_endpoint = Some(endpoint);
        }

        let events = EventBus::default();
        let layout = BundleLayout::new(dir.join("bundle"));
        let updates = Arc::new(UpdateManager::new(
            layout,
            config.clone(),
            events.clone(),
            cfg!(debug_assertions),
        ));

        let bundle_root = match packaged_bundle() {
            Some((archive, version)) => updates.ensure_app_exists(&archive, &version)?,
            None => {
                let app_dir = updates.layout().app_dir();
                updates.validate_bundle(&app_dir).map_err(|e| {
                    SkiffError::InvalidBundleStructure(format!(
                        "no packaged bundle configured and no installed bundle found: {e}"
                    ))
                })?;
                app_dir
            }
        };

        // Finish any update that was downloaded but never installed.
        if let Err(e) = updates.apply_pending_update() {
            warn!(error = %e, "pending update scan failed");
        }

        let queue = Arc::new(ExecutionQueue::start(build_engine()?));
        let gateway = Arc::new(
            RequestGateway::new(
                config.clone(),
                bundle_root,
                Arc::clone(&queue),
                events.clone(),
            )
            .with_cookie_store(Arc::new(JsonFileCookieStore::new(dir.join("cookies.json")))),
        );

        let shell = platform_shell();
        let registry = Arc::new(BridgeRegistry::new());
        register_builtins(
            &registry,
            BuiltinContext {
                app_version: updates.installed_version(),
                shell: Arc::clone(&shell),
                events: events.clone(),
            },
        );

        info!(
            version = %updates.installed_version(),
            origin = %config.origin(),
            "app services initialised"
        );

        Ok(Self {
            config,
            events,
            queue,
            gateway,
            registry,
            updates,
            shell,
            data_dir: dir,
        })
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    /// React to lifecycle events until the bus closes. Spawn once, with a
    /// receiver subscribed before anything that can emit: a broadcast
    /// subscription only sees events sent after it exists, so subscribing
    /// inside the spawned task could miss an install that finishes first.
    pub async fn run_event_loop(
        &self,
        mut rx: tokio::sync::broadcast::Receiver<LifecycleEvent>,
    ) {
        loop {
            match rx.recv().await {
                Ok(LifecycleEvent::UpdateInstalled { version, .. }) => {
                    info!(%version, "update installed, running post-install commands");
                    if let Err(e) = self.gateway.run_command(&["migrate", "--force"]).await {
                        error!(error = %e, "post-install migration failed");
                    }
                    self.events.emit(LifecycleEvent::ReloadRequested);
                }
                Ok(LifecycleEvent::NavigateExternal { url }) => {
                    if let Err(e) = self.shell.open_external(&url) {
                        warn!(%url, error = %e, "could not open external browser");
                    }
                }
                Ok(LifecycleEvent::ReloadRequested) => {
                    // Consumed by the webview layer; nothing to do here.
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event loop lagged behind the bus");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    /// One launch-time update pass: check, download, install.
    ///
    /// Failures are logged and swallowed; the app keeps running on the
    /// bundle it has.
    pub async fn check_and_install_update(&self) {
        let Some(endpoint) = self.config.update_endpoint.clone() else {
            return;
        };
        let installed = self.updates.installed_version();
        if installed == skiff_core::DEBUG_VERSION {
            info!("development bundle, skipping remote update check");
            return;
        }
        let endpoint = match &self.config.app_id {
            Some(app_id) => format!("{}/{app_id}/ota", endpoint.trim_end_matches('/')),
            None => endpoint,
        };

        let client = match UpdateClient::new(endpoint) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "update client unavailable");
                return;
            }
        };
        let check = match client.check(&installed).await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "update check failed");
                return;
            }
        };
        if check.up_to_date {
            info!(%installed, "bundle is up to date");
            return;
        }
        let (Some(url), Some(version)) = (check.download_url, check.current_version) else {
            warn!("update offered without download_url or current_version");
            return;
        };
        if !skiff_core::is_compatible_upgrade(&installed, &version) {
            info!(%installed, offered = %version, "ignoring incompatible remote update");
            return;
        }

        match client.download(self.updates.layout(), &url, &version).await {
            Ok(archive) => {
                if let Err(e) = self.updates.install_update(&archive, &version) {
                    warn!(error = %e, %version, "update install rejected");
                }
            }
            Err(e) => warn!(error = %e, "update download failed"),
        }
    }
}

/// Engine selection for this build.
///
/// Desktop builds run the interpreter as a subprocess named by
/// `SKIFF_ENGINE`; mobile builds link it in and register their own
/// [`ScriptEngine`] before starting the queue.
fn build_engine() -> Result<Box<dyn ScriptEngine>> {
    let command = std::env::var("SKIFF_ENGINE")
        .map_err(|_| SkiffError::Engine("SKIFF_ENGINE is not set".into()))?;
    Ok(Box::new(ProcessEngine::new(command)))
}

/// The packaged archive and its version. The version comes from
/// `SKIFF_BUNDLE_VERSION` when the packager set it, otherwise from the
/// archive's own `.env` entry, read without extracting the rest.
fn packaged_bundle() -> Option<(PathBuf, String)> {
    let archive = PathBuf::from(std::env::var("SKIFF_BUNDLE").ok()?);
    let version = match std::env::var("SKIFF_BUNDLE_VERSION") {
        Ok(version) => version,
        Err(_) => match skiff_update::archive_env_version(&archive) {
            Ok(Some(version)) => version,
            Ok(None) => "0.0.0".into(),
            Err(e) => {
                warn!(error = %e, "could not read packaged bundle version");
                "0.0.0".into()
            }
        },
    };
    Some((archive, version))
}

fn platform_name() -> &'static str {
    if cfg!(target_os = "ios") {
        "ios"
    } else if cfg!(target_os = "android") {
        "android"
    } else {
        "desktop"
    }
}
