// SPDX-License-Identifier: MIT
//
// Skiff — embedded web-app shell.
//
// Entry point. Initialises logging and backend services, runs the launch
// update pass, then stays resident handling lifecycle events until the
// process is told to stop. The platform webview calls into the gateway and
// bridge through the `AppServices` handle.

mod services;

use services::app_services::AppServices;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Skiff starting");

    let services = match AppServices::init() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "service initialisation failed");
            std::process::exit(1);
        }
    };

    // Subscribe before the update pass can emit; a receiver created later
    // would miss an UpdateInstalled from a fast install.
    let event_rx = services.events.subscribe();
    let event_services = services.clone();
    tokio::spawn(async move { event_services.run_event_loop(event_rx).await });

    let update_services = services.clone();
    tokio::spawn(async move { update_services.check_and_install_update().await });

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "signal handler failed");
    }

    tracing::info!("Skiff shutting down");
    services.queue.shutdown().await;
}
