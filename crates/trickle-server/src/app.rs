//! Route table and process lifecycle

use crate::config::AppConfig;
use crate::scenarios;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use trickle_core::diagnostics::{base_url, list_html, local_ipv4, reachable_urls};
use trickle_core::{bind, serve, ConnectionTracker, Result, ServerState};

/// Register every route and the static mount
pub fn build_state(config: &AppConfig) -> Result<Arc<ServerState>> {
    let state = ServerState::new();

    state.get("/", |_req| async { scenarios::hello() });
    state.get("/a", |_req| async { scenarios::hello() });

    let template = config.referrer_template();
    state.get("/stream/referrer-test", move |_req| {
        let template = template.clone();
        async move { scenarios::referrer_test(&template).await }
    });
    state.get("/stream/slow-stream", |_req| async { scenarios::slow_stream() });
    state.get("/stream/scanAndPreload", |_req| async { scenarios::scan_and_preload() });

    state.mount(&config.static_mount, config.static_files())?;

    Ok(Arc::new(state))
}

/// Registered routes, then every `.html` file under the static root
pub fn startup_urls(state: &ServerState, config: &AppConfig, base: &str) -> Vec<String> {
    let static_root = config.static_root();
    reachable_urls(base, &state.routes(), &config.static_mount, list_html(&static_root))
}

/// Bind, announce, serve until Ctrl-C, then let open streams finish
pub async fn run(config: AppConfig) -> Result<()> {
    let state = build_state(&config)?;
    let listener = bind(&config.server)?;

    let base = base_url(local_ipv4(), config.server.port);
    debug!(root = %config.asset_root.display(), "serving assets");
    info!(addr = %listener.local_addr()?, "app is listening at {}, here are all routes:", base);
    for url in startup_urls(&state, &config, &base) {
        info!("{}", url);
    }

    let tracker = Arc::new(ConnectionTracker::new());
    serve(listener, state, tracker.clone(), shutdown_signal()).await?;

    if !tracker.wait_for_drain(config.drain_timeout).await {
        warn!(active = tracker.active(), "stopping with connections still open");
    }
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
