//! `ace-daemon`: long-running HTTP service surface (§6). Resolves
//! configuration once at startup and serves the control-plane endpoints
//! over it until killed.

mod bootstrap;
mod daily;
mod error;
mod routes;
mod state;
mod webhook;

use std::sync::Arc;

use ace_pool::{PoolScheduler, ResourceReclaimer};

use daily::DailyScheduler;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Arc::new(ace_core::config::AceConfig::resolve());
    let metrics_handle = ace_core::metrics::install();

    let deps = bootstrap::build_deps(&config)?;
    let builder = bootstrap::build_queue_builder(&config, deps.board.clone());
    let (workspace, sessions, deps_config) =
        (deps.workspace.clone(), deps.sessions.clone(), deps.config.clone());

    let scheduler = PoolScheduler::new(config.max_agents, builder, deps, None);
    let daily = DailyScheduler::new(scheduler.clone(), config.clone());

    let reclaimer = Arc::new(ResourceReclaimer::new(
        workspace,
        sessions,
        scheduler.clone(),
        deps_config,
    ));
    tokio::spawn(run_reclaim_loop(reclaimer, config.cleanup_interval_seconds));

    let state = AppState {
        scheduler,
        config: config.clone(),
        metrics_handle,
        daily,
    };

    let bind = std::env::var("ACE_DAEMON_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("ACE_DAEMON_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);

    routes::run_serve(state, &bind, port).await
}

/// Ticks the Resource Reclaimer on its own cadence for the lifetime of the
/// process. `tick()` self-gates on `cleanupIntervalSeconds`, so waking up
/// more often than that just costs a cheap no-op check.
async fn run_reclaim_loop(reclaimer: Arc<ResourceReclaimer>, interval_seconds: u64) {
    let period = std::time::Duration::from_secs(interval_seconds.max(1));
    loop {
        tokio::time::sleep(period).await;
        let outcome = reclaimer.tick().await;
        if outcome.worktrees_removed > 0 || outcome.sessions_killed > 0 {
            tracing::info!(
                worktrees_removed = outcome.worktrees_removed,
                sessions_killed = outcome.sessions_killed,
                "resource reclaimer swept stale state"
            );
        }
    }
}
