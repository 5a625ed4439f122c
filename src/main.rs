// =============================================================================
// Argus Intel Engine — Main Entry Point
// =============================================================================
//
// A long-running aggregator: polls and streams two market-data vendors,
// fuses the feeds per ticker into directional signals, and drives a
// simulated paper-trading journal. State is best-effort snapshotted to disk
// and reconstructed from the upstream APIs on restart.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod alerts;
mod api;
mod app_state;
mod clients;
mod config;
mod journal;
mod orchestrator;
mod persist;
mod scanner;
mod scheduler;
mod signal;
mod store;
mod ta;
mod types;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::clients::rate_limit::SlidingWindowLimiter;
use crate::clients::{FlowClient, FlowSocket, TickClient, TickSocket};
use crate::config::EngineConfig;
use crate::orchestrator::Orchestrator;
use crate::persist::PersistStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Argus Intel Engine — Starting Up                  ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = EngineConfig::load("engine_config.json").unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        EngineConfig::default()
    });

    // Override the watchlist from env if provided.
    if let Ok(tickers) = std::env::var("ARGUS_TICKERS") {
        let parsed: Vec<String> = tickers
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if !parsed.is_empty() {
            config.tickers = parsed;
        }
    }

    info!(tickers = ?config.tickers, "Configured watchlist");
    info!(
        daily_limit = config.daily_limit,
        safety_margin = config.safety_margin,
        "API budget configured"
    );

    // ── 2. Persistence & shared state ────────────────────────────────────
    let data_dir = std::env::var("ARGUS_DATA_DIR").unwrap_or_else(|_| config.data_dir.clone());
    let persist = PersistStore::new(&data_dir)?;
    let versions = persist.load_signal_versions();
    info!(active_version = %versions.active_version, "signal version bucket");

    let state = Arc::new(AppState::new(config, persist, versions.active_version));

    // Restore counters and the cached state from the previous run.
    if let Some(cache) = state.persist.load_state_cache() {
        let counters = crate::scheduler::SchedulerCounters {
            daily_call_count: cache.daily_call_count,
            cycle_count: cache.cycle_count,
            last_reset_date: cache.last_reset_date.clone(),
        };
        state.governor.restore(&counters, chrono::Utc::now());
        state.tier_wheel.restore(cache.cycle_count);
        state.store.restore(cache.state);
        info!(
            cycle_count = cache.cycle_count,
            saved_at = %cache.saved_at,
            "state cache restored"
        );
    }

    // A corrupted journal is fatal: exit nonzero so the host restarts us.
    if let Some(journal_file) = state.persist.load_journal()? {
        info!(trades = journal_file.trades.len(), "trade journal restored");
        state.journal.load_from(journal_file);
    }

    // ── 3. Upstream clients ──────────────────────────────────────────────
    let flow_token = std::env::var("ARGUS_FLOW_TOKEN").unwrap_or_default();
    let tick_token = std::env::var("ARGUS_TICK_TOKEN").unwrap_or_default();
    if flow_token.is_empty() || tick_token.is_empty() {
        warn!("vendor tokens missing — upstream calls will be rejected");
    }

    let flow_limiter = Arc::new(SlidingWindowLimiter::default());
    let tick_limiter = Arc::new(SlidingWindowLimiter::default());

    let flow_client = Arc::new(FlowClient::new(
        flow_token.clone(),
        flow_limiter,
        state.governor.clone(),
    ));
    let tick_client = Arc::new(TickClient::new(
        tick_token.clone(),
        tick_limiter,
        state.governor.clone(),
    ));

    // ── 4. WebSocket streams ─────────────────────────────────────────────
    {
        let store = state.store.clone();
        let store2 = state.store.clone();
        let flow_ws = FlowSocket::new(flow_token, state.ws_tickers.clone());
        tokio::spawn(flow_ws.run(
            Arc::new(move |item: crate::store::FlowItem| store.push_options_flow(item)),
            Arc::new(move |print: crate::store::DarkPoolPrint| store2.push_dark_pool_recent(print)),
        ));
    }
    {
        let tick_ws = TickSocket::new(tick_token, state.ws_tickers.clone(), state.tick_cache.clone());
        tokio::spawn(tick_ws.run());
    }
    info!("vendor WebSocket streams launched");

    // ── 5. API server ────────────────────────────────────────────────────
    let api_state = state.clone();
    let bind_addr = std::env::var("ARGUS_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".into());
    let bind_addr_clone = bind_addr.clone();

    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        let listener = tokio::net::TcpListener::bind(&bind_addr_clone)
            .await
            .expect("Failed to bind API server");
        info!(addr = %bind_addr_clone, "API server listening");
        axum::serve(listener, app).await.expect("API server failed");
    });

    // ── 6. Polling orchestrator ──────────────────────────────────────────
    let orchestrator = Arc::new(Orchestrator::new(
        state.clone(),
        flow_client,
        tick_client,
    ));
    tokio::spawn(orchestrator.run());

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 7. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — snapshotting state");

    if let Err(e) = state
        .persist
        .save_state_cache(&state.scheduler_counters(), state.store.snapshot())
    {
        error!(error = %e, "Failed to save state cache on shutdown");
    }
    if let Err(e) = state.persist.save_journal(&state.journal.to_file()) {
        error!(error = %e, "Failed to save journal on shutdown");
    }

    info!("Argus Intel Engine shut down complete.");
    Ok(())
}
