// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Everything lives under `/api/v1/`. The health probe is public; all other
// endpoints require a valid Bearer token via the `AuthBearer` extractor.
// CORS is permissive for development.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api::auth::AuthBearer;
use crate::app_state::AppState;

/// Build the REST router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Public ──────────────────────────────────────────────────
        .route("/api/v1/health", get(health))
        // ── Authenticated ───────────────────────────────────────────
        .route("/api/v1/state", get(full_state))
        .route("/api/v1/setups", get(setups))
        .route("/api/v1/alerts", get(alerts))
        .route("/api/v1/scanner", get(scanner_results))
        .route("/api/v1/budget", get(budget))
        .route("/api/v1/journal", get(journal))
        .route("/api/v1/journal/stats", get(journal_stats))
        .route("/api/v1/journal/training", get(journal_training))
        .route("/api/v1/journal/close", post(journal_close))
        .route("/api/v1/watchlist", post(set_watchlist))
        // ── WebSocket push feed ─────────────────────────────────────
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        // ── Middleware & state ──────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health (public)
// =============================================================================

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "state_version": state.current_state_version(),
        "server_time": chrono::Utc::now().timestamp_millis(),
    }))
}

// =============================================================================
// Snapshots (authenticated)
// =============================================================================

async fn full_state(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_snapshot())
}

async fn setups(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.store.setups_map())
}

async fn alerts(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.store.alerts())
}

async fn scanner_results(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    Json(state.store.discoveries())
}

async fn budget(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "used_today": state.governor.used_today(),
        "ceiling": state.governor.ceiling(),
        "within_budget": state.governor.is_within_budget(),
        "cycle_count": state.tier_wheel.cycle_count(),
    }))
}

// =============================================================================
// Journal (authenticated)
// =============================================================================

async fn journal(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.journal.all_trades())
}

async fn journal_stats(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    Json(state.journal.stats())
}

/// Labelled feature rows for the offline training pipeline.
async fn journal_training(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    Json(state.journal.training_data())
}

#[derive(Deserialize)]
struct CloseRequest {
    trade_id: String,
}

/// Explicit close request. Gate failures surface as a typed `{error}` body,
/// never a 5xx.
async fn journal_close(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CloseRequest>,
) -> impl IntoResponse {
    let now = chrono::Utc::now();

    let price = state
        .journal
        .open_trades()
        .iter()
        .find(|t| t.id == req.trade_id)
        .and_then(|t| state.store.quote(&t.ticker).map(|q| q.last).or(Some(t.entry)));

    let Some(price) = price else {
        return (
            StatusCode::OK,
            Json(serde_json::json!({ "error": "unknown or already closed trade" })),
        );
    };

    match state.journal.close_trade(&req.trade_id, price, now) {
        Some(trade) => {
            if let Err(e) = state.persist.save_journal(&state.journal.to_file()) {
                state.push_error(format!("journal persist: {e}"));
            }
            state.increment_version();
            info!(id = %trade.id, status = %trade.status, "trade closed via API");
            (StatusCode::OK, Json(serde_json::json!({ "closed": trade })))
        }
        None => (
            StatusCode::OK,
            Json(serde_json::json!({ "error": "unknown or already closed trade" })),
        ),
    }
}

// =============================================================================
// Watchlist (authenticated)
// =============================================================================

#[derive(Deserialize)]
struct WatchlistRequest {
    tickers: Vec<String>,
}

/// Replace the watchlist. Tickers are validated (1-5 uppercase letters);
/// invalid entries are reported back, not silently dropped.
async fn set_watchlist(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(req): Json<WatchlistRequest>,
) -> impl IntoResponse {
    let mut valid = Vec::new();
    let mut rejected = Vec::new();

    for raw in req.tickers {
        let t = raw.trim().to_uppercase();
        if !t.is_empty() && t.len() <= 5 && t.chars().all(|c| c.is_ascii_uppercase()) {
            if !valid.contains(&t) {
                valid.push(t);
            }
        } else {
            rejected.push(raw);
        }
    }

    if valid.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "no valid tickers", "rejected": rejected })),
        );
    }

    state.store.set_tickers(valid.clone());
    *state.ws_tickers.write() = valid.clone();
    state.config.write().tickers = valid.clone();
    state.increment_version();

    info!(count = valid.len(), "watchlist replaced via API");
    (
        StatusCode::OK,
        Json(serde_json::json!({ "tickers": valid, "rejected": rejected })),
    )
}
