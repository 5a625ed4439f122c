// =============================================================================
// API Module — the engine's outward boundary
// =============================================================================
//
// REST endpoints for snapshots and gated actions, plus the WebSocket push
// feed. No business logic lives here: handlers read AppState and serialise.

pub mod auth;
pub mod rest;
pub mod ws;
