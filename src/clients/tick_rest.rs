// =============================================================================
// Tick Vendor REST Client — snapshots, aggregates, reference data
// =============================================================================
//
// Polygon-style endpoint families: `/v2/snapshot/...`, `/v2/aggs/ticker/...`,
// `/v3/reference/tickers/...`. Shares the limiter/governor plumbing with the
// flow vendor through `RestCore`.
// =============================================================================

use std::sync::Arc;

use chrono::Utc;

use crate::clients::adapters;
use crate::clients::rate_limit::SlidingWindowLimiter;
use crate::clients::RestCore;
use crate::scheduler::BudgetGovernor;
use crate::store::{Candle, Quote};

/// Default production base URL.
const DEFAULT_BASE_URL: &str = "https://api.polygon.io";
/// The tick vendor signals 429 resets through the standard Retry-After.
const RESET_HEADER: &str = "retry-after";

/// REST client for the tick vendor.
pub struct TickClient {
    core: RestCore,
}

impl TickClient {
    pub fn new(
        token: impl Into<String>,
        limiter: Arc<SlidingWindowLimiter>,
        governor: Arc<BudgetGovernor>,
    ) -> Self {
        Self {
            core: RestCore::new(DEFAULT_BASE_URL, token, RESET_HEADER, limiter, governor),
        }
    }

    /// Last-trade snapshot for one ticker.
    pub async fn snapshot(&self, ticker: &str) -> Option<Quote> {
        let body = self
            .core
            .rest_call(&format!("/v2/snapshot/locale/us/markets/stocks/tickers/{ticker}"), &[])
            .await?;

        // The snapshot nests the useful fields under `ticker.day` / `.lastTrade`.
        let root = body.get("ticker").unwrap_or(&body);
        let last = root
            .get("lastTrade")
            .and_then(|lt| lt.get("p"))
            .and_then(adapters::parse_f64)
            .or_else(|| root.get("day").and_then(|d| d.get("c")).and_then(adapters::parse_f64))?;
        if last <= 0.0 {
            return None;
        }

        let day = root.get("day").cloned().unwrap_or_default();
        let prev = root.get("prevDay").cloned().unwrap_or_default();
        let prev_close = prev.get("c").and_then(adapters::parse_f64).unwrap_or(last);

        Some(Quote {
            last,
            bid: root
                .get("lastQuote")
                .and_then(|q| q.get("bp"))
                .and_then(adapters::parse_f64)
                .unwrap_or(0.0),
            ask: root
                .get("lastQuote")
                .and_then(|q| q.get("ap"))
                .and_then(adapters::parse_f64)
                .unwrap_or(0.0),
            change: last - prev_close,
            change_pct: if prev_close > 0.0 {
                (last - prev_close) / prev_close * 100.0
            } else {
                0.0
            },
            day_open: day.get("o").and_then(adapters::parse_f64).unwrap_or(last),
            day_high: day.get("h").and_then(adapters::parse_f64).unwrap_or(last),
            day_low: day.get("l").and_then(adapters::parse_f64).unwrap_or(last),
            day_volume: day.get("v").and_then(adapters::parse_f64).unwrap_or(0.0),
            vwap: day.get("vw").and_then(adapters::parse_f64),
            prev_close,
            updated_at: Utc::now(),
        })
    }

    /// Daily bars, ascending, most recent `limit`.
    pub async fn daily_bars(&self, ticker: &str, from: &str, to: &str, limit: usize) -> Vec<Candle> {
        let params = [
            ("adjusted", "true".to_string()),
            ("sort", "asc".to_string()),
            ("limit", limit.to_string()),
        ];
        match self
            .core
            .rest_call(&format!("/v2/aggs/ticker/{ticker}/range/1/day/{from}/{to}"), &params)
            .await
        {
            Some(body) => adapters::parse_ohlc_bars(&body),
            None => Vec::new(),
        }
    }

    /// One-minute bars for the current session, ascending.
    pub async fn minute_bars(&self, ticker: &str, from: &str, to: &str, limit: usize) -> Vec<Candle> {
        let params = [
            ("adjusted", "true".to_string()),
            ("sort", "asc".to_string()),
            ("limit", limit.to_string()),
        ];
        match self
            .core
            .rest_call(&format!("/v2/aggs/ticker/{ticker}/range/1/minute/{from}/{to}"), &params)
            .await
        {
            Some(body) => adapters::parse_ohlc_bars(&body),
            None => Vec::new(),
        }
    }

    /// Session gainers or losers → (ticker, % change).
    pub async fn movers(&self, losers: bool) -> Vec<(String, f64)> {
        let direction = if losers { "losers" } else { "gainers" };
        match self
            .core
            .rest_call(&format!("/v2/snapshot/locale/us/markets/stocks/{direction}"), &[])
            .await
        {
            Some(body) => adapters::parse_movers(&body),
            None => Vec::new(),
        }
    }

    /// Reference lookup: whether a ticker is a known, active US equity.
    pub async fn ticker_exists(&self, ticker: &str) -> bool {
        self.core
            .rest_call(&format!("/v3/reference/tickers/{ticker}"), &[])
            .await
            .and_then(|body| body.get("results").cloned())
            .is_some()
    }
}

impl std::fmt::Debug for TickClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickClient").field("core", &self.core).finish()
    }
}
