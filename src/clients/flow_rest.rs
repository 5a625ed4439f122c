// =============================================================================
// Flow Vendor REST Client — options flow, dark pool, GEX, shorts, filings
// =============================================================================
//
// Thin typed wrappers over the vendor's endpoint families. Every helper is a
// `rest_call` through the shared core (rate limiter + 429 retry + budget
// accounting) followed by a narrow adapter; `None`/empty means "no data this
// cycle" and is never an error.
// =============================================================================

use std::sync::Arc;

use chrono::Utc;

use crate::clients::adapters;
use crate::clients::rate_limit::SlidingWindowLimiter;
use crate::clients::RestCore;
use crate::scheduler::BudgetGovernor;
use crate::store::{
    Candle, CongressTrade, DarkPoolPrint, EconomicEvent, FlowItem, FtdRecord, GexProfile,
    MarketTide, NetImpactRow, NewsItem, Quote, ShortInterestRecord,
};

/// Default production base URL.
const DEFAULT_BASE_URL: &str = "https://api.unusualwhales.com/api";
/// Header carrying the 429 reset hint.
const RESET_HEADER: &str = "x-uw-req-per-minute-reset";

/// REST client for the flow vendor.
pub struct FlowClient {
    core: RestCore,
}

impl FlowClient {
    pub fn new(
        token: impl Into<String>,
        limiter: Arc<SlidingWindowLimiter>,
        governor: Arc<BudgetGovernor>,
    ) -> Self {
        Self {
            core: RestCore::new(DEFAULT_BASE_URL, token, RESET_HEADER, limiter, governor),
        }
    }

    // ── Per-ticker (HOT) ────────────────────────────────────────────────

    pub async fn quote(&self, ticker: &str) -> Option<Quote> {
        let body = self.core.rest_call(&format!("/stock/{ticker}/info"), &[]).await?;
        adapters::parse_quote(&body, Utc::now())
    }

    pub async fn flow_recent(&self, ticker: &str) -> Vec<FlowItem> {
        match self.core.rest_call(&format!("/stock/{ticker}/flow-recent"), &[]).await {
            Some(body) => adapters::parse_flow_items(&body, Some(ticker)),
            None => Vec::new(),
        }
    }

    /// Dark-pool prints classified against the current quote when available.
    pub async fn dark_pool(&self, ticker: &str, bid: Option<f64>, ask: Option<f64>) -> Vec<DarkPoolPrint> {
        match self.core.rest_call(&format!("/darkpool/{ticker}"), &[]).await {
            Some(body) => adapters::parse_dark_pool(&body, Some(ticker), bid, ask),
            None => Vec::new(),
        }
    }

    pub async fn gex(&self, ticker: &str) -> Option<GexProfile> {
        let body = self
            .core
            .rest_call(&format!("/stock/{ticker}/greek-exposure/strike"), &[])
            .await?;
        let rows = adapters::parse_gex_rows(&body);
        if rows.is_empty() {
            None
        } else {
            Some(GexProfile::from_rows(rows))
        }
    }

    pub async fn ohlc(&self, ticker: &str, timeframe: &str, limit: usize) -> Vec<Candle> {
        let params = [("limit", limit.to_string())];
        match self
            .core
            .rest_call(&format!("/stock/{ticker}/ohlc/{timeframe}"), &params)
            .await
        {
            Some(body) => adapters::parse_ohlc_bars(&body),
            None => Vec::new(),
        }
    }

    /// (call volume, put volume).
    pub async fn options_volume(&self, ticker: &str) -> Option<(f64, f64)> {
        let body = self
            .core
            .rest_call(&format!("/stock/{ticker}/options-volume"), &[])
            .await?;
        adapters::parse_call_put_volume(&body)
    }

    // ── Per-ticker (WARM) ───────────────────────────────────────────────

    pub async fn iv_rank(&self, ticker: &str) -> Option<f64> {
        let body = self.core.rest_call(&format!("/stock/{ticker}/iv-rank"), &[]).await?;
        adapters::parse_iv_rank(&body)
    }

    pub async fn max_pain(&self, ticker: &str) -> Option<f64> {
        let body = self.core.rest_call(&format!("/stock/{ticker}/max-pain"), &[]).await?;
        adapters::parse_max_pain(&body)
    }

    pub async fn oi_change(&self, ticker: &str) -> Option<f64> {
        let body = self.core.rest_call(&format!("/stock/{ticker}/oi-change"), &[]).await?;
        adapters::parse_spike(&body)
    }

    /// IV skew (put IV - call IV) from the greeks endpoint.
    pub async fn iv_skew(&self, ticker: &str) -> Option<f64> {
        let body = self.core.rest_call(&format!("/stock/{ticker}/greeks"), &[]).await?;
        adapters::parse_iv_skew(&body)
    }

    // ── Per-ticker (COLD) ───────────────────────────────────────────────

    pub async fn short_interest(&self, ticker: &str) -> Option<ShortInterestRecord> {
        let body = self
            .core
            .rest_call(&format!("/shorts/{ticker}/interest-float"), &[])
            .await?;
        adapters::parse_short_interest(&body)
    }

    pub async fn ftds(&self, ticker: &str) -> Vec<FtdRecord> {
        match self.core.rest_call(&format!("/shorts/{ticker}/ftds"), &[]).await {
            Some(body) => adapters::parse_ftds(&body),
            None => Vec::new(),
        }
    }

    /// Stock-state is a quote-shaped consolidation used by the COLD tier.
    pub async fn stock_state(&self, ticker: &str) -> Option<Quote> {
        let body = self
            .core
            .rest_call(&format!("/stock/{ticker}/stock-state"), &[])
            .await?;
        adapters::parse_quote(&body, Utc::now())
    }

    pub async fn insider(&self, ticker: &str) -> Vec<CongressTrade> {
        match self.core.rest_call(&format!("/insider/{ticker}"), &[]).await {
            Some(body) => adapters::parse_congress(&body),
            None => Vec::new(),
        }
    }

    /// Next earnings report date, for the earnings cache.
    pub async fn earnings(&self, ticker: &str) -> Option<String> {
        let body = self.core.rest_call(&format!("/earnings/{ticker}"), &[]).await?;
        adapters::parse_earnings_date(&body)
    }

    // ── Market-wide (HOT) ───────────────────────────────────────────────

    pub async fn market_tide(&self) -> Option<MarketTide> {
        let body = self.core.rest_call("/market/market-tide", &[]).await?;
        adapters::parse_market_tide(&body, Utc::now())
    }

    pub async fn flow_alerts(&self) -> Vec<FlowItem> {
        match self.core.rest_call("/option-trades/flow-alerts", &[]).await {
            Some(body) => adapters::parse_flow_items(&body, None),
            None => Vec::new(),
        }
    }

    pub async fn dark_pool_recent(&self) -> Vec<DarkPoolPrint> {
        match self.core.rest_call("/darkpool/recent", &[]).await {
            Some(body) => adapters::parse_dark_pool(&body, None, None, None),
            None => Vec::new(),
        }
    }

    pub async fn news(&self) -> Vec<NewsItem> {
        match self.core.rest_call("/news/headlines", &[]).await {
            Some(body) => adapters::parse_news(&body),
            None => Vec::new(),
        }
    }

    /// Volatility spike reading (VIX proxy for the regime classifier).
    pub async fn spike(&self) -> Option<f64> {
        let body = self.core.rest_call("/market/spike", &[]).await?;
        adapters::parse_spike(&body)
    }

    pub async fn top_net_impact(&self) -> Vec<NetImpactRow> {
        match self.core.rest_call("/market/top-net-impact", &[]).await {
            Some(body) => adapters::parse_net_impact(&body),
            None => Vec::new(),
        }
    }

    // ── Market-wide (WARM / COLD) ───────────────────────────────────────

    pub async fn total_options_volume(&self) -> Option<(f64, f64)> {
        let body = self.core.rest_call("/market/total-options-volume", &[]).await?;
        adapters::parse_call_put_volume(&body)
    }

    pub async fn market_oi_change(&self) -> Vec<NetImpactRow> {
        match self.core.rest_call("/market/oi-change", &[]).await {
            Some(body) => adapters::parse_net_impact(&body),
            None => Vec::new(),
        }
    }

    pub async fn insider_buy_sells(&self) -> Vec<CongressTrade> {
        match self.core.rest_call("/insider/buy-sells", &[]).await {
            Some(body) => adapters::parse_congress(&body),
            None => Vec::new(),
        }
    }

    pub async fn congress_recent(&self) -> Vec<CongressTrade> {
        match self.core.rest_call("/congress/recent-trades", &[]).await {
            Some(body) => adapters::parse_congress(&body),
            None => Vec::new(),
        }
    }

    pub async fn congress_late_reports(&self) -> Vec<CongressTrade> {
        match self.core.rest_call("/congress/late-reports", &[]).await {
            Some(body) => adapters::parse_congress(&body),
            None => Vec::new(),
        }
    }

    pub async fn economic_calendar(&self) -> Vec<EconomicEvent> {
        match self.core.rest_call("/market/economic-calendar", &[]).await {
            Some(body) => adapters::parse_economic_calendar(&body),
            None => Vec::new(),
        }
    }

    pub async fn fda_calendar(&self) -> Vec<EconomicEvent> {
        match self.core.rest_call("/market/fda-calendar", &[]).await {
            Some(body) => adapters::parse_economic_calendar(&body),
            None => Vec::new(),
        }
    }
}

impl std::fmt::Debug for FlowClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowClient").field("core", &self.core).finish()
    }
}
