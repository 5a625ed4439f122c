// =============================================================================
// Market State Store — the single source of truth for fused market data
// =============================================================================
//
// Keyed maps of per-ticker and per-market data with last-update timestamps.
//
// Thread safety follows the subtree rule: every field sits behind its own
// `parking_lot::RwLock`, writers replace whole values (never mutate nested
// structure in place), and readers clone under the read guard. The polling
// orchestrator is the only writer; the API layer and the WebSocket push loop
// are readers.
// =============================================================================

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::alerts::Alert;
use crate::scanner::Discovery;
use crate::scheduler::Session;
use crate::signal::engine::SignalResult;
use crate::signal::regime::MarketRegime;
use crate::signal::setup::TradeSetup;
use crate::ta::TechnicalsSnapshot;
use crate::types::Bias;

// ---------------------------------------------------------------------------
// Bounded-list capacities
// ---------------------------------------------------------------------------

/// Newest alerts kept in the ring.
pub const MAX_ALERTS: usize = 200;
/// Global options-flow tape length.
const MAX_GLOBAL_FLOW: usize = 300;
/// Global dark-pool tape length.
const MAX_GLOBAL_DARKPOOL: usize = 200;
/// Market-wide net-impact leaderboard length.
const MAX_NET_IMPACT: usize = 50;
/// News headlines kept.
const MAX_NEWS: usize = 100;
/// Congressional trades kept.
const MAX_CONGRESS: usize = 100;
/// Economic calendar entries kept.
const MAX_CALENDAR: usize = 100;
/// Scanner discoveries kept.
const MAX_DISCOVERIES: usize = 20;
/// Intraday candles kept per ticker (one session of 1-minute bars).
pub const MAX_INTRADAY_BARS: usize = 390;

// ---------------------------------------------------------------------------
// Domain records
// ---------------------------------------------------------------------------

/// A single OHLCV bar. Series are ordered ascending by `timestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open time, epoch milliseconds.
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default)]
    pub vwap: Option<f64>,
}

/// Latest quote for a ticker. Overwritten every HOT cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub last: f64,
    pub bid: f64,
    pub ask: f64,
    pub change: f64,
    pub change_pct: f64,
    pub day_open: f64,
    pub day_high: f64,
    pub day_low: f64,
    pub day_volume: f64,
    pub vwap: Option<f64>,
    pub prev_close: f64,
    pub updated_at: DateTime<Utc>,
}

/// Call or put side of an options print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractType {
    Call,
    Put,
}

/// How an options print executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionKind {
    Block,
    Sweep,
    Lit,
}

/// A single options-flow print, normalised from the vendor feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowItem {
    pub ticker: String,
    pub contract: ContractType,
    pub strike: f64,
    pub expiry: String,
    pub premium: f64,
    pub execution: ExecutionKind,
    pub executed_at: DateTime<Utc>,
    /// Inferred aggressor direction.
    pub direction: Bias,
}

/// A dark-pool print. Direction is inferred by price vs the spot quote:
/// above the ask = bullish, below the bid = bearish, else neutral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DarkPoolPrint {
    pub ticker: String,
    pub price: f64,
    pub size: f64,
    pub premium: f64,
    pub executed_at: DateTime<Utc>,
    pub direction: Bias,
}

/// Dealer gamma exposure at one strike.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GexRow {
    pub strike: f64,
    pub call_gex: f64,
    pub put_gex: f64,
}

impl GexRow {
    pub fn net(&self) -> f64 {
        self.call_gex + self.put_gex
    }
}

/// Aggregated gamma profile for a ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GexProfile {
    pub rows: Vec<GexRow>,
    pub net_gex: f64,
    /// Largest net-positive strike (support "wall"), if any.
    pub top_wall: Option<f64>,
    /// Largest net-negative strike (magnet), if any.
    pub top_magnet: Option<f64>,
}

impl GexProfile {
    /// Build a profile from raw strike rows.
    pub fn from_rows(rows: Vec<GexRow>) -> Self {
        let net_gex = rows.iter().map(GexRow::net).sum();

        let top_wall = rows
            .iter()
            .filter(|r| r.net() > 0.0)
            .max_by(|a, b| a.net().partial_cmp(&b.net()).unwrap_or(std::cmp::Ordering::Equal))
            .map(|r| r.strike);

        let top_magnet = rows
            .iter()
            .filter(|r| r.net() < 0.0)
            .min_by(|a, b| a.net().partial_cmp(&b.net()).unwrap_or(std::cmp::Ordering::Equal))
            .map(|r| r.strike);

        Self {
            rows,
            net_gex,
            top_wall,
            top_magnet,
        }
    }
}

/// Short-interest reading for a ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortInterestRecord {
    pub percent_of_float: f64,
    pub days_to_cover: f64,
    pub utilization: Option<f64>,
    pub reported_at: String,
    /// Short volume as a fraction of total volume, when the vendor carries it.
    pub short_volume_ratio: Option<f64>,
}

/// Fails-to-deliver reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FtdRecord {
    pub date: String,
    pub quantity: f64,
}

/// Market-wide net-premium leaderboard row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetImpactRow {
    pub ticker: String,
    pub net_premium: f64,
}

/// A news headline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub headline: String,
    pub source: String,
    pub tickers: Vec<String>,
    pub published_at: DateTime<Utc>,
}

/// A congressional or insider filing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CongressTrade {
    pub ticker: String,
    pub member: String,
    /// "buy" or "sell" as disclosed.
    pub side: String,
    pub amount_range: String,
    pub transaction_date: String,
    pub disclosed_at: String,
}

/// An economic-calendar entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicEvent {
    pub title: String,
    pub importance: String,
    pub scheduled_at: DateTime<Utc>,
}

/// Market tide — the vendor's aggregate call/put premium flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MarketTide {
    pub net_call_premium: f64,
    pub net_put_premium: f64,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Slow-moving per-ticker readings refreshed by the WARM tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WarmStats {
    pub iv_rank: Option<f64>,
    pub iv_skew: Option<f64>,
    pub max_pain: Option<f64>,
    pub oi_change: Option<f64>,
    pub call_volume: Option<f64>,
    pub put_volume: Option<f64>,
}

// ---------------------------------------------------------------------------
// Serializable snapshot of the whole store
// ---------------------------------------------------------------------------

/// Full, owned copy of the store contents. This is both the `full_state`
/// payload pushed to clients and the `state` field of `state-cache.json`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreSnapshot {
    pub tickers: Vec<String>,
    pub quotes: HashMap<String, Quote>,
    pub technicals: HashMap<String, TechnicalsSnapshot>,
    pub gex: HashMap<String, GexProfile>,
    pub dark_pool: HashMap<String, Vec<DarkPoolPrint>>,
    pub flow: HashMap<String, Vec<FlowItem>>,
    pub short_interest: HashMap<String, ShortInterestRecord>,
    pub ftds: HashMap<String, Vec<FtdRecord>>,
    pub warm_stats: HashMap<String, WarmStats>,
    pub candles: HashMap<String, Vec<Candle>>,
    pub signals: HashMap<String, SignalResult>,
    pub trade_setups: HashMap<String, TradeSetup>,
    pub options_flow: Vec<FlowItem>,
    pub dark_pool_recent: Vec<DarkPoolPrint>,
    pub top_net_impact: Vec<NetImpactRow>,
    pub news: Vec<NewsItem>,
    pub congress_trades: Vec<CongressTrade>,
    pub economic_calendar: Vec<EconomicEvent>,
    pub market_tide: MarketTide,
    pub alerts: Vec<Alert>,
    pub discoveries: Vec<Discovery>,
    pub session: Option<Session>,
    pub market_regime: Option<MarketRegime>,
    pub last_update: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// MarketStore
// ---------------------------------------------------------------------------

/// The in-memory state store.
pub struct MarketStore {
    tickers: RwLock<Vec<String>>,

    // Per-ticker subtrees.
    quotes: RwLock<HashMap<String, Quote>>,
    technicals: RwLock<HashMap<String, TechnicalsSnapshot>>,
    gex: RwLock<HashMap<String, GexProfile>>,
    dark_pool: RwLock<HashMap<String, Vec<DarkPoolPrint>>>,
    flow: RwLock<HashMap<String, Vec<FlowItem>>>,
    short_interest: RwLock<HashMap<String, ShortInterestRecord>>,
    ftds: RwLock<HashMap<String, Vec<FtdRecord>>>,
    warm_stats: RwLock<HashMap<String, WarmStats>>,
    candles: RwLock<HashMap<String, Vec<Candle>>>,
    signals: RwLock<HashMap<String, SignalResult>>,
    trade_setups: RwLock<HashMap<String, TradeSetup>>,

    // Market-wide bounded lists.
    options_flow: RwLock<Vec<FlowItem>>,
    dark_pool_recent: RwLock<Vec<DarkPoolPrint>>,
    top_net_impact: RwLock<Vec<NetImpactRow>>,
    news: RwLock<Vec<NewsItem>>,
    congress_trades: RwLock<Vec<CongressTrade>>,
    economic_calendar: RwLock<Vec<EconomicEvent>>,
    market_tide: RwLock<MarketTide>,

    // Alerts ring, newest first.
    alerts: RwLock<VecDeque<Alert>>,

    // Scanner discoveries, newest first, one entry per ticker.
    discoveries: RwLock<Vec<Discovery>>,

    // Scalar summaries.
    session: RwLock<Option<Session>>,
    market_regime: RwLock<Option<MarketRegime>>,
    last_update: RwLock<Option<DateTime<Utc>>>,
}

impl MarketStore {
    pub fn new(tickers: Vec<String>) -> Self {
        Self {
            tickers: RwLock::new(tickers),
            quotes: RwLock::new(HashMap::new()),
            technicals: RwLock::new(HashMap::new()),
            gex: RwLock::new(HashMap::new()),
            dark_pool: RwLock::new(HashMap::new()),
            flow: RwLock::new(HashMap::new()),
            short_interest: RwLock::new(HashMap::new()),
            ftds: RwLock::new(HashMap::new()),
            warm_stats: RwLock::new(HashMap::new()),
            candles: RwLock::new(HashMap::new()),
            signals: RwLock::new(HashMap::new()),
            trade_setups: RwLock::new(HashMap::new()),
            options_flow: RwLock::new(Vec::new()),
            dark_pool_recent: RwLock::new(Vec::new()),
            top_net_impact: RwLock::new(Vec::new()),
            news: RwLock::new(Vec::new()),
            congress_trades: RwLock::new(Vec::new()),
            economic_calendar: RwLock::new(Vec::new()),
            market_tide: RwLock::new(MarketTide::default()),
            alerts: RwLock::new(VecDeque::with_capacity(MAX_ALERTS)),
            discoveries: RwLock::new(Vec::new()),
            session: RwLock::new(None),
            market_regime: RwLock::new(None),
            last_update: RwLock::new(None),
        }
    }

    // ── Watchlist ───────────────────────────────────────────────────────

    pub fn tickers(&self) -> Vec<String> {
        self.tickers.read().clone()
    }

    pub fn set_tickers(&self, tickers: Vec<String>) {
        *self.tickers.write() = tickers;
    }

    // ── Per-ticker setters (whole-subtree replacement) ──────────────────

    pub fn set_quote(&self, ticker: &str, quote: Quote) {
        self.quotes.write().insert(ticker.to_string(), quote);
    }

    pub fn quote(&self, ticker: &str) -> Option<Quote> {
        self.quotes.read().get(ticker).cloned()
    }

    pub fn quotes_map(&self) -> HashMap<String, Quote> {
        self.quotes.read().clone()
    }

    pub fn set_technicals(&self, ticker: &str, snap: TechnicalsSnapshot) {
        self.technicals.write().insert(ticker.to_string(), snap);
    }

    pub fn technicals(&self, ticker: &str) -> Option<TechnicalsSnapshot> {
        self.technicals.read().get(ticker).cloned()
    }

    pub fn set_gex(&self, ticker: &str, profile: GexProfile) {
        self.gex.write().insert(ticker.to_string(), profile);
    }

    pub fn gex(&self, ticker: &str) -> Option<GexProfile> {
        self.gex.read().get(ticker).cloned()
    }

    pub fn set_dark_pool(&self, ticker: &str, prints: Vec<DarkPoolPrint>) {
        self.dark_pool.write().insert(ticker.to_string(), prints);
    }

    pub fn dark_pool(&self, ticker: &str) -> Vec<DarkPoolPrint> {
        self.dark_pool.read().get(ticker).cloned().unwrap_or_default()
    }

    pub fn set_flow(&self, ticker: &str, items: Vec<FlowItem>) {
        self.flow.write().insert(ticker.to_string(), items);
    }

    pub fn flow(&self, ticker: &str) -> Vec<FlowItem> {
        self.flow.read().get(ticker).cloned().unwrap_or_default()
    }

    pub fn set_short_interest(&self, ticker: &str, record: ShortInterestRecord) {
        self.short_interest.write().insert(ticker.to_string(), record);
    }

    pub fn short_interest(&self, ticker: &str) -> Option<ShortInterestRecord> {
        self.short_interest.read().get(ticker).cloned()
    }

    pub fn set_ftds(&self, ticker: &str, records: Vec<FtdRecord>) {
        self.ftds.write().insert(ticker.to_string(), records);
    }

    pub fn ftds(&self, ticker: &str) -> Vec<FtdRecord> {
        self.ftds.read().get(ticker).cloned().unwrap_or_default()
    }

    pub fn set_warm_stats(&self, ticker: &str, stats: WarmStats) {
        self.warm_stats.write().insert(ticker.to_string(), stats);
    }

    pub fn warm_stats(&self, ticker: &str) -> Option<WarmStats> {
        self.warm_stats.read().get(ticker).cloned()
    }

    /// Replace the candle series for a ticker, trimming to the intraday cap.
    pub fn set_candles(&self, ticker: &str, mut series: Vec<Candle>) {
        if series.len() > MAX_INTRADAY_BARS {
            series.drain(..series.len() - MAX_INTRADAY_BARS);
        }
        self.candles.write().insert(ticker.to_string(), series);
    }

    pub fn candles(&self, ticker: &str) -> Vec<Candle> {
        self.candles.read().get(ticker).cloned().unwrap_or_default()
    }

    pub fn set_signal(&self, ticker: &str, result: SignalResult) {
        self.signals.write().insert(ticker.to_string(), result);
    }

    /// Setups are idempotent per ticker: a re-emitted setup replaces the
    /// previous one.
    pub fn set_setup(&self, ticker: &str, setup: TradeSetup) {
        self.trade_setups.write().insert(ticker.to_string(), setup);
    }

    pub fn clear_setup(&self, ticker: &str) {
        self.trade_setups.write().remove(ticker);
    }

    pub fn setups_map(&self) -> HashMap<String, TradeSetup> {
        self.trade_setups.read().clone()
    }

    // ── Market-wide setters ─────────────────────────────────────────────

    pub fn set_options_flow(&self, mut items: Vec<FlowItem>) {
        items.truncate(MAX_GLOBAL_FLOW);
        *self.options_flow.write() = items;
    }

    /// Prepend one live-streamed print to the global tape.
    pub fn push_options_flow(&self, item: FlowItem) {
        let mut tape = self.options_flow.write();
        tape.insert(0, item);
        tape.truncate(MAX_GLOBAL_FLOW);
    }

    pub fn options_flow(&self) -> Vec<FlowItem> {
        self.options_flow.read().clone()
    }

    pub fn set_dark_pool_recent(&self, mut prints: Vec<DarkPoolPrint>) {
        prints.truncate(MAX_GLOBAL_DARKPOOL);
        *self.dark_pool_recent.write() = prints;
    }

    /// Prepend one live-streamed off-lit print to the global tape.
    pub fn push_dark_pool_recent(&self, print: DarkPoolPrint) {
        let mut tape = self.dark_pool_recent.write();
        tape.insert(0, print);
        tape.truncate(MAX_GLOBAL_DARKPOOL);
    }

    pub fn dark_pool_recent(&self) -> Vec<DarkPoolPrint> {
        self.dark_pool_recent.read().clone()
    }

    pub fn set_top_net_impact(&self, mut rows: Vec<NetImpactRow>) {
        rows.truncate(MAX_NET_IMPACT);
        *self.top_net_impact.write() = rows;
    }

    pub fn top_net_impact(&self) -> Vec<NetImpactRow> {
        self.top_net_impact.read().clone()
    }

    pub fn set_news(&self, mut items: Vec<NewsItem>) {
        items.truncate(MAX_NEWS);
        *self.news.write() = items;
    }

    pub fn news(&self) -> Vec<NewsItem> {
        self.news.read().clone()
    }

    pub fn set_congress_trades(&self, mut trades: Vec<CongressTrade>) {
        trades.truncate(MAX_CONGRESS);
        *self.congress_trades.write() = trades;
    }

    /// Prepend per-ticker insider filings without displacing the market-wide
    /// list wholesale.
    pub fn merge_congress_trades(&self, trades: Vec<CongressTrade>) {
        let mut list = self.congress_trades.write();
        for trade in trades {
            let exists = list.iter().any(|t| {
                t.ticker == trade.ticker
                    && t.member == trade.member
                    && t.transaction_date == trade.transaction_date
            });
            if !exists {
                list.insert(0, trade);
            }
        }
        list.truncate(MAX_CONGRESS);
    }

    pub fn congress_trades(&self) -> Vec<CongressTrade> {
        self.congress_trades.read().clone()
    }

    pub fn set_economic_calendar(&self, mut events: Vec<EconomicEvent>) {
        events.truncate(MAX_CALENDAR);
        *self.economic_calendar.write() = events;
    }

    pub fn set_market_tide(&self, tide: MarketTide) {
        *self.market_tide.write() = tide;
    }

    pub fn market_tide(&self) -> MarketTide {
        self.market_tide.read().clone()
    }

    // ── Alerts ring ─────────────────────────────────────────────────────

    /// Push a new alert to the front of the ring, trimming to capacity.
    pub fn push_alert(&self, alert: Alert) {
        let mut ring = self.alerts.write();
        ring.push_front(alert);
        while ring.len() > MAX_ALERTS {
            ring.pop_back();
        }
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.read().iter().cloned().collect()
    }

    // ── Scanner discoveries ─────────────────────────────────────────────

    /// Merge a discovery, replacing any previous entry for the same ticker
    /// and truncating to the last [`MAX_DISCOVERIES`].
    pub fn merge_discovery(&self, discovery: Discovery) {
        let mut list = self.discoveries.write();
        list.retain(|d| d.ticker != discovery.ticker);
        list.insert(0, discovery);
        list.truncate(MAX_DISCOVERIES);
    }

    pub fn discoveries(&self) -> Vec<Discovery> {
        self.discoveries.read().clone()
    }

    // ── Scalars ─────────────────────────────────────────────────────────

    pub fn set_session(&self, session: Session) {
        *self.session.write() = Some(session);
    }

    pub fn session(&self) -> Option<Session> {
        *self.session.read()
    }

    pub fn set_market_regime(&self, regime: MarketRegime) {
        *self.market_regime.write() = Some(regime);
    }

    pub fn market_regime(&self) -> Option<MarketRegime> {
        *self.market_regime.read()
    }

    /// Stamp the store as updated. Called once at the end of every cycle.
    pub fn touch(&self, now: DateTime<Utc>) {
        *self.last_update.write() = Some(now);
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        *self.last_update.read()
    }

    // ── Snapshot / restore ──────────────────────────────────────────────

    /// Build a full owned snapshot. Each subtree is cloned under its own
    /// read guard; no lock is held across subtrees.
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            tickers: self.tickers.read().clone(),
            quotes: self.quotes.read().clone(),
            technicals: self.technicals.read().clone(),
            gex: self.gex.read().clone(),
            dark_pool: self.dark_pool.read().clone(),
            flow: self.flow.read().clone(),
            short_interest: self.short_interest.read().clone(),
            ftds: self.ftds.read().clone(),
            warm_stats: self.warm_stats.read().clone(),
            candles: self.candles.read().clone(),
            signals: self.signals.read().clone(),
            trade_setups: self.trade_setups.read().clone(),
            options_flow: self.options_flow.read().clone(),
            dark_pool_recent: self.dark_pool_recent.read().clone(),
            top_net_impact: self.top_net_impact.read().clone(),
            news: self.news.read().clone(),
            congress_trades: self.congress_trades.read().clone(),
            economic_calendar: self.economic_calendar.read().clone(),
            market_tide: self.market_tide.read().clone(),
            alerts: self.alerts(),
            discoveries: self.discoveries.read().clone(),
            session: *self.session.read(),
            market_regime: *self.market_regime.read(),
            last_update: *self.last_update.read(),
        }
    }

    /// Restore the store from a persisted snapshot. Used once at startup;
    /// live feeds overwrite everything on the first cycle anyway.
    pub fn restore(&self, snap: StoreSnapshot) {
        *self.tickers.write() = snap.tickers;
        *self.quotes.write() = snap.quotes;
        *self.technicals.write() = snap.technicals;
        *self.gex.write() = snap.gex;
        *self.dark_pool.write() = snap.dark_pool;
        *self.flow.write() = snap.flow;
        *self.short_interest.write() = snap.short_interest;
        *self.ftds.write() = snap.ftds;
        *self.warm_stats.write() = snap.warm_stats;
        *self.candles.write() = snap.candles;
        *self.signals.write() = snap.signals;
        *self.trade_setups.write() = snap.trade_setups;
        *self.options_flow.write() = snap.options_flow;
        *self.dark_pool_recent.write() = snap.dark_pool_recent;
        *self.top_net_impact.write() = snap.top_net_impact;
        *self.news.write() = snap.news;
        *self.congress_trades.write() = snap.congress_trades;
        *self.economic_calendar.write() = snap.economic_calendar;
        *self.market_tide.write() = snap.market_tide;
        *self.alerts.write() = snap.alerts.into_iter().collect();
        *self.discoveries.write() = snap.discoveries;
        *self.session.write() = snap.session;
        *self.market_regime.write() = snap.market_regime;
        *self.last_update.write() = snap.last_update;
    }
}

impl std::fmt::Debug for MarketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketStore")
            .field("tickers", &self.tickers.read().len())
            .field("quotes", &self.quotes.read().len())
            .field("alerts", &self.alerts.read().len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;

    fn test_alert(ticker: &str, ts: i64) -> Alert {
        Alert {
            id: format!("a-{ticker}-{ts}"),
            ticker: ticker.to_string(),
            session: None,
            kind: crate::alerts::AlertKind::VolumeSpike,
            direction: Bias::Neutral,
            severity: Severity::Low,
            message: "test".to_string(),
            timestamp: DateTime::from_timestamp(ts, 0).unwrap(),
        }
    }

    #[test]
    fn alerts_ring_bounded_and_newest_first() {
        let store = MarketStore::new(vec![]);
        for i in 0..250 {
            store.push_alert(test_alert("SPY", i));
        }
        let alerts = store.alerts();
        assert_eq!(alerts.len(), MAX_ALERTS);
        // Newest first: timestamps non-increasing.
        for w in alerts.windows(2) {
            assert!(w[0].timestamp >= w[1].timestamp);
        }
    }

    #[test]
    fn candle_series_trimmed_to_session_length() {
        let store = MarketStore::new(vec!["SPY".into()]);
        let series: Vec<Candle> = (0..500)
            .map(|i| Candle {
                timestamp: i,
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.5,
                volume: 100.0,
                vwap: None,
            })
            .collect();
        store.set_candles("SPY", series);
        let kept = store.candles("SPY");
        assert_eq!(kept.len(), MAX_INTRADAY_BARS);
        // Oldest bars were dropped.
        assert_eq!(kept[0].timestamp, 500 - MAX_INTRADAY_BARS as i64);
    }

    #[test]
    fn gex_profile_walls_and_magnets() {
        let profile = GexProfile::from_rows(vec![
            GexRow { strike: 100.0, call_gex: 5e8, put_gex: -1e8 },
            GexRow { strike: 105.0, call_gex: 1e8, put_gex: -4e8 },
            GexRow { strike: 110.0, call_gex: 9e8, put_gex: -2e8 },
        ]);
        assert_eq!(profile.top_wall, Some(110.0));
        assert_eq!(profile.top_magnet, Some(105.0));
    }

    #[test]
    fn discovery_merge_replaces_same_ticker() {
        let store = MarketStore::new(vec![]);
        let mk = |ticker: &str, confidence: u32| Discovery {
            ticker: ticker.to_string(),
            score: 1.0,
            confidence,
            direction: Bias::Bullish,
            sources: vec![],
            discovered_at: Utc::now(),
        };
        store.merge_discovery(mk("GME", 50));
        store.merge_discovery(mk("AMC", 45));
        store.merge_discovery(mk("GME", 70));

        let list = store.discoveries();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].ticker, "GME");
        assert_eq!(list[0].confidence, 70);
    }

    #[test]
    fn snapshot_roundtrip_preserves_contents() {
        let store = MarketStore::new(vec!["SPY".into(), "QQQ".into()]);
        store.set_quote(
            "SPY",
            Quote {
                last: 450.0,
                bid: 449.9,
                ask: 450.1,
                change: 1.0,
                change_pct: 0.22,
                day_open: 449.0,
                day_high: 451.0,
                day_low: 448.0,
                day_volume: 1e7,
                vwap: Some(450.2),
                prev_close: 449.0,
                updated_at: Utc::now(),
            },
        );
        store.touch(Utc::now());

        let snap = store.snapshot();
        let restored = MarketStore::new(vec![]);
        restored.restore(snap.clone());

        assert_eq!(restored.tickers(), vec!["SPY", "QQQ"]);
        assert_eq!(restored.quote("SPY").unwrap().last, 450.0);
        assert!(restored.last_update().is_some());

        // The snapshot itself round-trips through JSON.
        let json = serde_json::to_string(&snap).unwrap();
        let back: StoreSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tickers, snap.tickers);
    }
}
