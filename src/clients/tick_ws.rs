// =============================================================================
// Tick Vendor WebSocket — live trades and aggregates with tick-rule tape
// =============================================================================
//
// Subscription protocol:
//   1. connect
//   2. {"action":"auth","params":"<key>"}
//   3. wait for status "auth_success" (auth_failed aborts the attempt)
//   4. {"action":"subscribe","params":"T.<SYM>,AM.<SYM>,A.<SYM>"}
//
// Trades are classified by the tick rule: price above the previous trade is
// a BUY, below is a SELL; an unchanged price falls back to the mid-quote
// rule when both sides of the book are known, else inherits the previous
// direction. Trades whose condition codes mark them as non-representative
// (average-price, odd-lot, contingent, prior-reference) are rejected.
//
// Each ticker's running summary sits behind its own mutex; readers take a
// cheap snapshot copy, never the lock across await points.
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::clients::adapters::parse_f64;
use crate::store::Candle;

/// Default production stream URL.
const DEFAULT_WS_URL: &str = "wss://socket.polygon.io/stocks";
/// Initial reconnect delay.
const BACKOFF_START_SECS: u64 = 5;
/// Reconnect delay ceiling.
const BACKOFF_CAP_SECS: u64 = 300;

/// Condition codes that disqualify a trade from the tape:
/// average-price, odd-lot, contingent, prior-reference.
const REJECTED_CONDITIONS: &[i64] = &[15, 16, 37, 52];

/// Rolling trade-tape window.
const TAPE_WINDOW_MS: i64 = 5 * 60 * 1000;
/// Second-aggregate ring capacity.
const MAX_SECOND_BARS: usize = 300;
/// Minute-aggregate ring capacity (one session).
const MAX_MINUTE_BARS: usize = 390;

// ---------------------------------------------------------------------------
// Classified trades & summary
// ---------------------------------------------------------------------------

/// Tick-rule classification of one trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
    Neutral,
}

/// One accepted trade on the rolling tape.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TapeTrade {
    ts_ms: i64,
    price: f64,
    size: f64,
    side: TradeSide,
}

/// Running per-ticker totals fed by the live stream.
#[derive(Debug, Default)]
pub struct TickSummary {
    total_volume: f64,
    total_notional: f64,
    buy_volume: f64,
    sell_volume: f64,
    last_price: f64,
    last_side: TradeSide,
    last_bid: Option<f64>,
    last_ask: Option<f64>,
    high_of_day: Option<f64>,
    low_of_day: Option<f64>,
    tape: VecDeque<TapeTrade>,
    second_bars: VecDeque<Candle>,
    minute_bars: VecDeque<Candle>,
}

impl Default for TradeSide {
    fn default() -> Self {
        Self::Neutral
    }
}

/// Owned copy handed to readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TickSummarySnapshot {
    pub last_price: f64,
    pub vwap: Option<f64>,
    pub total_volume: f64,
    pub buy_volume: f64,
    pub sell_volume: f64,
    /// buy / (buy + sell); 0.5 when the tape is empty.
    pub buy_ratio: f64,
    pub high_of_day: Option<f64>,
    pub low_of_day: Option<f64>,
    /// Volume inside the rolling five-minute tape.
    pub tape_volume: f64,
    /// Signed (buy - sell) notional inside the tape.
    pub tape_net_notional: f64,
}

impl TickSummary {
    /// Ingest one trade. Returns `false` when the trade was rejected by its
    /// condition codes.
    pub fn process_trade(&mut self, price: f64, size: f64, conditions: &[i64], ts_ms: i64) -> bool {
        if !(price > 0.0) || !(size > 0.0) {
            return false;
        }
        if conditions.iter().any(|c| REJECTED_CONDITIONS.contains(c)) {
            return false;
        }

        // Tick rule.
        let side = if self.last_price == 0.0 {
            TradeSide::Neutral
        } else if price > self.last_price {
            TradeSide::Buy
        } else if price < self.last_price {
            TradeSide::Sell
        } else {
            // Unchanged: mid-quote rule when both sides are known.
            match (self.last_bid, self.last_ask) {
                (Some(bid), Some(ask)) if ask > bid => {
                    let mid = (bid + ask) / 2.0;
                    if price > mid {
                        TradeSide::Buy
                    } else if price < mid {
                        TradeSide::Sell
                    } else {
                        self.last_side
                    }
                }
                _ => self.last_side,
            }
        };

        self.total_volume += size;
        self.total_notional += price * size;
        match side {
            TradeSide::Buy => self.buy_volume += size,
            TradeSide::Sell => self.sell_volume += size,
            TradeSide::Neutral => {}
        }

        self.high_of_day = Some(self.high_of_day.map_or(price, |h| h.max(price)));
        self.low_of_day = Some(self.low_of_day.map_or(price, |l| l.min(price)));

        self.last_price = price;
        self.last_side = side;

        self.tape.push_back(TapeTrade {
            ts_ms,
            price,
            size,
            side,
        });
        while let Some(front) = self.tape.front() {
            if ts_ms - front.ts_ms > TAPE_WINDOW_MS {
                self.tape.pop_front();
            } else {
                break;
            }
        }

        true
    }

    /// Update the book context for the mid-quote rule.
    pub fn set_quote(&mut self, bid: f64, ask: f64) {
        if bid > 0.0 {
            self.last_bid = Some(bid);
        }
        if ask > 0.0 {
            self.last_ask = Some(ask);
        }
    }

    /// Append or replace a second-aggregate bar.
    pub fn push_second_bar(&mut self, bar: Candle) {
        push_ring(&mut self.second_bars, bar, MAX_SECOND_BARS);
    }

    /// Append or replace a minute-aggregate bar.
    pub fn push_minute_bar(&mut self, bar: Candle) {
        push_ring(&mut self.minute_bars, bar, MAX_MINUTE_BARS);
    }

    pub fn minute_bars(&self) -> Vec<Candle> {
        self.minute_bars.iter().copied().collect()
    }

    pub fn snapshot(&self) -> TickSummarySnapshot {
        let classified = self.buy_volume + self.sell_volume;
        TickSummarySnapshot {
            last_price: self.last_price,
            vwap: if self.total_volume > 0.0 {
                Some(self.total_notional / self.total_volume)
            } else {
                None
            },
            total_volume: self.total_volume,
            buy_volume: self.buy_volume,
            sell_volume: self.sell_volume,
            buy_ratio: if classified > 0.0 {
                self.buy_volume / classified
            } else {
                0.5
            },
            high_of_day: self.high_of_day,
            low_of_day: self.low_of_day,
            tape_volume: self.tape.iter().map(|t| t.size).sum(),
            tape_net_notional: self
                .tape
                .iter()
                .map(|t| match t.side {
                    TradeSide::Buy => t.price * t.size,
                    TradeSide::Sell => -t.price * t.size,
                    TradeSide::Neutral => 0.0,
                })
                .sum(),
        }
    }
}

/// Replace the last bar when timestamps match (in-progress update), else
/// append and trim.
fn push_ring(ring: &mut VecDeque<Candle>, bar: Candle, cap: usize) {
    if let Some(last) = ring.back() {
        if last.timestamp == bar.timestamp {
            ring.pop_back();
        }
    }
    ring.push_back(bar);
    while ring.len() > cap {
        ring.pop_front();
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Per-ticker summaries behind fine-grained mutexes.
pub struct TickSummaryCache {
    summaries: RwLock<HashMap<String, Arc<Mutex<TickSummary>>>>,
}

impl TickSummaryCache {
    pub fn new() -> Self {
        Self {
            summaries: RwLock::new(HashMap::new()),
        }
    }

    fn entry(&self, ticker: &str) -> Arc<Mutex<TickSummary>> {
        if let Some(existing) = self.summaries.read().get(ticker) {
            return existing.clone();
        }
        self.summaries
            .write()
            .entry(ticker.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(TickSummary::default())))
            .clone()
    }

    pub fn process_trade(&self, ticker: &str, price: f64, size: f64, conditions: &[i64], ts_ms: i64) {
        self.entry(ticker).lock().process_trade(price, size, conditions, ts_ms);
    }

    pub fn set_quote(&self, ticker: &str, bid: f64, ask: f64) {
        self.entry(ticker).lock().set_quote(bid, ask);
    }

    pub fn push_second_bar(&self, ticker: &str, bar: Candle) {
        self.entry(ticker).lock().push_second_bar(bar);
    }

    pub fn push_minute_bar(&self, ticker: &str, bar: Candle) {
        self.entry(ticker).lock().push_minute_bar(bar);
    }

    /// Owned snapshot, or `None` for an unknown ticker.
    pub fn snapshot(&self, ticker: &str) -> Option<TickSummarySnapshot> {
        self.summaries.read().get(ticker).map(|s| s.lock().snapshot())
    }

    /// Minute bars accumulated from the live stream.
    pub fn minute_bars(&self, ticker: &str) -> Vec<Candle> {
        self.summaries
            .read()
            .get(ticker)
            .map(|s| s.lock().minute_bars())
            .unwrap_or_default()
    }
}

impl Default for TickSummaryCache {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

/// Reconnecting WebSocket client for the tick vendor.
pub struct TickSocket {
    url: String,
    api_key: String,
    tickers: Arc<RwLock<Vec<String>>>,
    cache: Arc<TickSummaryCache>,
}

impl TickSocket {
    pub fn new(
        api_key: impl Into<String>,
        tickers: Arc<RwLock<Vec<String>>>,
        cache: Arc<TickSummaryCache>,
    ) -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            api_key: api_key.into(),
            tickers,
            cache,
        }
    }

    /// Run forever, reconnecting with exponential backoff. Spawn as a task.
    pub async fn run(self) {
        let mut backoff = BACKOFF_START_SECS;

        loop {
            match self.connect_once().await {
                Ok(()) => {
                    warn!("tick WebSocket stream ended — reconnecting");
                    backoff = BACKOFF_START_SECS;
                }
                Err(e) => {
                    warn!(error = %e, backoff_secs = backoff, "tick WebSocket error — reconnecting");
                }
            }

            tokio::time::sleep(std::time::Duration::from_secs(backoff)).await;
            backoff = (backoff * 2).min(BACKOFF_CAP_SECS);
        }
    }

    async fn connect_once(&self) -> Result<()> {
        info!(url = %self.url, "connecting to tick WebSocket");

        let (ws_stream, _response) = connect_async(&self.url)
            .await
            .context("failed to connect to tick WebSocket")?;
        let (mut write, mut read) = ws_stream.split();

        // Authenticate.
        let auth = json!({ "action": "auth", "params": self.api_key });
        write
            .send(Message::Text(auth.to_string()))
            .await
            .context("failed to send auth message")?;

        let mut authed = false;

        while let Some(frame) = read.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    let events: Vec<serde_json::Value> = match serde_json::from_str(&text) {
                        Ok(serde_json::Value::Array(arr)) => arr,
                        Ok(single) => vec![single],
                        Err(_) => {
                            debug!("unparseable tick frame dropped");
                            continue;
                        }
                    };

                    for event in &events {
                        let ev = event.get("ev").and_then(|v| v.as_str()).unwrap_or_default();
                        match ev {
                            "status" => {
                                let status =
                                    event.get("status").and_then(|v| v.as_str()).unwrap_or_default();
                                match status {
                                    "auth_success" => {
                                        authed = true;
                                        self.send_subscriptions(&mut write).await?;
                                    }
                                    "auth_failed" => {
                                        bail!("tick vendor rejected credentials");
                                    }
                                    _ => debug!(status, "tick status event"),
                                }
                            }
                            "T" if authed => self.handle_trade(event),
                            "A" if authed => self.handle_agg(event, false),
                            "AM" if authed => self.handle_agg(event, true),
                            _ => {}
                        }
                    }
                }
                Ok(Message::Ping(data)) => {
                    if write.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("tick WebSocket closed by vendor");
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    async fn send_subscriptions<S>(&self, write: &mut S) -> Result<()>
    where
        S: SinkExt<Message> + Unpin,
        <S as futures_util::Sink<Message>>::Error: std::error::Error + Send + Sync + 'static,
    {
        let tickers = self.tickers.read().clone();
        let params: Vec<String> = tickers
            .iter()
            .flat_map(|t| [format!("T.{t}"), format!("AM.{t}"), format!("A.{t}")])
            .collect();

        let subscribe = json!({ "action": "subscribe", "params": params.join(",") });
        write
            .send(Message::Text(subscribe.to_string()))
            .await
            .context("failed to send subscribe message")?;
        info!(tickers = tickers.len(), "tick WebSocket subscribed");
        Ok(())
    }

    fn handle_trade(&self, event: &serde_json::Value) {
        let Some(ticker) = event.get("sym").and_then(|v| v.as_str()) else {
            return;
        };
        let Some(price) = event.get("p").and_then(parse_f64) else {
            return;
        };
        let Some(size) = event.get("s").and_then(parse_f64) else {
            return;
        };
        let conditions: Vec<i64> = event
            .get("c")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|c| c.as_i64()).collect())
            .unwrap_or_default();
        let ts = event.get("t").and_then(|v| v.as_i64()).unwrap_or(0);

        self.cache.process_trade(ticker, price, size, &conditions, ts);
    }

    fn handle_agg(&self, event: &serde_json::Value, minute: bool) {
        let Some(ticker) = event.get("sym").and_then(|v| v.as_str()) else {
            return;
        };
        let bar = Candle {
            timestamp: event.get("s").and_then(|v| v.as_i64()).unwrap_or(0),
            open: event.get("o").and_then(parse_f64).unwrap_or(0.0),
            high: event.get("h").and_then(parse_f64).unwrap_or(0.0),
            low: event.get("l").and_then(parse_f64).unwrap_or(0.0),
            close: event.get("c").and_then(parse_f64).unwrap_or(0.0),
            volume: event.get("v").and_then(parse_f64).unwrap_or(0.0),
            vwap: event.get("vw").and_then(parse_f64),
        };
        if bar.close <= 0.0 {
            return;
        }

        if minute {
            self.cache.push_minute_bar(ticker, bar);
        } else {
            self.cache.push_second_bar(ticker, bar);
        }
    }
}

impl std::fmt::Debug for TickSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickSocket")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_rule_basic() {
        let mut s = TickSummary::default();
        assert!(s.process_trade(100.0, 10.0, &[], 1_000));
        // First trade has no reference: neutral.
        assert_eq!(s.last_side, TradeSide::Neutral);

        s.process_trade(100.5, 5.0, &[], 2_000); // uptick => buy
        assert_eq!(s.last_side, TradeSide::Buy);

        s.process_trade(100.2, 5.0, &[], 3_000); // downtick => sell
        assert_eq!(s.last_side, TradeSide::Sell);

        let snap = s.snapshot();
        assert!((snap.buy_volume - 5.0).abs() < 1e-9);
        assert!((snap.sell_volume - 5.0).abs() < 1e-9);
        assert!((snap.total_volume - 20.0).abs() < 1e-9);
    }

    #[test]
    fn unchanged_price_uses_mid_quote_rule() {
        let mut s = TickSummary::default();
        s.set_quote(99.8, 100.4); // mid 100.1
        s.process_trade(100.0, 10.0, &[], 1_000);
        s.process_trade(100.0, 10.0, &[], 2_000); // unchanged, below mid => sell
        assert_eq!(s.last_side, TradeSide::Sell);

        s.set_quote(99.0, 100.6); // mid 99.8
        s.process_trade(100.0, 10.0, &[], 3_000); // unchanged, above mid => buy
        assert_eq!(s.last_side, TradeSide::Buy);
    }

    #[test]
    fn unchanged_price_without_quotes_inherits() {
        let mut s = TickSummary::default();
        s.process_trade(100.0, 10.0, &[], 1_000);
        s.process_trade(100.5, 10.0, &[], 2_000); // buy
        s.process_trade(100.5, 10.0, &[], 3_000); // unchanged, no quotes => inherit buy
        assert_eq!(s.last_side, TradeSide::Buy);
        assert!((s.snapshot().buy_volume - 20.0).abs() < 1e-9);
    }

    #[test]
    fn rejected_condition_codes() {
        let mut s = TickSummary::default();
        assert!(!s.process_trade(100.0, 10.0, &[15], 1_000)); // average price
        assert!(!s.process_trade(100.0, 10.0, &[1, 37], 2_000)); // contingent
        assert!(s.process_trade(100.0, 10.0, &[1, 2], 3_000)); // fine
        assert!((s.snapshot().total_volume - 10.0).abs() < 1e-9);
    }

    #[test]
    fn vwap_is_notional_over_volume() {
        let mut s = TickSummary::default();
        s.process_trade(100.0, 10.0, &[], 1_000);
        s.process_trade(110.0, 10.0, &[], 2_000);
        let snap = s.snapshot();
        assert!((snap.vwap.unwrap() - 105.0).abs() < 1e-9);
    }

    #[test]
    fn hod_lod_tracked() {
        let mut s = TickSummary::default();
        s.process_trade(100.0, 1.0, &[], 1_000);
        s.process_trade(104.0, 1.0, &[], 2_000);
        s.process_trade(98.0, 1.0, &[], 3_000);
        let snap = s.snapshot();
        assert_eq!(snap.high_of_day, Some(104.0));
        assert_eq!(snap.low_of_day, Some(98.0));
    }

    #[test]
    fn tape_trims_to_five_minutes() {
        let mut s = TickSummary::default();
        s.process_trade(100.0, 10.0, &[], 0);
        s.process_trade(100.5, 10.0, &[], 1_000);
        // Six minutes later: the first two age out.
        s.process_trade(101.0, 10.0, &[], 6 * 60 * 1000 + 1_500);
        let snap = s.snapshot();
        assert!((snap.tape_volume - 10.0).abs() < 1e-9);
    }

    #[test]
    fn rings_bounded_and_replace_in_progress() {
        let mut s = TickSummary::default();
        let bar = |ts: i64, close: f64| Candle {
            timestamp: ts,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
            vwap: None,
        };

        for i in 0..400 {
            s.push_minute_bar(bar(i, 100.0 + i as f64));
        }
        assert_eq!(s.minute_bars().len(), MAX_MINUTE_BARS);

        // Same timestamp replaces instead of appending.
        let len_before = s.minute_bars().len();
        s.push_minute_bar(bar(399, 999.0));
        assert_eq!(s.minute_bars().len(), len_before);
        assert_eq!(s.minute_bars().last().unwrap().close, 999.0);
    }

    #[test]
    fn cache_snapshot_by_copy() {
        let cache = TickSummaryCache::new();
        cache.process_trade("SPY", 450.0, 100.0, &[], 1_000);
        cache.process_trade("SPY", 450.5, 50.0, &[], 2_000);

        let snap = cache.snapshot("SPY").unwrap();
        assert!((snap.last_price - 450.5).abs() < 1e-9);
        assert!(cache.snapshot("UNKNOWN").is_none());
    }
}
