// =============================================================================
// Response Adapters — narrow normalisation of vendor JSON into domain records
// =============================================================================
//
// Upstream responses are untyped JSON with many alternative field spellings
// (e.g. premium | total_premium | cost_basis). Each adapter knows the
// spellings for one endpoint family and produces the domain record; raw JSON
// never leaves the clients module.
//
// Adapters are lenient: a malformed element is skipped, never an error.
// =============================================================================

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::store::{
    Candle, CongressTrade, ContractType, DarkPoolPrint, ExecutionKind, FlowItem, FtdRecord,
    GexRow, MarketTide, NetImpactRow, NewsItem, Quote, ShortInterestRecord,
};
use crate::types::Bias;

// ---------------------------------------------------------------------------
// Primitive helpers
// ---------------------------------------------------------------------------

/// Parse a JSON value that may be either a string or a number into `f64`.
pub fn parse_f64(val: &Value) -> Option<f64> {
    match val {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// First present field among alternative spellings.
fn pick<'a>(obj: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|n| {
        let v = obj.get(n)?;
        if v.is_null() {
            None
        } else {
            Some(v)
        }
    })
}

fn pick_f64(obj: &Value, names: &[&str]) -> Option<f64> {
    pick(obj, names).and_then(parse_f64)
}

fn pick_str(obj: &Value, names: &[&str]) -> Option<String> {
    pick(obj, names).and_then(|v| v.as_str()).map(str::to_string)
}

/// Timestamps arrive as RFC 3339 strings or epoch milliseconds.
fn pick_datetime(obj: &Value, names: &[&str]) -> Option<DateTime<Utc>> {
    let v = pick(obj, names)?;
    if let Some(s) = v.as_str() {
        return DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc));
    }
    let ms = v.as_i64()?;
    DateTime::from_timestamp_millis(ms)
}

/// The array payload, tolerating a `data`/`results` wrapper object.
fn unwrap_rows(v: &Value) -> &[Value] {
    let inner = if v.is_array() {
        v
    } else {
        pick(v, &["data", "results", "items"]).unwrap_or(v)
    };
    inner.as_array().map(Vec::as_slice).unwrap_or(&[])
}

// ---------------------------------------------------------------------------
// Quote
// ---------------------------------------------------------------------------

/// `/stock/{T}/info`-style payload → [`Quote`].
pub fn parse_quote(v: &Value, now: DateTime<Utc>) -> Option<Quote> {
    let obj = if v.get("data").is_some() { &v["data"] } else { v };

    let last = pick_f64(obj, &["last", "price", "close", "last_price"])?;
    if last <= 0.0 {
        return None;
    }

    Some(Quote {
        last,
        bid: pick_f64(obj, &["bid", "bid_price"]).unwrap_or(0.0),
        ask: pick_f64(obj, &["ask", "ask_price"]).unwrap_or(0.0),
        change: pick_f64(obj, &["change", "net_change"]).unwrap_or(0.0),
        change_pct: pick_f64(obj, &["change_percent", "change_pct", "percent_change"]).unwrap_or(0.0),
        day_open: pick_f64(obj, &["open", "day_open"]).unwrap_or(last),
        day_high: pick_f64(obj, &["high", "day_high"]).unwrap_or(last),
        day_low: pick_f64(obj, &["low", "day_low"]).unwrap_or(last),
        day_volume: pick_f64(obj, &["volume", "day_volume", "total_volume"]).unwrap_or(0.0),
        vwap: pick_f64(obj, &["vwap"]),
        prev_close: pick_f64(obj, &["prev_close", "previous_close"]).unwrap_or(last),
        updated_at: now,
    })
}

// ---------------------------------------------------------------------------
// Options flow
// ---------------------------------------------------------------------------

/// Flow prints → [`FlowItem`]s. `default_ticker` fills rows that omit the
/// underlying (per-ticker endpoints do).
pub fn parse_flow_items(v: &Value, default_ticker: Option<&str>) -> Vec<FlowItem> {
    unwrap_rows(v)
        .iter()
        .filter_map(|row| {
            let ticker = pick_str(row, &["ticker", "underlying_symbol", "symbol"])
                .or_else(|| default_ticker.map(str::to_string))?
                .to_uppercase();

            let contract = match pick_str(row, &["type", "option_type", "put_call"])?
                .to_lowercase()
                .as_str()
            {
                "call" | "c" => ContractType::Call,
                "put" | "p" => ContractType::Put,
                _ => return None,
            };

            let premium = pick_f64(row, &["premium", "total_premium", "cost_basis"])?;
            let strike = pick_f64(row, &["strike", "strike_price"])?;
            let expiry = pick_str(row, &["expiry", "expiration", "expiration_date"])
                .unwrap_or_default();

            let execution = match pick_str(row, &["exec_type", "execution", "trade_type"])
                .unwrap_or_default()
                .to_lowercase()
                .as_str()
            {
                "sweep" => ExecutionKind::Sweep,
                "block" => ExecutionKind::Block,
                _ => ExecutionKind::Lit,
            };

            // Aggressor side: ask-side calls and bid-side puts lean bullish.
            let side = pick_str(row, &["side", "price_side"]).unwrap_or_default();
            let direction = match (contract, side.to_lowercase().as_str()) {
                (ContractType::Call, "ask") | (ContractType::Put, "bid") => Bias::Bullish,
                (ContractType::Call, "bid") | (ContractType::Put, "ask") => Bias::Bearish,
                _ => Bias::Neutral,
            };

            Some(FlowItem {
                ticker,
                contract,
                strike,
                expiry,
                premium,
                execution,
                executed_at: pick_datetime(row, &["executed_at", "timestamp", "time"])
                    .unwrap_or_else(Utc::now),
                direction,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Dark pool
// ---------------------------------------------------------------------------

/// Dark-pool prints → [`DarkPoolPrint`]s, classified against the spot quote:
/// above the ask bullish, below the bid bearish, else neutral.
pub fn parse_dark_pool(
    v: &Value,
    default_ticker: Option<&str>,
    bid: Option<f64>,
    ask: Option<f64>,
) -> Vec<DarkPoolPrint> {
    unwrap_rows(v)
        .iter()
        .filter_map(|row| {
            let ticker = pick_str(row, &["ticker", "symbol"])
                .or_else(|| default_ticker.map(str::to_string))?
                .to_uppercase();
            let price = pick_f64(row, &["price", "executed_price"])?;
            let size = pick_f64(row, &["size", "volume", "shares"])?;
            let premium = pick_f64(row, &["premium", "notional", "amount"])
                .unwrap_or(price * size);

            let direction = match (bid, ask) {
                (_, Some(a)) if price > a => Bias::Bullish,
                (Some(b), _) if price < b => Bias::Bearish,
                _ => Bias::Neutral,
            };

            Some(DarkPoolPrint {
                ticker,
                price,
                size,
                premium,
                executed_at: pick_datetime(row, &["executed_at", "timestamp", "time"])
                    .unwrap_or_else(Utc::now),
                direction,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// GEX, short interest, FTDs
// ---------------------------------------------------------------------------

/// `/stock/{T}/greek-exposure/strike` rows → [`GexRow`]s.
pub fn parse_gex_rows(v: &Value) -> Vec<GexRow> {
    unwrap_rows(v)
        .iter()
        .filter_map(|row| {
            Some(GexRow {
                strike: pick_f64(row, &["strike", "strike_price"])?,
                call_gex: pick_f64(row, &["call_gex", "call_gamma_exposure", "call_gamma"])?,
                put_gex: pick_f64(row, &["put_gex", "put_gamma_exposure", "put_gamma"])?,
            })
        })
        .collect()
}

/// `/shorts/{T}/interest-float` → [`ShortInterestRecord`].
pub fn parse_short_interest(v: &Value) -> Option<ShortInterestRecord> {
    let obj = if v.get("data").is_some() { &v["data"] } else { v };
    // Tolerate a single-element array wrapper.
    let obj = match obj.as_array() {
        Some(arr) => arr.first()?,
        None => obj,
    };

    let percent_of_float = pick_f64(obj, &["si_percent_float", "percent_of_float", "short_percent_of_float"])?;

    Some(ShortInterestRecord {
        percent_of_float,
        days_to_cover: pick_f64(obj, &["days_to_cover", "dtc"]).unwrap_or(0.0),
        utilization: pick_f64(obj, &["utilization", "utilization_pct"]),
        reported_at: pick_str(obj, &["date", "reported_at", "settlement_date"]).unwrap_or_default(),
        short_volume_ratio: pick_f64(obj, &["short_volume_ratio", "short_volume_pct"]),
    })
}

/// Fails-to-deliver rows → [`FtdRecord`]s.
pub fn parse_ftds(v: &Value) -> Vec<FtdRecord> {
    unwrap_rows(v)
        .iter()
        .filter_map(|row| {
            Some(FtdRecord {
                date: pick_str(row, &["date", "settlement_date"])?,
                quantity: pick_f64(row, &["quantity", "fails", "ftd_shares"])?,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// OHLC bars
// ---------------------------------------------------------------------------

/// Aggregate bars → [`Candle`]s, ascending. Accepts `t/o/h/l/c/v[/vw]` short
/// spellings or full names.
pub fn parse_ohlc_bars(v: &Value) -> Vec<Candle> {
    let mut bars: Vec<Candle> = unwrap_rows(v)
        .iter()
        .filter_map(|row| {
            Some(Candle {
                timestamp: pick(row, &["t", "timestamp", "time", "start_time"])
                    .and_then(Value::as_i64)?,
                open: pick_f64(row, &["o", "open"])?,
                high: pick_f64(row, &["h", "high"])?,
                low: pick_f64(row, &["l", "low"])?,
                close: pick_f64(row, &["c", "close"])?,
                volume: pick_f64(row, &["v", "volume"]).unwrap_or(0.0),
                vwap: pick_f64(row, &["vw", "vwap"]),
            })
        })
        .collect();

    bars.sort_by_key(|b| b.timestamp);
    bars
}

// ---------------------------------------------------------------------------
// Market-wide feeds
// ---------------------------------------------------------------------------

/// News headlines → [`NewsItem`]s.
pub fn parse_news(v: &Value) -> Vec<NewsItem> {
    unwrap_rows(v)
        .iter()
        .filter_map(|row| {
            let headline = pick_str(row, &["headline", "title"])?;
            let tickers = row
                .get("tickers")
                .or_else(|| row.get("symbols"))
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(Value::as_str)
                        .map(|s| s.to_uppercase())
                        .collect()
                })
                .unwrap_or_default();

            Some(NewsItem {
                headline,
                source: pick_str(row, &["source", "publisher"]).unwrap_or_default(),
                tickers,
                published_at: pick_datetime(row, &["published_at", "created_at", "timestamp"])
                    .unwrap_or_else(Utc::now),
            })
        })
        .collect()
}

/// Congressional / insider filings → [`CongressTrade`]s.
pub fn parse_congress(v: &Value) -> Vec<CongressTrade> {
    unwrap_rows(v)
        .iter()
        .filter_map(|row| {
            Some(CongressTrade {
                ticker: pick_str(row, &["ticker", "symbol"])?.to_uppercase(),
                member: pick_str(row, &["member", "representative", "reporter", "name"])
                    .unwrap_or_default(),
                side: pick_str(row, &["side", "transaction_type", "txn_type"])
                    .unwrap_or_default()
                    .to_lowercase(),
                amount_range: pick_str(row, &["amounts", "amount_range", "amount"]).unwrap_or_default(),
                transaction_date: pick_str(row, &["transaction_date", "txn_date"]).unwrap_or_default(),
                disclosed_at: pick_str(row, &["disclosed_at", "filed_at", "disclosure_date"])
                    .unwrap_or_default(),
            })
        })
        .collect()
}

/// Net-impact leaderboard rows.
pub fn parse_net_impact(v: &Value) -> Vec<NetImpactRow> {
    unwrap_rows(v)
        .iter()
        .filter_map(|row| {
            Some(NetImpactRow {
                ticker: pick_str(row, &["ticker", "symbol"])?.to_uppercase(),
                net_premium: pick_f64(row, &["net_premium", "net_impact", "net_value"])?,
            })
        })
        .collect()
}

/// Market tide aggregate.
pub fn parse_market_tide(v: &Value, now: DateTime<Utc>) -> Option<MarketTide> {
    let obj = if v.get("data").is_some() { &v["data"] } else { v };
    // Tide endpoints return a time series; the newest row is the reading.
    let obj = match obj.as_array() {
        Some(arr) => arr.last()?,
        None => obj,
    };

    Some(MarketTide {
        net_call_premium: pick_f64(obj, &["net_call_premium", "net_call_prem"])?,
        net_put_premium: pick_f64(obj, &["net_put_premium", "net_put_prem"])?,
        updated_at: Some(now),
    })
}

/// Gainers/losers rows → (ticker, % change).
pub fn parse_movers(v: &Value) -> Vec<(String, f64)> {
    unwrap_rows(v)
        .iter()
        .filter_map(|row| {
            let ticker = pick_str(row, &["ticker", "symbol", "T"])?.to_uppercase();
            let pct = pick_f64(row, &["change_percent", "todaysChangePerc", "percent_change"])?;
            Some((ticker, pct))
        })
        .collect()
}

/// IV-rank payloads carry a single number under assorted names.
pub fn parse_iv_rank(v: &Value) -> Option<f64> {
    let obj = if v.get("data").is_some() { &v["data"] } else { v };
    let obj = match obj.as_array() {
        Some(arr) => arr.last()?,
        None => obj,
    };
    pick_f64(obj, &["iv_rank", "iv_rank_1y", "rank"]).filter(|r| (0.0..=100.0).contains(r))
}

/// Greeks payload → IV skew (put IV - call IV, percentage points).
pub fn parse_iv_skew(v: &Value) -> Option<f64> {
    let obj = if v.get("data").is_some() { &v["data"] } else { v };
    let obj = match obj.as_array() {
        Some(arr) => arr.last()?,
        None => obj,
    };
    let put_iv = pick_f64(obj, &["put_iv", "put_implied_volatility"])?;
    let call_iv = pick_f64(obj, &["call_iv", "call_implied_volatility"])?;
    Some((put_iv - call_iv) * 100.0)
}

/// Options-volume payload → (call volume, put volume).
pub fn parse_call_put_volume(v: &Value) -> Option<(f64, f64)> {
    let obj = if v.get("data").is_some() { &v["data"] } else { v };
    let obj = match obj.as_array() {
        Some(arr) => arr.last()?,
        None => obj,
    };
    let call = pick_f64(obj, &["call_volume", "calls", "total_call_volume"])?;
    let put = pick_f64(obj, &["put_volume", "puts", "total_put_volume"])?;
    Some((call, put))
}

/// Max-pain payload → strike.
pub fn parse_max_pain(v: &Value) -> Option<f64> {
    let obj = if v.get("data").is_some() { &v["data"] } else { v };
    let obj = match obj.as_array() {
        Some(arr) => arr.last()?,
        None => obj,
    };
    pick_f64(obj, &["max_pain", "max_pain_strike", "strike"])
}

/// Spike / volatility reading → latest level.
pub fn parse_spike(v: &Value) -> Option<f64> {
    let obj = if v.get("data").is_some() { &v["data"] } else { v };
    let obj = match obj.as_array() {
        Some(arr) => arr.last()?,
        None => obj,
    };
    pick_f64(obj, &["value", "spike", "level", "close"]).filter(|s| *s >= 0.0)
}

/// Earnings payload → next report date string.
pub fn parse_earnings_date(v: &Value) -> Option<String> {
    let obj = if v.get("data").is_some() { &v["data"] } else { v };
    let obj = match obj.as_array() {
        Some(arr) => arr.first()?,
        None => obj,
    };
    pick_str(obj, &["next_earnings_date", "report_date", "date"])
}

/// Economic / FDA calendar rows → [`EconomicEvent`]s.
pub fn parse_economic_calendar(v: &Value) -> Vec<crate::store::EconomicEvent> {
    unwrap_rows(v)
        .iter()
        .filter_map(|row| {
            Some(crate::store::EconomicEvent {
                title: pick_str(row, &["event", "title", "name"])?,
                importance: pick_str(row, &["importance", "impact"]).unwrap_or_default(),
                scheduled_at: pick_datetime(row, &["time", "scheduled_at", "date"])?,
            })
        })
        .collect()
}
