// =============================================================================
// Alert Engine — event detection over flows, dark pool, and technicals
// =============================================================================
//
// Evaluators are stateless functions from a slice of the store to zero or
// more alerts. The engine wraps them with a per-(ticker, kind) cooldown so a
// condition that persists across cycles does not spam the ring. New alerts
// are pushed to the front of the store's bounded ring by the orchestrator.
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scheduler::Session;
use crate::store::{DarkPoolPrint, ExecutionKind, FlowItem, Quote};
use crate::ta::TechnicalsSnapshot;
use crate::types::{Bias, Severity};

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Options premium that makes a single print alert-worthy.
const FLOW_PREMIUM_ALERT: f64 = 250_000.0;
/// Premium that escalates a flow alert to HIGH severity.
const FLOW_PREMIUM_HIGH: f64 = 1_000_000.0;
/// Dark-pool share size considered a block.
const DARKPOOL_SIZE_ALERT: f64 = 100_000.0;
/// Dark-pool notional considered a block.
const DARKPOOL_NOTIONAL_ALERT: f64 = 1_000_000.0;
/// Re-alert suppression per (ticker, kind).
const COOLDOWN_MINUTES: i64 = 30;

// ---------------------------------------------------------------------------
// Alert record
// ---------------------------------------------------------------------------

/// What fired the alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertKind {
    FlowPremium,
    RsiExtreme,
    TrendConfluence,
    VolumeSpike,
    Gap,
    DarkPoolBlock,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FlowPremium => write!(f, "FLOW_PREMIUM"),
            Self::RsiExtreme => write!(f, "RSI_EXTREME"),
            Self::TrendConfluence => write!(f, "TREND_CONFLUENCE"),
            Self::VolumeSpike => write!(f, "VOLUME_SPIKE"),
            Self::Gap => write!(f, "GAP"),
            Self::DarkPoolBlock => write!(f, "DARK_POOL_BLOCK"),
        }
    }
}

/// A client-facing alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub ticker: String,
    pub session: Option<Session>,
    pub kind: AlertKind,
    pub direction: Bias,
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Wraps the stateless evaluators with cooldown bookkeeping.
pub struct AlertEngine {
    cooldowns: RwLock<HashMap<(String, AlertKind), DateTime<Utc>>>,
}

impl AlertEngine {
    pub fn new() -> Self {
        Self {
            cooldowns: RwLock::new(HashMap::new()),
        }
    }

    /// Run every evaluator for one ticker and return the alerts that survive
    /// the cooldown gate.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate_ticker(
        &self,
        ticker: &str,
        session: Option<Session>,
        quote: Option<&Quote>,
        technicals: Option<&TechnicalsSnapshot>,
        flow: &[FlowItem],
        dark_pool: &[DarkPoolPrint],
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        let mut candidates = Vec::new();

        candidates.extend(eval_flow(ticker, flow));
        candidates.extend(eval_dark_pool(ticker, dark_pool));

        if let Some(ta) = technicals {
            candidates.extend(eval_technicals(ticker, session, quote, ta));
        }

        // Cooldown gate: keep at most one alert per (ticker, kind) per window.
        let mut out = Vec::new();
        let mut cooldowns = self.cooldowns.write();
        for mut alert in candidates {
            let key = (ticker.to_string(), alert.kind);
            let blocked = cooldowns
                .get(&key)
                .is_some_and(|last| now - *last < Duration::minutes(COOLDOWN_MINUTES));
            if blocked {
                continue;
            }
            cooldowns.insert(key, now);
            alert.session = session;
            alert.timestamp = now;
            out.push(alert);
        }

        out
    }

    /// Drop cooldown entries older than the window (bounded memory).
    pub fn prune(&self, now: DateTime<Utc>) {
        self.cooldowns
            .write()
            .retain(|_, last| now - *last < Duration::minutes(COOLDOWN_MINUTES));
    }
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Stateless evaluators
// ---------------------------------------------------------------------------

fn new_alert(ticker: &str, kind: AlertKind, direction: Bias, severity: Severity, message: String) -> Alert {
    Alert {
        id: Uuid::new_v4().to_string(),
        ticker: ticker.to_string(),
        session: None,
        kind,
        direction,
        severity,
        message,
        timestamp: Utc::now(),
    }
}

/// Option-flow premium above thresholds, sweeps escalate severity.
fn eval_flow(ticker: &str, flow: &[FlowItem]) -> Vec<Alert> {
    let mut out = Vec::new();

    // Only the single largest qualifying print per cycle; the cooldown
    // handles repeats.
    let biggest = flow
        .iter()
        .filter(|f| f.premium >= FLOW_PREMIUM_ALERT)
        .max_by(|a, b| a.premium.partial_cmp(&b.premium).unwrap_or(std::cmp::Ordering::Equal));

    if let Some(item) = biggest {
        let is_sweep = item.execution == ExecutionKind::Sweep;
        let severity = if item.premium >= FLOW_PREMIUM_HIGH {
            Severity::High
        } else if is_sweep {
            Severity::Medium
        } else {
            Severity::Low
        };
        let exec = if is_sweep { "sweep" } else { "block" };
        out.push(new_alert(
            ticker,
            AlertKind::FlowPremium,
            item.direction,
            severity,
            format!(
                "{} ${:.0}k {:?} {} @ {}",
                exec,
                item.premium / 1_000.0,
                item.contract,
                item.strike,
                item.expiry
            ),
        ));
    }

    out
}

/// Large dark-pool print: > 100k shares or > $1M notional.
fn eval_dark_pool(ticker: &str, prints: &[DarkPoolPrint]) -> Vec<Alert> {
    let mut out = Vec::new();

    let biggest = prints
        .iter()
        .filter(|p| p.size >= DARKPOOL_SIZE_ALERT || p.premium >= DARKPOOL_NOTIONAL_ALERT)
        .max_by(|a, b| a.premium.partial_cmp(&b.premium).unwrap_or(std::cmp::Ordering::Equal));

    if let Some(print) = biggest {
        let severity = if print.premium >= 5.0 * DARKPOOL_NOTIONAL_ALERT {
            Severity::High
        } else {
            Severity::Medium
        };
        out.push(new_alert(
            ticker,
            AlertKind::DarkPoolBlock,
            print.direction,
            severity,
            format!(
                "dark pool {:.0} shares @ {:.2} (${:.1}M)",
                print.size,
                print.price,
                print.premium / 1_000_000.0
            ),
        ));
    }

    out
}

/// Technical triggers: RSI extremes, EMA x MACD confluence, volume spike,
/// gap on the most recent bar.
fn eval_technicals(
    ticker: &str,
    session: Option<Session>,
    quote: Option<&Quote>,
    ta: &TechnicalsSnapshot,
) -> Vec<Alert> {
    let mut out = Vec::new();

    if let Some(rsi) = ta.rsi {
        if rsi >= 80.0 || rsi <= 20.0 {
            let direction = if rsi <= 20.0 { Bias::Bullish } else { Bias::Bearish };
            let session_note = session
                .map(|s| format!(" during {s}"))
                .unwrap_or_default();
            out.push(new_alert(
                ticker,
                AlertKind::RsiExtreme,
                direction,
                Severity::Medium,
                format!("RSI at {rsi:.1}{session_note}"),
            ));
        }
    }

    // EMA alignment confirmed by the MACD histogram.
    if let (Some(e9), Some(e20), Some(e50), Some(macd)) = (ta.ema9, ta.ema20, ta.ema50, ta.macd) {
        let bullish = e9 > e20 && e20 > e50 && macd.histogram > 0.0;
        let bearish = e9 < e20 && e20 < e50 && macd.histogram < 0.0;
        if bullish || bearish {
            let direction = if bullish { Bias::Bullish } else { Bias::Bearish };
            out.push(new_alert(
                ticker,
                AlertKind::TrendConfluence,
                direction,
                Severity::Low,
                format!("EMA stack aligned with MACD histogram {:.3}", macd.histogram),
            ));
        }
    }

    if ta.volume_spike {
        let direction = match ta.bias {
            Bias::Bullish => Bias::Bullish,
            Bias::Bearish => Bias::Bearish,
            Bias::Neutral => Bias::Neutral,
        };
        let last = quote.map(|q| q.last).unwrap_or(ta.last_close);
        out.push(new_alert(
            ticker,
            AlertKind::VolumeSpike,
            direction,
            Severity::Low,
            format!("volume spike at {last:.2}"),
        ));
    }

    // Gap on the most recent bar only.
    if let Some(gap) = ta
        .gaps
        .last()
        .filter(|g| g.bar_index + 1 == ta.bar_count)
    {
        let direction = match gap.kind {
            crate::ta::pivots::GapKind::GapUp => Bias::Bullish,
            crate::ta::pivots::GapKind::GapDown => Bias::Bearish,
        };
        let severity = if gap.pct.abs() >= 2.0 {
            Severity::High
        } else {
            Severity::Medium
        };
        out.push(new_alert(
            ticker,
            AlertKind::Gap,
            direction,
            severity,
            format!("{:+.2}% gap", gap.pct),
        ));
    }

    out
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ContractType;

    fn sweep(premium: f64) -> FlowItem {
        FlowItem {
            ticker: "NVDA".into(),
            contract: ContractType::Call,
            strike: 800.0,
            expiry: "2026-08-21".into(),
            premium,
            execution: ExecutionKind::Sweep,
            executed_at: Utc::now(),
            direction: Bias::Bullish,
        }
    }

    fn dp(size: f64, premium: f64) -> DarkPoolPrint {
        DarkPoolPrint {
            ticker: "NVDA".into(),
            price: 800.0,
            size,
            premium,
            executed_at: Utc::now(),
            direction: Bias::Bullish,
        }
    }

    #[test]
    fn big_sweep_fires_flow_alert() {
        let engine = AlertEngine::new();
        let alerts = engine.evaluate_ticker(
            "NVDA",
            Some(Session::Midday),
            None,
            None,
            &[sweep(1_500_000.0)],
            &[],
            Utc::now(),
        );
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::FlowPremium);
        assert_eq!(alerts[0].severity, Severity::High);
        assert_eq!(alerts[0].session, Some(Session::Midday));
    }

    #[test]
    fn small_flow_ignored() {
        let engine = AlertEngine::new();
        let alerts = engine.evaluate_ticker(
            "NVDA",
            None,
            None,
            None,
            &[sweep(50_000.0)],
            &[],
            Utc::now(),
        );
        assert!(alerts.is_empty());
    }

    #[test]
    fn dark_pool_block_by_size_or_notional() {
        let engine = AlertEngine::new();
        let now = Utc::now();

        let by_size = engine.evaluate_ticker("A", None, None, None, &[], &[dp(150_000.0, 500_000.0)], now);
        assert_eq!(by_size.len(), 1);
        assert_eq!(by_size[0].kind, AlertKind::DarkPoolBlock);

        let by_notional = engine.evaluate_ticker("B", None, None, None, &[], &[dp(50_000.0, 2_000_000.0)], now);
        assert_eq!(by_notional.len(), 1);

        let neither = engine.evaluate_ticker("C", None, None, None, &[], &[dp(10_000.0, 200_000.0)], now);
        assert!(neither.is_empty());
    }

    #[test]
    fn cooldown_suppresses_repeats() {
        let engine = AlertEngine::new();
        let t0 = Utc::now();

        let first = engine.evaluate_ticker("NVDA", None, None, None, &[sweep(2e6)], &[], t0);
        assert_eq!(first.len(), 1);

        // Same condition 10 minutes later: suppressed.
        let again = engine.evaluate_ticker(
            "NVDA",
            None,
            None,
            None,
            &[sweep(2e6)],
            &[],
            t0 + Duration::minutes(10),
        );
        assert!(again.is_empty());

        // After the window: fires again.
        let later = engine.evaluate_ticker(
            "NVDA",
            None,
            None,
            None,
            &[sweep(2e6)],
            &[],
            t0 + Duration::minutes(31),
        );
        assert_eq!(later.len(), 1);
    }

    #[test]
    fn cooldown_is_per_ticker() {
        let engine = AlertEngine::new();
        let t0 = Utc::now();
        assert_eq!(engine.evaluate_ticker("AAA", None, None, None, &[sweep(2e6)], &[], t0).len(), 1);
        assert_eq!(engine.evaluate_ticker("BBB", None, None, None, &[sweep(2e6)], &[], t0).len(), 1);
    }

    #[test]
    fn rsi_extreme_alert_with_session() {
        let candles: Vec<crate::store::Candle> = (0..60)
            .map(|i| {
                let close = 100.0 + i as f64;
                crate::store::Candle {
                    timestamp: i,
                    open: close - 0.5,
                    high: close + 0.3,
                    low: close - 0.8,
                    close,
                    volume: 1e6,
                    vwap: None,
                }
            })
            .collect();
        let ta = crate::ta::analyze(&candles).unwrap();
        assert!(ta.rsi.unwrap() > 80.0);

        let engine = AlertEngine::new();
        let alerts =
            engine.evaluate_ticker("SPY", Some(Session::PowerHour), None, Some(&ta), &[], &[], Utc::now());
        let rsi_alert = alerts.iter().find(|a| a.kind == AlertKind::RsiExtreme).unwrap();
        assert!(rsi_alert.message.contains("POWER_HOUR"));
        assert_eq!(rsi_alert.direction, Bias::Bearish);
    }

    #[test]
    fn prune_drops_stale_entries() {
        let engine = AlertEngine::new();
        let t0 = Utc::now();
        engine.evaluate_ticker("NVDA", None, None, None, &[sweep(2e6)], &[], t0);
        assert_eq!(engine.cooldowns.read().len(), 1);
        engine.prune(t0 + Duration::minutes(31));
        assert!(engine.cooldowns.read().is_empty());
    }
}
