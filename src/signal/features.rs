// =============================================================================
// Feature Vector — fixed 25-slot layout
// =============================================================================
//
// The layout is frozen so downstream calibrators trained on exported journal
// data stay valid across releases. Slots hold raw (unscaled) readings; a slot
// is `None` when the underlying feed had no data, and a `None` slot
// contributes nothing to scoring.
//
// Slot semantics:
//   RSI             0..100
//   MACD_HIST       raw histogram value
//   EMA_ALIGN       +1 bullish stack, -1 bearish stack, 0 mixed
//   BB_POSITION     0..1 position within the bands
//   ATR             raw average true range (no direction)
//   CALL_PUT_RATIO  call premium / put premium over recent flow
//   DP_DIRECTION    net dark-pool direction in [-1, +1]
//   IV_RANK         0..100
//   SHORT_INTEREST  squeeze composite 0..6
//   VOLUME_SPIKE    1.0 when last bar volume spikes, else 0.0
//   BB_BANDWIDTH    band width % of middle
//   VWAP_DEV        (last - vwap) / vwap * 100
//   REGIME          +1 trending up, -1 trending down, 0 otherwise
//   GAMMA_PROXIMITY signed distance % to nearest wall (+) / magnet (-)
//   IV_SKEW         put IV - call IV, percentage points
//   CANDLE_SCORE    sum of pattern direction scores
//   SENTIMENT       news sentiment in [-1, +1]
//   ADX             ADX signed by the DI spread
//   RSI_DIVERGENCE  +2/-2 regular, +1/-1 hidden, 0 none
//   FIB_PROXIMITY   distance fraction to nearest retracement level
//   RSI_SLOPE       RSI - previous RSI
//   MACD_ACCEL      histogram - previous histogram
//   ATR_CHANGE      ATR / previous ATR - 1
//   RSI_X_EMA       (RSI - 50) / 50 * EMA_ALIGN
//   VOL_X_MACD      VOLUME_SPIKE * sign(MACD_HIST)
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::signal::regime::MarketRegime;
use crate::signal::squeeze::SqueezeScore;
use crate::store::{DarkPoolPrint, FlowItem, GexProfile, Quote};
use crate::ta::TechnicalsSnapshot;
use crate::types::Bias;

/// Number of feature slots. Frozen.
pub const FEATURE_COUNT: usize = 25;

/// Slot names, index-aligned with [`FeatureVector::values`].
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "RSI",
    "MACD_Hist",
    "EMA_Align",
    "BB_Position",
    "ATR",
    "CallPut_Ratio",
    "DP_Direction",
    "IV_Rank",
    "Short_Interest",
    "Volume_Spike",
    "BB_Bandwidth",
    "VWAP_Dev",
    "Regime",
    "Gamma_Proximity",
    "IV_Skew",
    "Candle_Score",
    "Sentiment",
    "ADX",
    "RSI_Divergence",
    "Fib_Proximity",
    "RSI_Slope",
    "MACD_Accel",
    "ATR_Change",
    "RSI_x_EMA",
    "Vol_x_MACD",
];

// Index constants used by the scoring engine.
pub const F_RSI: usize = 0;
pub const F_MACD_HIST: usize = 1;
pub const F_EMA_ALIGN: usize = 2;
pub const F_BB_POSITION: usize = 3;
pub const F_ATR: usize = 4;
pub const F_CALL_PUT_RATIO: usize = 5;
pub const F_DP_DIRECTION: usize = 6;
pub const F_IV_RANK: usize = 7;
pub const F_SHORT_INTEREST: usize = 8;
pub const F_VOLUME_SPIKE: usize = 9;
pub const F_BB_BANDWIDTH: usize = 10;
pub const F_VWAP_DEV: usize = 11;
pub const F_REGIME: usize = 12;
pub const F_GAMMA_PROXIMITY: usize = 13;
pub const F_IV_SKEW: usize = 14;
pub const F_CANDLE_SCORE: usize = 15;
pub const F_SENTIMENT: usize = 16;
pub const F_ADX: usize = 17;
pub const F_RSI_DIVERGENCE: usize = 18;
pub const F_FIB_PROXIMITY: usize = 19;
pub const F_RSI_SLOPE: usize = 20;
pub const F_MACD_ACCEL: usize = 21;
pub const F_ATR_CHANGE: usize = 22;
pub const F_RSI_X_EMA: usize = 23;
pub const F_VOL_X_MACD: usize = 24;

/// The fixed-layout feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FeatureVector {
    pub values: Vec<Option<f64>>,
}

impl FeatureVector {
    pub fn empty() -> Self {
        Self {
            values: vec![None; FEATURE_COUNT],
        }
    }

    pub fn get(&self, idx: usize) -> Option<f64> {
        self.values.get(idx).copied().flatten()
    }

    fn set(&mut self, idx: usize, value: Option<f64>) {
        if idx < self.values.len() {
            // Non-finite readings are invalid data and contribute nothing.
            self.values[idx] = value.filter(|v| v.is_finite());
        }
    }

    /// Number of populated slots.
    pub fn present(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }
}

/// Everything the extractor may draw on for one ticker. All fields optional;
/// extraction degrades gracefully.
#[derive(Debug, Clone, Default)]
pub struct FeatureContext {
    pub quote: Option<Quote>,
    pub technicals: Option<TechnicalsSnapshot>,
    pub prev_technicals: Option<TechnicalsSnapshot>,
    pub flow: Vec<FlowItem>,
    pub dark_pool: Vec<DarkPoolPrint>,
    pub gex: Option<GexProfile>,
    pub squeeze: Option<SqueezeScore>,
    pub iv_rank: Option<f64>,
    pub iv_skew: Option<f64>,
    pub sentiment: Option<f64>,
    pub regime: MarketRegime,
}

/// Extract the full feature vector from a ticker context.
pub fn extract_features(ctx: &FeatureContext) -> FeatureVector {
    let mut fv = FeatureVector::empty();

    let last_price = ctx.quote.as_ref().map(|q| q.last);

    if let Some(ta) = &ctx.technicals {
        fv.set(F_RSI, ta.rsi);
        fv.set(F_MACD_HIST, ta.macd.map(|m| m.histogram));
        fv.set(F_EMA_ALIGN, Some(ema_alignment(ta)));
        fv.set(F_BB_POSITION, ta.bollinger.map(|b| b.position));
        fv.set(F_ATR, ta.atr);
        fv.set(F_BB_BANDWIDTH, ta.bollinger.map(|b| b.bandwidth));
        fv.set(
            F_CANDLE_SCORE,
            Some(ta.patterns.iter().map(|p| p.direction_score() as f64).sum()),
        );
        fv.set(F_VOLUME_SPIKE, Some(if ta.volume_spike { 1.0 } else { 0.0 }));
        fv.set(
            F_ADX,
            ta.adx.map(|a| a.adx * a.di_spread().signum()),
        );
        fv.set(
            F_RSI_DIVERGENCE,
            Some(ta.divergence.map(|d| d.bias_points() as f64).unwrap_or(0.0)),
        );
        fv.set(
            F_FIB_PROXIMITY,
            ta.fibonacci.as_ref().and_then(|fib| {
                last_price.and_then(|p| crate::ta::swings::nearest_level_distance(fib, p))
            }),
        );

        if let Some(prev) = &ctx.prev_technicals {
            fv.set(
                F_RSI_SLOPE,
                match (ta.rsi, prev.rsi) {
                    (Some(a), Some(b)) => Some(a - b),
                    _ => None,
                },
            );
            fv.set(
                F_MACD_ACCEL,
                match (ta.macd, prev.macd) {
                    (Some(a), Some(b)) => Some(a.histogram - b.histogram),
                    _ => None,
                },
            );
            fv.set(
                F_ATR_CHANGE,
                match (ta.atr, prev.atr) {
                    (Some(a), Some(b)) if b > 0.0 => Some(a / b - 1.0),
                    _ => None,
                },
            );
        }

        // Interaction terms.
        if let Some(rsi) = ta.rsi {
            fv.set(F_RSI_X_EMA, Some((rsi - 50.0) / 50.0 * ema_alignment(ta)));
        }
        if let Some(m) = ta.macd {
            let spike = if ta.volume_spike { 1.0 } else { 0.0 };
            fv.set(F_VOL_X_MACD, Some(spike * m.histogram.signum()));
        }
    }

    if let Some(q) = &ctx.quote {
        if let Some(vwap) = q.vwap {
            if vwap > 0.0 {
                fv.set(F_VWAP_DEV, Some((q.last - vwap) / vwap * 100.0));
            }
        }
    }

    fv.set(F_CALL_PUT_RATIO, call_put_ratio(&ctx.flow));
    fv.set(F_DP_DIRECTION, dark_pool_direction(&ctx.dark_pool));
    fv.set(F_IV_RANK, ctx.iv_rank.filter(|v| (0.0..=100.0).contains(v)));
    fv.set(F_IV_SKEW, ctx.iv_skew);
    fv.set(F_SHORT_INTEREST, ctx.squeeze.map(|s| s.score as f64));
    fv.set(F_SENTIMENT, ctx.sentiment.map(|s| s.clamp(-1.0, 1.0)));
    fv.set(F_REGIME, Some(ctx.regime.feature_value()));
    fv.set(
        F_GAMMA_PROXIMITY,
        gamma_proximity(ctx.gex.as_ref(), last_price),
    );

    fv
}

// =============================================================================
// Extraction helpers
// =============================================================================

/// +1 bullish EMA stack, -1 bearish, 0 mixed.
fn ema_alignment(ta: &TechnicalsSnapshot) -> f64 {
    match (ta.ema9, ta.ema20, ta.ema50) {
        (Some(e9), Some(e20), Some(e50)) => {
            if e9 > e20 && e20 > e50 {
                1.0
            } else if e9 < e20 && e20 < e50 {
                -1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

/// Call premium over put premium across the recent flow tape.
fn call_put_ratio(flow: &[FlowItem]) -> Option<f64> {
    if flow.is_empty() {
        return None;
    }
    let call: f64 = flow
        .iter()
        .filter(|f| f.contract == crate::store::ContractType::Call)
        .map(|f| f.premium)
        .sum();
    let put: f64 = flow
        .iter()
        .filter(|f| f.contract == crate::store::ContractType::Put)
        .map(|f| f.premium)
        .sum();

    if put > 0.0 {
        Some(call / put)
    } else if call > 0.0 {
        // All calls — cap the ratio rather than dividing by zero.
        Some(10.0)
    } else {
        None
    }
}

/// Premium-weighted net dark-pool direction in [-1, +1].
fn dark_pool_direction(prints: &[DarkPoolPrint]) -> Option<f64> {
    if prints.is_empty() {
        return None;
    }
    let total: f64 = prints.iter().map(|p| p.premium).sum();
    if total <= 0.0 {
        return None;
    }
    let net: f64 = prints
        .iter()
        .map(|p| {
            let sign = match p.direction {
                Bias::Bullish => 1.0,
                Bias::Bearish => -1.0,
                Bias::Neutral => 0.0,
            };
            sign * p.premium
        })
        .sum();
    Some((net / total).clamp(-1.0, 1.0))
}

/// Signed distance % to the nearest gamma level: positive toward the closest
/// wall (support), negative toward the closest magnet.
fn gamma_proximity(gex: Option<&GexProfile>, price: Option<f64>) -> Option<f64> {
    let gex = gex?;
    let price = price.filter(|p| *p > 0.0)?;

    let wall_dist = gex.top_wall.map(|w| (price - w).abs() / price * 100.0);
    let magnet_dist = gex.top_magnet.map(|m| (price - m).abs() / price * 100.0);

    match (wall_dist, magnet_dist) {
        (Some(w), Some(m)) => Some(if w <= m { w } else { -m }),
        (Some(w), None) => Some(w),
        (None, Some(m)) => Some(-m),
        (None, None) => None,
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ContractType, ExecutionKind, GexRow};
    use chrono::Utc;

    fn flow_item(contract: ContractType, premium: f64) -> FlowItem {
        FlowItem {
            ticker: "SPY".into(),
            contract,
            strike: 450.0,
            expiry: "2026-09-18".into(),
            premium,
            execution: ExecutionKind::Sweep,
            executed_at: Utc::now(),
            direction: Bias::Bullish,
        }
    }

    #[test]
    fn vector_has_frozen_layout() {
        let fv = FeatureVector::empty();
        assert_eq!(fv.values.len(), FEATURE_COUNT);
        assert_eq!(FEATURE_NAMES.len(), FEATURE_COUNT);
        assert_eq!(FEATURE_NAMES[F_RSI], "RSI");
        assert_eq!(FEATURE_NAMES[F_VOL_X_MACD], "Vol_x_MACD");
    }

    #[test]
    fn empty_context_mostly_none() {
        let fv = extract_features(&FeatureContext::default());
        // Regime is always encodable; everything feed-driven is absent.
        assert_eq!(fv.get(F_REGIME), Some(0.0));
        assert!(fv.get(F_RSI).is_none());
        assert!(fv.get(F_CALL_PUT_RATIO).is_none());
        assert!(fv.get(F_DP_DIRECTION).is_none());
    }

    #[test]
    fn call_put_ratio_computed() {
        let flow = vec![
            flow_item(ContractType::Call, 300_000.0),
            flow_item(ContractType::Put, 100_000.0),
        ];
        assert_eq!(call_put_ratio(&flow), Some(3.0));
    }

    #[test]
    fn call_put_ratio_all_calls_capped() {
        let flow = vec![flow_item(ContractType::Call, 300_000.0)];
        assert_eq!(call_put_ratio(&flow), Some(10.0));
    }

    #[test]
    fn dark_pool_direction_weighted() {
        let mk = |direction: Bias, premium: f64| DarkPoolPrint {
            ticker: "SPY".into(),
            price: 450.0,
            size: 10_000.0,
            premium,
            executed_at: Utc::now(),
            direction,
        };
        let prints = vec![mk(Bias::Bullish, 3_000_000.0), mk(Bias::Bearish, 1_000_000.0)];
        let d = dark_pool_direction(&prints).unwrap();
        assert!((d - 0.5).abs() < 1e-10);
    }

    #[test]
    fn invalid_iv_rank_dropped() {
        let ctx = FeatureContext {
            iv_rank: Some(140.0),
            ..Default::default()
        };
        let fv = extract_features(&ctx);
        assert!(fv.get(F_IV_RANK).is_none());
    }

    #[test]
    fn sentiment_clamped() {
        let ctx = FeatureContext {
            sentiment: Some(3.5),
            ..Default::default()
        };
        let fv = extract_features(&ctx);
        assert_eq!(fv.get(F_SENTIMENT), Some(1.0));
    }

    #[test]
    fn gamma_proximity_sign() {
        let gex = GexProfile::from_rows(vec![
            GexRow { strike: 95.0, call_gex: 1e9, put_gex: -1e8 }, // wall
            GexRow { strike: 110.0, call_gex: 1e8, put_gex: -2e9 }, // magnet
        ]);
        // Price 96: wall (95) is 1.04% away, magnet (110) is 14.6% away.
        let prox = gamma_proximity(Some(&gex), Some(96.0)).unwrap();
        assert!(prox > 0.0);
        // Price 109: magnet wins.
        let prox = gamma_proximity(Some(&gex), Some(109.0)).unwrap();
        assert!(prox < 0.0);
    }
}
