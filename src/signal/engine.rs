// =============================================================================
// Signal Engine — per-ticker fusion of technicals, flow, dark pool, GEX,
// squeeze, filings, and sentiment into a directional score
// =============================================================================
//
// Scoring walks the fixed feature vector and accumulates bull/bear points
// through the const weight table below. The side with the higher score wins
// when the scores differ by at least `DIRECTION_DEADBAND`; confidence scales
// the score gap through an engine-wide normalizer and is capped at 95 — the
// engine never claims certainty.
//
// When an ML calibrator is registered, the rule confidence is blended with
// the model probability: blended = round(alpha*rule + (1-alpha)*ml).
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::signal::features::{self, FeatureContext, FeatureVector};
use crate::signal::setup::{self, TradeSetup};
use crate::signal::squeeze::SqueezeScore;
use crate::types::{Bias, TradeHorizon};

// ---------------------------------------------------------------------------
// Tunables — pinned in one place, never scattered
// ---------------------------------------------------------------------------

/// Minimum score gap before a direction is declared.
const DIRECTION_DEADBAND: f64 = 0.5;
/// Engine-wide confidence normalizer (score gap that maps to full scale).
const CONFIDENCE_NORMALIZER: f64 = 15.0;
/// Confidence ceiling.
const CONFIDENCE_CAP: f64 = 95.0;
/// Rule weight in the ensemble blend.
const ENSEMBLE_ALPHA: f64 = 0.7;

/// Per-feature weights.
const W_RSI_BAND: f64 = 0.5;
const W_RSI_EXTREME: f64 = 1.0;
const W_MACD: f64 = 2.0;
const W_EMA: f64 = 3.0;
const W_BB_EDGE: f64 = 0.5;
const W_CALL_PUT: f64 = 1.5;
const W_DARK_POOL: f64 = 1.5;
const W_SQUEEZE: f64 = 1.0;
const W_VWAP: f64 = 0.5;
const W_REGIME: f64 = 1.0;
const W_GAMMA: f64 = 0.5;
const W_CANDLE: f64 = 1.0;
const W_SENTIMENT: f64 = 1.0;
const W_ADX: f64 = 1.0;
const W_DIVERGENCE: f64 = 1.0;
const W_RSI_SLOPE: f64 = 0.5;
const W_MACD_ACCEL: f64 = 0.5;
const W_IV_SKEW: f64 = 0.5;

/// Call/put premium ratios beyond these bounds count as directional flow.
const CPR_BULL: f64 = 1.5;
const CPR_BEAR: f64 = 1.0 / 1.5;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// One named contribution to the final score, kept for explainability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalContribution {
    pub name: String,
    pub bull: f64,
    pub bear: f64,
}

/// The fused per-ticker signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalResult {
    pub ticker: String,
    pub direction: Bias,
    /// Conviction in the chosen direction, 0..100 (capped at 95).
    pub confidence: f64,
    pub bull_score: f64,
    pub bear_score: f64,
    pub features: FeatureVector,
    pub signals: Vec<SignalContribution>,
    pub horizon: TradeHorizon,
    pub setup: Option<TradeSetup>,
    pub squeeze: Option<SqueezeScore>,
    /// Model probability when a calibrator contributed, 0..1.
    pub ml_probability: Option<f64>,
}

// ---------------------------------------------------------------------------
// ML calibrator seam
// ---------------------------------------------------------------------------

/// Optional probability model trained on exported journal outcomes.
pub trait MlCalibrator: Send + Sync {
    /// Probability that the bullish side wins, 0..1. `None` when the model
    /// cannot score this vector (e.g. too many missing slots).
    fn predict(&self, features: &FeatureVector) -> Option<f64>;
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The fusion engine. Stateless apart from the optional calibrator.
pub struct SignalEngine {
    calibrator: Option<std::sync::Arc<dyn MlCalibrator>>,
}

impl SignalEngine {
    pub fn new() -> Self {
        Self { calibrator: None }
    }

    pub fn with_calibrator(calibrator: std::sync::Arc<dyn MlCalibrator>) -> Self {
        Self {
            calibrator: Some(calibrator),
        }
    }

    /// Evaluate one ticker from its feature context.
    pub fn evaluate(&self, ticker: &str, ctx: &FeatureContext) -> SignalResult {
        let fv = features::extract_features(ctx);
        let (bull, bear, contributions) = score_features(&fv);

        let gap = bull - bear;
        let direction = if gap >= DIRECTION_DEADBAND {
            Bias::Bullish
        } else if gap <= -DIRECTION_DEADBAND {
            Bias::Bearish
        } else {
            Bias::Neutral
        };

        let rule_confidence =
            (50.0 + 50.0 * gap.abs() / CONFIDENCE_NORMALIZER).clamp(0.0, CONFIDENCE_CAP);

        // Ensemble blend when a calibrator is present and willing to score.
        let ml_probability = self
            .calibrator
            .as_ref()
            .and_then(|c| c.predict(&fv))
            .filter(|p| (0.0..=1.0).contains(p));

        let confidence = match ml_probability {
            Some(p) => {
                // Model probability is for the bullish side; convert it into
                // conviction for whichever side the rules picked.
                let ml_conf = match direction {
                    Bias::Bearish => (1.0 - p) * 100.0,
                    _ => p * 100.0,
                };
                (ENSEMBLE_ALPHA * rule_confidence + (1.0 - ENSEMBLE_ALPHA) * ml_conf)
                    .round()
                    .clamp(0.0, CONFIDENCE_CAP)
            }
            None => rule_confidence,
        };

        // Setup generation needs a tradable bias and a price.
        let price = ctx.quote.as_ref().map(|q| q.last);
        let atr = ctx.technicals.as_ref().and_then(|t| t.atr);
        let pivot_spread = ctx
            .technicals
            .as_ref()
            .and_then(|t| t.pivots)
            .map(|p| (p.r1 - p.s1).abs());

        let setup = price.and_then(|p| {
            setup::generate_setup(
                direction,
                p,
                atr,
                pivot_spread,
                ctx.regime.stop_multiplier(),
                confidence,
                None,
            )
        });

        let horizon = setup
            .as_ref()
            .map(|s| s.horizon)
            .unwrap_or(TradeHorizon::DayTrade);

        SignalResult {
            ticker: ticker.to_string(),
            direction,
            confidence,
            bull_score: bull,
            bear_score: bear,
            features: fv,
            signals: contributions,
            horizon,
            setup,
            squeeze: ctx.squeeze,
            ml_probability,
        }
    }
}

impl Default for SignalEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Walk the feature vector and accumulate weighted bull/bear points.
///
/// Absent slots contribute nothing; invalid data was already dropped at the
/// adapter layer and is indistinguishable from missing data here.
fn score_features(fv: &FeatureVector) -> (f64, f64, Vec<SignalContribution>) {
    use crate::signal::features::*;

    let mut bull = 0.0;
    let mut bear = 0.0;
    let mut out: Vec<SignalContribution> = Vec::new();

    let mut add = |name: &str, b: f64, s: f64| {
        if b == 0.0 && s == 0.0 {
            return;
        }
        bull += b;
        bear += s;
        out.push(SignalContribution {
            name: name.to_string(),
            bull: b,
            bear: s,
        });
    };

    if let Some(rsi) = fv.get(F_RSI) {
        if rsi > 50.0 {
            add("rsi_band", W_RSI_BAND, 0.0);
        } else {
            add("rsi_band", 0.0, W_RSI_BAND);
        }
        if rsi < 30.0 {
            add("rsi_oversold", W_RSI_EXTREME, 0.0);
        } else if rsi > 70.0 {
            add("rsi_overbought", 0.0, W_RSI_EXTREME);
        }
    }

    if let Some(hist) = fv.get(F_MACD_HIST) {
        if hist > 0.0 {
            add("macd_histogram", W_MACD, 0.0);
        } else if hist < 0.0 {
            add("macd_histogram", 0.0, W_MACD);
        }
    }

    if let Some(align) = fv.get(F_EMA_ALIGN) {
        if align > 0.0 {
            add("ema_alignment", W_EMA, 0.0);
        } else if align < 0.0 {
            add("ema_alignment", 0.0, W_EMA);
        }
    }

    if let Some(pos) = fv.get(F_BB_POSITION) {
        // Touching a band leans mean-reversion.
        if pos <= 0.05 {
            add("bb_lower_tag", W_BB_EDGE, 0.0);
        } else if pos >= 0.95 {
            add("bb_upper_tag", 0.0, W_BB_EDGE);
        }
    }

    if let Some(cpr) = fv.get(F_CALL_PUT_RATIO) {
        if cpr > CPR_BULL {
            add("call_put_ratio", W_CALL_PUT, 0.0);
        } else if cpr < CPR_BEAR {
            add("call_put_ratio", 0.0, W_CALL_PUT);
        }
    }

    if let Some(dp) = fv.get(F_DP_DIRECTION) {
        if dp > 0.2 {
            add("dark_pool", W_DARK_POOL * dp, 0.0);
        } else if dp < -0.2 {
            add("dark_pool", 0.0, W_DARK_POOL * dp.abs());
        }
    }

    if let Some(sq) = fv.get(F_SHORT_INTEREST) {
        // A loaded squeeze is an upside catalyst.
        if sq >= 4.0 {
            add("squeeze", W_SQUEEZE, 0.0);
        }
    }

    if let Some(dev) = fv.get(F_VWAP_DEV) {
        if dev > 0.0 {
            add("vwap", W_VWAP, 0.0);
        } else if dev < 0.0 {
            add("vwap", 0.0, W_VWAP);
        }
    }

    if let Some(regime) = fv.get(F_REGIME) {
        if regime > 0.0 {
            add("regime", W_REGIME, 0.0);
        } else if regime < 0.0 {
            add("regime", 0.0, W_REGIME);
        }
    }

    if let Some(gamma) = fv.get(F_GAMMA_PROXIMITY) {
        // Near a wall (positive, close) supports price; near a magnet drags.
        if gamma > 0.0 && gamma < 1.0 {
            add("gamma_wall", W_GAMMA, 0.0);
        } else if gamma < 0.0 && gamma > -1.0 {
            add("gamma_magnet", 0.0, W_GAMMA);
        }
    }

    if let Some(candle) = fv.get(F_CANDLE_SCORE) {
        let clamped = candle.clamp(-2.0, 2.0);
        if clamped > 0.0 {
            add("candle_patterns", W_CANDLE * clamped, 0.0);
        } else if clamped < 0.0 {
            add("candle_patterns", 0.0, W_CANDLE * clamped.abs());
        }
    }

    if let Some(sent) = fv.get(F_SENTIMENT) {
        if sent > 0.1 {
            add("sentiment", W_SENTIMENT * sent, 0.0);
        } else if sent < -0.1 {
            add("sentiment", 0.0, W_SENTIMENT * sent.abs());
        }
    }

    if let Some(adx) = fv.get(F_ADX) {
        // Signed ADX: magnitude is strength, sign is the DI direction.
        if adx.abs() >= 25.0 {
            if adx > 0.0 {
                add("adx_trend", W_ADX, 0.0);
            } else {
                add("adx_trend", 0.0, W_ADX);
            }
        }
    }

    if let Some(div) = fv.get(F_RSI_DIVERGENCE) {
        // Slot already carries ±2 regular / ±1 hidden.
        if div > 0.0 {
            add("rsi_divergence", W_DIVERGENCE * div, 0.0);
        } else if div < 0.0 {
            add("rsi_divergence", 0.0, W_DIVERGENCE * div.abs());
        }
    }

    if let Some(slope) = fv.get(F_RSI_SLOPE) {
        if slope > 1.0 {
            add("rsi_slope", W_RSI_SLOPE, 0.0);
        } else if slope < -1.0 {
            add("rsi_slope", 0.0, W_RSI_SLOPE);
        }
    }

    if let Some(accel) = fv.get(F_MACD_ACCEL) {
        if accel > 0.0 {
            add("macd_accel", W_MACD_ACCEL, 0.0);
        } else if accel < 0.0 {
            add("macd_accel", 0.0, W_MACD_ACCEL);
        }
    }

    if let Some(skew) = fv.get(F_IV_SKEW) {
        // Heavy put skew signals hedging demand — a bearish tell.
        if skew > 5.0 {
            add("iv_skew", 0.0, W_IV_SKEW);
        } else if skew < -5.0 {
            add("iv_skew", W_IV_SKEW, 0.0);
        }
    }

    (bull, bear, out)
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::features::FeatureContext;
    use crate::store::{Candle, Quote};
    use crate::types::Direction;
    use chrono::Utc;

    fn rising_candles(n: usize, start: f64, end: f64) -> Vec<Candle> {
        let step = (end - start) / (n - 1) as f64;
        (0..n)
            .map(|i| {
                let close = start + step * i as f64;
                Candle {
                    timestamp: i as i64 * 86_400_000,
                    open: close - step * 0.5,
                    high: close + step * 0.3,
                    low: close - step * 0.8,
                    close,
                    volume: 1e6,
                    vwap: None,
                }
            })
            .collect()
    }

    fn quote(last: f64) -> Quote {
        Quote {
            last,
            bid: last - 0.05,
            ask: last + 0.05,
            change: 1.0,
            change_pct: 0.5,
            day_open: last - 1.0,
            day_high: last + 1.0,
            day_low: last - 2.0,
            day_volume: 1e7,
            vwap: None,
            prev_close: last - 1.0,
            updated_at: Utc::now(),
        }
    }

    fn bullish_context() -> FeatureContext {
        let candles = rising_candles(60, 100.0, 160.0);
        FeatureContext {
            quote: Some(quote(160.0)),
            technicals: crate::ta::analyze(&candles),
            ..Default::default()
        }
    }

    #[test]
    fn technicals_only_bullish_setup() {
        // No flow/DP/SI present — pure uptrend technicals must be enough.
        let engine = SignalEngine::new();
        let result = engine.evaluate("TEST", &bullish_context());

        assert_eq!(result.direction, Bias::Bullish);
        assert!(result.confidence >= 55.0, "confidence {}", result.confidence);

        let setup = result.setup.expect("bullish setup expected");
        assert_eq!(setup.direction, Direction::Long);
        assert!((setup.entry - 160.0).abs() < 1e-9);
        assert!((setup.risk_reward - 2.0).abs() < 1e-6);
    }

    #[test]
    fn empty_context_is_neutral() {
        let engine = SignalEngine::new();
        let result = engine.evaluate("TEST", &FeatureContext::default());
        assert_eq!(result.direction, Bias::Neutral);
        assert!(result.setup.is_none());
        assert!(result.confidence <= 55.0);
    }

    #[test]
    fn confidence_capped_at_95() {
        // Saturate every bullish slot by hand.
        let mut fv = FeatureVector::empty();
        for i in 0..fv.values.len() {
            fv.values[i] = Some(0.0);
        }
        let (bull, bear, _) = score_features(&fv);
        let conf = (50.0 + 50.0 * (bull - bear).abs() / CONFIDENCE_NORMALIZER).clamp(0.0, 95.0);
        assert!(conf <= 95.0);
    }

    #[test]
    fn scoring_is_deterministic() {
        let engine = SignalEngine::new();
        let ctx = bullish_context();
        let a = engine.evaluate("TEST", &ctx);
        let b = engine.evaluate("TEST", &ctx);
        assert_eq!(a.bull_score, b.bull_score);
        assert_eq!(a.bear_score, b.bear_score);
        assert_eq!(a.confidence, b.confidence);
    }

    struct FixedCalibrator(f64);
    impl MlCalibrator for FixedCalibrator {
        fn predict(&self, _features: &FeatureVector) -> Option<f64> {
            Some(self.0)
        }
    }

    #[test]
    fn ensemble_blends_rule_and_model() {
        let ctx = bullish_context();

        let rule_only = SignalEngine::new().evaluate("TEST", &ctx);
        let with_model =
            SignalEngine::with_calibrator(std::sync::Arc::new(FixedCalibrator(0.95)))
                .evaluate("TEST", &ctx);

        assert_eq!(with_model.ml_probability, Some(0.95));
        // A confident model nudges the blended confidence up and it stays
        // integral (round) and capped.
        assert!(with_model.confidence >= rule_only.confidence.min(95.0) - 1.0);
        assert!(with_model.confidence <= 95.0);
        assert_eq!(with_model.confidence, with_model.confidence.round());
    }

    #[test]
    fn model_rejected_outside_unit_interval() {
        let ctx = bullish_context();
        let result = SignalEngine::with_calibrator(std::sync::Arc::new(FixedCalibrator(1.7)))
            .evaluate("TEST", &ctx);
        assert!(result.ml_probability.is_none());
    }

    #[test]
    fn bearish_context_produces_short_setup() {
        let candles = rising_candles(60, 160.0, 100.0);
        let ctx = FeatureContext {
            quote: Some(quote(100.0)),
            technicals: crate::ta::analyze(&candles),
            ..Default::default()
        };
        let result = SignalEngine::new().evaluate("TEST", &ctx);
        assert_eq!(result.direction, Bias::Bearish);
        let setup = result.setup.unwrap();
        assert_eq!(setup.direction, Direction::Short);
        assert!(setup.stop > setup.entry);
    }
}
