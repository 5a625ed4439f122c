// =============================================================================
// Trade Setup Generator
// =============================================================================
//
// Converts a directional bias plus a current price and volatility into a
// concrete (entry, target1, target2, stop) consumable by the paper journal.
//
//   LONG:  entry = price
//          t1    = price + ATR
//          t2    = price + 2*ATR
//          stop  = price - stop_mult*ATR       (stop_mult defaults to 0.5)
//   SHORT: mirror.
//
// Invariant: for LONG, stop < entry <= t1 <= t2 (reversed for SHORT), and
// riskReward == |t1 - entry| / |entry - stop|.
//
// When no ATR is available, the pivot spread |r1 - s1| / 2 stands in.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::scheduler::Session;
use crate::types::{Bias, Direction, TradeHorizon};

/// Default stop distance in ATR multiples.
pub const DEFAULT_STOP_MULT: f64 = 0.5;

/// A concrete, journal-ready trade setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSetup {
    pub direction: Direction,
    pub entry: f64,
    pub target1: f64,
    pub target2: f64,
    pub stop: f64,
    pub risk_reward: f64,
    /// Confidence inherited from the signal result, 0..100.
    pub confidence: f64,
    pub horizon: TradeHorizon,
    pub session: Option<Session>,
}

/// Build a setup from a bias, price, and volatility estimate.
///
/// Returns `None` when:
/// - `bias` is neutral (no directional edge to trade).
/// - `price` is not a positive finite number.
/// - Neither an ATR nor a pivot spread is available or positive.
pub fn generate_setup(
    bias: Bias,
    price: f64,
    atr: Option<f64>,
    pivot_spread: Option<f64>,
    stop_mult: f64,
    confidence: f64,
    session: Option<Session>,
) -> Option<TradeSetup> {
    let direction = match bias {
        Bias::Bullish => Direction::Long,
        Bias::Bearish => Direction::Short,
        Bias::Neutral => return None,
    };

    if !(price > 0.0) || !price.is_finite() {
        return None;
    }

    // ATR, or fall back to half the pivot R1-S1 spread.
    let vol = match atr.filter(|a| *a > 0.0 && a.is_finite()) {
        Some(a) => a,
        None => pivot_spread.filter(|s| *s > 0.0 && s.is_finite())? / 2.0,
    };

    let stop_mult = if stop_mult > 0.0 { stop_mult } else { DEFAULT_STOP_MULT };

    let (entry, target1, target2, stop) = match direction {
        Direction::Long => (price, price + vol, price + 2.0 * vol, price - stop_mult * vol),
        Direction::Short => (price, price - vol, price - 2.0 * vol, price + stop_mult * vol),
    };

    if stop <= 0.0 {
        return None;
    }

    let risk = (entry - stop).abs();
    if risk == 0.0 {
        return None;
    }
    let risk_reward = (target1 - entry).abs() / risk;

    Some(TradeSetup {
        direction,
        entry,
        target1,
        target2,
        stop,
        risk_reward,
        confidence,
        horizon: classify_horizon(entry, target1),
        session,
    })
}

/// Classify the holding horizon from the expected move to target1.
///
///   > 5%    Swing 3-5d
///   > 2%    Swing 1-3d
///   > 0.8%  Day trade
///   else    Scalp
pub fn classify_horizon(entry: f64, target1: f64) -> TradeHorizon {
    if entry <= 0.0 {
        return TradeHorizon::Scalp;
    }
    let move_pct = (target1 - entry).abs() / entry * 100.0;

    if move_pct > 5.0 {
        TradeHorizon::Swing3to5d
    } else if move_pct > 2.0 {
        TradeHorizon::Swing1to3d
    } else if move_pct > 0.8 {
        TradeHorizon::DayTrade
    } else {
        TradeHorizon::Scalp
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_setup_invariants() {
        let s = generate_setup(Bias::Bullish, 160.0, Some(2.0), None, 0.5, 60.0, None).unwrap();
        assert_eq!(s.direction, Direction::Long);
        assert!(s.stop < s.entry);
        assert!(s.entry < s.target1);
        assert!(s.target1 <= s.target2);
        // riskReward = |t1-entry| / |entry-stop| = 2.0 / 1.0.
        assert!((s.risk_reward - 2.0).abs() < 1e-6);
        let rr = (s.target1 - s.entry).abs() / (s.entry - s.stop).abs();
        assert!((rr - s.risk_reward).abs() < 1e-6);
    }

    #[test]
    fn short_setup_mirrors() {
        let s = generate_setup(Bias::Bearish, 160.0, Some(2.0), None, 0.5, 60.0, None).unwrap();
        assert_eq!(s.direction, Direction::Short);
        assert!(s.stop > s.entry);
        assert!(s.entry > s.target1);
        assert!(s.target1 >= s.target2);
        assert!((s.risk_reward - 2.0).abs() < 1e-6);
    }

    #[test]
    fn neutral_bias_yields_nothing() {
        assert!(generate_setup(Bias::Neutral, 100.0, Some(1.0), None, 0.5, 50.0, None).is_none());
    }

    #[test]
    fn pivot_spread_fallback() {
        // No ATR; pivot spread 4.0 => vol 2.0.
        let s = generate_setup(Bias::Bullish, 100.0, None, Some(4.0), 0.5, 50.0, None).unwrap();
        assert!((s.target1 - 102.0).abs() < 1e-10);
        assert!((s.stop - 99.0).abs() < 1e-10);
    }

    #[test]
    fn no_volatility_yields_nothing() {
        assert!(generate_setup(Bias::Bullish, 100.0, None, None, 0.5, 50.0, None).is_none());
        assert!(generate_setup(Bias::Bullish, 100.0, Some(0.0), Some(0.0), 0.5, 50.0, None).is_none());
    }

    #[test]
    fn invalid_price_yields_nothing() {
        assert!(generate_setup(Bias::Bullish, 0.0, Some(1.0), None, 0.5, 50.0, None).is_none());
        assert!(generate_setup(Bias::Bullish, f64::NAN, Some(1.0), None, 0.5, 50.0, None).is_none());
    }

    #[test]
    fn horizon_classification() {
        // Move of 6% => swing 3-5d.
        assert_eq!(classify_horizon(100.0, 106.0), TradeHorizon::Swing3to5d);
        assert_eq!(classify_horizon(100.0, 103.0), TradeHorizon::Swing1to3d);
        assert_eq!(classify_horizon(100.0, 101.0), TradeHorizon::DayTrade);
        assert_eq!(classify_horizon(100.0, 100.5), TradeHorizon::Scalp);
    }

    #[test]
    fn wide_stop_multiplier_lowers_risk_reward() {
        let s = generate_setup(Bias::Bullish, 100.0, Some(2.0), None, 0.75, 50.0, None).unwrap();
        assert!((s.risk_reward - (2.0 / 1.5)).abs() < 1e-6);
    }
}
