// =============================================================================
// Candlestick Pattern Recognition
// =============================================================================
//
// Detectors run over the tail of the series and report every pattern present
// on the most recent bars. Definitions:
//
//   Doji           |body| / range < 0.1
//   Hammer         lower wick > 2*body, upper wick < 0.5*body, bullish body
//   Shooting Star  mirror of the hammer
//   Engulfing      prior opposite-direction body fully contained in this body
//   Morning Star   down bar, doji gapping below its midpoint, up bar closing
//                  above the first bar's midpoint (Evening Star mirrors)
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::store::Candle;

/// A recognised candlestick pattern on the most recent bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandlePattern {
    Doji,
    Hammer,
    ShootingStar,
    BullishEngulfing,
    BearishEngulfing,
    MorningStar,
    EveningStar,
}

impl CandlePattern {
    /// +1 for bullish patterns, -1 for bearish, 0 for the neutral doji.
    pub fn direction_score(&self) -> i32 {
        match self {
            Self::Hammer | Self::BullishEngulfing | Self::MorningStar => 1,
            Self::ShootingStar | Self::BearishEngulfing | Self::EveningStar => -1,
            Self::Doji => 0,
        }
    }
}

impl std::fmt::Display for CandlePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Doji => write!(f, "DOJI"),
            Self::Hammer => write!(f, "HAMMER"),
            Self::ShootingStar => write!(f, "SHOOTING_STAR"),
            Self::BullishEngulfing => write!(f, "BULLISH_ENGULFING"),
            Self::BearishEngulfing => write!(f, "BEARISH_ENGULFING"),
            Self::MorningStar => write!(f, "MORNING_STAR"),
            Self::EveningStar => write!(f, "EVENING_STAR"),
        }
    }
}

/// Detect all patterns present on the tail of the series.
pub fn detect_patterns(candles: &[Candle]) -> Vec<CandlePattern> {
    let mut found = Vec::new();
    let n = candles.len();
    if n == 0 {
        return found;
    }

    let last = &candles[n - 1];

    if is_doji(last) {
        found.push(CandlePattern::Doji);
    }
    if is_hammer(last) {
        found.push(CandlePattern::Hammer);
    }
    if is_shooting_star(last) {
        found.push(CandlePattern::ShootingStar);
    }

    if n >= 2 {
        let prev = &candles[n - 2];
        if is_engulfing(prev, last, true) {
            found.push(CandlePattern::BullishEngulfing);
        }
        if is_engulfing(prev, last, false) {
            found.push(CandlePattern::BearishEngulfing);
        }
    }

    if n >= 3 {
        let (a, b, c) = (&candles[n - 3], &candles[n - 2], &candles[n - 1]);
        if is_star(a, b, c, true) {
            found.push(CandlePattern::MorningStar);
        }
        if is_star(a, b, c, false) {
            found.push(CandlePattern::EveningStar);
        }
    }

    found
}

// =============================================================================
// Single-bar anatomy
// =============================================================================

fn body(c: &Candle) -> f64 {
    (c.close - c.open).abs()
}

fn range(c: &Candle) -> f64 {
    c.high - c.low
}

fn upper_wick(c: &Candle) -> f64 {
    c.high - c.open.max(c.close)
}

fn lower_wick(c: &Candle) -> f64 {
    c.open.min(c.close) - c.low
}

fn is_bullish(c: &Candle) -> bool {
    c.close > c.open
}

fn is_doji(c: &Candle) -> bool {
    let r = range(c);
    r > 0.0 && body(c) / r < 0.1
}

fn is_hammer(c: &Candle) -> bool {
    let b = body(c);
    b > 0.0 && is_bullish(c) && lower_wick(c) > 2.0 * b && upper_wick(c) < 0.5 * b
}

fn is_shooting_star(c: &Candle) -> bool {
    let b = body(c);
    b > 0.0 && !is_bullish(c) && upper_wick(c) > 2.0 * b && lower_wick(c) < 0.5 * b
}

/// `bullish == true` checks for a bullish engulfing (prior bearish body fully
/// contained in the current bullish body); `false` checks the mirror.
fn is_engulfing(prev: &Candle, cur: &Candle, bullish: bool) -> bool {
    if bullish {
        !is_bullish(prev)
            && is_bullish(cur)
            && cur.open <= prev.close
            && cur.close >= prev.open
            && body(cur) > body(prev)
    } else {
        is_bullish(prev)
            && !is_bullish(cur)
            && cur.open >= prev.close
            && cur.close <= prev.open
            && body(cur) > body(prev)
    }
}

/// Three-bar star reversal. `bullish == true` is the Morning Star.
///
/// The middle bar must be a doji whose body gaps past the midpoint of the
/// first bar's body; the third bar must close beyond that midpoint.
fn is_star(a: &Candle, b: &Candle, c: &Candle, bullish: bool) -> bool {
    if !is_doji(b) {
        return false;
    }

    let a_mid = (a.open + a.close) / 2.0;
    let b_body_mid = (b.open + b.close) / 2.0;

    if bullish {
        // Down bar, doji below its midpoint, up bar recovering past it.
        !is_bullish(a) && b_body_mid < a_mid && is_bullish(c) && c.close > a_mid
    } else {
        is_bullish(a) && b_body_mid > a_mid && !is_bullish(c) && c.close < a_mid
    }
}
