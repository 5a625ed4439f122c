// =============================================================================
// Swing Points, Fibonacci Levels & RSI Divergence
// =============================================================================
//
// Swing detection uses a symmetric fractal: a bar is a swing high when its
// high exceeds the highs of the `lookback` bars on both sides (swing lows
// mirror). The most recent swing of each kind is found scanning back from the
// tail.
//
// Fibonacci retracements span the swing range; extensions project beyond it
// in the direction of the move.
//
// RSI divergence compares the last two price peaks (bearish case) or troughs
// (bullish case) against the RSI values aligned to the same closes.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::store::Candle;

/// Fractal half-window; a swing needs this many lower bars on each side.
pub const SWING_LOOKBACK: usize = 5;

/// Direction of the move spanned by a Fibonacci grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwingDirection {
    Up,
    Down,
}

/// A detected swing extreme.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub bar_index: usize,
    pub price: f64,
}

/// Fibonacci retracement and extension grid over a swing range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FibLevels {
    pub direction: SwingDirection,
    pub swing_high: f64,
    pub swing_low: f64,
    /// (ratio_pct, price) pairs for 0/23.6/38.2/50/61.8/78.6/100.
    pub retracements: Vec<(f64, f64)>,
    /// (ratio_pct, price) pairs for 127.2/161.8/200/261.8.
    pub extensions: Vec<(f64, f64)>,
}

/// Kind of RSI divergence found at the tail of the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RsiDivergence {
    RegularBullish,
    RegularBearish,
    HiddenBullish,
    HiddenBearish,
}

impl RsiDivergence {
    /// +2/-2 for regular, +1/-1 for hidden, matching the bias weights.
    pub fn bias_points(&self) -> i32 {
        match self {
            Self::RegularBullish => 2,
            Self::RegularBearish => -2,
            Self::HiddenBullish => 1,
            Self::HiddenBearish => -1,
        }
    }
}

// =============================================================================
// Swing detection
// =============================================================================

/// Most recent swing high, scanning back from the tail.
pub fn latest_swing_high(candles: &[Candle], lookback: usize) -> Option<SwingPoint> {
    latest_swing(candles, lookback, true)
}

/// Most recent swing low, scanning back from the tail.
pub fn latest_swing_low(candles: &[Candle], lookback: usize) -> Option<SwingPoint> {
    latest_swing(candles, lookback, false)
}

fn latest_swing(candles: &[Candle], lookback: usize, high: bool) -> Option<SwingPoint> {
    let n = candles.len();
    if lookback == 0 || n < 2 * lookback + 1 {
        return None;
    }

    // Candidate centers from newest to oldest. The newest possible center
    // leaves `lookback` bars to its right.
    for i in (lookback..n - lookback).rev() {
        let value = if high { candles[i].high } else { candles[i].low };
        let is_extreme = (i - lookback..i + lookback + 1).filter(|&j| j != i).all(|j| {
            if high {
                candles[j].high < value
            } else {
                candles[j].low > value
            }
        });
        if is_extreme {
            return Some(SwingPoint {
                bar_index: i,
                price: value,
            });
        }
    }

    None
}

// =============================================================================
// Fibonacci
// =============================================================================

const RETRACE_RATIOS: [f64; 7] = [0.0, 23.6, 38.2, 50.0, 61.8, 78.6, 100.0];
const EXTENSION_RATIOS: [f64; 4] = [127.2, 161.8, 200.0, 261.8];

/// Build a Fibonacci grid over `(swing_high, swing_low)`.
///
/// For an UP move, 0% anchors at the swing high and retracements fall toward
/// the low; extensions project above the high. DOWN mirrors.
///
/// Returns `None` for a degenerate (non-positive) range.
pub fn fibonacci_levels(
    swing_high: f64,
    swing_low: f64,
    direction: SwingDirection,
) -> Option<FibLevels> {
    let span = swing_high - swing_low;
    if !(span > 0.0) || !span.is_finite() {
        return None;
    }

    let retracements: Vec<(f64, f64)> = RETRACE_RATIOS
        .iter()
        .map(|&pct| {
            let price = match direction {
                SwingDirection::Up => swing_high - span * pct / 100.0,
                SwingDirection::Down => swing_low + span * pct / 100.0,
            };
            (pct, price)
        })
        .collect();

    let extensions: Vec<(f64, f64)> = EXTENSION_RATIOS
        .iter()
        .map(|&pct| {
            let price = match direction {
                SwingDirection::Up => swing_low + span * pct / 100.0,
                SwingDirection::Down => swing_high - span * pct / 100.0,
            };
            (pct, price)
        })
        .collect();

    Some(FibLevels {
        direction,
        swing_high,
        swing_low,
        retracements,
        extensions,
    })
}

/// Distance from `price` to the nearest retracement level, as a fraction of
/// price. Used as the Fib-proximity feature.
pub fn nearest_level_distance(levels: &FibLevels, price: f64) -> Option<f64> {
    if price <= 0.0 {
        return None;
    }
    levels
        .retracements
        .iter()
        .map(|&(_, lvl)| (price - lvl).abs() / price)
        .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
}

// =============================================================================
// RSI divergence
// =============================================================================

/// Find the last two local maxima (peaks) or minima (troughs) of a series.
fn last_two_extremes(values: &[f64], peaks: bool) -> Option<((usize, f64), (usize, f64))> {
    let n = values.len();
    if n < 5 {
        return None;
    }

    let mut found: Vec<(usize, f64)> = Vec::new();
    for i in (1..n - 1).rev() {
        let is_extreme = if peaks {
            values[i] > values[i - 1] && values[i] >= values[i + 1]
        } else {
            values[i] < values[i - 1] && values[i] <= values[i + 1]
        };
        if is_extreme {
            found.push((i, values[i]));
            if found.len() == 2 {
                // Scanned from the tail: found[0] is the most recent.
                return Some((found[1], found[0]));
            }
        }
    }

    None
}

/// Detect an RSI divergence from closes and an RSI series aligned so that
/// `rsi[i]` corresponds to `closes[i + offset]` with
/// `offset = closes.len() - rsi.len()`.
///
/// Regular bearish: price higher-high while RSI lower-high.
/// Regular bullish: price lower-low while RSI higher-low.
/// Hidden variants mirror (price LH/HL with RSI HH/LL).
pub fn detect_rsi_divergence(closes: &[f64], rsi: &[f64]) -> Option<RsiDivergence> {
    if rsi.len() < 5 || closes.len() < rsi.len() {
        return None;
    }

    // Work on the aligned tail so price and RSI indices line up.
    let aligned_closes = &closes[closes.len() - rsi.len()..];

    // Bearish side: compare the last two price peaks.
    if let Some(((i1, p1), (i2, p2))) = last_two_extremes(aligned_closes, true) {
        let (r1, r2) = (rsi[i1], rsi[i2]);
        if p2 > p1 && r2 < r1 {
            return Some(RsiDivergence::RegularBearish);
        }
        if p2 < p1 && r2 > r1 {
            return Some(RsiDivergence::HiddenBearish);
        }
    }

    // Bullish side: compare the last two price troughs.
    if let Some(((i1, p1), (i2, p2))) = last_two_extremes(aligned_closes, false) {
        let (r1, r2) = (rsi[i1], rsi[i2]);
        if p2 < p1 && r2 > r1 {
            return Some(RsiDivergence::RegularBullish);
        }
        if p2 > p1 && r2 < r1 {
            return Some(RsiDivergence::HiddenBullish);
        }
    }

    None
}
