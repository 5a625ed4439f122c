// =============================================================================
// Average Directional Index (ADX)
// =============================================================================
//
// ADX quantifies trend **strength** regardless of direction.
//
// Calculation pipeline:
//   1. Compute +DM (positive directional movement) and -DM per bar.
//   2. Compute True Range (TR) per bar.
//   3. Apply Wilder's smoothing (period) to +DM, -DM, and TR.
//   4. Derive +DI = smoothed(+DM) / smoothed(TR) * 100
//            -DI = smoothed(-DM) / smoothed(TR) * 100
//   5. DX  = |+DI - -DI| / (+DI + -DI) * 100
//   6. ADX = Wilder's smoothed average of DX over `period` bars.
//
// Strength buckets: ADX >= 30 STRONG, >= 20 WEAK, else NO_TREND.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::store::Candle;

/// Categorical trend strength derived from the ADX level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendStrength {
    Strong,
    Weak,
    NoTrend,
}

impl std::fmt::Display for TrendStrength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strong => write!(f, "STRONG"),
            Self::Weak => write!(f, "WEAK"),
            Self::NoTrend => write!(f, "NO_TREND"),
        }
    }
}

/// ADX output: level, both directional indices, and the derived bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdxResult {
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
    pub strength: TrendStrength,
}

impl AdxResult {
    /// Positive when +DI leads, negative when -DI leads.
    pub fn di_spread(&self) -> f64 {
        self.plus_di - self.minus_di
    }
}

/// Compute the most recent ADX value from a slice of OHLCV candles.
///
/// Returns `None` when:
/// - `period` is zero.
/// - There are fewer than `2 * period + 1` candles (period bars for the
///   initial smoothing, another period of DX values to seed the ADX, plus the
///   first bar that has no predecessor).
/// - Any intermediate calculation produces a non-finite result.
pub fn calculate_adx(candles: &[Candle], period: usize) -> Option<AdxResult> {
    if period == 0 {
        return None;
    }

    let min_candles = 2 * period + 1;
    if candles.len() < min_candles {
        return None;
    }

    let period_f = period as f64;
    let n = candles.len();
    let bar_count = n - 1;

    // Raw +DM, -DM, and True Range for each consecutive pair.
    let mut plus_dm = Vec::with_capacity(bar_count);
    let mut minus_dm = Vec::with_capacity(bar_count);
    let mut tr_vals = Vec::with_capacity(bar_count);

    for i in 1..n {
        let high = candles[i].high;
        let low = candles[i].low;
        let prev_high = candles[i - 1].high;
        let prev_low = candles[i - 1].low;
        let prev_close = candles[i - 1].close;

        let tr = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());

        let up_move = high - prev_high;
        let down_move = prev_low - low;

        let pdm = if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        };
        let mdm = if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        };

        plus_dm.push(pdm);
        minus_dm.push(mdm);
        tr_vals.push(tr);
    }

    // Wilder's smoothing, seeded with plain sums of the first `period` values.
    let mut smooth_plus_dm: f64 = plus_dm[..period].iter().sum();
    let mut smooth_minus_dm: f64 = minus_dm[..period].iter().sum();
    let mut smooth_tr: f64 = tr_vals[..period].iter().sum();

    let mut dx_values: Vec<f64> = Vec::with_capacity(bar_count - period + 1);
    dx_values.push(compute_dx(smooth_plus_dm, smooth_minus_dm, smooth_tr)?);

    for i in period..bar_count {
        smooth_plus_dm = smooth_plus_dm - smooth_plus_dm / period_f + plus_dm[i];
        smooth_minus_dm = smooth_minus_dm - smooth_minus_dm / period_f + minus_dm[i];
        smooth_tr = smooth_tr - smooth_tr / period_f + tr_vals[i];

        dx_values.push(compute_dx(smooth_plus_dm, smooth_minus_dm, smooth_tr)?);
    }

    if dx_values.len() < period {
        return None;
    }

    // ADX = Wilder's smoothed average of DX, seeded with an SMA.
    let adx_seed: f64 = dx_values[..period].iter().sum::<f64>() / period_f;
    if !adx_seed.is_finite() {
        return None;
    }

    let mut adx = adx_seed;
    for &dx in &dx_values[period..] {
        adx = (adx * (period_f - 1.0) + dx) / period_f;
        if !adx.is_finite() {
            return None;
        }
    }

    // Final DI values from the last smoothed sums.
    if smooth_tr == 0.0 {
        return None;
    }
    let plus_di = smooth_plus_dm / smooth_tr * 100.0;
    let minus_di = smooth_minus_dm / smooth_tr * 100.0;

    if !adx.is_finite() || !plus_di.is_finite() || !minus_di.is_finite() {
        return None;
    }

    let strength = if adx >= 30.0 {
        TrendStrength::Strong
    } else if adx >= 20.0 {
        TrendStrength::Weak
    } else {
        TrendStrength::NoTrend
    };

    Some(AdxResult {
        adx,
        plus_di,
        minus_di,
        strength,
    })
}

// =============================================================================
// Internal helpers
// =============================================================================

/// DX = |+DI - -DI| / (+DI + -DI) * 100, or `None` on degenerate input.
fn compute_dx(smooth_plus_dm: f64, smooth_minus_dm: f64, smooth_tr: f64) -> Option<f64> {
    if smooth_tr == 0.0 {
        return None;
    }

    let plus_di = smooth_plus_dm / smooth_tr * 100.0;
    let minus_di = smooth_minus_dm / smooth_tr * 100.0;

    let di_sum = plus_di + minus_di;
    if di_sum == 0.0 {
        // No directional movement at all — DX is defined as zero.
        return Some(0.0);
    }

    let dx = (plus_di - minus_di).abs() / di_sum * 100.0;
    if dx.is_finite() {
        Some(dx)
    } else {
        None
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn candle(high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: 0,
            open: close,
            high,
            low,
            close,
            volume: 1_000_000.0,
            vwap: None,
        }
    }

    #[test]
    fn adx_insufficient_data() {
        let candles: Vec<Candle> = (0..20).map(|i| candle(101.0 + i as f64, 99.0, 100.0)).collect();
        assert!(calculate_adx(&candles, 14).is_none());
    }

    #[test]
    fn adx_period_zero() {
        let candles: Vec<Candle> = (0..40).map(|_| candle(101.0, 99.0, 100.0)).collect();
        assert!(calculate_adx(&candles, 0).is_none());
    }

    #[test]
    fn adx_strong_uptrend() {
        // Monotonic rise: +DM dominates, ADX climbs toward 100.
        let candles: Vec<Candle> = (0..60)
            .map(|i| {
                let base = 100.0 + i as f64 * 2.0;
                candle(base + 1.0, base - 1.0, base)
            })
            .collect();
        let result = calculate_adx(&candles, 14).unwrap();
        assert!(result.adx > 30.0, "adx {}", result.adx);
        assert_eq!(result.strength, TrendStrength::Strong);
        assert!(result.di_spread() > 0.0);
    }

    #[test]
    fn adx_strong_downtrend_direction() {
        let candles: Vec<Candle> = (0..60)
            .map(|i| {
                let base = 300.0 - i as f64 * 2.0;
                candle(base + 1.0, base - 1.0, base)
            })
            .collect();
        let result = calculate_adx(&candles, 14).unwrap();
        assert!(result.di_spread() < 0.0);
        assert_eq!(result.strength, TrendStrength::Strong);
    }

    #[test]
    fn adx_choppy_market_no_trend() {
        // Alternating up/down bars of equal size — no net directional movement.
        let candles: Vec<Candle> = (0..80)
            .map(|i| {
                let base = if i % 2 == 0 { 100.0 } else { 102.0 };
                candle(base + 1.0, base - 1.0, base)
            })
            .collect();
        let result = calculate_adx(&candles, 14).unwrap();
        assert!(result.adx < 30.0, "adx {}", result.adx);
    }

    #[test]
    fn adx_in_valid_range() {
        let candles: Vec<Candle> = (0..60)
            .map(|i| {
                let base = 100.0 + (i as f64 * 0.4).sin() * 4.0;
                candle(base + 1.5, base - 1.5, base)
            })
            .collect();
        let result = calculate_adx(&candles, 14).unwrap();
        assert!((0.0..=100.0).contains(&result.adx));
        assert!(result.plus_di >= 0.0);
        assert!(result.minus_di >= 0.0);
    }
}
