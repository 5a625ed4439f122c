// =============================================================================
// Technical Analyzer
// =============================================================================
//
// Pure, side-effect-free analysis of an OHLCV series. `analyze` recomputes a
// whole `TechnicalsSnapshot` from candles every time; snapshots are never
// mutated in place, so two calls over the same series are bitwise identical.
//
// A minimum of 30 bars is required; shorter series yield `None`.

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod patterns;
pub mod pivots;
pub mod rsi;
pub mod swings;

use serde::{Deserialize, Serialize};

use crate::store::Candle;
use crate::types::Bias;

pub use adx::{AdxResult, TrendStrength};
pub use bollinger::BollingerResult;
pub use macd::MacdResult;
pub use patterns::CandlePattern;
pub use pivots::{GapEvent, PivotPoints};
pub use swings::{FibLevels, RsiDivergence, SwingDirection, SwingPoint};

/// Minimum number of candles `analyze` accepts.
pub const MIN_BARS: usize = 30;

/// Bars of gap history kept on the snapshot.
const MAX_GAPS: usize = 10;

/// Volume-spike multiple over the series average.
const VOLUME_SPIKE_RATIO: f64 = 1.5;

// =============================================================================
// Snapshot
// =============================================================================

/// Complete per-ticker, per-timeframe technical picture.
///
/// Sparse fields are `None` when the series is long enough for `analyze` but
/// too short for that specific indicator (e.g. SMA-200).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalsSnapshot {
    pub rsi: Option<f64>,
    pub macd: Option<MacdResult>,
    pub ema9: Option<f64>,
    pub ema20: Option<f64>,
    pub ema50: Option<f64>,
    pub sma200: Option<f64>,
    pub bollinger: Option<BollingerResult>,
    pub atr: Option<f64>,
    pub pivots: Option<PivotPoints>,
    pub gaps: Vec<GapEvent>,
    pub adx: Option<AdxResult>,
    pub divergence: Option<RsiDivergence>,
    pub swing_high: Option<SwingPoint>,
    pub swing_low: Option<SwingPoint>,
    pub fibonacci: Option<FibLevels>,
    pub patterns: Vec<CandlePattern>,
    pub volume_spike: bool,
    pub bias: Bias,
    pub bull_points: f64,
    pub bear_points: f64,
    /// Close of the most recent bar the snapshot was computed from.
    pub last_close: f64,
    /// Number of bars analyzed; gap indices are relative to this series.
    pub bar_count: usize,
}

// =============================================================================
// Analyzer
// =============================================================================

/// Analyze an ascending OHLCV series into a [`TechnicalsSnapshot`].
///
/// Returns `None` when the series has fewer than [`MIN_BARS`] bars — the
/// caller treats this exactly like missing upstream data.
pub fn analyze(candles: &[Candle]) -> Option<TechnicalsSnapshot> {
    if candles.len() < MIN_BARS {
        return None;
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let last_close = *closes.last()?;

    let rsi_series = rsi::calculate_rsi(&closes, 14);
    let rsi_last = rsi_series.last().copied();

    let macd = macd::calculate_macd(&closes, 12, 26, 9);
    let ema9 = ema::calculate_ema(&closes, 9).last().copied();
    let ema20 = ema::calculate_ema(&closes, 20).last().copied();
    let ema50 = ema::calculate_ema(&closes, 50).last().copied();
    let sma200 = ema::calculate_sma(&closes, 200);
    let bollinger = bollinger::calculate_bollinger(&closes, 20, 2.0);
    let atr = atr::calculate_atr(candles, 14);
    let pivot_levels = pivots::calculate_pivots(candles);

    let mut gaps = pivots::detect_gaps(candles);
    if gaps.len() > MAX_GAPS {
        gaps.drain(..gaps.len() - MAX_GAPS);
    }

    let adx_result = adx::calculate_adx(candles, 14);
    let divergence = detect_divergence(&closes, &rsi_series);

    let swing_high = swings::latest_swing_high(candles, swings::SWING_LOOKBACK);
    let swing_low = swings::latest_swing_low(candles, swings::SWING_LOOKBACK);

    let fibonacci = match (swing_high, swing_low) {
        (Some(hi), Some(lo)) => {
            // The more recent extreme sets the direction of the move.
            let direction = if hi.bar_index >= lo.bar_index {
                SwingDirection::Up
            } else {
                SwingDirection::Down
            };
            swings::fibonacci_levels(hi.price, lo.price, direction)
        }
        _ => None,
    };

    let patterns = patterns::detect_patterns(candles);
    let volume_spike = detect_volume_spike(candles);

    let (bull_points, bear_points) = score_bias(
        rsi_last,
        &macd,
        ema9,
        ema20,
        ema50,
        last_close,
        &adx_result,
        divergence,
        volume_spike,
    );

    let bias = if bull_points > bear_points + 1.0 {
        Bias::Bullish
    } else if bear_points > bull_points + 1.0 {
        Bias::Bearish
    } else {
        Bias::Neutral
    };

    Some(TechnicalsSnapshot {
        rsi: rsi_last,
        macd,
        ema9,
        ema20,
        ema50,
        sma200,
        bollinger,
        atr,
        pivots: pivot_levels,
        gaps,
        adx: adx_result,
        divergence,
        swing_high,
        swing_low,
        fibonacci,
        patterns,
        volume_spike,
        bias,
        bull_points,
        bear_points,
        last_close,
        bar_count: candles.len(),
    })
}

fn detect_divergence(closes: &[f64], rsi_series: &[f64]) -> Option<RsiDivergence> {
    if rsi_series.is_empty() {
        return None;
    }
    swings::detect_rsi_divergence(closes, rsi_series)
}

/// Last bar volume above `VOLUME_SPIKE_RATIO` times the series average.
fn detect_volume_spike(candles: &[Candle]) -> bool {
    let n = candles.len();
    if n < 2 {
        return false;
    }
    let avg: f64 = candles[..n - 1].iter().map(|c| c.volume).sum::<f64>() / (n - 1) as f64;
    avg > 0.0 && candles[n - 1].volume > avg * VOLUME_SPIKE_RATIO
}

// =============================================================================
// Bias scoring
// =============================================================================

/// Accumulate bull/bear points from the computed indicators.
///
/// Point table:
///   RSI above/below the 50 midline          ±1
///   RSI extremes (<30 oversold, >70 hot)    ±1 (mean-reversion lean)
///   EMA 9/20/50 alignment                   ±2
///   MACD histogram sign                     ±1
///   Volume spike                            +1 to the current leader
///   ADX >= 25 with DI direction             ±1
///   RSI divergence                          ±2 regular, ±1 hidden
#[allow(clippy::too_many_arguments)]
fn score_bias(
    rsi: Option<f64>,
    macd: &Option<MacdResult>,
    ema9: Option<f64>,
    ema20: Option<f64>,
    ema50: Option<f64>,
    last_close: f64,
    adx: &Option<AdxResult>,
    divergence: Option<RsiDivergence>,
    volume_spike: bool,
) -> (f64, f64) {
    let mut bull = 0.0;
    let mut bear = 0.0;

    if let Some(r) = rsi {
        if r > 50.0 {
            bull += 1.0;
        } else {
            bear += 1.0;
        }
        // Extremes lean against the prevailing move.
        if r < 30.0 {
            bull += 1.0;
        } else if r > 70.0 {
            bear += 1.0;
        }
    }

    if let (Some(e9), Some(e20), Some(e50)) = (ema9, ema20, ema50) {
        if e9 > e20 && e20 > e50 && last_close > e9 {
            bull += 2.0;
        } else if e9 < e20 && e20 < e50 && last_close < e9 {
            bear += 2.0;
        }
    }

    if let Some(m) = macd {
        if m.histogram > 0.0 {
            bull += 1.0;
        } else if m.histogram < 0.0 {
            bear += 1.0;
        }
    }

    if let Some(a) = adx {
        if a.adx >= 25.0 {
            if a.di_spread() > 0.0 {
                bull += 1.0;
            } else if a.di_spread() < 0.0 {
                bear += 1.0;
            }
        }
    }

    if let Some(div) = divergence {
        let pts = div.bias_points();
        if pts > 0 {
            bull += pts as f64;
        } else {
            bear += (-pts) as f64;
        }
    }

    // Volume spike confirms whichever side is already ahead.
    if volume_spike {
        if bull > bear {
            bull += 1.0;
        } else if bear > bull {
            bear += 1.0;
        }
    }

    (bull, bear)
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn linear_candles(n: usize, start: f64, end: f64, volume: f64) -> Vec<Candle> {
        let step = (end - start) / (n - 1) as f64;
        (0..n)
            .map(|i| {
                let close = start + step * i as f64;
                Candle {
                    timestamp: i as i64 * 86_400_000,
                    open: close - step * 0.5,
                    high: close + step.abs() * 0.3 + 0.01,
                    low: close - step.abs() * 0.8 - 0.01,
                    close,
                    volume,
                    vwap: None,
                }
            })
            .collect()
    }

    #[test]
    fn analyze_rejects_short_series() {
        let candles = linear_candles(29, 100.0, 110.0, 1e6);
        assert!(analyze(&candles).is_none());
    }

    #[test]
    fn rising_series_is_bullish() {
        // 60 daily closes rising 100 -> 160 with constant volume.
        let candles = linear_candles(60, 100.0, 160.0, 1e6);
        let snap = analyze(&candles).unwrap();

        assert!(snap.rsi.unwrap() > 70.0, "rsi {}", snap.rsi.unwrap());
        assert!(snap.macd.unwrap().histogram > 0.0);
        assert_eq!(snap.bias, Bias::Bullish);
        assert!(snap.bull_points > snap.bear_points + 1.0);
        assert!((snap.last_close - 160.0).abs() < 1e-9);
    }

    #[test]
    fn falling_series_is_bearish() {
        let candles = linear_candles(60, 160.0, 100.0, 1e6);
        let snap = analyze(&candles).unwrap();
        assert!(snap.rsi.unwrap() < 30.0);
        assert_eq!(snap.bias, Bias::Bearish);
    }

    #[test]
    fn analyze_is_pure() {
        let candles = linear_candles(80, 100.0, 130.0, 1e6);
        let a = analyze(&candles).unwrap();
        let b = analyze(&candles).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn sma200_absent_on_short_series() {
        let candles = linear_candles(60, 100.0, 120.0, 1e6);
        let snap = analyze(&candles).unwrap();
        assert!(snap.sma200.is_none());
        assert!(snap.ema50.is_some());
    }

    #[test]
    fn volume_spike_detected() {
        let mut candles = linear_candles(60, 100.0, 120.0, 1e6);
        candles.last_mut().unwrap().volume = 5e6;
        let snap = analyze(&candles).unwrap();
        assert!(snap.volume_spike);
    }

    #[test]
    fn gaps_bounded() {
        // Build a series with a gap every bar: close jumps 1% each open.
        let mut candles = Vec::new();
        let mut price = 100.0;
        for i in 0..60 {
            let open = price * 1.01;
            let close = open;
            candles.push(Candle {
                timestamp: i,
                open,
                high: open + 0.5,
                low: open - 0.5,
                close,
                volume: 1e6,
                vwap: None,
            });
            price = close;
        }
        let snap = analyze(&candles).unwrap();
        assert!(snap.gaps.len() <= MAX_GAPS);
    }

    #[test]
    fn pivots_present() {
        let candles = linear_candles(60, 100.0, 120.0, 1e6);
        let snap = analyze(&candles).unwrap();
        let p = snap.pivots.unwrap();
        assert!(p.r1 > p.pp && p.pp > p.s1);
    }
}
