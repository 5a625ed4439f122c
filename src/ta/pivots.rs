// =============================================================================
// Classic Pivot Points & Gap Detection
// =============================================================================
//
// Pivots use the classic daily formulas on the most recent bar's H, L, C:
//   PP = (H + L + C) / 3
//   R1 = 2*PP - L       S1 = 2*PP - H
//   R2 = PP + (H - L)   S2 = PP - (H - L)
//   R3 = H + 2*(PP - L) S3 = L - 2*(H - PP)
//
// A gap is recorded whenever |open_i - close_{i-1}| / close_{i-1} >= 0.5%.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::store::Candle;

/// Classic pivot levels derived from a single bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PivotPoints {
    pub pp: f64,
    pub r1: f64,
    pub r2: f64,
    pub r3: f64,
    pub s1: f64,
    pub s2: f64,
    pub s3: f64,
}

/// Direction of a detected gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GapKind {
    GapUp,
    GapDown,
}

/// A single open-vs-prior-close gap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GapEvent {
    pub kind: GapKind,
    /// Index of the bar that opened away from the prior close.
    pub bar_index: usize,
    /// Signed gap size as a percentage of the prior close.
    pub pct: f64,
}

/// Minimum gap size as a fraction of the prior close.
const GAP_THRESHOLD: f64 = 0.005;

/// Compute classic pivots from the most recent candle.
///
/// Returns `None` on an empty series.
pub fn calculate_pivots(candles: &[Candle]) -> Option<PivotPoints> {
    let last = candles.last()?;
    let (h, l, c) = (last.high, last.low, last.close);

    let pp = (h + l + c) / 3.0;
    if !pp.is_finite() {
        return None;
    }

    Some(PivotPoints {
        pp,
        r1: 2.0 * pp - l,
        r2: pp + (h - l),
        r3: h + 2.0 * (pp - l),
        s1: 2.0 * pp - h,
        s2: pp - (h - l),
        s3: l - 2.0 * (h - pp),
    })
}

/// Scan the series for open-vs-prior-close gaps of at least 0.5%.
///
/// Gaps are returned oldest-first; `bar_index` refers to the opening bar.
pub fn detect_gaps(candles: &[Candle]) -> Vec<GapEvent> {
    let mut gaps = Vec::new();

    for i in 1..candles.len() {
        let prev_close = candles[i - 1].close;
        if prev_close == 0.0 {
            continue;
        }

        let pct = (candles[i].open - prev_close) / prev_close;
        if pct.abs() >= GAP_THRESHOLD {
            gaps.push(GapEvent {
                kind: if pct > 0.0 { GapKind::GapUp } else { GapKind::GapDown },
                bar_index: i,
                pct: pct * 100.0,
            });
        }
    }

    gaps
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: 0,
            open,
            high,
            low,
            close,
            volume: 1_000_000.0,
            vwap: None,
        }
    }

    #[test]
    fn pivots_empty_series() {
        assert!(calculate_pivots(&[]).is_none());
    }

    #[test]
    fn pivots_classic_formulas() {
        let candles = vec![candle(100.0, 110.0, 90.0, 105.0)];
        let p = calculate_pivots(&candles).unwrap();
        let pp = (110.0 + 90.0 + 105.0) / 3.0;
        assert!((p.pp - pp).abs() < 1e-10);
        assert!((p.r1 - (2.0 * pp - 90.0)).abs() < 1e-10);
        assert!((p.s1 - (2.0 * pp - 110.0)).abs() < 1e-10);
        assert!((p.r2 - (pp + 20.0)).abs() < 1e-10);
        assert!((p.s2 - (pp - 20.0)).abs() < 1e-10);
    }

    #[test]
    fn pivots_ordering() {
        let candles = vec![candle(100.0, 108.0, 95.0, 103.0)];
        let p = calculate_pivots(&candles).unwrap();
        assert!(p.s3 < p.s2 && p.s2 < p.s1);
        assert!(p.s1 < p.pp && p.pp < p.r1);
        assert!(p.r1 < p.r2 && p.r2 < p.r3);
    }

    #[test]
    fn no_gap_below_threshold() {
        let candles = vec![
            candle(100.0, 101.0, 99.0, 100.0),
            candle(100.3, 101.0, 99.0, 100.0), // 0.3% — under threshold
        ];
        assert!(detect_gaps(&candles).is_empty());
    }

    #[test]
    fn gap_up_detected() {
        let candles = vec![
            candle(100.0, 101.0, 99.0, 100.0),
            candle(101.0, 102.0, 100.5, 101.5), // +1.0%
        ];
        let gaps = detect_gaps(&candles);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].kind, GapKind::GapUp);
        assert_eq!(gaps[0].bar_index, 1);
        assert!((gaps[0].pct - 1.0).abs() < 1e-10);
    }

    #[test]
    fn gap_down_detected() {
        let candles = vec![
            candle(200.0, 201.0, 199.0, 200.0),
            candle(198.0, 198.5, 196.0, 197.0), // -1.0%
        ];
        let gaps = detect_gaps(&candles);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].kind, GapKind::GapDown);
        assert!(gaps[0].pct < 0.0);
    }
}
