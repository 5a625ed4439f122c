// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
// MACD line  = EMA(fast) - EMA(slow)
// Signal     = EMA(signal_period) of the MACD line
// Histogram  = MACD line - Signal
//
// Alignment: the slow EMA starts later than the fast EMA, so the fast series
// is truncated from the front to line both series up on the same closes.
// Standard parameters: (12, 26, 9).
// =============================================================================

use super::ema::calculate_ema;

/// The MACD triplet for the most recent close.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MacdResult {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Compute the full MACD-line series aligned to the slow EMA.
///
/// Returns an empty vec when there is not enough data for the slow EMA.
pub fn macd_line_series(closes: &[f64], fast: usize, slow: usize) -> Vec<f64> {
    if fast == 0 || slow == 0 || fast >= slow {
        return Vec::new();
    }

    let fast_ema = calculate_ema(closes, fast);
    let slow_ema = calculate_ema(closes, slow);

    if slow_ema.is_empty() {
        return Vec::new();
    }

    // The fast series is longer; drop its head so both end-align.
    let offset = fast_ema.len().saturating_sub(slow_ema.len());

    fast_ema[offset..]
        .iter()
        .zip(slow_ema.iter())
        .map(|(f, s)| f - s)
        .collect()
}

/// Compute the most recent MACD triplet with the given parameters.
///
/// Returns `None` when there is not enough data for the signal EMA on top of
/// the slow EMA (i.e. fewer than `slow + signal_period - 1` closes).
pub fn calculate_macd(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> Option<MacdResult> {
    if signal_period == 0 {
        return None;
    }

    let line_series = macd_line_series(closes, fast, slow);
    let signal_series = calculate_ema(&line_series, signal_period);

    let line = *line_series.last()?;
    let signal = *signal_series.last()?;
    let histogram = line - signal;

    if line.is_finite() && signal.is_finite() {
        Some(MacdResult {
            line,
            signal,
            histogram,
        })
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

    #[test]
    fn macd_insufficient_data() {
        let closes: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        assert!(calculate_macd(&closes, 12, 26, 9).is_none());
    }

    #[test]
    fn macd_invalid_params() {
        let closes: Vec<f64> = (1..=60).map(|x| x as f64).collect();
        assert!(macd_line_series(&closes, 26, 12).is_empty());
        assert!(macd_line_series(&closes, 0, 26).is_empty());
        assert!(calculate_macd(&closes, 12, 26, 0).is_none());
    }

    #[test]
    fn macd_positive_in_uptrend() {
        // Steady uptrend: fast EMA above slow EMA => positive line and
        // positive histogram once the signal catches up.
        let closes: Vec<f64> = (1..=120).map(|x| 100.0 + x as f64).collect();
        let macd = calculate_macd(&closes, 12, 26, 9).unwrap();
        assert!(macd.line > 0.0);
        assert!(macd.histogram.abs() < macd.line.abs() + 1.0);
    }

    #[test]
    fn macd_negative_in_downtrend() {
        let closes: Vec<f64> = (1..=120).map(|x| 400.0 - x as f64).collect();
        let macd = calculate_macd(&closes, 12, 26, 9).unwrap();
        assert!(macd.line < 0.0);
    }

    #[test]
    fn histogram_is_line_minus_signal() {
        let closes: Vec<f64> = (0..100)
            .map(|i| 100.0 + (i as f64 * 0.3).sin() * 8.0)
            .collect();
        let macd = calculate_macd(&closes, 12, 26, 9).unwrap();
        assert!((macd.histogram - (macd.line - macd.signal)).abs() < 1e-12);
    }

    #[test]
    fn line_series_end_aligned() {
        let closes: Vec<f64> = (1..=60).map(|x| x as f64).collect();
        let series = macd_line_series(&closes, 12, 26);
        // Slow EMA has len 60 - 26 + 1 = 35; line series must match it.
        assert_eq!(series.len(), 35);
    }
}
