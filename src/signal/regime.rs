// =============================================================================
// Market Regime Classifier
// =============================================================================
//
// Fuses three market-wide readings into a coarse regime label:
//   - VIX level (volatility)
//   - SPY trend (percent distance of SPY from its 20-bar mean)
//   - breadth (fraction of watchlist tickers with a bullish technical bias)
//
// The classification is a pure function of its inputs. The regime modulates
// the setup generator's ATR stop multiplier and scales a handful of signal
// weights through a fixed table.
// =============================================================================

use serde::{Deserialize, Serialize};

/// Coarse market regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketRegime {
    TrendingUp,
    TrendingDown,
    Volatile,
    Rangebound,
    Unknown,
}

impl Default for MarketRegime {
    fn default() -> Self {
        Self::Unknown
    }
}

impl std::fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TrendingUp => write!(f, "TRENDING_UP"),
            Self::TrendingDown => write!(f, "TRENDING_DOWN"),
            Self::Volatile => write!(f, "VOLATILE"),
            Self::Rangebound => write!(f, "RANGEBOUND"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// VIX level above which the market counts as volatile regardless of trend.
const VIX_VOLATILE: f64 = 28.0;
/// SPY trend (percent vs its 20-bar mean) needed to call a trend.
const TREND_PCT: f64 = 0.5;
/// Breadth thresholds confirming an up/down trend.
const BREADTH_BULL: f64 = 0.55;
const BREADTH_BEAR: f64 = 0.45;

/// Classify the regime from VIX, SPY trend, and breadth.
///
/// Any missing input degrades the answer toward `Unknown` unless the
/// remaining inputs are decisive (a VIX spike alone is enough for
/// `Volatile`).
pub fn classify_regime(
    vix: Option<f64>,
    spy_trend_pct: Option<f64>,
    breadth: Option<f64>,
) -> MarketRegime {
    if let Some(v) = vix {
        if v >= VIX_VOLATILE {
            return MarketRegime::Volatile;
        }
    }

    match (spy_trend_pct, breadth) {
        (Some(trend), Some(b)) => {
            if trend > TREND_PCT && b > BREADTH_BULL {
                MarketRegime::TrendingUp
            } else if trend < -TREND_PCT && b < BREADTH_BEAR {
                MarketRegime::TrendingDown
            } else {
                MarketRegime::Rangebound
            }
        }
        (Some(trend), None) => {
            if trend.abs() <= TREND_PCT {
                MarketRegime::Rangebound
            } else {
                MarketRegime::Unknown
            }
        }
        _ => MarketRegime::Unknown,
    }
}

impl MarketRegime {
    /// ATR multiple for the protective stop under this regime. Volatile
    /// markets get a wider stop so noise does not shake positions out.
    pub fn stop_multiplier(&self) -> f64 {
        match self {
            Self::Volatile => 0.75,
            _ => 0.5,
        }
    }

    /// Scale factor applied to trend-following feature weights.
    pub fn trend_weight_scale(&self) -> f64 {
        match self {
            Self::TrendingUp | Self::TrendingDown => 1.25,
            Self::Rangebound => 0.8,
            Self::Volatile => 0.9,
            Self::Unknown => 1.0,
        }
    }

    /// Scale factor applied to mean-reversion feature weights.
    pub fn reversion_weight_scale(&self) -> f64 {
        match self {
            Self::Rangebound => 1.25,
            Self::TrendingUp | Self::TrendingDown => 0.8,
            Self::Volatile => 0.9,
            Self::Unknown => 1.0,
        }
    }

    /// Numeric encoding for the feature vector: +1 up, -1 down, 0 otherwise.
    pub fn feature_value(&self) -> f64 {
        match self {
            Self::TrendingUp => 1.0,
            Self::TrendingDown => -1.0,
            _ => 0.0,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vix_spike_is_volatile() {
        assert_eq!(
            classify_regime(Some(32.0), Some(1.5), Some(0.7)),
            MarketRegime::Volatile
        );
    }

    #[test]
    fn uptrend_with_breadth() {
        assert_eq!(
            classify_regime(Some(15.0), Some(1.2), Some(0.65)),
            MarketRegime::TrendingUp
        );
    }

    #[test]
    fn downtrend_with_breadth() {
        assert_eq!(
            classify_regime(Some(20.0), Some(-1.2), Some(0.30)),
            MarketRegime::TrendingDown
        );
    }

    #[test]
    fn flat_market_rangebound() {
        assert_eq!(
            classify_regime(Some(14.0), Some(0.1), Some(0.5)),
            MarketRegime::Rangebound
        );
    }

    #[test]
    fn trend_without_breadth_confirmation_is_rangebound() {
        // Trend up but breadth weak — not a confirmed trend.
        assert_eq!(
            classify_regime(Some(14.0), Some(1.2), Some(0.40)),
            MarketRegime::Rangebound
        );
    }

    #[test]
    fn missing_inputs_unknown() {
        assert_eq!(classify_regime(None, None, None), MarketRegime::Unknown);
        assert_eq!(classify_regime(Some(15.0), None, None), MarketRegime::Unknown);
    }

    #[test]
    fn classification_deterministic() {
        let a = classify_regime(Some(22.0), Some(0.7), Some(0.6));
        let b = classify_regime(Some(22.0), Some(0.7), Some(0.6));
        assert_eq!(a, b);
    }

    #[test]
    fn volatile_widens_stop() {
        assert!((MarketRegime::Volatile.stop_multiplier() - 0.75).abs() < 1e-12);
        assert!((MarketRegime::TrendingUp.stop_multiplier() - 0.5).abs() < 1e-12);
    }
}
