// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Middle band = SMA(period); upper/lower = middle ± num_std * σ.
//
// Two derived metrics feed the signal engine:
//   position  = (last - lower) / (upper - lower), clipped to [0, 1]
//   bandwidth = (upper - lower) / middle * 100
// =============================================================================

/// Result of a Bollinger Band calculation.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BollingerResult {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    /// Where the last close sits within the bands, in [0, 1].
    pub position: f64,
    /// Band width as a percentage of the middle band.
    pub bandwidth: f64,
}

/// Calculate Bollinger Bands over the trailing `period` closes.
///
/// Returns `None` when:
/// - Fewer than `period` data points or `period == 0`.
/// - Middle band is zero (degenerate input).
pub fn calculate_bollinger(closes: &[f64], period: usize, num_std: f64) -> Option<BollingerResult> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let middle = window.iter().sum::<f64>() / period as f64;

    if middle == 0.0 {
        return None;
    }

    let variance = window.iter().map(|x| (x - middle).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();

    let upper = middle + num_std * std_dev;
    let lower = middle - num_std * std_dev;

    let last = *closes.last()?;
    let position = if upper > lower {
        ((last - lower) / (upper - lower)).clamp(0.0, 1.0)
    } else {
        0.5 // Flat window — bands collapse onto the middle.
    };

    let bandwidth = (upper - lower) / middle * 100.0;

    if bandwidth.is_finite() && position.is_finite() {
        Some(BollingerResult {
            upper,
            middle,
            lower,
            position,
            bandwidth,
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
    fn bollinger_basic() {
        let closes: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        let bb = calculate_bollinger(&closes, 20, 2.0).unwrap();
        assert!(bb.upper > bb.middle);
        assert!(bb.lower < bb.middle);
        assert!(bb.bandwidth > 0.0);
    }

    #[test]
    fn bollinger_insufficient_data() {
        let closes = vec![1.0, 2.0, 3.0];
        assert!(calculate_bollinger(&closes, 20, 2.0).is_none());
    }

    #[test]
    fn bollinger_flat_collapses() {
        let closes = vec![100.0; 20];
        let bb = calculate_bollinger(&closes, 20, 2.0).unwrap();
        assert!((bb.bandwidth - 0.0).abs() < 1e-10);
        assert!((bb.position - 0.5).abs() < 1e-10);
    }

    #[test]
    fn position_clipped_to_unit_interval() {
        // Last close far above the window mean pushes raw position > 1.
        let mut closes = vec![100.0; 19];
        closes.push(200.0);
        let bb = calculate_bollinger(&closes, 20, 2.0).unwrap();
        assert!((0.0..=1.0).contains(&bb.position));
    }

    #[test]
    fn position_high_at_upper_band() {
        let closes: Vec<f64> = (1..=20).map(|x| 100.0 + x as f64).collect();
        let bb = calculate_bollinger(&closes, 20, 2.0).unwrap();
        // Rising series ends near the top of its own window.
        assert!(bb.position > 0.7, "position {}", bb.position);
    }
}
