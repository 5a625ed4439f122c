// =============================================================================
// Short-Squeeze Composite Score
// =============================================================================
//
// Fuses short-volume ratio, fails-to-deliver size, and short interest as a
// percentage of float into an integer score 0..6:
//
//   short-volume ratio  > 0.5  +2      > 0.4  +1
//   FTD quantity        > 1M   +2      > 500k +1
//   SI % of float       > 20   +2      > 10   +1
//
// Readings above 100% of float are treated as bad vendor data and contribute
// nothing.
// =============================================================================

use serde::{Deserialize, Serialize};

/// Categorical label for the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqueezeLabel {
    Extreme,
    High,
    Elevated,
    Moderate,
    Low,
}

impl std::fmt::Display for SqueezeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Extreme => write!(f, "EXTREME"),
            Self::High => write!(f, "HIGH"),
            Self::Elevated => write!(f, "ELEVATED"),
            Self::Moderate => write!(f, "MODERATE"),
            Self::Low => write!(f, "LOW"),
        }
    }
}

/// Composite squeeze reading for a ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqueezeScore {
    pub score: u8,
    pub label: SqueezeLabel,
}

/// Score the squeeze inputs. Any input may be absent; absent or invalid
/// inputs contribute zero.
pub fn score_squeeze(
    short_volume_ratio: Option<f64>,
    ftd_quantity: Option<f64>,
    si_percent_of_float: Option<f64>,
) -> SqueezeScore {
    let mut score: u8 = 0;

    if let Some(svr) = short_volume_ratio {
        // A ratio is a fraction of volume; above 1.0 is vendor garbage.
        if (0.0..=1.0).contains(&svr) {
            if svr > 0.5 {
                score += 2;
            } else if svr > 0.4 {
                score += 1;
            }
        }
    }

    if let Some(ftd) = ftd_quantity {
        if ftd.is_finite() && ftd > 0.0 {
            if ftd > 1_000_000.0 {
                score += 2;
            } else if ftd > 500_000.0 {
                score += 1;
            }
        }
    }

    if let Some(si) = si_percent_of_float {
        // SI above 100% of float is zeroed as bad data.
        if (0.0..=100.0).contains(&si) {
            if si > 20.0 {
                score += 2;
            } else if si > 10.0 {
                score += 1;
            }
        }
    }

    let label = match score {
        s if s >= 5 => SqueezeLabel::Extreme,
        4 => SqueezeLabel::High,
        3 => SqueezeLabel::Elevated,
        2 => SqueezeLabel::Moderate,
        _ => SqueezeLabel::Low,
    };

    SqueezeScore { score, label }
}
