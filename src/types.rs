// =============================================================================
// Shared types used across the Argus intelligence engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Directional side of a trade setup or paper position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1.0 for long, -1.0 for short. Used wherever P&L is direction-signed.
    pub fn sign(&self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// Net directional lean of a ticker, produced by the technical analyzer and
/// the signal engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

impl Default for Bias {
    fn default() -> Self {
        Self::Neutral
    }
}

impl std::fmt::Display for Bias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bullish => write!(f, "BULLISH"),
            Self::Bearish => write!(f, "BEARISH"),
            Self::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Life-cycle status of a paper trade.
///
/// A trade is `Pending` while open; every other variant is terminal and the
/// trade becomes immutable once it is assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Pending,
    WinT1,
    WinT2,
    LossStop,
    WinEod,
    LossEod,
    Expired,
}

impl TradeStatus {
    pub fn is_closed(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Training label: 1 for wins, 0 for losses, None for undecided/expired.
    pub fn training_label(&self) -> Option<u8> {
        match self {
            Self::WinT1 | Self::WinT2 | Self::WinEod => Some(1),
            Self::LossStop | Self::LossEod => Some(0),
            Self::Pending | Self::Expired => None,
        }
    }
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::WinT1 => write!(f, "WIN_T1"),
            Self::WinT2 => write!(f, "WIN_T2"),
            Self::LossStop => write!(f, "LOSS_STOP"),
            Self::WinEod => write!(f, "WIN_EOD"),
            Self::LossEod => write!(f, "LOSS_EOD"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// Fetch-frequency class for a polling cycle. Tiers are cumulative: a WARM
/// cycle also fetches every HOT endpoint, and a COLD cycle fetches everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    Hot,
    Warm,
    Cold,
}

impl Tier {
    /// Whether a cycle of this tier includes endpoints tagged `other`.
    pub fn includes(&self, other: Tier) -> bool {
        self.rank() >= other.rank()
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Hot => 0,
            Self::Warm => 1,
            Self::Cold => 2,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hot => write!(f, "HOT"),
            Self::Warm => write!(f, "WARM"),
            Self::Cold => write!(f, "COLD"),
        }
    }
}

/// Alert severity shown to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// Expected holding horizon of a setup, classified from the expected % move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeHorizon {
    Scalp,
    DayTrade,
    Intraday,
    Swing1to3d,
    Swing3to5d,
}

impl TradeHorizon {
    /// Horizons that must be flattened by the 16:00 ET end-of-day sweep.
    pub fn is_intraday(&self) -> bool {
        matches!(self, Self::Scalp | Self::DayTrade | Self::Intraday)
    }
}

impl std::fmt::Display for TradeHorizon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalp => write!(f, "Scalp"),
            Self::DayTrade => write!(f, "DayTrade"),
            Self::Intraday => write!(f, "Intraday"),
            Self::Swing1to3d => write!(f, "Swing-1-3d"),
            Self::Swing3to5d => write!(f, "Swing-3-5d"),
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
    fn tier_is_cumulative() {
        assert!(Tier::Cold.includes(Tier::Warm));
        assert!(Tier::Cold.includes(Tier::Hot));
        assert!(Tier::Warm.includes(Tier::Hot));
        assert!(!Tier::Warm.includes(Tier::Cold));
        assert!(!Tier::Hot.includes(Tier::Warm));
        assert!(Tier::Hot.includes(Tier::Hot));
    }

    #[test]
    fn status_terminality() {
        assert!(!TradeStatus::Pending.is_closed());
        for s in [
            TradeStatus::WinT1,
            TradeStatus::WinT2,
            TradeStatus::LossStop,
            TradeStatus::WinEod,
            TradeStatus::LossEod,
            TradeStatus::Expired,
        ] {
            assert!(s.is_closed());
        }
    }

    #[test]
    fn training_labels_exclude_expired() {
        assert_eq!(TradeStatus::WinT2.training_label(), Some(1));
        assert_eq!(TradeStatus::LossEod.training_label(), Some(0));
        assert_eq!(TradeStatus::Expired.training_label(), None);
        assert_eq!(TradeStatus::Pending.training_label(), None);
    }

    #[test]
    fn direction_sign() {
        assert_eq!(Direction::Long.sign(), 1.0);
        assert_eq!(Direction::Short.sign(), -1.0);
    }

    #[test]
    fn intraday_horizons() {
        assert!(TradeHorizon::Scalp.is_intraday());
        assert!(TradeHorizon::DayTrade.is_intraday());
        assert!(!TradeHorizon::Swing1to3d.is_intraday());
        assert!(!TradeHorizon::Swing3to5d.is_intraday());
    }

    #[test]
    fn display_strings_match_wire_format() {
        assert_eq!(TradeStatus::WinEod.to_string(), "WIN_EOD");
        assert_eq!(TradeHorizon::Swing3to5d.to_string(), "Swing-3-5d");
        assert_eq!(Tier::Warm.to_string(), "WARM");
    }
}
