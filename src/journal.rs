// =============================================================================
// Paper-Trading Journal — simulated position lifecycle and training data
// =============================================================================
//
// Life-cycle:
//   admitted  ->  PENDING  ->  WIN_T1 / WIN_T2 / LOSS_STOP   (outcome checker)
//                          ->  WIN_EOD / LOSS_EOD            (16:00 ET sweep)
//                          ->  EXPIRED                       (> 5 days old)
//
// Admission gates run in order; the first failure wins and is returned as a
// typed outcome, never an error:
//   1. Market is in a trading session.
//   2. No PENDING trade with the same (ticker, direction, version) opened
//      within the cooldown.
//   3. Open positions for the ticker (same version bucket) below the limit.
//   4. Notional fits the remaining version budget; shares clamp down, and a
//      clamp below one share rejects.
//   5. Notional fits the remaining account budget; same clamp.
//
// Fills happen at the live market price. When the fill drifts more than 0.1%
// from the setup entry, stop and targets are rescaled so their percentage
// distances from the fill match the original distances from the setup entry.
//
// Closed trades are immutable. Thread-safety mirrors the rest of the engine:
// a single `parking_lot::RwLock` around the trade list, single writer.
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::JournalConfig;
use crate::signal::features::FeatureVector;
use crate::signal::setup::TradeSetup;
use crate::types::{Direction, TradeHorizon, TradeStatus};

/// Fill drift beyond which stop/targets are rescaled.
const RESCALE_THRESHOLD: f64 = 0.001;
/// Outcome evaluation is blocked for this long after open.
const GRACE_PERIOD_MINUTES: i64 = 5;
/// Swing trades expire after this many days.
const EXPIRY_DAYS: i64 = 5;
/// Dollar risk assumed when a legacy trade has no share count.
const FALLBACK_RISK_DOLLARS: f64 = 2_000.0;
/// Closed-trade sample below which sizing falls back to confidence scaling.
const KELLY_MIN_SAMPLE: usize = 10;

// ---------------------------------------------------------------------------
// Trade record
// ---------------------------------------------------------------------------

/// A simulated position. Append-only: after insertion it is only mutated by
/// the outcome checker, the EOD sweep, or an explicit close request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperTrade {
    pub id: String,
    pub ticker: String,
    pub direction: Direction,
    /// Actual fill price (may differ from the setup entry).
    pub entry: f64,
    pub shares: f64,
    pub target1: f64,
    pub target2: f64,
    pub stop: f64,
    pub opened_at: DateTime<Utc>,
    pub status: TradeStatus,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_price: Option<f64>,
    #[serde(default)]
    pub pnl_pct: f64,
    #[serde(default)]
    pub pnl_points: f64,
    #[serde(default)]
    pub pnl_total: f64,
    #[serde(default)]
    pub unrealized_pnl_pct: f64,
    #[serde(default)]
    pub unrealized_pnl_total: f64,
    pub signal_version: String,
    pub horizon: TradeHorizon,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub features: Option<FeatureVector>,
}

impl PaperTrade {
    pub fn notional(&self) -> f64 {
        self.entry * self.shares
    }

    fn close(&mut self, status: TradeStatus, exit: f64, now: DateTime<Utc>) {
        let sign = self.direction.sign();
        self.status = status;
        self.exit_price = Some(exit);
        self.closed_at = Some(now);
        self.pnl_points = (exit - self.entry) * sign;
        self.pnl_pct = if self.entry > 0.0 {
            (exit - self.entry) / self.entry * sign * 100.0
        } else {
            0.0
        };
        self.pnl_total = if self.shares > 0.0 {
            self.pnl_points * self.shares
        } else if self.entry > 0.0 && (self.entry - self.stop).abs() > 0.0 {
            // Legacy rows without shares: scale to a fixed dollar risk.
            self.pnl_points * (FALLBACK_RISK_DOLLARS / (self.entry - self.stop).abs())
        } else {
            0.0
        };
        self.unrealized_pnl_pct = 0.0;
        self.unrealized_pnl_total = 0.0;
    }
}

// ---------------------------------------------------------------------------
// Admission outcomes
// ---------------------------------------------------------------------------

/// Why an admission was refused. A rejection is an expected outcome, not an
/// error; the boundary serialises it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateRejection {
    NotTradingSession,
    CooldownActive,
    MaxPositionsForTicker,
    BelowMinimumShares,
}

impl std::fmt::Display for GateRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotTradingSession => write!(f, "market is not in a trading session"),
            Self::CooldownActive => write!(f, "cooldown active for this ticker/direction/version"),
            Self::MaxPositionsForTicker => write!(f, "per-ticker position limit reached"),
            Self::BelowMinimumShares => write!(f, "budget leaves less than one share"),
        }
    }
}

/// Result of an admission attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Admission {
    Opened(PaperTrade),
    Rejected(GateRejection),
}

// ---------------------------------------------------------------------------
// Aggregate stats
// ---------------------------------------------------------------------------

/// Aggregate journal statistics, persisted alongside the trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct JournalStats {
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    #[serde(with = "finite_f64")]
    pub profit_factor: f64,
    pub total_pnl: f64,
    pub by_version: HashMap<String, VersionStats>,
}

/// (De)serialises an `f64` that may be non-finite (e.g. `profit_factor` is
/// `+inf` when there have been no losing trades). `serde_json` has no wire
/// representation for infinity and silently turns it into `null` on encode,
/// which then fails to decode back into a plain `f64`. Round-trip it through
/// a string for non-finite values instead.
mod finite_f64 {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            value.to_string().serialize(serializer)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Text(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::Text(s) => s.parse::<f64>().map_err(serde::de::Error::custom),
        }
    }
}

/// Per-signal-version bucket stats for A/B comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VersionStats {
    pub trades: usize,
    pub wins: usize,
    pub total_pnl: f64,
}

/// Kelly-sizing summary derived from decided trades. Also the input to the
/// sizing path once the sample is large enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct KellySummary {
    pub sample: usize,
    pub win_rate: f64,
    /// Average win over average loss.
    pub payoff_ratio: f64,
    /// Half-Kelly fraction, floored at zero.
    pub half_kelly: f64,
}

/// One exported training row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRow {
    pub ticker: String,
    pub features: FeatureVector,
    pub label: u8,
    pub pnl_pct: f64,
    pub signal_version: String,
}

/// On-disk layout of `trade-journal.json`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JournalFile {
    pub trades: Vec<PaperTrade>,
    pub stats: JournalStats,
}

// ---------------------------------------------------------------------------
// Journal
// ---------------------------------------------------------------------------

/// The paper-trading journal.
pub struct PaperJournal {
    trades: RwLock<Vec<PaperTrade>>,
    config: JournalConfig,
}

impl PaperJournal {
    pub fn new(config: JournalConfig) -> Self {
        Self {
            trades: RwLock::new(Vec::new()),
            config,
        }
    }

    // ── Admission ───────────────────────────────────────────────────────

    /// Attempt to open a paper trade from a setup at the live `fill` price.
    ///
    /// `trading_session` is the scheduler's predicate result for `now`; the
    /// journal does not consult the clock itself so tests can pin it.
    #[allow(clippy::too_many_arguments)]
    pub fn try_open(
        &self,
        ticker: &str,
        setup: &TradeSetup,
        fill: f64,
        signal_version: &str,
        trading_session: bool,
        features: Option<FeatureVector>,
        now: DateTime<Utc>,
    ) -> Admission {
        // Gate 1: trading session.
        if !trading_session {
            return Admission::Rejected(GateRejection::NotTradingSession);
        }

        if !(fill > 0.0) || !fill.is_finite() {
            return Admission::Rejected(GateRejection::BelowMinimumShares);
        }

        let cooldown = Duration::milliseconds(self.config.cooldown_ms as i64);

        {
            let trades = self.trades.read();

            // Gate 2: cooldown on (ticker, direction, version).
            let cooled = trades.iter().any(|t| {
                t.status == TradeStatus::Pending
                    && t.ticker == ticker
                    && t.direction == setup.direction
                    && t.signal_version == signal_version
                    && now - t.opened_at < cooldown
            });
            if cooled {
                return Admission::Rejected(GateRejection::CooldownActive);
            }

            // Gate 3: per-ticker limit within the version bucket.
            let open_for_ticker = trades
                .iter()
                .filter(|t| {
                    t.status == TradeStatus::Pending
                        && t.ticker == ticker
                        && t.signal_version == signal_version
                })
                .count();
            if open_for_ticker >= self.config.max_per_ticker {
                return Admission::Rejected(GateRejection::MaxPositionsForTicker);
            }
        }

        // Sizing before the budget gates: half-Kelly or confidence fallback.
        let mut shares = self.size_shares(fill, setup.confidence);

        // Gates 4 & 5: version and account budgets, clamping share count.
        let version_used = self.pending_notional_for_version(signal_version);
        let account_used = self.pending_notional();

        let version_room = (self.config.version_budget - version_used).max(0.0);
        let account_room = (self.config.account_budget - account_used).max(0.0);
        let room = version_room.min(account_room);

        let max_affordable = (room / fill).floor();
        if shares > max_affordable {
            shares = max_affordable;
        }
        if shares < 1.0 {
            return Admission::Rejected(GateRejection::BelowMinimumShares);
        }

        // Fill semantics: rescale stop/targets when the fill drifted.
        let (stop, target1, target2) = rescale_levels(setup, fill);

        let trade = PaperTrade {
            id: Uuid::new_v4().to_string(),
            ticker: ticker.to_string(),
            direction: setup.direction,
            entry: fill,
            shares,
            target1,
            target2,
            stop,
            opened_at: now,
            status: TradeStatus::Pending,
            closed_at: None,
            exit_price: None,
            pnl_pct: 0.0,
            pnl_points: 0.0,
            pnl_total: 0.0,
            unrealized_pnl_pct: 0.0,
            unrealized_pnl_total: 0.0,
            signal_version: signal_version.to_string(),
            horizon: setup.horizon,
            confidence: setup.confidence,
            features,
        };

        info!(
            id = %trade.id,
            ticker,
            direction = %trade.direction,
            fill,
            shares,
            stop,
            target1,
            target2,
            version = signal_version,
            "paper trade opened"
        );

        self.trades.write().push(trade.clone());
        Admission::Opened(trade)
    }

    /// Kelly inputs from every decided trade.
    pub fn kelly_summary(&self) -> KellySummary {
        let trades = self.trades.read();
        let decided: Vec<&PaperTrade> = trades
            .iter()
            .filter(|t| t.status.is_closed() && t.status != TradeStatus::Expired)
            .collect();

        let sample = decided.len();
        if sample == 0 {
            return KellySummary::default();
        }

        let wins: Vec<&&PaperTrade> = decided.iter().filter(|t| t.pnl_total > 0.0).collect();
        let losses: Vec<&&PaperTrade> = decided.iter().filter(|t| t.pnl_total < 0.0).collect();

        let win_rate = wins.len() as f64 / sample as f64;
        let avg_win: f64 = if wins.is_empty() {
            0.0
        } else {
            wins.iter().map(|t| t.pnl_total).sum::<f64>() / wins.len() as f64
        };
        let avg_loss: f64 = if losses.is_empty() {
            0.0
        } else {
            losses.iter().map(|t| t.pnl_total.abs()).sum::<f64>() / losses.len() as f64
        };

        let payoff_ratio = if avg_loss > 0.0 { avg_win / avg_loss } else { 1.0 };
        let kelly = if payoff_ratio > 0.0 {
            (win_rate * (payoff_ratio + 1.0) - 1.0) / payoff_ratio
        } else {
            0.0
        };

        KellySummary {
            sample,
            win_rate,
            payoff_ratio,
            half_kelly: (kelly / 2.0).max(0.0),
        }
    }

    /// Half-Kelly share sizing with a confidence modifier, clamped to
    /// 10-50% of the version budget; confidence-scaled 10-40% until enough
    /// closed trades exist.
    fn size_shares(&self, price: f64, confidence: f64) -> f64 {
        let conf = (confidence / 100.0).clamp(0.0, 1.0);
        let kelly = self.kelly_summary();

        let fraction = if kelly.sample >= KELLY_MIN_SAMPLE {
            (kelly.half_kelly * conf).clamp(0.10, 0.50)
        } else {
            // Confidence-scaled allocation until the sample is meaningful.
            (0.10 + 0.30 * conf).clamp(0.10, 0.40)
        };

        let allocation = fraction * self.config.version_budget;
        let raw_shares = (allocation / price).floor();

        let min_shares = if price < 100.0 {
            10.0
        } else if price < 500.0 {
            5.0
        } else {
            2.0
        };

        raw_shares.max(min_shares)
    }

    // ── Exposure queries ────────────────────────────────────────────────

    pub fn pending_notional(&self) -> f64 {
        self.trades
            .read()
            .iter()
            .filter(|t| t.status == TradeStatus::Pending)
            .map(PaperTrade::notional)
            .sum()
    }

    pub fn pending_notional_for_version(&self, version: &str) -> f64 {
        self.trades
            .read()
            .iter()
            .filter(|t| t.status == TradeStatus::Pending && t.signal_version == version)
            .map(PaperTrade::notional)
            .sum()
    }

    pub fn open_trades(&self) -> Vec<PaperTrade> {
        self.trades
            .read()
            .iter()
            .filter(|t| t.status == TradeStatus::Pending)
            .cloned()
            .collect()
    }

    pub fn all_trades(&self) -> Vec<PaperTrade> {
        self.trades.read().clone()
    }

    // ── Marking & outcomes ──────────────────────────────────────────────

    /// Re-mark unrealized P&L on every PENDING trade from the latest prices.
    pub fn update_paper_pnl(&self, prices: &HashMap<String, f64>) {
        let mut trades = self.trades.write();
        for trade in trades.iter_mut().filter(|t| t.status == TradeStatus::Pending) {
            if let Some(&price) = prices.get(&trade.ticker) {
                if price > 0.0 {
                    let sign = trade.direction.sign();
                    trade.unrealized_pnl_pct = (price - trade.entry) / trade.entry * sign * 100.0;
                    trade.unrealized_pnl_total = (price - trade.entry) * sign * trade.shares;
                }
            }
        }
    }

    /// Evaluate targets, stops, and expiry on every PENDING trade.
    ///
    /// A five-minute grace period from open blocks evaluation so a stale bar
    /// cannot trigger an instant stop. Only the current last price is used —
    /// never the session high/low.
    pub fn check_outcomes(&self, prices: &HashMap<String, f64>, now: DateTime<Utc>) -> Vec<PaperTrade> {
        let grace = Duration::minutes(GRACE_PERIOD_MINUTES);
        let expiry = Duration::days(EXPIRY_DAYS);
        let mut closed = Vec::new();

        let mut trades = self.trades.write();
        for trade in trades.iter_mut().filter(|t| t.status == TradeStatus::Pending) {
            let age = now - trade.opened_at;
            if age < grace {
                continue;
            }

            let Some(&price) = prices.get(&trade.ticker) else {
                // No quote this cycle; expiry still applies.
                if age > expiry {
                    let exit = trade.entry;
                    trade.close(TradeStatus::Expired, exit, now);
                    closed.push(trade.clone());
                }
                continue;
            };
            if !(price > 0.0) {
                continue;
            }

            let status = match trade.direction {
                Direction::Long => {
                    if price <= trade.stop {
                        Some(TradeStatus::LossStop)
                    } else if price >= trade.target2 {
                        Some(TradeStatus::WinT2)
                    } else if price >= trade.target1 {
                        Some(TradeStatus::WinT1)
                    } else if age > expiry {
                        Some(TradeStatus::Expired)
                    } else {
                        None
                    }
                }
                Direction::Short => {
                    if price >= trade.stop {
                        Some(TradeStatus::LossStop)
                    } else if price <= trade.target2 {
                        Some(TradeStatus::WinT2)
                    } else if price <= trade.target1 {
                        Some(TradeStatus::WinT1)
                    } else if age > expiry {
                        Some(TradeStatus::Expired)
                    } else {
                        None
                    }
                }
            };

            if let Some(status) = status {
                // Snap the exit to the level that triggered it so the fill is
                // honest about what the simulation assumed.
                let exit = match status {
                    TradeStatus::LossStop => trade.stop,
                    TradeStatus::WinT2 => trade.target2,
                    TradeStatus::WinT1 => trade.target1,
                    _ => price,
                };
                trade.close(status, exit, now);
                info!(
                    id = %trade.id,
                    ticker = %trade.ticker,
                    status = %trade.status,
                    exit,
                    pnl_pct = trade.pnl_pct,
                    "paper trade closed"
                );
                closed.push(trade.clone());
            }
        }

        closed
    }

    /// Force-close every PENDING intraday-horizon trade at the latest price.
    /// Invoked once per day inside the 16:00 ET window.
    pub fn close_intraday_trades(
        &self,
        prices: &HashMap<String, f64>,
        now: DateTime<Utc>,
    ) -> Vec<PaperTrade> {
        let mut closed = Vec::new();
        let mut trades = self.trades.write();

        for trade in trades
            .iter_mut()
            .filter(|t| t.status == TradeStatus::Pending && t.horizon.is_intraday())
        {
            let exit = prices
                .get(&trade.ticker)
                .copied()
                .filter(|p| *p > 0.0)
                .unwrap_or(trade.entry);

            let sign = trade.direction.sign();
            let status = if (exit - trade.entry) * sign >= 0.0 {
                TradeStatus::WinEod
            } else {
                TradeStatus::LossEod
            };
            trade.close(status, exit, now);
            info!(
                id = %trade.id,
                ticker = %trade.ticker,
                status = %trade.status,
                "intraday trade swept at EOD"
            );
            closed.push(trade.clone());
        }

        closed
    }

    /// Explicit close request from the boundary. Marked as an EOD-style
    /// outcome by P&L sign. Returns `None` for an unknown or already-closed
    /// trade.
    pub fn close_trade(&self, id: &str, price: f64, now: DateTime<Utc>) -> Option<PaperTrade> {
        let mut trades = self.trades.write();
        let trade = trades
            .iter_mut()
            .find(|t| t.id == id && t.status == TradeStatus::Pending)?;

        let sign = trade.direction.sign();
        let status = if (price - trade.entry) * sign >= 0.0 {
            TradeStatus::WinEod
        } else {
            TradeStatus::LossEod
        };
        trade.close(status, price, now);
        info!(id, price, status = %trade.status, "paper trade closed on request");
        Some(trade.clone())
    }

    // ── Stats & training export ─────────────────────────────────────────

    /// Recompute aggregate stats over all decided trades.
    pub fn stats(&self) -> JournalStats {
        let trades = self.trades.read();
        let decided: Vec<&PaperTrade> = trades
            .iter()
            .filter(|t| t.status.is_closed() && t.status != TradeStatus::Expired)
            .collect();

        let wins = decided.iter().filter(|t| t.status.training_label() == Some(1)).count();
        let losses = decided.iter().filter(|t| t.status.training_label() == Some(0)).count();

        let gross_profit: f64 = decided.iter().map(|t| t.pnl_total).filter(|p| *p > 0.0).sum();
        let gross_loss: f64 = decided
            .iter()
            .map(|t| t.pnl_total)
            .filter(|p| *p < 0.0)
            .map(f64::abs)
            .sum();
        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let mut by_version: HashMap<String, VersionStats> = HashMap::new();
        for t in &decided {
            let entry = by_version.entry(t.signal_version.clone()).or_default();
            entry.trades += 1;
            if t.status.training_label() == Some(1) {
                entry.wins += 1;
            }
            entry.total_pnl += t.pnl_total;
        }

        JournalStats {
            total_trades: decided.len(),
            wins,
            losses,
            win_rate: if decided.is_empty() {
                0.0
            } else {
                wins as f64 / decided.len() as f64
            },
            profit_factor,
            total_pnl: decided.iter().map(|t| t.pnl_total).sum(),
            by_version,
        }
    }

    /// Decided trades with features, labelled 1 for wins and 0 for losses.
    /// EXPIRED trades carry no label and are excluded.
    pub fn training_data(&self) -> Vec<TrainingRow> {
        self.trades
            .read()
            .iter()
            .filter_map(|t| {
                let label = t.status.training_label()?;
                let features = t.features.clone()?;
                Some(TrainingRow {
                    ticker: t.ticker.clone(),
                    features,
                    label,
                    pnl_pct: t.pnl_pct,
                    signal_version: t.signal_version.clone(),
                })
            })
            .collect()
    }

    // ── Persistence ─────────────────────────────────────────────────────

    /// Snapshot the journal for `trade-journal.json`.
    pub fn to_file(&self) -> JournalFile {
        JournalFile {
            trades: self.all_trades(),
            stats: self.stats(),
        }
    }

    /// Load trades from a persisted file, replacing the in-memory list.
    pub fn load_from(&self, file: JournalFile) {
        debug!(count = file.trades.len(), "journal restored from disk");
        *self.trades.write() = file.trades;
    }
}

// ---------------------------------------------------------------------------
// Fill rescaling
// ---------------------------------------------------------------------------

/// Rescale stop/targets so their percentage distances from the fill equal
/// the original percentage distances from the setup entry. A fill within
/// 0.1% of the entry keeps the levels untouched (identity).
fn rescale_levels(setup: &TradeSetup, fill: f64) -> (f64, f64, f64) {
    if setup.entry <= 0.0 {
        return (setup.stop, setup.target1, setup.target2);
    }

    let drift = (fill - setup.entry).abs() / setup.entry;
    if drift <= RESCALE_THRESHOLD {
        return (setup.stop, setup.target1, setup.target2);
    }

    let ratio = fill / setup.entry;
    (setup.stop * ratio, setup.target1 * ratio, setup.target2 * ratio)
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Bias;

    fn config() -> JournalConfig {
        JournalConfig::default()
    }

    fn long_setup(entry: f64) -> TradeSetup {
        crate::signal::setup::generate_setup(
            Bias::Bullish,
            entry,
            Some(entry * 0.02),
            None,
            0.5,
            60.0,
            None,
        )
        .unwrap()
    }

    fn setup_with_levels(entry: f64, stop: f64, t1: f64, t2: f64) -> TradeSetup {
        TradeSetup {
            direction: Direction::Long,
            entry,
            target1: t1,
            target2: t2,
            stop,
            risk_reward: (t1 - entry).abs() / (entry - stop).abs(),
            confidence: 60.0,
            horizon: crate::signal::setup::classify_horizon(entry, t1),
            session: None,
        }
    }

    fn prices(ticker: &str, price: f64) -> HashMap<String, f64> {
        HashMap::from([(ticker.to_string(), price)])
    }

    #[test]
    fn admission_outside_trading_session_rejected() {
        let journal = PaperJournal::new(config());
        let adm = journal.try_open("AAPL", &long_setup(100.0), 100.0, "v1.0", false, None, Utc::now());
        assert_eq!(adm, Admission::Rejected(GateRejection::NotTradingSession));
    }

    #[test]
    fn admission_cooldown_per_version_bucket() {
        // A PENDING AAPL LONG v1.0 opened 30 min ago blocks another v1.0
        // admission, but not the v1.1 bucket.
        let journal = PaperJournal::new(config());
        let t0 = Utc::now() - Duration::minutes(30);

        let adm = journal.try_open("AAPL", &long_setup(100.0), 100.0, "v1.0", true, None, t0);
        assert!(matches!(adm, Admission::Opened(_)));

        let now = Utc::now();
        let again = journal.try_open("AAPL", &long_setup(100.0), 100.0, "v1.0", true, None, now);
        assert_eq!(again, Admission::Rejected(GateRejection::CooldownActive));

        let other_bucket = journal.try_open("AAPL", &long_setup(100.0), 100.0, "v1.1", true, None, now);
        assert!(matches!(other_bucket, Admission::Opened(_)));
    }

    #[test]
    fn per_ticker_limit_within_bucket() {
        let mut cfg = config();
        cfg.cooldown_ms = 0; // isolate the limit gate
        let journal = PaperJournal::new(cfg);
        let now = Utc::now();

        for _ in 0..3 {
            let adm = journal.try_open("AAPL", &long_setup(100.0), 100.0, "v1.0", true, None, now);
            assert!(matches!(adm, Admission::Opened(_)));
        }
        let fourth = journal.try_open("AAPL", &long_setup(100.0), 100.0, "v1.0", true, None, now);
        assert_eq!(fourth, Admission::Rejected(GateRejection::MaxPositionsForTicker));
    }

    #[test]
    fn version_budget_clamps_shares() {
        let mut cfg = config();
        cfg.cooldown_ms = 0;
        cfg.max_per_ticker = 100;
        let journal = PaperJournal::new(cfg);
        let now = Utc::now();

        // Burn most of the version budget with expensive fills.
        for ticker in ["AAA", "BBB", "CCC", "DDD"] {
            let adm = journal.try_open(ticker, &long_setup(1000.0), 1000.0, "v1.0", true, None, now);
            assert!(matches!(adm, Admission::Opened(_)));
        }

        let used = journal.pending_notional_for_version("v1.0");
        assert!(used <= 25_000.0, "version budget respected, used {used}");

        // Keep opening until the clamp rejects below one share.
        let mut rejected = false;
        for ticker in ["EEE", "FFF", "GGG", "HHH", "III", "JJJ"] {
            match journal.try_open(ticker, &long_setup(1000.0), 1000.0, "v1.0", true, None, now) {
                Admission::Opened(_) => {}
                Admission::Rejected(GateRejection::BelowMinimumShares) => {
                    rejected = true;
                    break;
                }
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert!(rejected, "budget exhaustion must eventually reject");
        assert!(journal.pending_notional_for_version("v1.0") <= 25_000.0);
    }

    #[test]
    fn account_budget_caps_across_versions() {
        let mut cfg = config();
        cfg.cooldown_ms = 0;
        cfg.max_per_ticker = 1000;
        let journal = PaperJournal::new(cfg);
        let now = Utc::now();

        // Five version buckets of up to $25k each would exceed $100k global.
        for v in ["v1", "v2", "v3", "v4", "v5"] {
            for ticker in ["AAA", "BBB", "CCC", "DDD"] {
                let _ = journal.try_open(ticker, &long_setup(1000.0), 1000.0, v, true, None, now);
            }
        }
        assert!(journal.pending_notional() <= 100_000.0);
    }

    #[test]
    fn fill_rescale_preserves_ratios() {
        let setup = setup_with_levels(100.0, 99.0, 102.0, 104.0);
        let (stop, t1, t2) = rescale_levels(&setup, 101.0);
        assert!((stop - 99.99).abs() < 1e-3);
        assert!((t1 - 103.02).abs() < 1e-3);
        assert!((t2 - 105.04).abs() < 1e-3);
    }

    #[test]
    fn fill_rescale_identity_at_entry() {
        let setup = setup_with_levels(100.0, 99.0, 102.0, 104.0);
        let (stop, t1, t2) = rescale_levels(&setup, 100.0);
        assert_eq!((stop, t1, t2), (99.0, 102.0, 104.0));

        // Within the 0.1% threshold: also untouched.
        let (stop, t1, t2) = rescale_levels(&setup, 100.05);
        assert_eq!((stop, t1, t2), (99.0, 102.0, 104.0));
    }

    #[test]
    fn grace_period_blocks_outcome() {
        // stop=99, price 98.5 at 2 minutes: no close. Same price at
        // 6 minutes: LOSS_STOP.
        let mut cfg = config();
        cfg.cooldown_ms = 0;
        let journal = PaperJournal::new(cfg);

        let t0 = Utc::now();
        let setup = setup_with_levels(100.0, 99.0, 102.0, 104.0);
        let adm = journal.try_open("AAPL", &setup, 100.0, "v1.0", true, None, t0);
        assert!(matches!(adm, Admission::Opened(_)));

        let closed = journal.check_outcomes(&prices("AAPL", 98.5), t0 + Duration::minutes(2));
        assert!(closed.is_empty());

        let closed = journal.check_outcomes(&prices("AAPL", 98.5), t0 + Duration::minutes(6));
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].status, TradeStatus::LossStop);
        // Exit snapped to the stop level.
        assert!((closed[0].exit_price.unwrap() - 99.0).abs() < 1e-9);
        assert!(closed[0].pnl_total < 0.0);
    }

    #[test]
    fn target2_beats_target1_when_both_crossed() {
        let mut cfg = config();
        cfg.cooldown_ms = 0;
        let journal = PaperJournal::new(cfg);
        let t0 = Utc::now();
        let setup = setup_with_levels(100.0, 99.0, 102.0, 104.0);
        journal.try_open("AAPL", &setup, 100.0, "v1.0", true, None, t0);

        let closed = journal.check_outcomes(&prices("AAPL", 105.0), t0 + Duration::minutes(10));
        assert_eq!(closed[0].status, TradeStatus::WinT2);
        assert!((closed[0].exit_price.unwrap() - 104.0).abs() < 1e-9);
    }

    #[test]
    fn short_outcomes_mirror() {
        let mut cfg = config();
        cfg.cooldown_ms = 0;
        let journal = PaperJournal::new(cfg);
        let t0 = Utc::now();

        let setup = TradeSetup {
            direction: Direction::Short,
            entry: 100.0,
            target1: 98.0,
            target2: 96.0,
            stop: 101.0,
            risk_reward: 2.0,
            confidence: 60.0,
            horizon: TradeHorizon::Swing1to3d,
            session: None,
        };
        journal.try_open("TSLA", &setup, 100.0, "v1.0", true, None, t0);

        let closed = journal.check_outcomes(&prices("TSLA", 97.5), t0 + Duration::minutes(10));
        assert_eq!(closed[0].status, TradeStatus::WinT1);
        assert!(closed[0].pnl_total > 0.0);
    }

    #[test]
    fn stale_trade_expires() {
        let mut cfg = config();
        cfg.cooldown_ms = 0;
        let journal = PaperJournal::new(cfg);
        let t0 = Utc::now();
        let setup = setup_with_levels(100.0, 95.0, 120.0, 140.0);
        journal.try_open("AAPL", &setup, 100.0, "v1.0", true, None, t0);

        // Price never reaches any level; six days later it expires.
        let closed = journal.check_outcomes(&prices("AAPL", 101.0), t0 + Duration::days(6));
        assert_eq!(closed[0].status, TradeStatus::Expired);
    }

    #[test]
    fn eod_sweep_closes_intraday_only() {
        let mut cfg = config();
        cfg.cooldown_ms = 0;
        let journal = PaperJournal::new(cfg);
        let t0 = Utc::now();

        // DayTrade horizon (~1% move).
        let intraday = setup_with_levels(100.0, 99.5, 101.0, 102.0);
        assert!(intraday.horizon.is_intraday());
        journal.try_open("AAPL", &intraday, 100.0, "v1.0", true, None, t0);

        // Swing horizon (~3% move).
        let swing = setup_with_levels(100.0, 98.0, 103.0, 106.0);
        assert!(!swing.horizon.is_intraday());
        journal.try_open("MSFT", &swing, 100.0, "v1.0", true, None, t0);

        let mut p = prices("AAPL", 100.4);
        p.insert("MSFT".into(), 100.4);
        let closed = journal.close_intraday_trades(&p, t0 + Duration::hours(6));

        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].ticker, "AAPL");
        assert_eq!(closed[0].status, TradeStatus::WinEod);
        assert_eq!(journal.open_trades().len(), 1);
    }

    #[test]
    fn eod_loss_when_under_water() {
        let mut cfg = config();
        cfg.cooldown_ms = 0;
        let journal = PaperJournal::new(cfg);
        let t0 = Utc::now();
        let setup = setup_with_levels(100.0, 99.5, 101.0, 102.0);
        journal.try_open("AAPL", &setup, 100.0, "v1.0", true, None, t0);

        let closed = journal.close_intraday_trades(&prices("AAPL", 99.7), t0 + Duration::hours(6));
        assert_eq!(closed[0].status, TradeStatus::LossEod);
    }

    #[test]
    fn unrealized_pnl_updates() {
        let mut cfg = config();
        cfg.cooldown_ms = 0;
        let journal = PaperJournal::new(cfg);
        let t0 = Utc::now();
        journal.try_open("AAPL", &setup_with_levels(100.0, 99.0, 102.0, 104.0), 100.0, "v1.0", true, None, t0);

        journal.update_paper_pnl(&prices("AAPL", 101.0));
        let open = journal.open_trades();
        assert!((open[0].unrealized_pnl_pct - 1.0).abs() < 1e-9);
        assert!(open[0].unrealized_pnl_total > 0.0);
    }

    #[test]
    fn training_data_excludes_expired_and_featureless() {
        let mut cfg = config();
        cfg.cooldown_ms = 0;
        let journal = PaperJournal::new(cfg);
        let t0 = Utc::now();

        // Win with features.
        journal.try_open(
            "AAA",
            &setup_with_levels(100.0, 99.0, 102.0, 104.0),
            100.0,
            "v1.0",
            true,
            Some(FeatureVector::empty()),
            t0,
        );
        // Win without features.
        journal.try_open("BBB", &setup_with_levels(100.0, 99.0, 102.0, 104.0), 100.0, "v1.0", true, None, t0);
        // Will expire.
        journal.try_open(
            "CCC",
            &setup_with_levels(100.0, 90.0, 130.0, 150.0),
            100.0,
            "v1.0",
            true,
            Some(FeatureVector::empty()),
            t0,
        );

        let mut p = prices("AAA", 103.0);
        p.insert("BBB".into(), 103.0);
        p.insert("CCC".into(), 100.5);
        journal.check_outcomes(&p, t0 + Duration::minutes(10));
        journal.check_outcomes(&p, t0 + Duration::days(6));

        let rows = journal.training_data();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ticker, "AAA");
        assert_eq!(rows[0].label, 1);
    }

    #[test]
    fn save_load_roundtrip_is_identity() {
        let mut cfg = config();
        cfg.cooldown_ms = 0;
        let journal = PaperJournal::new(cfg.clone());
        let t0 = Utc::now();
        journal.try_open("AAPL", &setup_with_levels(100.0, 99.0, 102.0, 104.0), 100.0, "v1.0", true, None, t0);
        journal.check_outcomes(&prices("AAPL", 103.0), t0 + Duration::minutes(10));

        let file = journal.to_file();
        let json = serde_json::to_string(&file).unwrap();
        let parsed: JournalFile = serde_json::from_str(&json).unwrap();

        let restored = PaperJournal::new(cfg);
        restored.load_from(parsed);
        assert_eq!(restored.all_trades(), journal.all_trades());
    }

    #[test]
    fn stats_track_versions() {
        let mut cfg = config();
        cfg.cooldown_ms = 0;
        let journal = PaperJournal::new(cfg);
        let t0 = Utc::now();

        journal.try_open("AAA", &setup_with_levels(100.0, 99.0, 102.0, 104.0), 100.0, "v1.0", true, None, t0);
        journal.try_open("BBB", &setup_with_levels(100.0, 99.0, 102.0, 104.0), 100.0, "v1.1", true, None, t0);

        let mut p = prices("AAA", 103.0); // win
        p.insert("BBB".into(), 98.0); // stop
        journal.check_outcomes(&p, t0 + Duration::minutes(10));

        let stats = journal.stats();
        assert_eq!(stats.total_trades, 2);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.losses, 1);
        assert!((stats.win_rate - 0.5).abs() < 1e-9);
        assert_eq!(stats.by_version["v1.0"].wins, 1);
        assert_eq!(stats.by_version["v1.1"].wins, 0);
    }

    #[test]
    fn kelly_summary_from_decided_trades() {
        let mut cfg = config();
        cfg.cooldown_ms = 0;
        let journal = PaperJournal::new(cfg);
        let t0 = Utc::now();

        // Two wins at +2 points, one loss at -1 point (per share).
        for (ticker, price) in [("AAA", 103.0), ("BBB", 103.0), ("CCC", 98.0)] {
            journal.try_open(
                ticker,
                &setup_with_levels(100.0, 99.0, 102.0, 104.0),
                100.0,
                "v1.0",
                true,
                None,
                t0,
            );
            journal.check_outcomes(&prices(ticker, price), t0 + Duration::minutes(10));
        }

        let kelly = journal.kelly_summary();
        assert_eq!(kelly.sample, 3);
        assert!((kelly.win_rate - 2.0 / 3.0).abs() < 1e-9);
        // Wins exit at t1 (+2/share), the loss exits at the stop (-1/share).
        assert!((kelly.payoff_ratio - 2.0).abs() < 1e-9);
        // Kelly = (p(b+1)-1)/b = (2/3*3-1)/2 = 0.5; half = 0.25.
        assert!((kelly.half_kelly - 0.25).abs() < 1e-9);
    }

    #[test]
    fn empty_journal_kelly_is_zeroed() {
        let journal = PaperJournal::new(config());
        let kelly = journal.kelly_summary();
        assert_eq!(kelly.sample, 0);
        assert_eq!(kelly.half_kelly, 0.0);
    }

    #[test]
    fn closed_exit_matches_level_invariant() {
        // Every closed trade's exit equals t1, t2, or stop, unless the
        // status is EXPIRED or an EOD sweep.
        let mut cfg = config();
        cfg.cooldown_ms = 0;
        let journal = PaperJournal::new(cfg);
        let t0 = Utc::now();

        journal.try_open("AAA", &setup_with_levels(100.0, 99.0, 102.0, 104.0), 100.0, "v1.0", true, None, t0);
        journal.try_open("BBB", &setup_with_levels(100.0, 99.0, 102.0, 104.0), 100.0, "v1.0", true, None, t0);

        let mut p = prices("AAA", 103.0);
        p.insert("BBB".into(), 98.5);
        journal.check_outcomes(&p, t0 + Duration::minutes(10));

        for t in journal.all_trades() {
            if !t.status.is_closed() {
                continue;
            }
            let exit = t.exit_price.unwrap();
            let on_level = (exit - t.target1).abs() < 1e-9
                || (exit - t.target2).abs() < 1e-9
                || (exit - t.stop).abs() < 1e-9;
            let eod_or_expired = matches!(
                t.status,
                TradeStatus::WinEod | TradeStatus::LossEod | TradeStatus::Expired
            );
            assert!(on_level || eod_or_expired);
        }
    }
}

