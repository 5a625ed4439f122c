// =============================================================================
// Session Scheduler & Budget Governor
// =============================================================================
//
// The current session is a function of wall-clock time in America/New_York
// only. Weekends and recognised market holidays degrade to OVERNIGHT.
//
//   Session       ET window      Cadence
//   OVERNIGHT     17:01-08:29    60 min
//   PRE_MARKET    08:30-09:00    10 min
//   OPEN_RUSH     09:01-09:20     5 min
//   POWER_OPEN    09:21-10:00     1 min
//   MIDDAY        10:01-15:00    10 min
//   POWER_HOUR    15:01-16:15     5 min
//   AFTER_HOURS   16:16-17:00    10 min
//
// The tier wheel derives each cycle's fetch tier from a monotonic counter:
// every `cold_every`-th cycle is COLD, every `warm_every`-th remaining cycle
// is WARM, otherwise HOT.
//
// The budget governor counts successful upstream calls per ET day against a
// configured limit with a safety margin; the counter rolls over exactly once
// when the ET date changes, and the rollover is idempotent across restarts.
// =============================================================================

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::America::New_York;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::Tier;

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Clock-based market phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Session {
    Overnight,
    PreMarket,
    OpenRush,
    PowerOpen,
    Midday,
    PowerHour,
    AfterHours,
}

impl std::fmt::Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Overnight => write!(f, "OVERNIGHT"),
            Self::PreMarket => write!(f, "PRE_MARKET"),
            Self::OpenRush => write!(f, "OPEN_RUSH"),
            Self::PowerOpen => write!(f, "POWER_OPEN"),
            Self::Midday => write!(f, "MIDDAY"),
            Self::PowerHour => write!(f, "POWER_HOUR"),
            Self::AfterHours => write!(f, "AFTER_HOURS"),
        }
    }
}

impl Session {
    /// Base polling cadence for this session.
    pub fn cadence(&self) -> Duration {
        match self {
            Self::Overnight => Duration::from_secs(60 * 60),
            Self::PreMarket => Duration::from_secs(10 * 60),
            Self::OpenRush => Duration::from_secs(5 * 60),
            Self::PowerOpen => Duration::from_secs(60),
            Self::Midday => Duration::from_secs(10 * 60),
            Self::PowerHour => Duration::from_secs(5 * 60),
            Self::AfterHours => Duration::from_secs(10 * 60),
        }
    }
}

/// NYSE full-day closures. Extend each December when the next year's
/// calendar is published.
const MARKET_HOLIDAYS: &[&str] = &[
    "2025-01-01", "2025-01-20", "2025-02-17", "2025-04-18", "2025-05-26",
    "2025-06-19", "2025-07-04", "2025-09-01", "2025-11-27", "2025-12-25",
    "2026-01-01", "2026-01-19", "2026-02-16", "2026-04-03", "2026-05-25",
    "2026-06-19", "2026-07-03", "2026-09-07", "2026-11-26", "2026-12-25",
];

/// The ET calendar date for `now`, formatted `YYYY-MM-DD`.
pub fn est_date(now: DateTime<Utc>) -> String {
    now.with_timezone(&New_York).format("%Y-%m-%d").to_string()
}

fn is_weekend(now: DateTime<Utc>) -> bool {
    matches!(
        now.with_timezone(&New_York).weekday(),
        Weekday::Sat | Weekday::Sun
    )
}

fn is_holiday(now: DateTime<Utc>) -> bool {
    let date = est_date(now);
    MARKET_HOLIDAYS.contains(&date.as_str())
}

/// Current session for the given instant. Weekends and holidays are
/// OVERNIGHT regardless of the clock.
pub fn session_at(now: DateTime<Utc>) -> Session {
    if is_weekend(now) || is_holiday(now) {
        return Session::Overnight;
    }

    let local = now.with_timezone(&New_York);
    let minutes = local.hour() * 60 + local.minute();

    match minutes {
        510..=540 => Session::PreMarket,  // 08:30-09:00
        541..=560 => Session::OpenRush,   // 09:01-09:20
        561..=600 => Session::PowerOpen,  // 09:21-10:00
        601..=900 => Session::Midday,     // 10:01-15:00
        901..=975 => Session::PowerHour,  // 15:01-16:15
        976..=1020 => Session::AfterHours, // 16:16-17:00
        _ => Session::Overnight,
    }
}

/// True only on weekdays during PRE_MARKET through AFTER_HOURS. The paper
/// journal gates admission on this.
pub fn is_trading_session(now: DateTime<Utc>) -> bool {
    session_at(now) != Session::Overnight
}

/// True during the end-of-day close window (16:00-16:05 ET on a weekday).
pub fn is_eod_window(now: DateTime<Utc>) -> bool {
    if is_weekend(now) || is_holiday(now) {
        return false;
    }
    let local = now.with_timezone(&New_York);
    let minutes = local.hour() * 60 + local.minute();
    (960..=965).contains(&minutes)
}

// ---------------------------------------------------------------------------
// Tier wheel
// ---------------------------------------------------------------------------

/// Derives each cycle's tier from a monotonic counter.
pub struct TierWheel {
    cycle_count: AtomicU64,
    warm_every: u64,
    cold_every: u64,
}

impl TierWheel {
    pub fn new(warm_every: u32, cold_every: u32) -> Self {
        Self {
            cycle_count: AtomicU64::new(0),
            warm_every: warm_every.max(1) as u64,
            cold_every: cold_every.max(1) as u64,
        }
    }

    /// Advance the counter and return the tier of the new cycle.
    pub fn next_tier(&self) -> Tier {
        let count = self.cycle_count.fetch_add(1, Ordering::SeqCst) + 1;
        if count % self.cold_every == 0 {
            Tier::Cold
        } else if count % self.warm_every == 0 {
            Tier::Warm
        } else {
            Tier::Hot
        }
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count.load(Ordering::SeqCst)
    }

    /// Restore the counter from a persisted snapshot.
    pub fn restore(&self, count: u64) {
        self.cycle_count.store(count, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Budget governor
// ---------------------------------------------------------------------------

/// Persisted scheduler counters (written into `state-cache.json`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchedulerCounters {
    pub daily_call_count: u32,
    pub cycle_count: u64,
    pub last_reset_date: String,
}

/// Per-ET-day API-call counter with a safety margin.
pub struct BudgetGovernor {
    daily_call_count: AtomicU32,
    last_reset_date: RwLock<String>,
    daily_limit: u32,
    safety_margin: f64,
}

impl BudgetGovernor {
    pub fn new(daily_limit: u32, safety_margin: f64, now: DateTime<Utc>) -> Self {
        Self {
            daily_call_count: AtomicU32::new(0),
            last_reset_date: RwLock::new(est_date(now)),
            daily_limit,
            safety_margin: safety_margin.clamp(0.0, 1.0),
        }
    }

    /// Record `n` successful upstream calls.
    pub fn record_calls(&self, n: u32) {
        self.daily_call_count.fetch_add(n, Ordering::SeqCst);
    }

    pub fn used_today(&self) -> u32 {
        self.daily_call_count.load(Ordering::SeqCst)
    }

    /// Hard ceiling after the safety margin.
    pub fn ceiling(&self) -> u32 {
        (self.daily_limit as f64 * self.safety_margin) as u32
    }

    /// False once used calls reach `limit * margin`. The orchestrator then
    /// downgrades every cycle to HOT-only and sheds optional endpoints.
    pub fn is_within_budget(&self) -> bool {
        self.used_today() < self.ceiling()
    }

    /// Reset the counter when the ET date has changed. Idempotent: calling
    /// this any number of times within the same ET day does nothing, so a
    /// restart cannot double-reset.
    pub fn maybe_rollover(&self, now: DateTime<Utc>) {
        let today = est_date(now);
        let mut last = self.last_reset_date.write();
        if *last != today {
            let spent = self.daily_call_count.swap(0, Ordering::SeqCst);
            info!(
                previous_date = %*last,
                new_date = %today,
                calls_spent = spent,
                "daily call counter rolled over"
            );
            *last = today;
        }
    }

    /// Counters for persistence. `cycle_count` is filled in by the caller.
    pub fn counters(&self, cycle_count: u64) -> SchedulerCounters {
        SchedulerCounters {
            daily_call_count: self.used_today(),
            cycle_count,
            last_reset_date: self.last_reset_date.read().clone(),
        }
    }

    /// Restore from persisted counters. Counts carry over only when the
    /// saved ET date is still today; otherwise they are zeroed.
    pub fn restore(&self, counters: &SchedulerCounters, now: DateTime<Utc>) {
        let today = est_date(now);
        if counters.last_reset_date == today {
            self.daily_call_count
                .store(counters.daily_call_count, Ordering::SeqCst);
            *self.last_reset_date.write() = counters.last_reset_date.clone();
            info!(
                calls = counters.daily_call_count,
                "restored daily call counter for today"
            );
        } else {
            self.daily_call_count.store(0, Ordering::SeqCst);
            *self.last_reset_date.write() = today;
            warn!(
                saved_date = %counters.last_reset_date,
                "saved counters are from a previous ET day — starting fresh"
            );
        }
    }
}

impl std::fmt::Debug for BudgetGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetGovernor")
            .field("used_today", &self.used_today())
            .field("ceiling", &self.ceiling())
            .finish()
    }
}
