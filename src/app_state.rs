// =============================================================================
// Central Application State — Argus Intelligence Engine
// =============================================================================
//
// The single source of truth for the engine. Subsystems own their interior
// mutability; AppState ties them together and builds the unified snapshot
// pushed over the WebSocket feed and the REST API.
//
// Thread safety:
//   - Atomic counters for lock-free version tracking.
//   - parking_lot::RwLock for mutable shared collections.
//   - Arc wrappers for subsystem engines.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::alerts::{Alert, AlertEngine};
use crate::config::EngineConfig;
use crate::clients::tick_ws::TickSummaryCache;
use crate::journal::{JournalStats, KellySummary, PaperJournal, PaperTrade};
use crate::persist::PersistStore;
use crate::scanner::MarketScanner;
use crate::scheduler::{BudgetGovernor, SchedulerCounters, Session, TierWheel};
use crate::signal::SignalEngine;
use crate::store::{MarketStore, StoreSnapshot};

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

/// A recorded error event for the operational log.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    pub at: String,
}

/// Central application state shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    // ── Version tracking ────────────────────────────────────────────────
    /// Monotonically increasing version counter. Incremented after every
    /// cycle and on any mutation clients care about; the WebSocket feed
    /// uses it to detect changes.
    pub state_version: AtomicU64,

    /// WebSocket message sequence number.
    pub ws_sequence_number: AtomicU64,

    // ── Configuration ───────────────────────────────────────────────────
    pub config: Arc<RwLock<EngineConfig>>,

    // ── Subsystems ──────────────────────────────────────────────────────
    pub store: Arc<MarketStore>,
    pub journal: Arc<PaperJournal>,
    pub tier_wheel: Arc<TierWheel>,
    pub governor: Arc<BudgetGovernor>,
    pub alert_engine: Arc<AlertEngine>,
    pub scanner: Arc<MarketScanner>,
    pub signal_engine: Arc<SignalEngine>,
    pub tick_cache: Arc<TickSummaryCache>,
    pub persist: Arc<PersistStore>,

    // ── Live watchlist shared with the WebSocket clients ────────────────
    pub ws_tickers: Arc<RwLock<Vec<String>>>,

    // ── Alert fan-out to connected WebSocket clients ────────────────────
    pub alert_tx: tokio::sync::broadcast::Sender<Alert>,

    // ── A/B bucket tag stamped on new paper trades ──────────────────────
    pub active_version: RwLock<String>,

    // ── Operational status ──────────────────────────────────────────────
    pub recent_errors: RwLock<Vec<ErrorRecord>>,
    pub last_cycle_ms: RwLock<Option<u64>>,
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Wire every subsystem from the configuration. The returned value is
    /// wrapped in `Arc` immediately by the caller.
    pub fn new(config: EngineConfig, persist: PersistStore, active_version: String) -> Self {
        let now = Utc::now();
        let tickers = config.tickers.clone();

        let tier_wheel = TierWheel::new(config.warm_every, config.cold_every);
        let governor = BudgetGovernor::new(config.daily_limit, config.safety_margin, now);
        let journal = PaperJournal::new(config.journal.clone());
        let scanner = MarketScanner::new(config.scanner.clone());

        Self {
            state_version: AtomicU64::new(1),
            ws_sequence_number: AtomicU64::new(0),
            config: Arc::new(RwLock::new(config)),
            store: Arc::new(MarketStore::new(tickers.clone())),
            journal: Arc::new(journal),
            tier_wheel: Arc::new(tier_wheel),
            governor: Arc::new(governor),
            alert_engine: Arc::new(AlertEngine::new()),
            scanner: Arc::new(scanner),
            signal_engine: Arc::new(SignalEngine::new()),
            tick_cache: Arc::new(TickSummaryCache::new()),
            persist: Arc::new(persist),
            ws_tickers: Arc::new(RwLock::new(tickers)),
            alert_tx: tokio::sync::broadcast::channel(64).0,
            active_version: RwLock::new(active_version),
            recent_errors: RwLock::new(Vec::new()),
            last_cycle_ms: RwLock::new(None),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Error logging ───────────────────────────────────────────────────

    /// Record an error message. Bounded at [`MAX_RECENT_ERRORS`].
    pub fn push_error(&self, msg: String) {
        let mut errors = self.recent_errors.write();
        errors.push(ErrorRecord {
            message: msg,
            at: Utc::now().to_rfc3339(),
        });
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
        self.increment_version();
    }

    // ── Persisted counters ──────────────────────────────────────────────

    pub fn scheduler_counters(&self) -> SchedulerCounters {
        self.governor.counters(self.tier_wheel.cycle_count())
    }

    // ── Snapshot builder ────────────────────────────────────────────────

    /// Build the complete serialisable snapshot. This is the `full_state`
    /// payload for both `GET /api/v1/state` and the WebSocket push feed.
    pub fn build_snapshot(&self) -> EngineSnapshot {
        let now = Utc::now();

        // Market-level sentiment from the tide: net call premium share.
        let market_sentiment = {
            let tide = self.store.market_tide();
            let total = tide.net_call_premium.abs() + tide.net_put_premium.abs();
            if total > 0.0 {
                Some((tide.net_call_premium - tide.net_put_premium) / total)
            } else {
                None
            }
        };

        EngineSnapshot {
            state_version: self.current_state_version(),
            server_time: now.timestamp_millis(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            session: self.store.session(),
            budget: BudgetSnapshot {
                used_today: self.governor.used_today(),
                ceiling: self.governor.ceiling(),
                within_budget: self.governor.is_within_budget(),
            },
            cycle: CycleSnapshot {
                cycle_count: self.tier_wheel.cycle_count(),
                last_cycle_ms: *self.last_cycle_ms.read(),
            },
            active_version: self.active_version.read().clone(),
            market_sentiment,
            kelly: self.journal.kelly_summary(),
            state: self.store.snapshot(),
            open_trades: self.journal.open_trades(),
            journal_stats: self.journal.stats(),
            recent_errors: self.recent_errors.read().clone(),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("state_version", &self.current_state_version())
            .field("store", &self.store)
            .finish()
    }
}

// =============================================================================
// Serialisable snapshot types
// =============================================================================

/// Full engine snapshot sent to clients.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub state_version: u64,
    pub server_time: i64,
    pub uptime_secs: u64,
    pub session: Option<Session>,
    pub budget: BudgetSnapshot,
    pub cycle: CycleSnapshot,
    pub active_version: String,
    /// Net call-premium share of the market tide, in [-1, +1].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_sentiment: Option<f64>,
    pub kelly: KellySummary,
    pub state: StoreSnapshot,
    pub open_trades: Vec<PaperTrade>,
    pub journal_stats: JournalStats,
    pub recent_errors: Vec<ErrorRecord>,
}

/// Budget governor telemetry.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetSnapshot {
    pub used_today: u32,
    pub ceiling: u32,
    pub within_budget: bool,
}

/// Cycle telemetry.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSnapshot {
    pub cycle_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle_ms: Option<u64>,
}
