// =============================================================================
// Engine Configuration — Hot-reloadable settings with atomic save
// =============================================================================
//
// Central configuration hub for the Argus aggregator. Every tunable parameter
// lives here so the engine can be reconfigured without a rebuild.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry `#[serde(default)]` so that adding new fields never
// breaks loading an older config file.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_tickers() -> Vec<String> {
    vec![
        "SPY".to_string(),
        "QQQ".to_string(),
        "AAPL".to_string(),
        "NVDA".to_string(),
        "TSLA".to_string(),
        "AMD".to_string(),
        "META".to_string(),
        "AMZN".to_string(),
    ]
}

fn default_daily_limit() -> u32 {
    15_000
}

fn default_safety_margin() -> f64 {
    0.90
}

fn default_warm_every() -> u32 {
    5
}

fn default_cold_every() -> u32 {
    15
}

fn default_max_inflight() -> usize {
    20
}

fn default_call_timeout_secs() -> u64 {
    10
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_scanner_min_confidence() -> u32 {
    40
}

fn default_scanner_max_candidates() -> usize {
    5
}

fn default_scanner_score_per_cycle() -> usize {
    3
}

fn default_scanner_cooldown_ms() -> u64 {
    1_800_000 // 30 minutes
}

fn default_journal_cooldown_ms() -> u64 {
    7_200_000 // 2 hours
}

fn default_journal_max_per_ticker() -> usize {
    3
}

fn default_version_budget() -> f64 {
    25_000.0
}

fn default_account_budget() -> f64 {
    100_000.0
}

// =============================================================================
// ScannerConfig
// =============================================================================

/// Tunables for the market scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Minimum signal confidence for a discovery to surface.
    #[serde(default = "default_scanner_min_confidence")]
    pub min_confidence: u32,

    /// Maximum candidates kept from a single harvest.
    #[serde(default = "default_scanner_max_candidates")]
    pub max_candidates: usize,

    /// How many harvested candidates get the full quick-score per cycle.
    #[serde(default = "default_scanner_score_per_cycle")]
    pub score_per_cycle: usize,

    /// Per-ticker re-alert suppression window.
    #[serde(default = "default_scanner_cooldown_ms")]
    pub cooldown_ms: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_scanner_min_confidence(),
            max_candidates: default_scanner_max_candidates(),
            score_per_cycle: default_scanner_score_per_cycle(),
            cooldown_ms: default_scanner_cooldown_ms(),
        }
    }
}

// =============================================================================
// JournalConfig
// =============================================================================

/// Tunables for the paper-trading journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Minimum time between two trades on the same (ticker, direction,
    /// version) triple.
    #[serde(default = "default_journal_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Maximum simultaneously open trades per ticker within a version bucket.
    #[serde(default = "default_journal_max_per_ticker")]
    pub max_per_ticker: usize,

    /// Exposure cap per signal version (USD notional).
    #[serde(default = "default_version_budget")]
    pub version_budget: f64,

    /// Global exposure cap across all versions (USD notional).
    #[serde(default = "default_account_budget")]
    pub account_budget: f64,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: default_journal_cooldown_ms(),
            max_per_ticker: default_journal_max_per_ticker(),
            version_budget: default_version_budget(),
            account_budget: default_account_budget(),
        }
    }
}

// =============================================================================
// EngineConfig
// =============================================================================

/// Top-level configuration for the Argus engine.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Watchlist tickers (uppercase, 1–5 letters).
    #[serde(default = "default_tickers")]
    pub tickers: Vec<String>,

    // --- API budget ----------------------------------------------------------
    /// Upstream API calls allowed per ET day.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,

    /// Fraction of the daily limit at which non-HOT tiers halt.
    #[serde(default = "default_safety_margin")]
    pub safety_margin: f64,

    // --- Tier wheel ----------------------------------------------------------
    /// Every Nth cycle (that is not COLD) is WARM.
    #[serde(default = "default_warm_every")]
    pub warm_every: u32,

    /// Every Nth cycle is COLD.
    #[serde(default = "default_cold_every")]
    pub cold_every: u32,

    // --- Fan-out -------------------------------------------------------------
    /// Maximum concurrent upstream fetches within one cycle.
    #[serde(default = "default_max_inflight")]
    pub max_inflight: usize,

    /// Per-call timeout in seconds.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    // --- Persistence ---------------------------------------------------------
    /// Directory holding state-cache.json, trade-journal.json, etc.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    // --- Subsystems ----------------------------------------------------------
    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub journal: JournalConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tickers: default_tickers(),
            daily_limit: default_daily_limit(),
            safety_margin: default_safety_margin(),
            warm_every: default_warm_every(),
            cold_every: default_cold_every(),
            max_inflight: default_max_inflight(),
            call_timeout_secs: default_call_timeout_secs(),
            data_dir: default_data_dir(),
            scanner: ScannerConfig::default(),
            journal: JournalConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        info!(
            path = %path.display(),
            tickers = ?config.tickers,
            daily_limit = config.daily_limit,
            "engine config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise engine config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }

    /// Hard ceiling on calls for the current ET day after the safety margin.
    pub fn budget_ceiling(&self) -> u32 {
        (self.daily_limit as f64 * self.safety_margin) as u32
    }
}
