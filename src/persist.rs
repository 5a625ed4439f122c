// =============================================================================
// Persistence — best-effort snapshot/restore of engine state
// =============================================================================
//
// Four files under the data directory, all pretty JSON written atomically
// (tmp + rename):
//
//   state-cache.json     { savedAt, dailyCallCount, cycleCount,
//                          lastResetDate, state }
//   trade-journal.json   { trades, stats }
//   signal-versions.json { activeVersion }
//   earnings-cache.json  { lastUpdated, entries } with a 6-hour TTL
//
// Persistence failures are logged and the engine continues in memory; the
// next cycle retries. A corrupted journal is fatal so the host restarts us.
// =============================================================================

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{info, warn};

use crate::journal::JournalFile;
use crate::scheduler::SchedulerCounters;
use crate::store::StoreSnapshot;

/// Earnings-cache entries older than this are refetched.
const EARNINGS_TTL_HOURS: i64 = 6;

// ---------------------------------------------------------------------------
// File layouts
// ---------------------------------------------------------------------------

/// `state-cache.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateCacheFile {
    pub saved_at: DateTime<Utc>,
    pub daily_call_count: u32,
    pub cycle_count: u64,
    pub last_reset_date: String,
    pub state: StoreSnapshot,
}

/// `signal-versions.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalVersionsFile {
    pub active_version: String,
}

impl Default for SignalVersionsFile {
    fn default() -> Self {
        Self {
            active_version: "v1.0".to_string(),
        }
    }
}

/// One cached earnings lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningsEntry {
    pub next_earnings: Option<String>,
    pub days_until: Option<i64>,
    pub fetched_at: DateTime<Utc>,
}

impl EarningsEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now - self.fetched_at < Duration::hours(EARNINGS_TTL_HOURS)
    }
}

/// `earnings-cache.json`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EarningsCacheFile {
    pub last_updated: Option<DateTime<Utc>>,
    pub entries: HashMap<String, EarningsEntry>,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Handle over the data directory.
pub struct PersistStore {
    dir: PathBuf,
}

impl PersistStore {
    /// Open (and create if needed) the data directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create data dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    // ── state-cache.json ────────────────────────────────────────────────

    pub fn save_state_cache(&self, counters: &SchedulerCounters, state: StoreSnapshot) -> Result<()> {
        let file = StateCacheFile {
            saved_at: Utc::now(),
            daily_call_count: counters.daily_call_count,
            cycle_count: counters.cycle_count,
            last_reset_date: counters.last_reset_date.clone(),
            state,
        };
        write_json(&self.path("state-cache.json"), &file)
    }

    pub fn load_state_cache(&self) -> Option<StateCacheFile> {
        read_json(&self.path("state-cache.json"))
    }

    // ── trade-journal.json ──────────────────────────────────────────────

    pub fn save_journal(&self, file: &JournalFile) -> Result<()> {
        write_json(&self.path("trade-journal.json"), file)
    }

    /// Load the journal. A missing file is a fresh start; an unparseable
    /// file is fatal so the host restarts us rather than silently dropping
    /// trade history.
    pub fn load_journal(&self) -> Result<Option<JournalFile>> {
        let path = self.path("trade-journal.json");
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file: JournalFile = serde_json::from_str(&content)
            .with_context(|| format!("corrupted trade journal at {}", path.display()))?;
        Ok(Some(file))
    }

    // ── signal-versions.json ────────────────────────────────────────────

    pub fn load_signal_versions(&self) -> SignalVersionsFile {
        read_json(&self.path("signal-versions.json")).unwrap_or_default()
    }

    pub fn save_signal_versions(&self, file: &SignalVersionsFile) -> Result<()> {
        write_json(&self.path("signal-versions.json"), file)
    }

    // ── earnings-cache.json ─────────────────────────────────────────────

    pub fn load_earnings_cache(&self) -> EarningsCacheFile {
        read_json(&self.path("earnings-cache.json")).unwrap_or_default()
    }

    pub fn save_earnings_cache(&self, cache: &EarningsCacheFile) -> Result<()> {
        write_json(&self.path("earnings-cache.json"), cache)
    }
}

impl std::fmt::Debug for PersistStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistStore").field("dir", &self.dir).finish()
    }
}

// ---------------------------------------------------------------------------
// Atomic JSON helpers
// ---------------------------------------------------------------------------

/// Write pretty JSON atomically: tmp sibling, then rename.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialise {}", path.display()))?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &content)
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("failed to rename into {}", path.display()))?;

    info!(path = %path.display(), "persisted (atomic)");
    Ok(())
}

/// Read JSON, returning `None` (with one log line) on any failure.
fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            if path.exists() {
                warn!(path = %path.display(), error = %e, "failed to read persisted file");
            }
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to parse persisted file");
            None
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(tag: &str) -> PersistStore {
        let dir = std::env::temp_dir().join(format!("argus-persist-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        PersistStore::new(dir).unwrap()
    }

    #[test]
    fn state_cache_roundtrip() {
        let store = temp_store("state");
        let counters = SchedulerCounters {
            daily_call_count: 321,
            cycle_count: 17,
            last_reset_date: "2026-08-01".into(),
        };

        store.save_state_cache(&counters, StoreSnapshot::default()).unwrap();
        let loaded = store.load_state_cache().unwrap();
        assert_eq!(loaded.daily_call_count, 321);
        assert_eq!(loaded.cycle_count, 17);
        assert_eq!(loaded.last_reset_date, "2026-08-01");
    }

    #[test]
    fn missing_state_cache_is_none() {
        let store = temp_store("missing");
        assert!(store.load_state_cache().is_none());
    }

    #[test]
    fn journal_roundtrip_and_corruption_is_fatal() {
        let store = temp_store("journal");

        assert!(store.load_journal().unwrap().is_none());

        store.save_journal(&JournalFile::default()).unwrap();
        assert!(store.load_journal().unwrap().is_some());

        // Corrupt the file: load must error, not silently reset.
        std::fs::write(store.path("trade-journal.json"), "{broken").unwrap();
        assert!(store.load_journal().is_err());
    }

    #[test]
    fn signal_versions_default() {
        let store = temp_store("versions");
        assert_eq!(store.load_signal_versions().active_version, "v1.0");

        store
            .save_signal_versions(&SignalVersionsFile {
                active_version: "v2.3".into(),
            })
            .unwrap();
        assert_eq!(store.load_signal_versions().active_version, "v2.3");
    }

    #[test]
    fn earnings_ttl() {
        let now = Utc::now();
        let fresh = EarningsEntry {
            next_earnings: Some("2026-08-20".into()),
            days_until: Some(19),
            fetched_at: now - Duration::hours(2),
        };
        let stale = EarningsEntry {
            next_earnings: None,
            days_until: None,
            fetched_at: now - Duration::hours(7),
        };
        assert!(fresh.is_fresh(now));
        assert!(!stale.is_fresh(now));
    }

    #[test]
    fn no_tmp_file_left_behind() {
        let store = temp_store("tmp");
        store.save_signal_versions(&SignalVersionsFile::default()).unwrap();
        assert!(!store.path("signal-versions.json.tmp").exists());
        assert!(store.path("signal-versions.json").exists());
    }
}
