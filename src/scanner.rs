// =============================================================================
// Market Scanner — cross-feed harvest of off-watchlist candidates
// =============================================================================
//
// The harvest pass walks every market-wide feed and accumulates a weighted
// count per ticker:
//
//   options flow    sweep +2, other prints +1
//                   premium > $500k +1, > $1M +2 (on top)
//   dark pool       print +1, notional > $5M +3
//   net impact      presence +1
//   insider/congress filings +1
//   news            +0.5 per headline
//   gainers/losers  |%change| / 2
//
// Watchlist members and a fixed index/ETF deny-list never surface. The top
// candidates are quick-scored through the reduced signal pipeline by the
// orchestrator; a per-ticker cooldown suppresses re-alerting, and results
// below the confidence threshold are dropped.
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ScannerConfig;
use crate::store::{CongressTrade, DarkPoolPrint, ExecutionKind, FlowItem, NetImpactRow, NewsItem};
use crate::types::Bias;

/// Index products and broad ETFs that the scanner never surfaces.
const DENY_LIST: &[&str] = &[
    "SPY", "QQQ", "IWM", "DIA", "VIX", "VXX", "UVXY", "SVXY", "SQQQ", "TQQQ",
    "SPXU", "UPRO", "XLF", "XLE", "XLK", "XLV", "XLU", "XLI", "XLP", "XLY",
    "GLD", "SLV", "TLT", "HYG", "LQD", "EEM", "EFA", "ARKK",
];

// ---------------------------------------------------------------------------
// Inputs & outputs
// ---------------------------------------------------------------------------

/// Everything the harvest pass reads. All fields may be empty.
#[derive(Debug, Clone, Default)]
pub struct HarvestInput {
    pub flow_alerts: Vec<FlowItem>,
    pub dark_pool: Vec<DarkPoolPrint>,
    pub net_impact: Vec<NetImpactRow>,
    pub congress: Vec<CongressTrade>,
    pub news: Vec<NewsItem>,
    /// (ticker, session % change) from the tick vendor's gainers/losers.
    pub movers: Vec<(String, f64)>,
}

/// A harvested candidate awaiting quick-scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub ticker: String,
    pub score: f64,
    pub sources: Vec<String>,
}

/// A scored scanner result surfaced to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discovery {
    pub ticker: String,
    /// Harvest score that put the ticker on the candidate list.
    pub score: f64,
    /// Confidence from the reduced signal pipeline, 0..100.
    pub confidence: u32,
    pub direction: Bias,
    pub sources: Vec<String>,
    pub discovered_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Harvest
// ---------------------------------------------------------------------------

/// Harvest candidates from the market-wide feeds.
///
/// An empty input yields an empty list. Results are sorted by descending
/// score and truncated to `max_candidates`.
pub fn harvest(input: &HarvestInput, watchlist: &[String], max_candidates: usize) -> Vec<Candidate> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut sources: HashMap<String, Vec<String>> = HashMap::new();

    let mut bump = |ticker: &str, amount: f64, source: &str| {
        let t = ticker.to_uppercase();
        if !is_valid_ticker(&t) {
            return;
        }
        *scores.entry(t.clone()).or_insert(0.0) += amount;
        let srcs = sources.entry(t).or_default();
        if !srcs.iter().any(|s| s == source) {
            srcs.push(source.to_string());
        }
    };

    for item in &input.flow_alerts {
        let mut w = if item.execution == ExecutionKind::Sweep { 2.0 } else { 1.0 };
        if item.premium > 1_000_000.0 {
            w += 2.0;
        } else if item.premium > 500_000.0 {
            w += 1.0;
        }
        bump(&item.ticker, w, "flow");
    }

    for print in &input.dark_pool {
        let w = if print.premium > 5_000_000.0 { 4.0 } else { 1.0 };
        bump(&print.ticker, w, "darkpool");
    }

    for row in &input.net_impact {
        bump(&row.ticker, 1.0, "net_impact");
    }

    for filing in &input.congress {
        bump(&filing.ticker, 1.0, "insider");
    }

    for news in &input.news {
        for ticker in &news.tickers {
            bump(ticker, 0.5, "news");
        }
    }

    for (ticker, pct) in &input.movers {
        bump(ticker, pct.abs() / 2.0, "movers");
    }

    let mut candidates: Vec<Candidate> = scores
        .into_iter()
        .filter(|(ticker, _)| {
            !DENY_LIST.contains(&ticker.as_str()) && !watchlist.iter().any(|w| w == ticker)
        })
        .map(|(ticker, score)| {
            let srcs = sources.remove(&ticker).unwrap_or_default();
            Candidate {
                ticker,
                score,
                sources: srcs,
            }
        })
        .collect();

    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    candidates.truncate(max_candidates);
    candidates
}

/// Uppercase, 1-5 letters A-Z.
fn is_valid_ticker(ticker: &str) -> bool {
    !ticker.is_empty() && ticker.len() <= 5 && ticker.chars().all(|c| c.is_ascii_uppercase())
}

// ---------------------------------------------------------------------------
// Cooldown gate
// ---------------------------------------------------------------------------

/// Per-ticker re-alert suppression for the scanner.
pub struct MarketScanner {
    cooldowns: RwLock<HashMap<String, DateTime<Utc>>>,
    pub config: ScannerConfig,
}

impl MarketScanner {
    pub fn new(config: ScannerConfig) -> Self {
        Self {
            cooldowns: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Whether a candidate may be quick-scored this cycle.
    pub fn eligible(&self, ticker: &str, now: DateTime<Utc>) -> bool {
        let window = Duration::milliseconds(self.config.cooldown_ms as i64);
        !self
            .cooldowns
            .read()
            .get(ticker)
            .is_some_and(|last| now - *last < window)
    }

    /// Record that a candidate was scored (starts its cooldown).
    pub fn note_scored(&self, ticker: &str, now: DateTime<Utc>) {
        self.cooldowns.write().insert(ticker.to_string(), now);
    }

    /// Keep only the top candidates that pass the cooldown gate, up to the
    /// per-cycle scoring allowance.
    pub fn select_for_scoring(&self, candidates: Vec<Candidate>, now: DateTime<Utc>) -> Vec<Candidate> {
        let selected: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| self.eligible(&c.ticker, now))
            .take(self.config.score_per_cycle)
            .collect();
        debug!(count = selected.len(), "scanner candidates selected for scoring");
        selected
    }

    /// Convert a quick-score result into a Discovery if it clears the
    /// confidence threshold.
    pub fn accept(
        &self,
        candidate: &Candidate,
        direction: Bias,
        confidence: f64,
        now: DateTime<Utc>,
    ) -> Option<Discovery> {
        self.note_scored(&candidate.ticker, now);

        let confidence = confidence.clamp(0.0, 95.0).round() as u32;
        if confidence < self.config.min_confidence {
            return None;
        }

        Some(Discovery {
            ticker: candidate.ticker.clone(),
            score: candidate.score,
            confidence,
            direction,
            sources: candidate.sources.clone(),
            discovered_at: now,
        })
    }

    /// Drop cooldown entries older than the window.
    pub fn prune(&self, now: DateTime<Utc>) {
        let window = Duration::milliseconds(self.config.cooldown_ms as i64);
        self.cooldowns.write().retain(|_, last| now - *last < window);
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ContractType;

    fn sweep(ticker: &str, premium: f64) -> FlowItem {
        FlowItem {
            ticker: ticker.into(),
            contract: ContractType::Call,
            strike: 100.0,
            expiry: "2026-08-21".into(),
            premium,
            execution: ExecutionKind::Sweep,
            executed_at: Utc::now(),
            direction: Bias::Bullish,
        }
    }

    fn dp(ticker: &str, premium: f64) -> DarkPoolPrint {
        DarkPoolPrint {
            ticker: ticker.into(),
            price: 50.0,
            size: 100_000.0,
            premium,
            executed_at: Utc::now(),
            direction: Bias::Neutral,
        }
    }

    #[test]
    fn empty_input_empty_harvest() {
        let out = harvest(&HarvestInput::default(), &[], 5);
        assert!(out.is_empty());
    }

    #[test]
    fn weights_accumulate_across_feeds() {
        let input = HarvestInput {
            // Sweep (+2) over $1M (+2) => 4.
            flow_alerts: vec![sweep("GME", 1_500_000.0)],
            // $6M dark pool => 4.
            dark_pool: vec![dp("GME", 6_000_000.0)],
            news: vec![NewsItem {
                headline: "GME squeeze chatter".into(),
                source: "wire".into(),
                tickers: vec!["GME".into()],
                published_at: Utc::now(),
            }],
            ..Default::default()
        };

        let out = harvest(&input, &[], 5);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].ticker, "GME");
        assert!((out[0].score - 8.5).abs() < 1e-9);
        assert!(out[0].sources.contains(&"flow".to_string()));
        assert!(out[0].sources.contains(&"darkpool".to_string()));
        assert!(out[0].sources.contains(&"news".to_string()));
    }

    #[test]
    fn watchlist_and_denylist_excluded() {
        let input = HarvestInput {
            flow_alerts: vec![
                sweep("SPY", 2_000_000.0),  // deny-list
                sweep("AAPL", 2_000_000.0), // watchlist
                sweep("GME", 2_000_000.0),  // eligible
            ],
            ..Default::default()
        };
        let out = harvest(&input, &["AAPL".to_string()], 5);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].ticker, "GME");
    }

    #[test]
    fn candidates_sorted_and_truncated() {
        let input = HarvestInput {
            flow_alerts: vec![
                sweep("AAA", 100_000.0),
                sweep("BBB", 600_000.0),
                sweep("CCC", 1_500_000.0),
            ],
            ..Default::default()
        };
        let out = harvest(&input, &[], 2);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].ticker, "CCC");
        assert_eq!(out[1].ticker, "BBB");
    }

    #[test]
    fn movers_weighted_by_change() {
        let input = HarvestInput {
            movers: vec![("XYZ".into(), -8.0), ("ABC".into(), 2.0)],
            ..Default::default()
        };
        let out = harvest(&input, &[], 5);
        assert_eq!(out[0].ticker, "XYZ");
        assert!((out[0].score - 4.0).abs() < 1e-9);
    }

    #[test]
    fn malformed_tickers_dropped() {
        let input = HarvestInput {
            movers: vec![("TOOLONG".into(), 5.0), ("ok".into(), 5.0), ("FINE".into(), 5.0)],
            ..Default::default()
        };
        let out = harvest(&input, &[], 5);
        assert_eq!(out.len(), 2); // "ok" uppercased to OK is valid; TOOLONG dropped
        assert!(out.iter().any(|c| c.ticker == "FINE"));
        assert!(out.iter().any(|c| c.ticker == "OK"));
    }

    #[test]
    fn cooldown_gates_scoring() {
        let scanner = MarketScanner::new(ScannerConfig::default());
        let now = Utc::now();

        assert!(scanner.eligible("GME", now));
        scanner.note_scored("GME", now);
        assert!(!scanner.eligible("GME", now + Duration::minutes(10)));
        assert!(scanner.eligible("GME", now + Duration::minutes(31)));
    }

    #[test]
    fn accept_honours_confidence_threshold() {
        let scanner = MarketScanner::new(ScannerConfig::default());
        let now = Utc::now();
        let cand = Candidate {
            ticker: "GME".into(),
            score: 6.0,
            sources: vec!["flow".into()],
        };

        assert!(scanner.accept(&cand, Bias::Bullish, 39.0, now).is_none());
        // Even a rejection starts the cooldown (it was scored).
        assert!(!scanner.eligible("GME", now));

        let cand2 = Candidate {
            ticker: "AMC".into(),
            score: 4.0,
            sources: vec![],
        };
        let disc = scanner.accept(&cand2, Bias::Bearish, 62.0, now).unwrap();
        assert_eq!(disc.confidence, 62);
        assert_eq!(disc.direction, Bias::Bearish);
    }

    #[test]
    fn select_respects_per_cycle_allowance() {
        let scanner = MarketScanner::new(ScannerConfig::default());
        let now = Utc::now();
        let candidates: Vec<Candidate> = (0..6)
            .map(|i| Candidate {
                ticker: format!("TK{i}"),
                score: 6.0 - i as f64,
                sources: vec![],
            })
            .collect();
        let selected = scanner.select_for_scoring(candidates, now);
        assert_eq!(selected.len(), ScannerConfig::default().score_per_cycle);
    }
}
