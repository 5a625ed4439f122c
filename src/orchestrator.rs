// =============================================================================
// Polling Orchestrator — drives one fetch/analyze/act cycle
// =============================================================================
//
// One cycle, in the order the store's readers rely on:
//   1. Roll the daily budget, pick the session and tier (budget exhaustion
//      forces HOT-only).
//   2. Market-wide fetches.
//   3. Per-ticker fan-out, bounded by a semaphore; each call carries the
//      client's 10 s timeout.
//   4. Technicals for every ticker that returned bars.
//   5. Market-regime classification, then signal fusion per ticker; setups
//      feed the paper journal through its admission gates.
//   6. Alert evaluation into the bounded ring.
//   7. Journal re-mark and outcome checks; the 16:00 ET sweep once per day.
//   8. State snapshot to disk; bump the state version for the push feed.
//
// Failure policy: every per-call failure is swallowed with one structured
// log line; the cycle always completes. The whole cycle runs under a
// deadline of 80% of the session cadence; whatever misses it is dropped.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::app_state::AppState;
use crate::clients::{FlowClient, TickClient};
use crate::journal::Admission;
use crate::persist::{EarningsCacheFile, EarningsEntry};
use crate::scanner::{self, HarvestInput};
use crate::scheduler::{self, est_date, Session};
use crate::signal::features::FeatureContext;
use crate::signal::{classify_regime, score_squeeze};
use crate::store::{NewsItem, WarmStats};
use crate::types::{Bias, Tier};

/// Minimum signal confidence before a setup is handed to the journal.
const OPEN_CONFIDENCE_MIN: f64 = 60.0;
/// Fraction of the cadence a cycle may spend before overdue work is dropped.
const CYCLE_DEADLINE_FRACTION: f64 = 0.8;
/// Daily bars requested for the technical analyzer.
const OHLC_LOOKBACK_BARS: usize = 120;
/// Scanner runs on cycles where `count % SCAN_PHASE_MODULO == SCAN_PHASE`.
const SCAN_PHASE_MODULO: u64 = 3;
const SCAN_PHASE: u64 = 1;
/// Pause between scanner quick-scores.
const SCAN_SPACING: Duration = Duration::from_secs(2);

/// The cycle driver. One instance lives for the process lifetime.
pub struct Orchestrator {
    state: Arc<AppState>,
    flow: Arc<FlowClient>,
    tick: Arc<TickClient>,
    /// ET date of the last end-of-day sweep, so it fires once per day.
    last_eod_date: RwLock<String>,
    earnings_cache: Mutex<EarningsCacheFile>,
    /// Latest volatility spike reading (VIX proxy) for the regime classifier.
    latest_spike: Mutex<Option<f64>>,
}

impl Orchestrator {
    pub fn new(state: Arc<AppState>, flow: Arc<FlowClient>, tick: Arc<TickClient>) -> Self {
        let earnings_cache = state.persist.load_earnings_cache();
        Self {
            state,
            flow,
            tick,
            last_eod_date: RwLock::new(String::new()),
            earnings_cache: Mutex::new(earnings_cache),
            latest_spike: Mutex::new(None),
        }
    }

    /// Main loop: run cycles forever at the session cadence. Spawn as a task.
    pub async fn run(self: Arc<Self>) {
        info!("polling orchestrator started");

        loop {
            let now = Utc::now();
            let session = scheduler::session_at(now);
            let cadence = session.cadence();
            let deadline = cadence.mul_f64(CYCLE_DEADLINE_FRACTION);

            let started = std::time::Instant::now();
            match tokio::time::timeout(deadline, self.run_cycle()).await {
                Ok(()) => {}
                Err(_) => {
                    warn!(
                        session = %session,
                        deadline_secs = deadline.as_secs(),
                        "cycle overran its deadline — overdue fetches dropped"
                    );
                }
            }
            let elapsed = started.elapsed();
            *self.state.last_cycle_ms.write() = Some(elapsed.as_millis() as u64);

            let sleep_for = cadence.saturating_sub(elapsed);
            debug!(
                session = %session,
                cycle_ms = elapsed.as_millis() as u64,
                sleep_secs = sleep_for.as_secs(),
                "cycle complete"
            );
            tokio::time::sleep(sleep_for).await;
        }
    }

    /// Execute one full cycle.
    pub async fn run_cycle(&self) {
        let now = Utc::now();
        let state = &self.state;

        // ── 1. Budget rollover, session, tier ───────────────────────────
        state.governor.maybe_rollover(now);

        let session = scheduler::session_at(now);
        state.store.set_session(session);

        let requested = state.tier_wheel.next_tier();
        let tier = effective_tier(requested, state.governor.is_within_budget());
        if tier != requested {
            info!(requested = %requested, "budget ceiling reached — downgrading cycle to HOT");
        }

        info!(
            session = %session,
            tier = %tier,
            cycle = state.tier_wheel.cycle_count(),
            calls_used = state.governor.used_today(),
            "cycle starting"
        );

        // ── 2. Market-wide fetches (always before per-ticker) ───────────
        self.fetch_market_wide(tier).await;

        // ── 3. Per-ticker fan-out ───────────────────────────────────────
        let tickers = state.store.tickers();
        let max_inflight = state.config.read().max_inflight;
        let semaphore = Arc::new(Semaphore::new(max_inflight.max(1)));

        // JoinSet so that a cycle-deadline cancellation aborts whatever is
        // still in flight instead of letting it write into the store late.
        let mut fetches = tokio::task::JoinSet::new();
        for ticker in &tickers {
            let permit_sem = semaphore.clone();
            let this = self.clone_refs();
            let ticker = ticker.clone();
            fetches.spawn(async move {
                let _permit = permit_sem.acquire().await;
                this.fetch_ticker(&ticker, tier).await;
            });
        }
        while fetches.join_next().await.is_some() {}

        // COLD tier refreshes earnings windows through the 6-hour cache.
        if tier.includes(Tier::Cold) {
            for ticker in &tickers {
                if let Some(days) = self.earnings_days_until(ticker).await {
                    debug!(ticker = %ticker, days_until = days, "earnings window refreshed");
                }
            }
        }

        // ── 4. Technicals ───────────────────────────────────────────────
        for ticker in &tickers {
            let candles = state.store.candles(ticker);
            if let Some(snapshot) = crate::ta::analyze(&candles) {
                state.store.set_technicals(ticker, snapshot);
            }
        }

        // ── 5. Regime, then signals and journal admissions ──────────────
        self.classify_and_store_regime(&tickers);
        self.evaluate_signals(&tickers, session).await;

        // ── 6. Alerts ───────────────────────────────────────────────────
        self.evaluate_alerts(&tickers, session);

        // ── 7. Journal marks, outcomes, EOD sweep ───────────────────────
        self.journal_pass(now).await;

        // ── 8. Scanner on its phase offset ──────────────────────────────
        if state.tier_wheel.cycle_count() % SCAN_PHASE_MODULO == SCAN_PHASE {
            self.scan_market().await;
        }

        // ── 9. Persist & publish ────────────────────────────────────────
        state.store.touch(Utc::now());
        if let Err(e) = state
            .persist
            .save_state_cache(&state.scheduler_counters(), state.store.snapshot())
        {
            warn!(error = %e, "state snapshot failed — continuing in memory");
            state.push_error(format!("persist: {e}"));
        }
        {
            let cache = self.earnings_cache.lock().clone();
            if let Err(e) = state.persist.save_earnings_cache(&cache) {
                warn!(error = %e, "earnings cache save failed");
            }
        }

        state.alert_engine.prune(Utc::now());
        state.scanner.prune(Utc::now());
        state.increment_version();
    }

    /// Cheap bundle of Arcs for spawned per-ticker tasks.
    fn clone_refs(&self) -> TickerFetcher {
        TickerFetcher {
            state: self.state.clone(),
            flow: self.flow.clone(),
            tick: self.tick.clone(),
        }
    }

    // ── Market-wide phase ───────────────────────────────────────────────

    async fn fetch_market_wide(&self, tier: Tier) {
        let state = &self.state;

        // HOT set.
        let (tide, flow_alerts, dp_recent, news, spike, net_impact) = tokio::join!(
            self.flow.market_tide(),
            self.flow.flow_alerts(),
            self.flow.dark_pool_recent(),
            self.flow.news(),
            self.flow.spike(),
            self.flow.top_net_impact(),
        );

        if let Some(tide) = tide {
            state.store.set_market_tide(tide);
        }
        if spike.is_some() {
            *self.latest_spike.lock() = spike;
        }
        if !flow_alerts.is_empty() {
            state.store.set_options_flow(flow_alerts);
        }
        if !dp_recent.is_empty() {
            state.store.set_dark_pool_recent(dp_recent);
        }
        if !news.is_empty() {
            state.store.set_news(news);
        }
        if !net_impact.is_empty() {
            state.store.set_top_net_impact(net_impact);
        }

        if tier.includes(Tier::Warm) {
            let (_total_volume, oi_rows, insider) = tokio::join!(
                self.flow.total_options_volume(),
                self.flow.market_oi_change(),
                self.flow.insider_buy_sells(),
            );
            if !oi_rows.is_empty() {
                debug!(rows = oi_rows.len(), "market OI change refreshed");
            }
            if !insider.is_empty() {
                state.store.set_congress_trades(insider);
            }
        }

        if tier.includes(Tier::Cold) {
            let (congress, late, econ, fda) = tokio::join!(
                self.flow.congress_recent(),
                self.flow.congress_late_reports(),
                self.flow.economic_calendar(),
                self.flow.fda_calendar(),
            );
            let mut filings = congress;
            filings.extend(late);
            if !filings.is_empty() {
                state.store.set_congress_trades(filings);
            }
            let mut calendar = econ;
            calendar.extend(fda);
            if !calendar.is_empty() {
                state.store.set_economic_calendar(calendar);
            }
        }
    }

    // ── Regime ──────────────────────────────────────────────────────────

    fn classify_and_store_regime(&self, tickers: &[String]) {
        let state = &self.state;

        // VIX proxy from the spike feed, stashed by fetch_market_wide.
        let vix = *self.latest_spike.lock();

        // SPY trend: percent distance of the last close from its 20-bar mean.
        let spy_trend = {
            let candles = state.store.candles("SPY");
            let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
            crate::ta::ema::calculate_sma(&closes, 20).and_then(|mean| {
                closes.last().map(|last| (last - mean) / mean * 100.0)
            })
        };

        // Breadth: fraction of the watchlist with a bullish technical bias.
        let breadth = {
            let mut bullish = 0usize;
            let mut counted = 0usize;
            for t in tickers {
                if let Some(ta) = state.store.technicals(t) {
                    counted += 1;
                    if ta.bias == Bias::Bullish {
                        bullish += 1;
                    }
                }
            }
            if counted > 0 {
                Some(bullish as f64 / counted as f64)
            } else {
                None
            }
        };

        let regime = classify_regime(vix, spy_trend, breadth);
        state.store.set_market_regime(regime);
    }

    // ── Signals & paper trades ──────────────────────────────────────────

    async fn evaluate_signals(&self, tickers: &[String], session: Session) {
        let state = &self.state;
        let now = Utc::now();
        let regime = state.store.market_regime().unwrap_or_default();
        let trading = scheduler::is_trading_session(now);
        let version = state.active_version.read().clone();
        let news = state.store.news();

        let mut journal_dirty = false;

        for ticker in tickers {
            let mut quote = state.store.quote(ticker);
            // The live tick tape carries a better VWAP than the polled quote.
            if let Some(q) = quote.as_mut() {
                if q.vwap.is_none() {
                    q.vwap = state.tick_cache.snapshot(ticker).and_then(|s| s.vwap);
                }
            }
            let technicals = state.store.technicals(ticker);

            // One-bar-back snapshot feeds the slope/accel features.
            let prev_technicals = {
                let candles = state.store.candles(ticker);
                if candles.len() > crate::ta::MIN_BARS {
                    crate::ta::analyze(&candles[..candles.len() - 1])
                } else {
                    None
                }
            };

            let si = state.store.short_interest(ticker);
            let ftd_peak = state
                .store
                .ftds(ticker)
                .iter()
                .map(|f| f.quantity)
                .fold(None::<f64>, |acc, q| Some(acc.map_or(q, |a| a.max(q))));
            let squeeze = si.as_ref().map(|rec| {
                score_squeeze(rec.short_volume_ratio, ftd_peak, Some(rec.percent_of_float))
            });

            let warm = state.store.warm_stats(ticker).unwrap_or_default();

            let ctx = FeatureContext {
                quote: quote.clone(),
                technicals,
                prev_technicals,
                flow: state.store.flow(ticker),
                dark_pool: state.store.dark_pool(ticker),
                gex: state.store.gex(ticker),
                squeeze,
                iv_rank: warm.iv_rank,
                iv_skew: warm.iv_skew,
                sentiment: news_sentiment(ticker, &news),
                regime,
            };

            let mut result = state.signal_engine.evaluate(ticker, &ctx);

            // Stamp the session onto any emitted setup.
            if let Some(setup) = result.setup.as_mut() {
                setup.session = Some(session);
            }

            match &result.setup {
                Some(setup) => state.store.set_setup(ticker, setup.clone()),
                None => state.store.clear_setup(ticker),
            }

            // Hand qualifying setups to the journal.
            if let (Some(setup), Some(q)) = (&result.setup, &quote) {
                if result.confidence >= OPEN_CONFIDENCE_MIN {
                    let admission = state.journal.try_open(
                        ticker,
                        setup,
                        q.last,
                        &version,
                        trading,
                        Some(result.features.clone()),
                        now,
                    );
                    match admission {
                        Admission::Opened(trade) => {
                            journal_dirty = true;
                            info!(ticker = %ticker, id = %trade.id, "setup admitted to paper journal");
                        }
                        Admission::Rejected(reason) => {
                            debug!(ticker = %ticker, %reason, "setup not admitted");
                        }
                    }
                }
            }

            state.store.set_signal(ticker, result);
        }

        if journal_dirty {
            if let Err(e) = state.persist.save_journal(&state.journal.to_file()) {
                warn!(error = %e, "journal save failed after admissions");
                state.push_error(format!("journal persist: {e}"));
            }
        }
    }

    // ── Alerts ──────────────────────────────────────────────────────────

    fn evaluate_alerts(&self, tickers: &[String], session: Session) {
        let state = &self.state;
        let now = Utc::now();

        for ticker in tickers {
            let quote = state.store.quote(ticker);
            let technicals = state.store.technicals(ticker);
            let flow = state.store.flow(ticker);
            let dark_pool = state.store.dark_pool(ticker);

            let alerts = state.alert_engine.evaluate_ticker(
                ticker,
                Some(session),
                quote.as_ref(),
                technicals.as_ref(),
                &flow,
                &dark_pool,
                now,
            );

            for alert in alerts {
                info!(
                    ticker = %alert.ticker,
                    kind = %alert.kind,
                    severity = %alert.severity,
                    "alert raised"
                );
                let _ = state.alert_tx.send(alert.clone());
                state.store.push_alert(alert);
            }
        }
    }

    // ── Journal pass ────────────────────────────────────────────────────

    async fn journal_pass(&self, now: chrono::DateTime<Utc>) {
        let state = &self.state;

        let mut prices: HashMap<String, f64> = HashMap::new();
        for (ticker, quote) in state.store.quotes_map() {
            if quote.last > 0.0 {
                prices.insert(ticker, quote.last);
            }
        }

        state.journal.update_paper_pnl(&prices);
        let closed = state.journal.check_outcomes(&prices, now);

        // EOD sweep once per ET day inside the close window.
        let mut swept = Vec::new();
        if scheduler::is_eod_window(now) {
            let today = est_date(now);
            let mut last = self.last_eod_date.write();
            if *last != today {
                *last = today;
                drop(last);
                swept = state.journal.close_intraday_trades(&prices, now);
                if !swept.is_empty() {
                    info!(count = swept.len(), "end-of-day sweep closed intraday trades");
                }
            }
        }

        if !closed.is_empty() || !swept.is_empty() {
            if let Err(e) = state.persist.save_journal(&state.journal.to_file()) {
                warn!(error = %e, "journal save failed after closes");
                state.push_error(format!("journal persist: {e}"));
            }
        }
    }

    // ── Scanner ─────────────────────────────────────────────────────────

    async fn scan_market(&self) {
        let state = &self.state;
        let now = Utc::now();

        let mut movers = self.tick.movers(false).await;
        movers.extend(self.tick.movers(true).await);

        let input = HarvestInput {
            flow_alerts: state.store.options_flow(),
            dark_pool: state.store.dark_pool_recent(),
            net_impact: state.store.top_net_impact(),
            congress: state.store.congress_trades(),
            news: state.store.news(),
            movers,
        };

        let watchlist = state.store.tickers();
        let max_candidates = state.scanner.config.max_candidates;
        let candidates = scanner::harvest(&input, &watchlist, max_candidates);
        if candidates.is_empty() {
            return;
        }

        let selected = state.scanner.select_for_scoring(candidates, now);
        let regime = state.store.market_regime().unwrap_or_default();

        for (i, candidate) in selected.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(SCAN_SPACING).await;
            }

            // Reduced pipeline: quote, flow, GEX, daily bars only.
            let ticker = candidate.ticker.as_str();

            // Harvested symbols come from free-text feeds; drop anything the
            // reference vendor does not recognise as a live US equity.
            if !self.tick.ticker_exists(ticker).await {
                debug!(ticker, "scanner candidate unknown to reference data — skipped");
                state.scanner.note_scored(ticker, now);
                continue;
            }

            let quote = match self.flow.quote(ticker).await {
                Some(q) => q,
                None => match self.tick.snapshot(ticker).await {
                    Some(q) => q,
                    None => {
                        debug!(ticker, "scanner candidate has no quote — skipped");
                        continue;
                    }
                },
            };

            let (flow_items, gex) = tokio::join!(
                self.flow.flow_recent(ticker),
                self.flow.gex(ticker),
            );

            let technicals = {
                let to = est_date(Utc::now());
                let mut bars = self.tick.daily_bars(ticker, "2025-01-01", &to, 150).await;
                if bars.is_empty() {
                    bars = self.tick.minute_bars(ticker, &to, &to, 390).await;
                }
                crate::ta::analyze(&bars)
            };

            let ctx = FeatureContext {
                quote: Some(quote),
                technicals,
                flow: flow_items,
                gex,
                regime,
                ..Default::default()
            };

            let result = state.signal_engine.evaluate(ticker, &ctx);
            if let Some(discovery) =
                state
                    .scanner
                    .accept(candidate, result.direction, result.confidence, now)
            {
                info!(
                    ticker = %discovery.ticker,
                    confidence = discovery.confidence,
                    "scanner discovery"
                );
                state.store.merge_discovery(discovery);
            }
        }
    }

    // ── Earnings cache ──────────────────────────────────────────────────

    /// COLD-tier earnings lookup through the 6-hour cache.
    async fn earnings_days_until(&self, ticker: &str) -> Option<i64> {
        let now = Utc::now();

        if let Some(entry) = self.earnings_cache.lock().entries.get(ticker) {
            if entry.is_fresh(now) {
                return entry.days_until;
            }
        }

        let next = self.flow.earnings(ticker).await;
        let days_until = next.as_deref().and_then(|date| {
            chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .ok()
                .map(|d| (d - now.date_naive()).num_days())
        });

        let mut cache = self.earnings_cache.lock();
        cache.entries.insert(
            ticker.to_string(),
            EarningsEntry {
                next_earnings: next,
                days_until,
                fetched_at: now,
            },
        );
        cache.last_updated = Some(now);

        days_until
    }
}

// ---------------------------------------------------------------------------
// Per-ticker fetch bundle
// ---------------------------------------------------------------------------

/// The Arc bundle a spawned per-ticker task needs.
struct TickerFetcher {
    state: Arc<AppState>,
    flow: Arc<FlowClient>,
    tick: Arc<TickClient>,
}

impl TickerFetcher {
    /// Fetch one ticker's endpoints for the cycle tier and write the results
    /// into the store. Every failure is "no data".
    async fn fetch_ticker(&self, ticker: &str, tier: Tier) {
        let state = &self.state;

        // ── HOT ─────────────────────────────────────────────────────────
        let quote = match self.flow.quote(ticker).await {
            Some(q) => Some(q),
            None => self.tick.snapshot(ticker).await,
        };
        let (bid, ask) = quote
            .as_ref()
            .map(|q| (Some(q.bid), Some(q.ask)))
            .unwrap_or((None, None));

        if let Some(q) = &quote {
            // Book context for the tick-rule's mid-quote fallback.
            if q.bid > 0.0 && q.ask > 0.0 {
                state.tick_cache.set_quote(ticker, q.bid, q.ask);
            }
            state.store.set_quote(ticker, q.clone());
        }

        let (flow_items, dark_pool, gex, bars, options_volume) = tokio::join!(
            self.flow.flow_recent(ticker),
            self.flow.dark_pool(ticker, bid, ask),
            self.flow.gex(ticker),
            self.flow.ohlc(ticker, "1d", OHLC_LOOKBACK_BARS),
            self.flow.options_volume(ticker),
        );

        if !flow_items.is_empty() {
            state.store.set_flow(ticker, flow_items);
        }
        if !dark_pool.is_empty() {
            state.store.set_dark_pool(ticker, dark_pool);
        }
        if let Some(profile) = gex {
            state.store.set_gex(ticker, profile);
        }
        if !bars.is_empty() {
            state.store.set_candles(ticker, bars);
        } else {
            // Fall back to the tick vendor's daily aggregates, then to the
            // minute ring accumulated from the live stream.
            let to = est_date(Utc::now());
            let tick_bars = self.tick.daily_bars(ticker, "2025-01-01", &to, 150).await;
            if !tick_bars.is_empty() {
                state.store.set_candles(ticker, tick_bars);
            } else {
                let minute_bars = state.tick_cache.minute_bars(ticker);
                if !minute_bars.is_empty() {
                    state.store.set_candles(ticker, minute_bars);
                }
            }
        }

        // ── WARM ────────────────────────────────────────────────────────
        if tier.includes(Tier::Warm) {
            let (iv_rank, max_pain, oi_change, iv_skew) = tokio::join!(
                self.flow.iv_rank(ticker),
                self.flow.max_pain(ticker),
                self.flow.oi_change(ticker),
                self.flow.iv_skew(ticker),
            );
            let (call_volume, put_volume) = options_volume.unzip();
            state.store.set_warm_stats(
                ticker,
                WarmStats {
                    iv_rank,
                    iv_skew,
                    max_pain,
                    oi_change,
                    call_volume,
                    put_volume,
                },
            );
        } else if let Some((calls, puts)) = options_volume {
            // Keep the HOT options-volume numbers without touching the rest.
            let mut warm = state.store.warm_stats(ticker).unwrap_or_default();
            warm.call_volume = Some(calls);
            warm.put_volume = Some(puts);
            state.store.set_warm_stats(ticker, warm);
        }

        // ── COLD ────────────────────────────────────────────────────────
        if tier.includes(Tier::Cold) {
            let (si, ftds, stock_state, insider) = tokio::join!(
                self.flow.short_interest(ticker),
                self.flow.ftds(ticker),
                self.flow.stock_state(ticker),
                self.flow.insider(ticker),
            );

            if let Some(record) = si {
                state.store.set_short_interest(ticker, record);
            }
            if !ftds.is_empty() {
                state.store.set_ftds(ticker, ftds);
            }
            if quote.is_none() {
                if let Some(q) = stock_state {
                    state.store.set_quote(ticker, q);
                }
            }
            if !insider.is_empty() {
                debug!(ticker, filings = insider.len(), "insider filings refreshed");
                state.store.merge_congress_trades(insider);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tier gating
// ---------------------------------------------------------------------------

/// The tier a cycle actually runs at: once the daily budget ceiling is hit,
/// every cycle is HOT-only until the ET date rolls over.
fn effective_tier(requested: Tier, within_budget: bool) -> Tier {
    if within_budget {
        requested
    } else {
        Tier::Hot
    }
}

// ---------------------------------------------------------------------------
// News sentiment
// ---------------------------------------------------------------------------

const POSITIVE_WORDS: &[&str] = &[
    "beat", "beats", "surge", "surges", "rally", "upgrade", "upgraded", "record",
    "strong", "growth", "wins", "approval", "bullish", "soars", "jump", "jumps",
];
const NEGATIVE_WORDS: &[&str] = &[
    "miss", "misses", "plunge", "plunges", "downgrade", "downgraded", "weak",
    "lawsuit", "probe", "recall", "bearish", "falls", "drop", "drops", "cuts", "halt",
];

/// Crude lexicon sentiment over headlines mentioning `ticker`, in [-1, +1].
/// `None` when no headline mentions the ticker.
fn news_sentiment(ticker: &str, news: &[NewsItem]) -> Option<f64> {
    let mut hits = 0usize;
    let mut score = 0i64;

    for item in news.iter().filter(|n| n.tickers.iter().any(|t| t == ticker)) {
        hits += 1;
        let lower = item.headline.to_lowercase();
        for word in lower.split(|c: char| !c.is_ascii_alphabetic()) {
            if POSITIVE_WORDS.contains(&word) {
                score += 1;
            } else if NEGATIVE_WORDS.contains(&word) {
                score -= 1;
            }
        }
    }

    if hits == 0 {
        None
    } else {
        Some((score as f64 / hits as f64).clamp(-1.0, 1.0))
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn headline(text: &str, tickers: &[&str]) -> NewsItem {
        NewsItem {
            headline: text.to_string(),
            source: "wire".into(),
            tickers: tickers.iter().map(|t| t.to_string()).collect(),
            published_at: Utc::now(),
        }
    }

    #[test]
    fn budget_exhaustion_forces_hot_only() {
        assert_eq!(effective_tier(Tier::Cold, true), Tier::Cold);
        assert_eq!(effective_tier(Tier::Warm, true), Tier::Warm);
        assert_eq!(effective_tier(Tier::Cold, false), Tier::Hot);
        assert_eq!(effective_tier(Tier::Warm, false), Tier::Hot);
        assert_eq!(effective_tier(Tier::Hot, false), Tier::Hot);
    }

    #[test]
    fn sentiment_none_without_mentions() {
        let news = vec![headline("NVDA beats estimates", &["NVDA"])];
        assert!(news_sentiment("AAPL", &news).is_none());
    }

    #[test]
    fn sentiment_positive_and_negative() {
        let news = vec![
            headline("AAPL beats on record growth", &["AAPL"]),
            headline("AAPL faces lawsuit after recall", &["AAPL"]),
        ];
        // Headline 1: +3; headline 2: -2 => mean +0.5 clamped stays 0.5.
        let s = news_sentiment("AAPL", &news).unwrap();
        assert!((s - 0.5).abs() < 1e-9);
    }

    #[test]
    fn sentiment_clamped() {
        let news = vec![headline(
            "surge rally record strong growth wins soars jump",
            &["XYZ"],
        )];
        assert_eq!(news_sentiment("XYZ", &news), Some(1.0));
    }
}
