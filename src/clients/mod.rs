// =============================================================================
// Upstream Clients
// =============================================================================
//
// Two vendors sit behind one capability: rate-limited REST calls plus
// trade/off-lit WebSocket subscriptions. `RestCore` carries everything the
// vendors share — the reqwest client, bearer token, sliding-window limiter,
// budget accounting, and the 429 retry dance. Raw JSON never leaves this
// module; see `adapters`.

pub mod adapters;
pub mod flow_rest;
pub mod flow_ws;
pub mod rate_limit;
pub mod tick_rest;
pub mod tick_ws;

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::scheduler::BudgetGovernor;
use rate_limit::SlidingWindowLimiter;

pub use flow_rest::FlowClient;
pub use flow_ws::FlowSocket;
pub use tick_rest::TickClient;
pub use tick_ws::{TickSocket, TickSummary, TickSummaryCache};

/// Floor applied to a vendor's 429 reset hint.
const RETRY_MIN_SECS: u64 = 2;
/// Ceiling applied to a vendor's 429 reset hint.
const RETRY_MAX_SECS: u64 = 30;

/// Shared REST plumbing for one vendor.
pub struct RestCore {
    client: reqwest::Client,
    base_url: String,
    token: String,
    /// Response header carrying the 429 reset hint, e.g.
    /// `x-uw-req-per-minute-reset`.
    reset_header: &'static str,
    limiter: Arc<SlidingWindowLimiter>,
    governor: Arc<BudgetGovernor>,
}

impl RestCore {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        reset_header: &'static str,
        limiter: Arc<SlidingWindowLimiter>,
        governor: Arc<BudgetGovernor>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
            reset_header,
            limiter,
            governor,
        }
    }

    /// Perform one rate-limited GET and return the JSON body.
    ///
    /// Failure policy:
    /// - 429: honour the vendor reset hint clamped to [2 s, 30 s], retry
    ///   once; a second failure behaves like any other error.
    /// - Any other failure: log one line, return `None`. Callers treat
    ///   `None` strictly as "no data".
    pub async fn rest_call(&self, path: &str, params: &[(&str, String)]) -> Option<Value> {
        match self.attempt(path, params).await {
            Attempt::Ok(v) => Some(v),
            Attempt::RateLimited(hint_secs) => {
                let delay = hint_secs.clamp(RETRY_MIN_SECS, RETRY_MAX_SECS);
                warn!(path, delay_secs = delay, "429 from vendor — backing off once");
                tokio::time::sleep(std::time::Duration::from_secs(delay)).await;

                match self.attempt(path, params).await {
                    Attempt::Ok(v) => Some(v),
                    _ => {
                        warn!(path, "retry after 429 failed — treating as no data");
                        None
                    }
                }
            }
            Attempt::Failed => None,
        }
    }

    async fn attempt(&self, path: &str, params: &[(&str, String)]) -> Attempt {
        self.limiter.acquire().await;

        let url = format!("{}{}", self.base_url, path);
        let request = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(params);

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(path, error = %e, "upstream request failed");
                return Attempt::Failed;
            }
        };

        let status = response.status();

        if status.as_u16() == 429 {
            let hint = response
                .headers()
                .get(self.reset_header)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(RETRY_MIN_SECS);
            return Attempt::RateLimited(hint);
        }

        if !status.is_success() {
            warn!(path, status = status.as_u16(), "upstream returned error status");
            return Attempt::Failed;
        }

        match response.json::<Value>().await {
            Ok(body) => {
                self.governor.record_calls(1);
                debug!(path, "upstream call ok");
                Attempt::Ok(body)
            }
            Err(e) => {
                warn!(path, error = %e, "failed to decode upstream JSON");
                Attempt::Failed
            }
        }
    }
}

enum Attempt {
    Ok(Value),
    RateLimited(u64),
    Failed,
}

impl std::fmt::Debug for RestCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestCore")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}
