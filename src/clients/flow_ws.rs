// =============================================================================
// Flow Vendor WebSocket — lit option trades + off-lit (dark pool) channels
// =============================================================================
//
// The socket owns its reconnect loop: exponential backoff starting at 5 s and
// doubling to a 300 s cap, reset after a healthy connection. On every
// (re)connect it re-sends the subscribe message with the *current* ticker
// set, so watchlist changes picked up between reconnects propagate.
//
// Parsed events are handed to caller-provided sinks; raw frames never leave
// this module.
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::clients::adapters;
use crate::store::{DarkPoolPrint, FlowItem};

/// Default production stream URL.
const DEFAULT_WS_URL: &str = "wss://api.unusualwhales.com/ws";
/// Initial reconnect delay.
const BACKOFF_START_SECS: u64 = 5;
/// Reconnect delay ceiling.
const BACKOFF_CAP_SECS: u64 = 300;

/// Sink for parsed lit option trades.
pub type FlowSink = Arc<dyn Fn(FlowItem) + Send + Sync>;
/// Sink for parsed off-lit prints.
pub type OffLitSink = Arc<dyn Fn(DarkPoolPrint) + Send + Sync>;

/// Reconnecting WebSocket client for the flow vendor.
pub struct FlowSocket {
    url: String,
    token: String,
    /// Live ticker set; re-read on every reconnect.
    tickers: Arc<RwLock<Vec<String>>>,
}

impl FlowSocket {
    pub fn new(token: impl Into<String>, tickers: Arc<RwLock<Vec<String>>>) -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            token: token.into(),
            tickers,
        }
    }

    /// Run forever, reconnecting with exponential backoff. Spawn as a task.
    pub async fn run(self, on_flow: FlowSink, on_offlit: OffLitSink) {
        let mut backoff = BACKOFF_START_SECS;

        loop {
            match self.connect_once(&on_flow, &on_offlit).await {
                Ok(()) => {
                    // Clean end-of-stream: reconnect promptly.
                    warn!("flow WebSocket stream ended — reconnecting");
                    backoff = BACKOFF_START_SECS;
                }
                Err(e) => {
                    warn!(error = %e, backoff_secs = backoff, "flow WebSocket error — reconnecting");
                }
            }

            tokio::time::sleep(std::time::Duration::from_secs(backoff)).await;
            backoff = (backoff * 2).min(BACKOFF_CAP_SECS);
        }
    }

    /// One connection lifetime: subscribe, then pump messages until the
    /// stream drops.
    async fn connect_once(&self, on_flow: &FlowSink, on_offlit: &OffLitSink) -> Result<()> {
        info!(url = %self.url, "connecting to flow WebSocket");

        let (ws_stream, _response) = connect_async(&self.url)
            .await
            .context("failed to connect to flow WebSocket")?;
        let (mut write, mut read) = ws_stream.split();

        // Subscribe both channels with the current ticker set.
        let tickers = self.tickers.read().clone();
        let subscribe = json!({
            "action": "subscribe",
            "token": self.token,
            "channels": ["option_trades", "darkpool"],
            "tickers": tickers,
        });
        write
            .send(Message::Text(subscribe.to_string()))
            .await
            .context("failed to send flow subscribe message")?;
        info!(tickers = tickers.len(), "flow WebSocket subscribed");

        while let Some(frame) = read.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    self.dispatch(&text, on_flow, on_offlit);
                }
                Ok(Message::Ping(data)) => {
                    if write.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("flow WebSocket closed by vendor");
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    /// Route one envelope to the matching sink.
    fn dispatch(&self, text: &str, on_flow: &FlowSink, on_offlit: &OffLitSink) {
        let Ok(root) = serde_json::from_str::<serde_json::Value>(text) else {
            debug!("unparseable flow frame dropped");
            return;
        };

        let channel = root
            .get("channel")
            .and_then(|c| c.as_str())
            .unwrap_or_default();
        let payload = root.get("data").unwrap_or(&root);

        match channel {
            "option_trades" => {
                for item in adapters::parse_flow_items(payload, None) {
                    on_flow(item);
                }
            }
            "darkpool" => {
                // No live quote context on the stream; classification happens
                // against the next polled quote, so prints arrive neutral.
                for print in adapters::parse_dark_pool(payload, None, None, None) {
                    on_offlit(print);
                }
            }
            other => {
                debug!(channel = other, "ignoring flow frame on unknown channel");
            }
        }
    }
}

impl std::fmt::Debug for FlowSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowSocket")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn socket() -> FlowSocket {
        FlowSocket::new(
            "test-token",
            Arc::new(RwLock::new(vec!["SPY".to_string()])),
        )
    }

    #[test]
    fn dispatch_routes_option_trades() {
        let seen: Arc<Mutex<Vec<FlowItem>>> = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();

        let on_flow: FlowSink = Arc::new(move |item| seen2.lock().unwrap().push(item));
        let on_offlit: OffLitSink = Arc::new(|_| panic!("wrong channel"));

        let frame = r#"{
            "channel": "option_trades",
            "data": [{
                "ticker": "SPY", "type": "call", "strike": 450.0,
                "premium": 750000.0, "exec_type": "sweep", "side": "ask"
            }]
        }"#;
        socket().dispatch(frame, &on_flow, &on_offlit);

        let items = seen.lock().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].ticker, "SPY");
    }

    #[test]
    fn dispatch_routes_darkpool() {
        let count = Arc::new(Mutex::new(0usize));
        let count2 = count.clone();

        let on_flow: FlowSink = Arc::new(|_| panic!("wrong channel"));
        let on_offlit: OffLitSink = Arc::new(move |_| *count2.lock().unwrap() += 1);

        let frame = r#"{
            "channel": "darkpool",
            "data": [{ "ticker": "NVDA", "price": 800.0, "size": 120000.0 }]
        }"#;
        socket().dispatch(frame, &on_flow, &on_offlit);
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn unknown_channel_and_garbage_dropped() {
        let on_flow: FlowSink = Arc::new(|_| panic!("should not fire"));
        let on_offlit: OffLitSink = Arc::new(|_| panic!("should not fire"));

        socket().dispatch(r#"{"channel":"status","data":{}}"#, &on_flow, &on_offlit);
        socket().dispatch("not json at all", &on_flow, &on_offlit);
    }
}
