//! Subscription lifecycle and message dispatch (SPEC_FULL.md §4.5).
//!
//! Grounded on `ws_manager.py`: markets are discovered from the batched
//! `market_stats/all` channel rather than a REST call, and each newly seen
//! market gets its own `order_book` subscription on the spot. Batch entries
//! that fail to parse are logged at debug level and skipped rather than
//! aborting the whole batch, matching the original's per-entry resilience.

use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex as StdMutex};

use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};

use crate::message::{self, WsMessage};
use crate::store::MarketStore;
use crate::upstream::client::{self, ClientConfig, OnConnect, OutboundQueue};

const ALL_MARKET_STATS_CHANNEL: &str = "market_stats/all";

/// Owns the upstream connection and feeds parsed updates into the store.
/// Runs until `shutdown` fires, then closes the store's bus so subscribers
/// unwind cleanly. `connected` tracks whether the upstream-client task is
/// currently running and is read by the health boundary (§6).
pub async fn run(
    config: ClientConfig,
    store: MarketStore,
    shutdown: watch::Receiver<bool>,
    connected: Arc<AtomicBool>,
) {
    let queue = Arc::new(OutboundQueue::new());
    let known_markets: Arc<StdMutex<BTreeSet<i32>>> = Arc::new(StdMutex::new(BTreeSet::new()));
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel();

    let on_connect: OnConnect = {
        let known_markets = known_markets.clone();
        Arc::new(move || build_subscription_set(&known_markets))
    };

    let client_task = tokio::spawn(client::run(
        config,
        on_connect,
        queue.clone(),
        frames_tx,
        shutdown.clone(),
        connected,
    ));

    loop {
        let frame = tokio::select! {
            frame = frames_rx.recv() => frame,
            _ = wait_for_shutdown(shutdown.clone()) => None,
        };

        let Some(frame) = frame else {
            break;
        };

        dispatch(&frame, &store, &known_markets, &queue).await;
    }

    store.close();
    let _ = client_task.await;
}

/// Deterministic subscription set for a fresh session (§4.5): the "all"
/// market-stats channel, then every known market's order-book channel in
/// ascending id order, so a reconnect restores book coverage identically
/// regardless of discovery order.
fn build_subscription_set(known_markets: &Arc<StdMutex<BTreeSet<i32>>>) -> Vec<Value> {
    let markets = known_markets.lock().expect("known markets poisoned");
    let mut frames = Vec::with_capacity(markets.len() + 1);
    frames.push(subscribe_frame(ALL_MARKET_STATS_CHANNEL));
    frames.extend(markets.iter().map(|id| subscribe_frame(&format!("order_book/{id}"))));
    frames
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    if *shutdown.borrow() {
        return;
    }
    let _ = shutdown.changed().await;
}

async fn dispatch(
    frame: &Value,
    store: &MarketStore,
    known_markets: &Arc<StdMutex<BTreeSet<i32>>>,
    queue: &Arc<OutboundQueue>,
) {
    if message::is_batched_market_stats(frame) {
        let Some(entries) = frame.get("market_stats").and_then(Value::as_object) else {
            return;
        };
        for (key, entry) in entries {
            match message::parse_market_stats_entry(&format!("market_stats/{key}"), entry) {
                Ok(msg) => {
                    let market_id = msg.market_stats.market_id;
                    ensure_subscribed(market_id, known_markets, queue).await;
                    store.apply_market_stats(&msg);
                }
                Err(err) => {
                    tracing::debug!(key, error = %err, "skipping invalid market_stats batch entry");
                }
            }
        }
        return;
    }

    match message::parse_ws_message(frame) {
        Ok(WsMessage::MarketStats(msg)) => {
            ensure_subscribed(msg.market_stats.market_id, known_markets, queue).await;
            store.apply_market_stats(&msg);
        }
        Ok(WsMessage::OrderBook(msg)) => {
            if let Err(err) = store.apply_order_book(&msg.channel, &msg) {
                tracing::debug!(channel = %msg.channel, error = %err, "dropping order book update");
            }
        }
        Err(err) => {
            tracing::debug!(error = %err, "dropping unrecognized upstream frame");
        }
    }
}

/// Records a newly discovered market and subscribes to its order book. The
/// same `known_markets` set feeds `build_subscription_set`, so this
/// subscribe and any future reconnect's replay are always consistent.
async fn ensure_subscribed(
    market_id: i32,
    known_markets: &Arc<StdMutex<BTreeSet<i32>>>,
    queue: &Arc<OutboundQueue>,
) {
    let inserted = known_markets
        .lock()
        .expect("known markets poisoned")
        .insert(market_id);
    if !inserted {
        return;
    }
    let frame = subscribe_frame(&format!("order_book/{market_id}"));
    queue.enqueue(&frame).await;
    tracing::info!(market_id, "discovered market, subscribing to order book");
}

fn subscribe_frame(channel: &str) -> Value {
    json!({"type": "subscribe", "channel": channel})
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Bus;
    use std::time::Duration;

    #[tokio::test]
    async fn dispatch_applies_batched_market_stats_and_subscribes_new_markets() {
        let bus = Arc::new(Bus::new(128));
        let store = MarketStore::new(bus, Duration::from_secs(60), Arc::new(crate::metadata::MarketMetadata::new()));
        let known = Arc::new(StdMutex::new(BTreeSet::new()));
        let queue = Arc::new(OutboundQueue::new());

        let frame = json!({
            "type": "update/market_stats",
            "channel": "market_stats/all",
            "market_stats": {
                "1": {"market_id": 1, "last_trade_price": "10.0"},
                "2": {"market_id": 2, "last_trade_price": "20.0"},
            }
        });

        dispatch(&frame, &store, &known, &queue).await;

        assert_eq!(known.lock().unwrap().len(), 2);
        assert_eq!(store.market_ids(), vec![1, 2]);
        assert_eq!(
            build_subscription_set(&known).len(),
            3,
            "all-markets channel plus one order_book channel per discovered market"
        );
    }

    #[tokio::test]
    async fn dispatch_skips_invalid_batch_entries() {
        let bus = Arc::new(Bus::new(128));
        let store = MarketStore::new(bus, Duration::from_secs(60), Arc::new(crate::metadata::MarketMetadata::new()));
        let known = Arc::new(StdMutex::new(BTreeSet::new()));
        let queue = Arc::new(OutboundQueue::new());

        let frame = json!({
            "type": "update/market_stats",
            "channel": "market_stats/all",
            "market_stats": {
                "1": {"last_trade_price": "10.0"},
            }
        });

        dispatch(&frame, &store, &known, &queue).await;
        assert!(store.market_ids().is_empty());
    }

    #[tokio::test]
    async fn dispatch_applies_order_book_updates() {
        let bus = Arc::new(Bus::new(128));
        let store = MarketStore::new(bus, Duration::from_secs(60), Arc::new(crate::metadata::MarketMetadata::new()));
        let known = Arc::new(StdMutex::new(BTreeSet::new()));
        let queue = Arc::new(OutboundQueue::new());

        let frame = json!({
            "type": "update/order_book",
            "channel": "order_book/7",
            "order_book": {
                "asks": [{"price": "101.0", "size": "1.0"}],
                "bids": [{"price": "99.0", "size": "1.0"}],
            }
        });

        dispatch(&frame, &store, &known, &queue).await;
        assert_eq!(store.market_ids(), vec![7]);
    }

    #[tokio::test]
    async fn on_connect_set_is_sorted_regardless_of_discovery_order() {
        let known = Arc::new(StdMutex::new(BTreeSet::new()));
        let queue = Arc::new(OutboundQueue::new());

        for market_id in [42, 3, 17] {
            ensure_subscribed(market_id, &known, &queue).await;
        }

        let frames = build_subscription_set(&known);
        let channels: Vec<String> = frames
            .iter()
            .map(|f| f.get("channel").unwrap().as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            channels,
            vec![
                "market_stats/all",
                "order_book/3",
                "order_book/17",
                "order_book/42",
            ]
        );
    }
}
