//! Subscriber-facing WebSocket endpoints (SPEC_FULL.md §6): `/ws` streams
//! market rows, `/ws/funding` streams funding z-score snapshots. Both send
//! a full snapshot on connect, then forward whatever the relevant bus
//! publishes until the client disconnects or the bus closes (§4.3's close
//! sentinel ends the subscription either way). `symbol` is already baked
//! into every row by the store (§3), so this layer is a plain relay.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use serde_json::Value;

use crate::analytics::FundingAnalytics;
use crate::bus::Bus;
use crate::store::MarketStore;

#[derive(Clone)]
pub struct AppState {
    pub store: MarketStore,
    pub bus: Arc<Bus>,
    pub funding_bus: Arc<Bus>,
    pub analytics: Arc<FundingAnalytics>,
}

pub async fn market_rows(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let initial = state.store.snapshot().into_iter().map(|row| row.to_wire()).collect();
        let subscription = state.bus.subscribe();
        serve(socket, initial, subscription).await;
    })
}

pub async fn funding(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let initial = match state.analytics.latest() {
            Some(snapshot) => vec![serde_json::json!({
                "type": "snapshot",
                "timestamp": snapshot.timestamp_ms,
                "rows": snapshot.rows.iter().map(|r| serde_json::json!({
                    "market_id": r.market_id,
                    "symbol": r.symbol,
                    "funding_rate": r.funding_rate,
                    "open_interest": r.open_interest,
                    "zscore": r.zscore,
                })).collect::<Vec<_>>(),
            })],
            None => Vec::new(),
        };
        let subscription = state.funding_bus.subscribe();
        serve(socket, initial, subscription).await;
    })
}

/// Send the bootstrap payload, then forward bus messages until the client
/// disconnects or the bus delivers its close sentinel (§4.3).
async fn serve(mut socket: WebSocket, initial: Vec<Value>, subscription: crate::bus::Subscription) {
    for value in initial {
        if socket.send(Message::Text(value.to_string())).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            update = subscription.recv() => {
                match update {
                    Some(value) => {
                        if socket.send(Message::Text(value.to_string())).await.is_err() {
                            return;
                        }
                    }
                    None => {
                        let _ = socket.send(Message::Close(None)).await;
                        return;
                    }
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Err(_)) => return,
                    _ => {}
                }
            }
        }
    }
}
