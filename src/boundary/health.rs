//! Liveness endpoint (SPEC_FULL.md §6): `{status: "ok"|"starting", markets:
//! <count>}`, `ok` iff the upstream-client task is live.
//!
//! Grounded on `adapters/metrics/health.rs`'s `HealthState`/`HealthServer`
//! shape, trimmed to the single `/health` contract this service's
//! subscriber-facing surface actually needs — no templated dashboard pages,
//! per the Non-goal in SPEC_FULL.md §1.
//!
//! `connected` is shared with `upstream::client::run`, which sets it true
//! for as long as that task's reconnect loop is running and clears it when
//! the task exits, mirroring the original's `ws_manager.py::is_running()`
//! task-aliveness check rather than per-session socket state: a transient
//! reconnect does not flip this back to "starting" (see DESIGN.md).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::store::MarketStore;

pub struct HealthState {
    connected: Arc<AtomicBool>,
    store: MarketStore,
}

impl HealthState {
    pub fn new(store: MarketStore, connected: Arc<AtomicBool>) -> Arc<Self> {
        Arc::new(Self { connected, store })
    }
}

pub async fn health(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let status = if state.connected.load(Ordering::Acquire) {
        "ok"
    } else {
        "starting"
    };
    Json(json!({
        "status": status,
        "markets": state.store.market_ids().len(),
    }))
}
