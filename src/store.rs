//! In-memory market state with per-market debounced fan-out (SPEC_FULL.md §4.4).
//!
//! Grounded on `store.py::MarketStore`: updates merge into a sticky row per
//! market (a missing/unparsable field never blanks a previously known
//! value), a small tolerance suppresses republishing float noise, and a
//! leading-edge debounce emits immediately when a market has been quiet long
//! enough, else schedules a single trailing flush that coalesces every
//! field touched in between into one sparse emission. The clock is
//! `tokio::time::Instant` rather than wall-clock time, so NTP adjustments
//! never shift a pending flush.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::bus::Bus;
use crate::errors::{Error, Result};
use crate::message::{MarketStatsBody, MarketStatsMsg, OrderBookLevel, OrderBookMsg};
use crate::metadata::MarketMetadata;

const TOLERANCE_ABS: f64 = 1e-9;
const TOLERANCE_REL: f64 = 1e-9;

/// Fields a merge can touch, used both as the debounce's "changed since
/// last emit" set and as the key set of a sparse wire update (§4.4 point 4).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Field {
    Symbol,
    BestBidPrice,
    BestBidSize,
    BestAskPrice,
    BestAskSize,
    LastPrice,
    MarkPrice,
    IndexPrice,
    MidPrice,
    DailyVolume,
    FundingRate,
    OpenInterest,
    Basis,
    Markout,
    Spread,
}

impl Field {
    const ALL: [Field; 15] = [
        Field::Symbol,
        Field::BestBidPrice,
        Field::BestBidSize,
        Field::BestAskPrice,
        Field::BestAskSize,
        Field::LastPrice,
        Field::MarkPrice,
        Field::IndexPrice,
        Field::MidPrice,
        Field::DailyVolume,
        Field::FundingRate,
        Field::OpenInterest,
        Field::Basis,
        Field::Markout,
        Field::Spread,
    ];

    fn key(self) -> &'static str {
        match self {
            Field::Symbol => "symbol",
            Field::BestBidPrice => "best_bid_price",
            Field::BestBidSize => "best_bid_size",
            Field::BestAskPrice => "best_ask_price",
            Field::BestAskSize => "best_ask_size",
            Field::LastPrice => "last_price",
            Field::MarkPrice => "mark_price",
            Field::IndexPrice => "index_price",
            Field::MidPrice => "mid_price",
            Field::DailyVolume => "daily_volume",
            Field::FundingRate => "funding_rate",
            Field::OpenInterest => "open_interest",
            Field::Basis => "basis",
            Field::Markout => "markout",
            Field::Spread => "spread",
        }
    }

    /// Every field name, used to seed the changed-set of a brand-new row
    /// (§4.4: "if row did not exist, mark every field as changed").
    fn all() -> HashSet<Field> {
        Field::ALL.into_iter().collect()
    }
}

/// Immutable-in-spirit snapshot of one market's derived state (§3). Mutated
/// in place behind the store's lock; clones handed out are a point-in-time
/// copy.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct MarketRow {
    pub market_id: i32,
    pub symbol: Option<String>,
    pub best_bid_price: Option<f64>,
    pub best_bid_size: Option<f64>,
    pub best_ask_price: Option<f64>,
    pub best_ask_size: Option<f64>,
    pub last_price: Option<f64>,
    pub mark_price: Option<f64>,
    pub index_price: Option<f64>,
    pub mid_price: Option<f64>,
    pub daily_volume: Option<f64>,
    pub funding_rate: Option<f64>,
    pub open_interest: Option<f64>,
    pub basis: Option<f64>,
    pub markout: Option<f64>,
    pub spread: Option<f64>,
    pub updated_ms: i64,
}

impl MarketRow {
    fn new(market_id: i32, symbol: Option<String>) -> Self {
        Self {
            market_id,
            symbol,
            ..Default::default()
        }
    }

    /// The symbol to show on the wire, defaulting to `MKT-<id>` when no
    /// metadata entry exists (§3).
    pub fn symbol_or_default(&self) -> String {
        self.symbol
            .clone()
            .unwrap_or_else(|| format!("MKT-{}", self.market_id))
    }

    fn value_for(&self, field: Field) -> Value {
        match field {
            Field::Symbol => json!(self.symbol_or_default()),
            Field::BestBidPrice => json!(self.best_bid_price),
            Field::BestBidSize => json!(self.best_bid_size),
            Field::BestAskPrice => json!(self.best_ask_price),
            Field::BestAskSize => json!(self.best_ask_size),
            Field::LastPrice => json!(self.last_price),
            Field::MarkPrice => json!(self.mark_price),
            Field::IndexPrice => json!(self.index_price),
            Field::MidPrice => json!(self.mid_price),
            Field::DailyVolume => json!(self.daily_volume),
            Field::FundingRate => json!(self.funding_rate),
            Field::OpenInterest => json!(self.open_interest),
            Field::Basis => json!(self.basis),
            Field::Markout => json!(self.markout),
            Field::Spread => json!(self.spread),
        }
    }

    /// Full row dump, used for bootstrap snapshots (§4.4 `snapshot()`).
    pub fn to_wire(&self) -> Value {
        let mut object = serde_json::Map::new();
        object.insert("type".to_string(), json!("market_row"));
        object.insert("market_id".to_string(), json!(self.market_id));
        object.insert("updated_ms".to_string(), json!(self.updated_ms));
        for field in Field::ALL {
            object.insert(field.key().to_string(), self.value_for(field));
        }
        Value::Object(object)
    }

    /// A partial row containing only `market_id` plus the accumulated
    /// changed-field set (§4.4 point 4: "sparse update" wire shape).
    fn to_wire_sparse(&self, changed: &HashSet<Field>) -> Value {
        let mut object = serde_json::Map::new();
        object.insert("type".to_string(), json!("market_row"));
        object.insert("market_id".to_string(), json!(self.market_id));
        object.insert("updated_ms".to_string(), json!(self.updated_ms));
        for field in changed {
            object.insert(field.key().to_string(), self.value_for(*field));
        }
        Value::Object(object)
    }

    fn merge_stats(&mut self, stats: &MarketStatsBody) -> HashSet<Field> {
        let mut changed = HashSet::new();
        assign_sticky(&mut self.index_price, stats.index_price, Field::IndexPrice, &mut changed);
        assign_sticky(&mut self.mark_price, stats.mark_price, Field::MarkPrice, &mut changed);
        assign_sticky(
            &mut self.last_price,
            stats.last_trade_price,
            Field::LastPrice,
            &mut changed,
        );
        assign_sticky(
            &mut self.funding_rate,
            stats.effective_funding_rate(),
            Field::FundingRate,
            &mut changed,
        );
        assign_sticky(
            &mut self.daily_volume,
            stats.effective_daily_volume(),
            Field::DailyVolume,
            &mut changed,
        );
        assign_sticky(
            &mut self.open_interest,
            stats.open_interest,
            Field::OpenInterest,
            &mut changed,
        );
        self.recompute_derived(&mut changed);
        changed
    }

    fn merge_book(&mut self, bid: Option<(f64, f64)>, ask: Option<(f64, f64)>) -> HashSet<Field> {
        let mut changed = HashSet::new();
        assign_cleared(
            &mut self.best_bid_price,
            bid.map(|(price, _)| price),
            Field::BestBidPrice,
            &mut changed,
        );
        assign_cleared(
            &mut self.best_bid_size,
            bid.map(|(_, size)| size),
            Field::BestBidSize,
            &mut changed,
        );
        assign_cleared(
            &mut self.best_ask_price,
            ask.map(|(price, _)| price),
            Field::BestAskPrice,
            &mut changed,
        );
        assign_cleared(
            &mut self.best_ask_size,
            ask.map(|(_, size)| size),
            Field::BestAskSize,
            &mut changed,
        );
        self.recompute_derived(&mut changed);
        changed
    }

    /// Recompute `mid_price`/`spread` (book-derived, cleared when either
    /// side is absent) and `basis`/`markout` (derived, absent unless both
    /// inputs are present) after any merge touches their inputs (§3).
    fn recompute_derived(&mut self, changed: &mut HashSet<Field>) {
        let mid = match (self.best_bid_price, self.best_ask_price) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
            _ => None,
        };
        assign_cleared(&mut self.mid_price, mid, Field::MidPrice, changed);

        let spread = match (self.best_bid_price, self.best_ask_price, self.mid_price) {
            (Some(bid), Some(ask), Some(mid)) if mid != 0.0 => {
                Some((ask - bid) / mid * 10_000.0)
            }
            _ => None,
        };
        assign_cleared(&mut self.spread, spread, Field::Spread, changed);

        let basis = match (self.mark_price, self.index_price) {
            (Some(mark), Some(index)) => Some(mark - index),
            _ => None,
        };
        assign_cleared(&mut self.basis, basis, Field::Basis, changed);

        let markout = match (self.mid_price, self.last_price) {
            (Some(mid), Some(last)) => Some(mid - last),
            _ => None,
        };
        assign_cleared(&mut self.markout, markout, Field::Markout, changed);
    }
}

/// Sticky assignment (§3: stats-derived fields): a `None` incoming value
/// leaves the stored field untouched. Records the field as changed when the
/// stored value moves beyond tolerance.
fn assign_sticky(field: &mut Option<f64>, incoming: Option<f64>, tag: Field, changed: &mut HashSet<Field>) {
    let Some(value) = incoming else {
        return;
    };
    if values_differ(*field, Some(value)) {
        *field = Some(value);
        changed.insert(tag);
    }
}

/// Clearing assignment (§3: book-derived and computed fields): the
/// incoming value, present or absent, replaces the stored one outright.
fn assign_cleared(field: &mut Option<f64>, incoming: Option<f64>, tag: Field, changed: &mut HashSet<Field>) {
    if values_differ(*field, incoming) {
        *field = incoming;
        changed.insert(tag);
    }
}

fn values_differ(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (None, None) => false,
        (Some(x), Some(y)) => {
            let diff = (x - y).abs();
            diff > TOLERANCE_ABS && diff > TOLERANCE_REL * x.abs().max(y.abs())
        }
        _ => true,
    }
}

/// Resolve a market id from a channel string's trailing digit run, e.g.
/// `"order_book/7"` or `"order_book_abc7"` both resolve to `7` (§4.4; the
/// leniency of accepting any trailing integer is a noted Open Question,
/// resolved in DESIGN.md in favor of the original's lenient regex).
pub fn extract_market_id(channel: &str) -> Result<i32> {
    let digits: String = channel
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if digits.is_empty() {
        return Err(Error::InvalidChannel(channel.to_string()));
    }
    digits
        .parse::<i32>()
        .map_err(|_| Error::InvalidChannel(channel.to_string()))
}

fn best_level(
    levels: &[OrderBookLevel],
    better: impl Fn(&OrderBookLevel, &OrderBookLevel) -> bool,
) -> Option<(f64, f64)> {
    levels
        .iter()
        .copied()
        .reduce(|a, b| if better(&a, &b) { a } else { b })
        .map(|level| (level.price, level.size))
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

struct StoreInner {
    rows: Mutex<HashMap<i32, MarketRow>>,
    pending: Mutex<HashMap<i32, HashSet<Field>>>,
    last_emit: Mutex<HashMap<i32, Instant>>,
    flush_handles: Mutex<HashMap<i32, JoinHandle<()>>>,
    debounce: Duration,
    bus: Arc<Bus>,
    metadata: Arc<MarketMetadata>,
}

#[derive(Clone)]
pub struct MarketStore {
    inner: Arc<StoreInner>,
}

impl MarketStore {
    pub fn new(bus: Arc<Bus>, debounce: Duration, metadata: Arc<MarketMetadata>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                rows: Mutex::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
                last_emit: Mutex::new(HashMap::new()),
                flush_handles: Mutex::new(HashMap::new()),
                debounce,
                bus,
                metadata,
            }),
        }
    }

    /// Merge a market-stats record per §3/§4.4. Returns the new row state
    /// when anything changed, `None` for a no-op republish (§8 scenario 6).
    pub fn apply_market_stats(&self, msg: &MarketStatsMsg) -> Option<MarketRow> {
        let market_id = msg.market_stats.market_id;
        let (row, changed) = {
            let mut rows = self.inner.rows.lock().expect("store rows poisoned");
            let is_new = !rows.contains_key(&market_id);
            let symbol = self.inner.metadata.get(&market_id).cloned();
            let row = rows
                .entry(market_id)
                .or_insert_with(|| MarketRow::new(market_id, symbol));
            let mut changed = row.merge_stats(&msg.market_stats);
            if is_new {
                changed = Field::all();
            }
            if !changed.is_empty() {
                row.updated_ms = now_ms();
            }
            (row.clone(), changed)
        };

        if changed.is_empty() {
            return None;
        }
        self.fold_and_schedule(market_id, changed);
        Some(row)
    }

    /// Merge an order-book update per §3/§4.4. The market id is parsed from
    /// the channel's trailing digits (§4.4).
    pub fn apply_order_book(&self, channel: &str, msg: &OrderBookMsg) -> Result<Option<MarketRow>> {
        let market_id = extract_market_id(channel)?;
        let best_bid = best_level(&msg.order_book.bids, |a, b| a.price > b.price);
        let best_ask = best_level(&msg.order_book.asks, |a, b| a.price < b.price);

        let (row, changed) = {
            let mut rows = self.inner.rows.lock().expect("store rows poisoned");
            let is_new = !rows.contains_key(&market_id);
            let symbol = self.inner.metadata.get(&market_id).cloned();
            let row = rows
                .entry(market_id)
                .or_insert_with(|| MarketRow::new(market_id, symbol));
            let mut changed = row.merge_book(best_bid, best_ask);
            if is_new {
                changed = Field::all();
            }
            if !changed.is_empty() {
                row.updated_ms = now_ms();
            }
            (row.clone(), changed)
        };

        if changed.is_empty() {
            return Ok(None);
        }
        self.fold_and_schedule(market_id, changed);
        Ok(Some(row))
    }

    /// All known rows, unordered (used by analytics; `snapshot()` is the
    /// bootstrap-ordered view).
    pub fn rows(&self) -> Vec<MarketRow> {
        self.inner
            .rows
            .lock()
            .expect("store rows poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Full-row dump for bootstrap, ordered per §4.4: known-OI rows first by
    /// descending OI, unknowns last by ascending market id.
    pub fn snapshot(&self) -> Vec<MarketRow> {
        let mut rows = self.rows();
        rows.sort_by(|a, b| {
            let a_known = a.open_interest.is_some();
            let b_known = b.open_interest.is_some();
            b_known
                .cmp(&a_known)
                .then_with(|| match (a.open_interest, b.open_interest) {
                    (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(std::cmp::Ordering::Equal),
                    _ => std::cmp::Ordering::Equal,
                })
                .then_with(|| a.market_id.cmp(&b.market_id))
        });
        rows
    }

    pub fn market_ids(&self) -> Vec<i32> {
        let rows = self.inner.rows.lock().expect("store rows poisoned");
        let mut ids: Vec<i32> = rows.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Abandon any scheduled flushes (their partial updates are lost, per
    /// §5: acceptable because a new session re-seeds every known market)
    /// and close the bus.
    pub fn close(&self) {
        let mut handles = self.inner.flush_handles.lock().expect("flush handles poisoned");
        for (_, handle) in handles.drain() {
            handle.abort();
        }
        drop(handles);
        self.inner.pending.lock().expect("pending poisoned").clear();
        self.inner.bus.close();
    }

    /// Fold `changed` into the market's pending set and either emit
    /// immediately or schedule a trailing flush (§4.4 debounce).
    fn fold_and_schedule(&self, market_id: i32, changed: HashSet<Field>) {
        {
            let mut pending = self.inner.pending.lock().expect("pending poisoned");
            pending.entry(market_id).or_default().extend(changed);
        }

        let now = Instant::now();
        let mut last_emit = self.inner.last_emit.lock().expect("last emit poisoned");
        let last = last_emit.get(&market_id).copied();
        let ready = last.map_or(true, |at| now.duration_since(at) >= self.inner.debounce);

        if ready {
            last_emit.insert(market_id, now);
            drop(last_emit);
            self.emit(market_id);
            return;
        }
        drop(last_emit);

        let mut handles = self.inner.flush_handles.lock().expect("flush handles poisoned");
        if handles.contains_key(&market_id) {
            return;
        }
        let delay = self.inner.debounce.saturating_sub(now.duration_since(last.expect("checked above")));
        let store = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            store.flush(market_id);
        });
        handles.insert(market_id, handle);
    }

    fn flush(&self, market_id: i32) {
        self.inner
            .flush_handles
            .lock()
            .expect("flush handles poisoned")
            .remove(&market_id);
        self.inner
            .last_emit
            .lock()
            .expect("last emit poisoned")
            .insert(market_id, Instant::now());
        self.emit(market_id);
    }

    /// Drain the pending changed-field set and publish a sparse update. The
    /// store lock is released before the bus is touched (§5: "the lock is
    /// RELEASED before the synchronous emit path enters the bus").
    fn emit(&self, market_id: i32) {
        let changed = {
            let mut pending = self.inner.pending.lock().expect("pending poisoned");
            pending.remove(&market_id)
        };
        let Some(changed) = changed else {
            return;
        };
        if changed.is_empty() {
            return;
        }
        let row = {
            let rows = self.inner.rows.lock().expect("store rows poisoned");
            rows.get(&market_id).cloned()
        };
        if let Some(row) = row {
            self.inner.bus.publish(row.to_wire_sparse(&changed));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::OrderBookPayload;

    fn store(debounce: Duration) -> (MarketStore, Arc<Bus>) {
        let bus = Arc::new(Bus::new(128));
        let store = MarketStore::new(bus.clone(), debounce, Arc::new(MarketMetadata::new()));
        (store, bus)
    }

    fn stats(market_id: i32, last_trade_price: Option<f64>) -> MarketStatsMsg {
        MarketStatsMsg {
            channel: format!("market_stats/{market_id}"),
            market_stats: MarketStatsBody {
                market_id,
                last_trade_price,
                ..Default::default()
            },
        }
    }

    #[test]
    fn extracts_trailing_digits_regardless_of_prefix() {
        assert_eq!(extract_market_id("order_book/7").unwrap(), 7);
        assert_eq!(extract_market_id("order_book:7").unwrap(), 7);
        assert_eq!(extract_market_id("order_book_abc7").unwrap(), 7);
        assert!(extract_market_id("order_book/").is_err());
    }

    #[tokio::test]
    async fn missing_fields_never_blank_a_sticky_value() {
        let (store, _bus) = store(Duration::from_secs(60));
        store.apply_market_stats(&stats(1, Some(100.0)));
        store.apply_market_stats(&stats(1, None));
        let row = store.snapshot().into_iter().next().unwrap();
        assert_eq!(row.last_price, Some(100.0));
    }

    #[tokio::test]
    async fn idempotent_republish_emits_exactly_once() {
        let (store, bus) = store(Duration::from_secs(60));
        let sub = bus.subscribe();
        let msg = stats(1, Some(100.0));
        assert!(store.apply_market_stats(&msg).is_some());
        assert!(store.apply_market_stats(&msg).is_none());
        let first = sub.recv().await.unwrap();
        assert_eq!(first["last_price"], json!(100.0));
        // confirm nothing further arrives by pushing a distinguishable
        // event through a second market.
        store.apply_market_stats(&stats(2, Some(5.0)));
        let next = sub.recv().await.unwrap();
        assert_eq!(next["market_id"], json!(2));
    }

    #[tokio::test]
    async fn seed_event_marks_every_field_changed() {
        let (store, bus) = store(Duration::from_secs(60));
        let sub = bus.subscribe();
        store.apply_market_stats(&stats(1, Some(100.0)));
        let first = sub.recv().await.unwrap();
        for field in Field::ALL {
            assert!(
                first.get(field.key()).is_some(),
                "seed event missing key {}",
                field.key()
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn emits_immediately_when_quiet_then_debounces_bursts() {
        let (store, bus) = store(Duration::from_millis(200));
        let sub = bus.subscribe();

        store.apply_market_stats(&stats(1, Some(1.0)));
        let first = sub.recv().await.unwrap();
        assert_eq!(first["last_price"], json!(1.0));

        store.apply_market_stats(&stats(1, Some(2.0)));
        tokio::time::advance(Duration::from_millis(50)).await;
        store.apply_market_stats(&stats(1, Some(3.0)));

        tokio::time::advance(Duration::from_millis(200)).await;
        let flushed = sub.recv().await.unwrap();
        assert_eq!(flushed["last_price"], json!(3.0));
    }

    #[tokio::test]
    async fn order_book_derives_mid_spread_and_markout() {
        let (store, bus) = store(Duration::from_secs(60));
        let sub = bus.subscribe();
        store.apply_market_stats(&stats(3, Some(50.5)));
        sub.recv().await.unwrap();

        let msg = OrderBookMsg {
            channel: "order_book/3".to_string(),
            order_book: OrderBookPayload {
                asks: vec![OrderBookLevel { price: 51.0, size: 1.0 }],
                bids: vec![OrderBookLevel { price: 49.5, size: 2.0 }],
            },
        };
        store.apply_order_book("order_book/3", &msg).unwrap();
        let row = sub.recv().await.unwrap();
        assert!((row["mid_price"].as_f64().unwrap() - 50.25).abs() < 1e-9);
        assert!((row["spread"].as_f64().unwrap() - 298.507_462_686_567).abs() < 1e-6);
        assert!((row["markout"].as_f64().unwrap() - (-0.25)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn funding_and_volume_preference_and_basis() {
        let (store, bus) = store(Duration::from_secs(60));
        let sub = bus.subscribe();
        store.apply_market_stats(&MarketStatsMsg {
            channel: "market_stats/9".to_string(),
            market_stats: MarketStatsBody {
                market_id: 9,
                mark_price: Some(100.10),
                index_price: Some(100.05),
                current_funding_rate: Some(0.0042),
                funding_rate: Some(0.0022),
                daily_quote_token_volume: Some(98765.4),
                daily_base_token_volume: Some(12.3),
                ..Default::default()
            },
        });
        let row = sub.recv().await.unwrap();
        assert_eq!(row["funding_rate"], json!(0.0042));
        assert_eq!(row["daily_volume"], json!(98765.4));
        assert!((row["basis"].as_f64().unwrap() - 0.05).abs() < 1e-9);
    }

    #[tokio::test]
    async fn snapshot_orders_known_oi_first_then_unknown_by_id() {
        let (store, _bus) = store(Duration::from_secs(60));
        store.apply_market_stats(&MarketStatsMsg {
            channel: "market_stats/1".to_string(),
            market_stats: MarketStatsBody {
                market_id: 1,
                open_interest: Some(10.0),
                ..Default::default()
            },
        });
        store.apply_market_stats(&MarketStatsMsg {
            channel: "market_stats/2".to_string(),
            market_stats: MarketStatsBody {
                market_id: 2,
                open_interest: Some(50.0),
                ..Default::default()
            },
        });
        store.apply_market_stats(&stats(3, Some(1.0))); // no open_interest
        store.apply_market_stats(&stats(4, Some(1.0))); // no open_interest

        let ids: Vec<i32> = store.snapshot().into_iter().map(|r| r.market_id).collect();
        assert_eq!(ids, vec![2, 1, 3, 4]);
    }

    #[test]
    fn symbol_defaults_to_mkt_prefixed_id_on_the_wire() {
        let row = MarketRow::new(42, None);
        assert_eq!(row.symbol_or_default(), "MKT-42");
        let named = MarketRow::new(7, Some("ETH-PERP".to_string()));
        assert_eq!(named.symbol_or_default(), "ETH-PERP");
    }
}
