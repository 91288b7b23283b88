//! Periodic cross-sectional funding-rate z-score snapshots (SPEC_FULL.md §4.6).
//!
//! Grounded on `analytics.py`'s funding worker: every `refresh` interval,
//! snapshot the store, compute a population z-score (ddof=0) per market
//! with a known funding rate, order the full row list, and publish the
//! batch on a dedicated bus. Below `min_assets` non-null fundings, or a
//! zero population std, every z-score in the batch is null rather than the
//! computation being skipped outright — markets still appear in the
//! snapshot, just without a score.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::watch;

use crate::store::{now_ms, MarketStore};

#[derive(Debug, Clone, PartialEq)]
pub struct FundingRecord {
    pub market_id: i32,
    pub symbol: String,
    pub funding_rate: Option<f64>,
    pub open_interest: Option<f64>,
    pub zscore: Option<f64>,
}

impl FundingRecord {
    fn to_wire(&self) -> Value {
        json!({
            "market_id": self.market_id,
            "symbol": self.symbol,
            "funding_rate": self.funding_rate,
            "open_interest": self.open_interest,
            "zscore": self.zscore,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FundingSnapshot {
    pub timestamp_ms: i64,
    pub rows: Vec<FundingRecord>,
}

impl FundingSnapshot {
    fn to_wire(&self) -> Value {
        json!({
            "type": "snapshot",
            "timestamp": self.timestamp_ms,
            "rows": self.rows.iter().map(FundingRecord::to_wire).collect::<Vec<_>>(),
        })
    }
}

use crate::bus::Bus;

/// Last computed batch, readable without waiting for the next cycle (serves
/// a new `/ws/funding` subscriber's bootstrap send, §6).
pub struct FundingAnalytics {
    latest: Mutex<Option<FundingSnapshot>>,
}

impl FundingAnalytics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            latest: Mutex::new(None),
        })
    }

    pub fn latest(&self) -> Option<FundingSnapshot> {
        self.latest.lock().expect("analytics cache poisoned").clone()
    }

    fn set(&self, snapshot: FundingSnapshot) {
        *self.latest.lock().expect("analytics cache poisoned") = Some(snapshot);
    }
}

/// Run the refresh loop: compute-then-publish, then race the stop signal
/// against the interval timer (§9: "never sleep unconditionally").
pub async fn run(
    analytics: Arc<FundingAnalytics>,
    store: MarketStore,
    funding_bus: Arc<Bus>,
    refresh: Duration,
    min_assets: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let snapshot = compute(&store, min_assets);
        funding_bus.publish(snapshot.to_wire());
        analytics.set(snapshot);

        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(refresh) => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }
    }
}

/// §4.6: compute population z-scores across rows with a non-null funding
/// rate, then order the *full* row list (including rows without a funding
/// rate) by `(z absent last, -z, -open_interest (null=0), market_id)`.
fn compute(store: &MarketStore, min_assets: usize) -> FundingSnapshot {
    let rows = store.rows();

    let fundings: Vec<f64> = rows.iter().filter_map(|row| row.funding_rate).collect();
    let zscores = if fundings.len() >= min_assets {
        let count = fundings.len() as f64;
        let mean = fundings.iter().sum::<f64>() / count;
        let variance = fundings.iter().map(|rate| (rate - mean).powi(2)).sum::<f64>() / count;
        let std_dev = variance.sqrt();
        if std_dev > 0.0 {
            Some((mean, std_dev))
        } else {
            None
        }
    } else {
        None
    };

    let mut records: Vec<FundingRecord> = rows
        .into_iter()
        .map(|row| {
            let zscore = row.funding_rate.and_then(|rate| {
                zscores.map(|(mean, std_dev)| (rate - mean) / std_dev)
            });
            FundingRecord {
                market_id: row.market_id,
                symbol: row.symbol_or_default(),
                funding_rate: row.funding_rate,
                open_interest: row.open_interest,
                zscore,
            }
        })
        .collect();

    records.sort_by(|a, b| {
        let a_absent = a.zscore.is_none();
        let b_absent = b.zscore.is_none();
        a_absent
            .cmp(&b_absent)
            .then_with(|| {
                let az = a.zscore.unwrap_or(0.0);
                let bz = b.zscore.unwrap_or(0.0);
                bz.partial_cmp(&az).unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| {
                let aoi = a.open_interest.unwrap_or(0.0);
                let boi = b.open_interest.unwrap_or(0.0);
                boi.partial_cmp(&aoi).unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.market_id.cmp(&b.market_id))
    });

    FundingSnapshot {
        timestamp_ms: now_ms(),
        rows: records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Bus;
    use crate::message::{MarketStatsBody, MarketStatsMsg};
    use crate::metadata::MarketMetadata;

    fn store_with_rates(rates: &[(i32, f64)]) -> MarketStore {
        let bus = Arc::new(Bus::new(128));
        let store = MarketStore::new(bus, Duration::from_secs(60), Arc::new(MarketMetadata::new()));
        for (market_id, rate) in rates {
            store.apply_market_stats(&MarketStatsMsg {
                channel: format!("market_stats/{market_id}"),
                market_stats: MarketStatsBody {
                    market_id: *market_id,
                    current_funding_rate: Some(*rate),
                    ..Default::default()
                },
            });
        }
        store
    }

    #[test]
    fn below_min_assets_yields_null_zscores_for_all() {
        let store = store_with_rates(&[(1, 0.01)]);
        store.apply_market_stats(&MarketStatsMsg {
            channel: "market_stats/2".to_string(),
            market_stats: MarketStatsBody {
                market_id: 2,
                ..Default::default()
            },
        });
        let snapshot = compute(&store, 3);
        assert_eq!(snapshot.rows.len(), 2);
        assert!(snapshot.rows.iter().all(|r| r.zscore.is_none()));
    }

    #[test]
    fn computes_population_z_scores() {
        let store = store_with_rates(&[(1, 0.01), (2, 0.02), (3, 0.03)]);
        let snapshot = compute(&store, 3);
        assert_eq!(snapshot.rows.len(), 3);

        let sum: f64 = snapshot.rows.iter().filter_map(|r| r.zscore).sum();
        assert!(sum.abs() < 1e-9);
        let sum_sq: f64 = snapshot
            .rows
            .iter()
            .filter_map(|r| r.zscore)
            .map(|z| z * z)
            .sum();
        assert!((sum_sq - 3.0).abs() < 1e-9);

        let expected = (1.5f64).sqrt();
        let low = snapshot.rows.iter().find(|r| r.market_id == 1).unwrap();
        assert!((low.zscore.unwrap() + expected).abs() < 1e-9);
        let mid = snapshot.rows.iter().find(|r| r.market_id == 2).unwrap();
        assert!(mid.zscore.unwrap().abs() < 1e-9);
        let high = snapshot.rows.iter().find(|r| r.market_id == 3).unwrap();
        assert!((high.zscore.unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn identical_rates_yield_null_z_scores_due_to_zero_std() {
        let store = store_with_rates(&[(1, 0.01), (2, 0.01), (3, 0.01)]);
        let snapshot = compute(&store, 3);
        assert!(snapshot.rows.iter().all(|r| r.zscore.is_none()));
    }

    #[test]
    fn orders_by_descending_zscore_then_open_interest_then_id_with_absent_last() {
        let store = store_with_rates(&[(1, 0.01), (2, 0.02), (3, 0.03)]);
        store.apply_market_stats(&MarketStatsMsg {
            channel: "market_stats/4".to_string(),
            market_stats: MarketStatsBody {
                market_id: 4,
                ..Default::default()
            },
        });
        let snapshot = compute(&store, 3);
        let ids: Vec<i32> = snapshot.rows.iter().map(|r| r.market_id).collect();
        assert_eq!(ids, vec![3, 2, 1, 4]);
    }
}
