//! Fan-out pub/sub bus with a newest-wins drop policy (SPEC_FULL.md §4.3).
//!
//! Grounded on `bus.py::UpdateBus`: a mutex-guarded subscriber set,
//! best-effort delivery, and a sentinel close message. The Rust rendition
//! leans on `Weak`/`Arc` rather than an explicit unsubscribe call — a
//! subscriber's queue is reclaimed once its `Subscription` handle is
//! dropped, and `publish` purges dead weak entries opportunistically, which
//! satisfies "a queue is removed when its owner unsubscribes or the bus is
//! closed" without a second removal path to keep in sync.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde_json::{json, Value};
use tokio::sync::Notify;

struct SubscriberQueue {
    inner: Mutex<VecDeque<Value>>,
    notify: Notify,
    capacity: usize,
    closed: AtomicBool,
}

impl SubscriberQueue {
    fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            notify: Notify::new(),
            capacity,
            closed: AtomicBool::new(false),
        }
    }

    /// Newest-wins: drop the oldest queued item to admit `value` when full.
    fn push(&self, value: Value) {
        let mut guard = self.inner.lock().expect("subscriber queue poisoned");
        if guard.len() >= self.capacity {
            guard.pop_front();
        }
        guard.push_back(value);
        drop(guard);
        self.notify.notify_one();
    }

    async fn recv(&self) -> Option<Value> {
        loop {
            let notified = self.notify.notified();
            {
                let mut guard = self.inner.lock().expect("subscriber queue poisoned");
                if let Some(value) = guard.pop_front() {
                    return Some(value);
                }
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            notified.await;
        }
    }
}

/// A live subscription to a [`Bus`]. Dropping it unregisters the subscriber
/// the next time the bus publishes.
pub struct Subscription {
    queue: Arc<SubscriberQueue>,
}

impl Subscription {
    /// Await the next message, or `None` once the bus has delivered its
    /// close sentinel and the queue has drained.
    pub async fn recv(&self) -> Option<Value> {
        let item = self.queue.recv().await?;
        if item.get("type").and_then(Value::as_str) == Some("closed") {
            return None;
        }
        Some(item)
    }
}

pub struct Bus {
    capacity: usize,
    subscribers: Mutex<Vec<Weak<SubscriberQueue>>>,
}

impl Bus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let queue = Arc::new(SubscriberQueue::new(self.capacity));
        self.subscribers
            .lock()
            .expect("bus subscriber list poisoned")
            .push(Arc::downgrade(&queue));
        Subscription { queue }
    }

    /// Deliver `message` to every live subscriber. Never blocks on a slow
    /// subscriber: a full queue loses its oldest entry instead.
    pub fn publish(&self, message: Value) {
        let snapshot = self.snapshot();
        for queue in snapshot {
            queue.push(message.clone());
        }
    }

    /// Broadcast the close sentinel and drop all subscriber references.
    pub fn close(&self) {
        let snapshot = self.snapshot();
        for queue in &snapshot {
            queue.closed.store(true, Ordering::Release);
            queue.push(json!({"type": "closed"}));
        }
        self.subscribers
            .lock()
            .expect("bus subscriber list poisoned")
            .clear();
    }

    fn snapshot(&self) -> Vec<Arc<SubscriberQueue>> {
        let mut guard = self.subscribers.lock().expect("bus subscriber list poisoned");
        let live: Vec<Arc<SubscriberQueue>> = guard.iter().filter_map(Weak::upgrade).collect();
        guard.retain(|w| w.strong_count() > 0);
        live
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .expect("bus subscriber list poisoned")
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }
}

/// Subscriber queue capacity per SPEC_FULL.md §3: 128 while debouncing is
/// active (the normal case), 512 when debouncing is disabled, since a
/// disabled debounce means bursts arrive undamped and subscribers need more
/// headroom to avoid thrashing on drops.
pub fn subscriber_queue_capacity(ui_debounce_seconds: f64) -> usize {
    if ui_debounce_seconds <= 0.0 {
        512
    } else {
        128
    }
}
