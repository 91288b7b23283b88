//! Resilient WebSocket connection to the upstream feed (SPEC_FULL.md §4.2).
//!
//! Grounded on `ws_client.rs`'s `WsConnection`: reconnect with exponential
//! backoff and jitter, an idle-read timeout that forces a reconnect on a
//! silent upstream, and an on-connect hook that replays subscriptions. The
//! jitter formula follows the additive `delay + random[0, min(1, delay/2)]`
//! shape rather than the teacher's multiplicative variant, per the feed
//! contract this service targets.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::Value;
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

use crate::errors::{Error, Result};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: Url,
    pub ping_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
}

/// `delay = min(backoff, max)`, `jitter = random[0, min(1, delay/2)]`,
/// `backoff = min(backoff*2, max)` after every attempt.
struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            current: base,
        }
    }

    fn reset(&mut self) {
        self.current = self.base;
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current.min(self.max);
        let jitter_cap = delay.mul_f64(0.5).min(Duration::from_secs(1));
        let jitter = if jitter_cap > Duration::ZERO {
            Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..jitter_cap.as_secs_f64()))
        } else {
            Duration::ZERO
        };
        self.current = (self.current.saturating_mul(2)).min(self.max);
        delay + jitter
    }
}

/// Bound on the outbound queue (SPEC_FULL.md §5: "Outbound queue to
/// upstream: bounded (1024)"). Overflow drops the oldest queued frame to
/// admit the newest, matching the bus's newest-wins drop policy (§4.3) —
/// control traffic on this queue is dominated by idempotent subscribe
/// frames, so losing an old one is recoverable on the next reconnect's
/// subscription replay.
const OUTBOUND_QUEUE_CAPACITY: usize = 1024;

/// Outbound frames waiting to be written. A write failure re-inserts the
/// message at the front so the same frame is retried ahead of anything
/// queued afterward, rather than losing its place in line.
///
/// Shared across reconnects: the subscription manager enqueues subscribe
/// commands here as it discovers new markets, and every new connection
/// replays the full subscription set before anything else drains.
pub struct OutboundQueue {
    inner: Mutex<VecDeque<WsMessage>>,
    notify: Notify,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Enqueue a JSON command frame, e.g. a subscribe request.
    pub async fn enqueue(&self, frame: &Value) {
        self.push_back(WsMessage::Text(frame.to_string())).await;
    }

    async fn push_back(&self, message: WsMessage) {
        let mut guard = self.inner.lock().await;
        if guard.len() >= OUTBOUND_QUEUE_CAPACITY {
            guard.pop_front();
            tracing::warn!("outbound queue at capacity, dropping oldest frame");
        }
        guard.push_back(message);
        drop(guard);
        self.notify.notify_one();
    }

    async fn push_front(&self, message: WsMessage) {
        let mut guard = self.inner.lock().await;
        if guard.len() >= OUTBOUND_QUEUE_CAPACITY {
            guard.pop_back();
            tracing::warn!("outbound queue at capacity, dropping newest frame to requeue");
        }
        guard.push_front(message);
        drop(guard);
        self.notify.notify_one();
    }

    async fn requeue_front(&self, message: WsMessage) {
        self.push_front(message).await;
    }

    /// Await the next outbound frame, blocking until one is enqueued.
    async fn pop(&self) -> WsMessage {
        loop {
            let notified = self.notify.notified();
            {
                let mut guard = self.inner.lock().await;
                if let Some(message) = guard.pop_front() {
                    return message;
                }
            }
            notified.await;
        }
    }
}

/// Produces the control messages to enqueue immediately on a fresh session
/// (§4.2's `on_connect` hook) — called afresh on every connection attempt
/// so its result reflects whatever the manager has discovered since the
/// last one.
pub type OnConnect = Arc<dyn Fn() -> Vec<Value> + Send + Sync>;

/// Run the reconnect loop until `shutdown` is signalled. Parsed frames are
/// forwarded on `frames`. `on_connect` is invoked once per new session and
/// its output is enqueued onto `queue` ahead of anything else, so a
/// reconnect always restores the full desired subscription state (§4.2,
/// §4.5).
pub async fn run(
    config: ClientConfig,
    on_connect: OnConnect,
    queue: Arc<OutboundQueue>,
    frames: mpsc::UnboundedSender<Value>,
    mut shutdown: watch::Receiver<bool>,
    connected: Arc<AtomicBool>,
) {
    let mut backoff = Backoff::new(config.reconnect_base, config.reconnect_max);

    // `connected` tracks whether this task is alive and looping, not
    // whether a session currently holds an open socket: the health
    // boundary (§6) reports "ok" iff the upstream-client task is live.
    connected.store(true, Ordering::Release);

    while !*shutdown.borrow() {
        match connect_and_serve(&config, &on_connect, &queue, &frames, &mut shutdown, &mut backoff).await {
            Ok(()) => {
                if *shutdown.borrow() {
                    break;
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "upstream connection lost");
            }
        }

        if *shutdown.borrow() {
            break;
        }

        let delay = backoff.next_delay();
        tracing::info!(delay_ms = delay.as_millis() as u64, "reconnecting to upstream");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {}
        }
    }

    connected.store(false, Ordering::Release);
}

async fn connect_and_serve(
    config: &ClientConfig,
    on_connect: &OnConnect,
    queue: &Arc<OutboundQueue>,
    frames: &mpsc::UnboundedSender<Value>,
    shutdown: &mut watch::Receiver<bool>,
    backoff: &mut Backoff,
) -> Result<()> {
    tracing::info!(url = %config.url, "connecting to upstream feed");
    let (socket, _response) = tokio_tungstenite::connect_async(config.url.as_str())
        .await
        .map_err(Error::WebSocket)?;
    let (mut write, mut read) = socket.split();
    // Reset immediately on a successful handshake, unconditional on how
    // this session later ends (§4.2: "On successful connect, reset backoff").
    backoff.reset();

    for frame in on_connect() {
        queue.enqueue(&frame).await;
    }

    let mut ping_tick = tokio::time::interval(config.ping_interval);
    ping_tick.tick().await; // first tick fires immediately; consume it

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = write.send(WsMessage::Close(None)).await;
                return Ok(());
            }

            _ = ping_tick.tick() => {
                queue.push_back(WsMessage::Ping(Vec::new())).await;
            }

            message = queue.pop() => {
                if let Err(err) = write.send(message.clone()).await {
                    queue.requeue_front(message).await;
                    return Err(Error::WebSocket(err));
                }
            }

            incoming = tokio::time::timeout(config.heartbeat_timeout, read.next()) => {
                match incoming {
                    Err(_elapsed) => {
                        return Err(Error::InvalidValue("upstream heartbeat timed out".to_string()));
                    }
                    Ok(None) => return Ok(()),
                    Ok(Some(Err(err))) => return Err(Error::WebSocket(err)),
                    Ok(Some(Ok(WsMessage::Text(text)))) => {
                        match serde_json::from_str::<Value>(&text) {
                            Ok(value) => {
                                if frames.send(value).is_err() {
                                    return Ok(());
                                }
                            }
                            Err(err) => tracing::debug!(error = %err, "dropping malformed upstream frame"),
                        }
                    }
                    Ok(Some(Ok(WsMessage::Close(frame)))) => {
                        tracing::info!(?frame, "upstream closed the connection");
                        return Ok(());
                    }
                    Ok(Some(Ok(_))) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps_at_max() {
        let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(30));
        let first = backoff.next_delay();
        assert!(first >= Duration::from_millis(500));
        assert!(first < Duration::from_millis(1500));
        for _ in 0..10 {
            backoff.next_delay();
        }
        let capped = backoff.next_delay();
        assert!(capped <= Duration::from_secs(31));
    }

    #[test]
    fn reset_returns_to_base() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(5));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        let delay = backoff.next_delay();
        assert!(delay >= Duration::from_millis(100));
        assert!(delay < Duration::from_millis(600));
    }

    #[tokio::test]
    async fn outbound_queue_drops_oldest_past_capacity() {
        let queue = OutboundQueue::new();
        for i in 0..OUTBOUND_QUEUE_CAPACITY {
            queue.enqueue(&Value::from(i as i64)).await;
        }
        // One more past capacity: the oldest (0) should be gone, the queue
        // stays at capacity, and the newest frame is admitted.
        queue.enqueue(&Value::from(OUTBOUND_QUEUE_CAPACITY as i64)).await;

        let mut popped = Vec::new();
        for _ in 0..OUTBOUND_QUEUE_CAPACITY {
            popped.push(queue.pop().await);
        }
        assert_eq!(popped.len(), OUTBOUND_QUEUE_CAPACITY);
        assert!(!popped.contains(&WsMessage::Text("0".to_string())));
        assert!(popped.contains(&WsMessage::Text(OUTBOUND_QUEUE_CAPACITY.to_string())));
    }
}
