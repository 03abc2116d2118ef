//! Broadcast hub for admin location tracking
//!
//! Keeps the registry of connected observer sessions in the `admin_tracking`
//! group and fans location events out to all of them.
//!
//! Each session owns a bounded outbound queue. `publish` serialises the event
//! once and enqueues it with `try_send`, so the publisher never waits on a
//! socket and one stalled observer cannot delay the others. What happens to
//! an observer whose queue is full is decided by [`LagPolicy`].
//!
//! Flow: subscribe → receive frames in publish order → drop handle / unsubscribe.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use types::ids::ObserverId;
use types::location::LocationEvent;

/// The single broadcast group every observer joins.
pub const ADMIN_TRACKING_GROUP: &str = "admin_tracking";

/// A serialised event, shared by every session it is delivered to.
pub type Frame = Arc<str>;

/// What to do with an observer whose outbound queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LagPolicy {
    /// Evict the lagging observer; its connection is closed.
    Disconnect,
    /// Skip this event for the lagging observer and keep it connected.
    DropNewest,
}

impl FromStr for LagPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disconnect" => Ok(LagPolicy::Disconnect),
            "drop_newest" | "drop-newest" => Ok(LagPolicy::DropNewest),
            other => Err(format!("unknown lag policy: {}", other)),
        }
    }
}

/// Configuration for the broadcast hub.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum frames buffered per observer.
    pub queue_capacity: usize,
    pub lag_policy: LagPolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            lag_policy: LagPolicy::Disconnect,
        }
    }
}

/// Per-publish delivery summary. Informational only; never an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    /// Observers the frame was enqueued for.
    pub delivered: usize,
    /// Lagging observers that skipped this frame.
    pub dropped: usize,
    /// Observers removed during this publish (lagging or already gone).
    pub evicted: usize,
}

/// Lifetime counters for the hub.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub observers: usize,
    pub published: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub evicted: u64,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    evicted: AtomicU64,
}

struct Registry {
    group: &'static str,
    sessions: DashMap<ObserverId, mpsc::Sender<Frame>>,
    config: HubConfig,
    counters: Counters,
}

impl Registry {
    fn remove(&self, id: &ObserverId) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            debug!(group = self.group, observer = %id, "Observer left");
        }
        removed
    }
}

/// Registry of observer sessions plus fan-out. Cheap to clone; clones share
/// the same registry.
#[derive(Clone)]
pub struct BroadcastHub {
    registry: Arc<Registry>,
}

impl BroadcastHub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            registry: Arc::new(Registry {
                group: ADMIN_TRACKING_GROUP,
                sessions: DashMap::new(),
                config,
                counters: Counters::default(),
            }),
        }
    }

    /// Register a new observer. The returned handle receives every event
    /// published from now on and unsubscribes itself when dropped.
    pub fn subscribe(&self) -> Subscription {
        let capacity = self.registry.config.queue_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let id = ObserverId::new();
        self.registry.sessions.insert(id, tx);
        debug!(
            group = self.registry.group,
            observer = %id,
            observers = self.registry.sessions.len(),
            "Observer joined"
        );

        Subscription {
            id,
            receiver: rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Remove an observer. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: &ObserverId) -> bool {
        self.registry.remove(id)
    }

    /// Deliver `event` to every registered observer, best-effort.
    pub fn publish(&self, event: &LocationEvent) -> PublishReport {
        let frame: Frame = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(driver_id = %event.driver_id, error = %e, "Failed to encode location event");
                return PublishReport::default();
            }
        };
        self.publish_frame(frame)
    }

    fn publish_frame(&self, frame: Frame) -> PublishReport {
        let registry = &self.registry;
        let mut report = PublishReport::default();

        // Snapshot the senders so no registry shard lock is held while sending.
        let targets: Vec<(ObserverId, mpsc::Sender<Frame>)> = registry
            .sessions
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut evict = Vec::new();
        for (id, tx) in targets {
            match tx.try_send(Arc::clone(&frame)) {
                Ok(()) => report.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => match registry.config.lag_policy {
                    LagPolicy::Disconnect => evict.push(id),
                    LagPolicy::DropNewest => report.dropped += 1,
                },
                Err(mpsc::error::TrySendError::Closed(_)) => evict.push(id),
            }
        }

        for id in evict {
            if registry.remove(&id) {
                report.evicted += 1;
                warn!(group = registry.group, observer = %id, "Evicted lagging or closed observer");
            }
        }

        let counters = &registry.counters;
        counters.published.fetch_add(1, Ordering::Relaxed);
        counters.delivered.fetch_add(report.delivered as u64, Ordering::Relaxed);
        counters.dropped.fetch_add(report.dropped as u64, Ordering::Relaxed);
        counters.evicted.fetch_add(report.evicted as u64, Ordering::Relaxed);

        report
    }

    /// Evict every observer, e.g. on server shutdown. Their receivers drain
    /// what is already queued and then end.
    pub fn close_all(&self) -> usize {
        let ids: Vec<ObserverId> = self.registry.sessions.iter().map(|e| *e.key()).collect();
        let closed = ids.iter().filter(|id| self.registry.remove(id)).count();
        info!(group = self.registry.group, closed, "Closed all observers");
        closed
    }

    pub fn observer_count(&self) -> usize {
        self.registry.sessions.len()
    }

    pub fn is_subscribed(&self, id: &ObserverId) -> bool {
        self.registry.sessions.contains_key(id)
    }

    pub fn stats(&self) -> HubStats {
        let counters = &self.registry.counters;
        HubStats {
            observers: self.observer_count(),
            published: counters.published.load(Ordering::Relaxed),
            delivered: counters.delivered.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            evicted: counters.evicted.load(Ordering::Relaxed),
        }
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

/// A live observer session.
///
/// Frames arrive in publish order. `recv` returns `None` once the session has
/// been evicted or the hub closed it and the queue is drained.
pub struct Subscription {
    id: ObserverId,
    receiver: mpsc::Receiver<Frame>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Frame> {
        self.receiver.recv().await
    }

    /// Non-blocking receive; `None` if nothing is queued right now.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.id);
        }
    }
}
