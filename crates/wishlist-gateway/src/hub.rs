use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use wishlist_types::models::WishlistSnapshot;

/// Produces the snapshot of a list as one particular viewer may see it.
pub trait SnapshotSource: Send + Sync {
    /// `Ok(None)` means the list no longer exists.
    fn snapshot(&self, share_id: &str, viewer_id: i64) -> anyhow::Result<Option<WishlistSnapshot>>;
}

/// Notified after every committed change to a list.
pub trait Publisher: Send + Sync {
    /// `origin_id` is the user whose request caused the change.
    fn publish(&self, share_id: &str, origin_id: i64);
}

/// A rendered snapshot tagged with the publish that produced it.
#[derive(Debug, Clone)]
struct Frame {
    seq: u64,
    json: String,
}

struct Subscriber {
    viewer_id: i64,
    tx: watch::Sender<Option<Frame>>,
}

/// Handle returned to a live-view connection when it joins a list.
///
/// Only the newest snapshot is kept: a connection that falls behind skips
/// straight to the latest state instead of queueing every intermediate one.
pub struct Subscription {
    pub conn_id: Uuid,
    rx: watch::Receiver<Option<Frame>>,
}

impl Subscription {
    /// Wait for the next snapshot. `None` once the hub has dropped this connection.
    pub async fn next(&mut self) -> Option<String> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(json) = self.take() {
                return Some(json);
            }
        }
    }

    /// The snapshot published since the last call, if any.
    pub fn try_next(&mut self) -> Option<String> {
        match self.rx.has_changed() {
            Ok(true) => self.take(),
            _ => None,
        }
    }

    fn take(&mut self) -> Option<String> {
        self.rx.borrow_and_update().as_ref().map(|frame| frame.json.clone())
    }
}

/// Registry of live viewers, keyed by share id, that fans out JSON snapshots.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    source: Arc<dyn SnapshotSource>,

    /// share_id -> (conn_id -> subscriber). Lists with no viewers have no entry.
    lists: RwLock<HashMap<String, HashMap<Uuid, Subscriber>>>,

    /// Taken at the start of every publish, before anything is read.
    next_seq: AtomicU64,
}

impl Hub {
    pub fn new(source: Arc<dyn SnapshotSource>) -> Self {
        Self {
            inner: Arc::new(HubInner {
                source,
                lists: RwLock::new(HashMap::new()),
                next_seq: AtomicU64::new(1),
            }),
        }
    }

    /// Register a connection for `share_id`. Snapshots arrive on the returned subscription.
    pub fn subscribe(&self, share_id: &str, viewer_id: i64) -> Subscription {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = watch::channel(None);

        self.inner
            .lists
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(share_id.to_string())
            .or_default()
            .insert(conn_id, Subscriber { viewer_id, tx });

        Subscription { conn_id, rx }
    }

    /// Remove a connection. The list's entry goes with its last connection.
    /// Returns whether the connection was registered.
    pub fn unsubscribe(&self, share_id: &str, conn_id: Uuid) -> bool {
        let mut lists = self
            .inner
            .lists
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let Some(connections) = lists.get_mut(share_id) else {
            return false;
        };
        let removed = connections.remove(&conn_id).is_some();
        if connections.is_empty() {
            lists.remove(share_id);
        }
        removed
    }

    pub fn subscriber_count(&self, share_id: &str) -> usize {
        self.inner
            .lists
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(share_id)
            .map_or(0, HashMap::len)
    }

    /// Number of share ids with at least one live connection.
    pub fn list_count(&self) -> usize {
        self.inner
            .lists
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn render(&self, share_id: &str, viewer_id: i64) -> Option<String> {
        match self.inner.source.snapshot(share_id, viewer_id) {
            Ok(Some(snapshot)) => match serde_json::to_string(&snapshot) {
                Ok(json) => Some(json),
                Err(e) => {
                    warn!("Failed to encode snapshot of {} for {}: {}", share_id, viewer_id, e);
                    None
                }
            },
            Ok(None) => {
                debug!("List {} is gone, nothing to publish", share_id);
                None
            }
            Err(e) => {
                warn!("Failed to assemble snapshot of {} for {}: {:#}", share_id, viewer_id, e);
                None
            }
        }
    }
}

impl Publisher for Hub {
    /// Deliver a fresh snapshot to every connection on `share_id`, each scoped
    /// to that connection's viewer. Connections whose receiver is gone are
    /// dropped from the registry.
    ///
    /// Concurrent publishes on one list may finish in any order. A frame never
    /// replaces one from a later publish, so the last frame a connection holds
    /// was rendered after the last committed change.
    fn publish(&self, share_id: &str, origin_id: i64) {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);

        // Copy targets out so no lock is held while snapshots are assembled.
        let targets: Vec<(Uuid, i64, watch::Sender<Option<Frame>>)> = {
            let lists = self
                .inner
                .lists
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            match lists.get(share_id) {
                Some(connections) => connections
                    .iter()
                    .map(|(conn_id, sub)| (*conn_id, sub.viewer_id, sub.tx.clone()))
                    .collect(),
                None => return,
            }
        };

        // Viewers with several tabs open share one rendering.
        let mut rendered: HashMap<i64, Option<String>> = HashMap::new();
        let mut delivered = 0usize;
        let mut superseded = 0usize;
        let mut closed = Vec::new();

        for (conn_id, viewer_id, tx) in targets {
            if tx.is_closed() {
                closed.push(conn_id);
                continue;
            }
            let payload = rendered
                .entry(viewer_id)
                .or_insert_with(|| self.render(share_id, viewer_id));
            let Some(payload) = payload else {
                continue;
            };
            let replaced = tx.send_if_modified(|current| {
                if current.as_ref().is_some_and(|frame| frame.seq > seq) {
                    return false;
                }
                *current = Some(Frame {
                    seq,
                    json: payload.clone(),
                });
                true
            });
            if replaced {
                delivered += 1;
            } else {
                superseded += 1;
            }
        }

        for conn_id in closed {
            debug!("Dropping closed connection {} from {}", conn_id, share_id);
            self.unsubscribe(share_id, conn_id);
        }

        debug!(
            "Published {} #{} (changed by {}) to {} connections, {} already newer",
            share_id, seq, origin_id, delivered, superseded
        );
    }
}
