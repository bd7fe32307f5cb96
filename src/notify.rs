//! Notification bridge between the scheduler and its observers.
//!
//! Every persisted queue mutation is published as a full [`QueueItem`]
//! snapshot. Snapshots travel over an unbounded channel to a forwarding task
//! that calls each registered listener in registration order, so publishing
//! never blocks a worker and nothing is dropped: terminal transitions always
//! reach listeners that were registered when they were published.
//!
//! Delivery is at-least-once and may be redundant (a listener can see the
//! same status twice). Listeners run on the bridge's task; a listener that
//! needs another thread (a UI loop, say) forwards from there itself.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::queue::QueueItem;

/// Receives queue item snapshots.
pub trait ItemListener: Send + Sync + 'static {
    /// Called once per published snapshot.
    fn on_item_changed(&self, item: &QueueItem);
}

impl<F> ItemListener for F
where
    F: Fn(&QueueItem) + Send + Sync + 'static,
{
    fn on_item_changed(&self, item: &QueueItem) {
        self(item);
    }
}

/// Handle returned by [`NotificationBridge::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

enum Envelope {
    Item(Box<QueueItem>),
    Flush(oneshot::Sender<()>),
}

type ListenerList = Arc<RwLock<Vec<(SubscriptionId, Arc<dyn ItemListener>)>>>;

/// Fans queue snapshots out to listeners.
///
/// Must be created inside a Tokio runtime; the forwarding task stops once
/// the bridge is dropped and its backlog is delivered.
pub struct NotificationBridge {
    tx: mpsc::UnboundedSender<Envelope>,
    listeners: ListenerList,
    next_id: AtomicU64,
}

impl std::fmt::Debug for NotificationBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBridge")
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}

impl NotificationBridge {
    /// Creates a bridge and spawns its forwarding task.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let listeners: ListenerList = Arc::new(RwLock::new(Vec::new()));
        tokio::spawn(forward(rx, Arc::clone(&listeners)));
        Self {
            tx,
            listeners,
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a listener for all snapshots published from now on.
    pub fn subscribe(&self, listener: impl ItemListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    /// Registers a channel that receives a clone of every snapshot.
    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<QueueItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(move |item: &QueueItem| {
            let _ = tx.send(item.clone());
        });
        (id, rx)
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Queues a snapshot for delivery.
    pub fn publish(&self, item: &QueueItem) {
        if self.tx.send(Envelope::Item(Box::new(item.clone()))).is_err() {
            debug!(item_id = %item.id, "notification task stopped; snapshot dropped");
        }
    }

    /// Waits until every snapshot published before this call was delivered.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Envelope::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

impl Default for NotificationBridge {
    fn default() -> Self {
        Self::new()
    }
}

async fn forward(mut rx: mpsc::UnboundedReceiver<Envelope>, listeners: ListenerList) {
    while let Some(envelope) = rx.recv().await {
        match envelope {
            Envelope::Item(item) => {
                let snapshot: Vec<_> = listeners
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .iter()
                    .map(|(_, listener)| Arc::clone(listener))
                    .collect();
                for listener in snapshot {
                    let delivered =
                        catch_unwind(AssertUnwindSafe(|| listener.on_item_changed(&item)));
                    if delivered.is_err() {
                        warn!(item_id = %item.id, "item listener panicked; continuing");
                    }
                }
            }
            Envelope::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}
