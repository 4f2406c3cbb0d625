use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use bento_types::events::FeedEvent;

/// Fans audit events out to every connected realtime subscriber.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for feed events; every subscriber receives every event
    broadcast_tx: broadcast::Sender<FeedEvent>,

    /// Live feed connections: conn_id -> peer label
    connections: RwLock<HashMap<Uuid, String>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to feed events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all subscribers. Returns how many received it.
    pub fn broadcast(&self, event: FeedEvent) -> usize {
        self.inner.broadcast_tx.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.broadcast_tx.receiver_count()
    }

    /// Track a new feed connection. Returns its conn_id.
    pub async fn register(&self, peer: String) -> Uuid {
        let conn_id = Uuid::new_v4();
        self.inner.connections.write().await.insert(conn_id, peer);
        conn_id
    }

    pub async fn unregister(&self, conn_id: Uuid) -> Option<String> {
        self.inner.connections.write().await.remove(&conn_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bento_types::models::Verdict;
    use chrono::Utc;

    fn insert_event() -> FeedEvent {
        FeedEvent::AuditLogInsert {
            id: Uuid::new_v4(),
            verdict: Verdict::Valid,
            source: "web-dashboard".into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let dispatcher = Dispatcher::new();
        let mut a = dispatcher.subscribe();
        let mut b = dispatcher.subscribe();

        assert_eq!(dispatcher.broadcast(insert_event()), 2);
        assert!(matches!(a.recv().await.unwrap(), FeedEvent::AuditLogInsert { .. }));
        assert!(matches!(b.recv().await.unwrap(), FeedEvent::AuditLogInsert { .. }));
    }

    #[test]
    fn broadcast_without_subscribers_is_dropped() {
        let dispatcher = Dispatcher::new();
        assert_eq!(dispatcher.broadcast(insert_event()), 0);
        assert_eq!(dispatcher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn tracks_connections() {
        let dispatcher = Dispatcher::new();
        let id = dispatcher.register("127.0.0.1:5000".into()).await;
        assert_eq!(dispatcher.connection_count().await, 1);
        assert_eq!(dispatcher.unregister(id).await.as_deref(), Some("127.0.0.1:5000"));
        assert_eq!(dispatcher.connection_count().await, 0);
    }
}
