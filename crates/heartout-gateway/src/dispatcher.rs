use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use heartout_types::events::ServerEvent;

/// Fans events out to every connected socket and tracks who is reading what.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for server events. Every connected socket receives every event.
    broadcast_tx: broadcast::Sender<ServerEvent>,

    /// story_id -> connections currently reading it
    readers: RwLock<HashMap<i64, HashSet<Uuid>>>,

    /// Open connections
    connections: RwLock<HashSet<Uuid>>,
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
                readers: RwLock::new(HashMap::new()),
                connections: RwLock::new(HashSet::new()),
            }),
        }
    }

    /// Subscribe to server events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients. Dropped silently when nobody listens.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a new connection and return its id.
    pub async fn connect(&self) -> Uuid {
        let conn_id = Uuid::new_v4();
        self.inner.connections.write().await.insert(conn_id);
        conn_id
    }

    /// Add the connection to the story's reader set. Returns the reader count.
    pub async fn join_story(&self, conn_id: Uuid, story_id: i64) -> usize {
        let mut readers = self.inner.readers.write().await;
        let set = readers.entry(story_id).or_default();
        set.insert(conn_id);
        set.len()
    }

    /// Remove the connection from the story's reader set.
    /// Returns the new count, or `None` if the connection was not reading it.
    pub async fn leave_story(&self, conn_id: Uuid, story_id: i64) -> Option<usize> {
        let mut readers = self.inner.readers.write().await;
        let set = readers.get_mut(&story_id)?;
        if !set.remove(&conn_id) {
            return None;
        }
        let count = set.len();
        if count == 0 {
            readers.remove(&story_id);
        }
        Some(count)
    }

    /// Forget the connection everywhere. Returns the updated count of every
    /// story it was reading.
    pub async fn disconnect(&self, conn_id: Uuid) -> Vec<(i64, usize)> {
        self.inner.connections.write().await.remove(&conn_id);

        let mut readers = self.inner.readers.write().await;
        let mut changed = Vec::new();
        readers.retain(|&story_id, set| {
            if set.remove(&conn_id) {
                changed.push((story_id, set.len()));
            }
            !set.is_empty()
        });
        changed.sort_unstable();
        changed
    }

    pub async fn reader_count(&self, story_id: i64) -> usize {
        self.inner
            .readers
            .read()
            .await
            .get(&story_id)
            .map_or(0, HashSet::len)
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn joining_twice_counts_once() {
        let dispatcher = Dispatcher::new();
        let conn = dispatcher.connect().await;

        assert_eq!(dispatcher.join_story(conn, 42).await, 1);
        assert_eq!(dispatcher.join_story(conn, 42).await, 1);
        assert_eq!(dispatcher.reader_count(42).await, 1);
    }

    #[tokio::test]
    async fn leave_drops_empty_sets() {
        let dispatcher = Dispatcher::new();
        let a = dispatcher.connect().await;
        let b = dispatcher.connect().await;

        dispatcher.join_story(a, 7).await;
        assert_eq!(dispatcher.join_story(b, 7).await, 2);
        assert_eq!(dispatcher.leave_story(a, 7).await, Some(1));
        assert_eq!(dispatcher.leave_story(a, 7).await, None);
        assert_eq!(dispatcher.leave_story(b, 7).await, Some(0));
        assert_eq!(dispatcher.reader_count(7).await, 0);
        assert_eq!(dispatcher.leave_story(b, 7).await, None);
    }

    #[tokio::test]
    async fn disconnect_reports_every_story_left() {
        let dispatcher = Dispatcher::new();
        let a = dispatcher.connect().await;
        let b = dispatcher.connect().await;

        dispatcher.join_story(a, 1).await;
        dispatcher.join_story(a, 2).await;
        dispatcher.join_story(b, 2).await;
        assert_eq!(dispatcher.connection_count().await, 2);

        let changed = dispatcher.disconnect(a).await;
        assert_eq!(changed, vec![(1, 0), (2, 1)]);
        assert_eq!(dispatcher.connection_count().await, 1);
        assert_eq!(dispatcher.reader_count(1).await, 0);
        assert!(dispatcher.disconnect(a).await.is_empty());
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let dispatcher = Dispatcher::new();
        let mut rx1 = dispatcher.subscribe();
        let mut rx2 = dispatcher.subscribe();

        dispatcher.broadcast(ServerEvent::ReaderCount { story_id: 3, count: 1 });

        assert_eq!(rx1.recv().await.unwrap().story_id(), Some(3));
        assert_eq!(rx2.recv().await.unwrap().story_id(), Some(3));
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_is_a_no_op() {
        Dispatcher::new().broadcast(ServerEvent::Pong);
    }
}
