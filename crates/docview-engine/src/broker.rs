//! Progress broker
//!
//! In-memory per-task topics with bounded broadcast buffers. Slow consumers
//! lag and skip the oldest events; publishing never blocks or fails the
//! worker. The most recent event per topic is cached so late subscribers
//! catch up immediately.

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use docview_core::{ProgressEvent, TaskId};

/// Buffered events per topic before the oldest are dropped for laggards.
const TOPIC_CAPACITY: usize = 64;

struct Topic {
    sender: broadcast::Sender<ProgressEvent>,
    last: RwLock<Option<ProgressEvent>>,
}

impl Topic {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(TOPIC_CAPACITY);
        Self {
            sender,
            last: RwLock::new(None),
        }
    }
}

/// Per-task progress topics.
#[derive(Default)]
pub struct ProgressBroker {
    topics: DashMap<TaskId, Topic>,
}

impl ProgressBroker {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
        }
    }

    /// Publish an event to its task topic. Best-effort: an event with no
    /// subscribers is only cached.
    pub fn publish(&self, event: ProgressEvent) {
        let topic = self.topics.entry(event.task_id).or_insert_with(Topic::new);
        *topic.last.write() = Some(event.clone());
        let _ = topic.sender.send(event);
    }

    /// Subscribe to a task topic. Returns the most recent cached event (for
    /// immediate catch-up) and the live receiver.
    pub fn subscribe(
        &self,
        task_id: TaskId,
    ) -> (Option<ProgressEvent>, broadcast::Receiver<ProgressEvent>) {
        let topic = self.topics.entry(task_id).or_insert_with(Topic::new);
        let last = topic.last.read().clone();
        (last, topic.sender.subscribe())
    }

    /// Drop a task topic (document deleted, or retention cleanup).
    pub fn remove(&self, task_id: TaskId) {
        self.topics.remove(&task_id);
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docview_core::DocumentId;

    fn event(task_id: TaskId, progress: u8) -> ProgressEvent {
        ProgressEvent::progress(task_id, DocumentId::new(), progress, "stage")
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let broker = ProgressBroker::new();
        broker.publish(event(TaskId::new(), 10));
        assert_eq!(broker.topic_count(), 1);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let broker = ProgressBroker::new();
        let task_id = TaskId::new();
        let (_, mut rx) = broker.subscribe(task_id);

        broker.publish(event(task_id, 20));
        broker.publish(event(task_id, 30));

        assert_eq!(rx.recv().await.unwrap().progress, 20);
        assert_eq!(rx.recv().await.unwrap().progress, 30);
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_cached_event() {
        let broker = ProgressBroker::new();
        let task_id = TaskId::new();
        broker.publish(event(task_id, 40));

        let (cached, _) = broker.subscribe(task_id);
        assert_eq!(cached.unwrap().progress, 40);
    }

    #[tokio::test]
    async fn test_slow_consumer_drops_oldest() {
        let broker = ProgressBroker::new();
        let task_id = TaskId::new();
        let (_, mut rx) = broker.subscribe(task_id);

        for i in 0..(TOPIC_CAPACITY + 10) {
            broker.publish(event(task_id, (i % 100) as u8));
        }

        // The receiver lagged: the first recv reports the overrun, later
        // receives resume with the surviving events.
        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(skipped)) => assert!(skipped >= 10),
            other => panic!("expected lag, got {:?}", other),
        }
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_remove_topic() {
        let broker = ProgressBroker::new();
        let task_id = TaskId::new();
        broker.publish(event(task_id, 10));
        broker.remove(task_id);
        assert_eq!(broker.topic_count(), 0);

        let (cached, _) = broker.subscribe(task_id);
        assert!(cached.is_none());
    }
}
