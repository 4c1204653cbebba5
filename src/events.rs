//! Typed change notifications published by the record store.

use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeEvent {
    TaskCreated(u64),
    TaskUpdated(u64),
    TaskDeleted(u64),
    CategoryCreated(u64),
    CategoryUpdated(u64),
    CategoryDeleted(u64),
    SessionChanged,
    Seeded,
    /// The persisted data was modified by another process.
    External,
}

impl ChangeEvent {
    pub fn touches_tasks(&self) -> bool {
        matches!(
            self,
            ChangeEvent::TaskCreated(_)
                | ChangeEvent::TaskUpdated(_)
                | ChangeEvent::TaskDeleted(_)
                | ChangeEvent::Seeded
                | ChangeEvent::External
        )
    }
}

#[derive(Clone, Debug)]
pub struct ChangeBus {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: ChangeEvent) {
        // No subscribers is the common case for one-shot CLI calls.
        if self.sender.send(event).is_err() {
            tracing::trace!(?event, "change event dropped, no subscribers");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = ChangeBus::new();
        bus.publish(ChangeEvent::TaskCreated(1));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn subscribers_receive_events_in_order() {
        let bus = ChangeBus::new();
        let mut rx = bus.subscribe();
        bus.publish(ChangeEvent::TaskCreated(1));
        bus.publish(ChangeEvent::TaskDeleted(1));

        assert_eq!(rx.try_recv().unwrap(), ChangeEvent::TaskCreated(1));
        assert_eq!(rx.try_recv().unwrap(), ChangeEvent::TaskDeleted(1));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn category_events_do_not_touch_tasks() {
        assert!(!ChangeEvent::CategoryUpdated(2).touches_tasks());
        assert!(!ChangeEvent::SessionChanged.touches_tasks());
        assert!(ChangeEvent::External.touches_tasks());
    }
}
