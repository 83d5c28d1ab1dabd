use super::schema::FileStatus;
use tokio::sync::broadcast;

/// Default number of events a slow subscriber may fall behind by.
const CHANNEL_CAPACITY: usize = 64;

/// A mutation of the record store or the comparison cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    RecordCreated { id: String },
    RecordUpdated { id: String, status: FileStatus },
    RecordDeleted { id: String },
    RecordsCleared,
    ComparisonCached { key: String },
    ComparisonCacheCleared,
}

/// Fan-out of store mutations to any number of subscribers.
///
/// Publishing never blocks and never fails; with no subscribers the event is
/// dropped. A subscriber that lags past the channel capacity receives
/// `RecvError::Lagged` and should re-read the store.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: StoreEvent) {
        tracing::trace!(?event, "store event");
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
