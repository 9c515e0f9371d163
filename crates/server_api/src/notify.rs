use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use shared::protocol::Toast;
use storage::Storage;
use tokio::sync::broadcast;
use tracing::warn;

/// Fire-and-forget destination for user-facing toasts.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, toast: Toast);
}

/// Persists each toast to the notification log and fans it out to every
/// connected listener. Delivery problems are logged, never returned.
#[derive(Clone)]
pub struct BroadcastSink {
    storage: Storage,
    events: broadcast::Sender<Toast>,
}

impl BroadcastSink {
    pub fn new(storage: Storage, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self { storage, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Toast> {
        self.events.subscribe()
    }
}

#[async_trait]
impl NotificationSink for BroadcastSink {
    async fn notify(&self, toast: Toast) {
        if let Err(error) = self.storage.insert_notification(&toast, Utc::now()).await {
            warn!(%error, "failed to persist notification");
        }
        // No subscribers is fine.
        let _ = self.events.send(toast);
    }
}

#[derive(Default)]
pub struct CollectingSink {
    toasts: Mutex<Vec<Toast>>,
}

impl CollectingSink {
    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl NotificationSink for CollectingSink {
    async fn notify(&self, toast: Toast) {
        self.toasts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(toast);
    }
}

#[cfg(test)]
#[path = "tests/notify_tests.rs"]
mod tests;
