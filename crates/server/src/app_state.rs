use std::sync::Arc;

use server_api::{ApiContext, BroadcastSink, NotificationSink};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    pub(crate) notifications: BroadcastSink,
}

impl AppState {
    pub(crate) fn new(api: ApiContext, notification_buffer: usize) -> Self {
        let notifications = BroadcastSink::new(api.storage.clone(), notification_buffer);
        Self { api, notifications }
    }

    pub(crate) fn sink(&self) -> Arc<dyn NotificationSink> {
        Arc::new(self.notifications.clone())
    }
}
