use tokio::sync::watch;

use crate::models::event::NotificationEvent;
use crate::models::unread::UnreadState;

/// Client-side unread tracker fed by the notification stream.
///
/// Every mutation goes through the watch channel's `send_modify`, so updates
/// are serialized and observers see each change. The count always starts at
/// zero; it is never hydrated from the server automatically.
pub struct NotificationStore {
    current_user_id: String,
    state: watch::Sender<UnreadState>,
}

impl NotificationStore {
    pub fn new(current_user_id: impl Into<String>) -> Self {
        let (state, _) = watch::channel(UnreadState::default());
        Self {
            current_user_id: current_user_id.into(),
            state,
        }
    }

    pub fn snapshot(&self) -> UnreadState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<UnreadState> {
        self.state.subscribe()
    }

    /// Apply one stream event. Returns whether the unread count changed.
    pub fn on_stream_event(&self, event: &NotificationEvent) -> bool {
        match event {
            NotificationEvent::NewMessage { message } => {
                if message.author_id == self.current_user_id {
                    return false;
                }
                if !message.is_visible_to(&self.current_user_id) {
                    return false;
                }
                self.state.send_modify(UnreadState::increment);
                true
            }
        }
    }

    pub fn mark_as_read(&self) {
        self.state.send_if_modified(|state| {
            let changed = state.has_unread();
            state.reset();
            changed
        });
    }

    /// For callers that learn about unread messages some other way.
    pub fn increment_unread(&self) {
        self.state.send_modify(UnreadState::increment);
    }

    /// Overwrite the count with a value fetched on explicit refresh.
    pub fn apply_unread_count(&self, count: u64) {
        self.state.send_modify(|state| state.set(count));
    }
}
