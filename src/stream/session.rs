use std::sync::Arc;

use uuid::Uuid;

use crate::bus::{BusError, EventBus, Subscription};
use crate::models::event::NotificationEvent;
use crate::models::message::Audience;
use crate::stream::buffer::FrameBuffer;
use crate::stream::directory::ChannelDirectory;

/// Lifecycle of a stream. Authentication happens in the request extractor,
/// before a session exists; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Subscribed,
    Streaming,
    Idle,
    Closed,
}

/// A live notification stream for one authenticated user.
///
/// Owns the bus subscription and the per-connection buffer. Dropping the
/// session (client disconnect drops the response body) releases both.
pub struct StreamSession {
    id: Uuid,
    user_id: String,
    buffer: Arc<FrameBuffer>,
    directory: Arc<dyn ChannelDirectory>,
    subscription: Option<Subscription>,
    state: SessionState,
    delivered: u64,
}

impl StreamSession {
    /// Subscribe to `bus` on behalf of `user_id`. Only direct messages
    /// addressed to the user and broadcasts on channels the directory
    /// currently lists them in reach the buffer.
    pub fn open(
        bus: &Arc<EventBus>,
        directory: Arc<dyn ChannelDirectory>,
        user_id: &str,
        buffer_capacity: usize,
    ) -> Result<Self, BusError> {
        let buffer = Arc::new(FrameBuffer::new(buffer_capacity));

        let sink = Arc::clone(&buffer);
        let roster = Arc::clone(&directory);
        let recipient = user_id.to_string();
        let subscription = bus.subscribe_scoped(move |event: &Arc<NotificationEvent>| {
            let message = event.message();
            if !message.is_visible_to(&recipient) {
                return;
            }
            if let Audience::Channel(channel) = message.audience() {
                if !roster.is_member_now(&recipient, channel) {
                    return;
                }
            }
            sink.push(Arc::clone(event));
        })?;

        let id = Uuid::new_v4();
        tracing::info!(session = %id, user_id, "notification stream opened");

        Ok(Self {
            id,
            user_id: user_id.to_string(),
            buffer,
            directory,
            subscription: Some(subscription),
            state: SessionState::Subscribed,
            delivered: 0,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Wait for the next event this user may still see. Returns `None` once
    /// the session is closed.
    pub async fn next_event(&mut self) -> Option<Arc<NotificationEvent>> {
        loop {
            if self.state == SessionState::Closed {
                return None;
            }
            if self.buffer.is_empty() {
                self.state = SessionState::Idle;
            }

            let event = self.buffer.recv().await?;

            if let Audience::Channel(channel) = event.message().audience() {
                if !self.directory.is_member(&self.user_id, channel).await {
                    tracing::debug!(
                        session = %self.id,
                        channel,
                        "skipping broadcast for non-member"
                    );
                    continue;
                }
            }

            self.state = SessionState::Streaming;
            self.delivered += 1;
            return Some(event);
        }
    }

    /// Release the bus subscription and the buffer. Safe to call twice.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.subscription.take();
        self.buffer.close();
        self.state = SessionState::Closed;

        tracing::info!(
            session = %self.id,
            user_id = %self.user_id,
            delivered = self.delivered,
            dropped = self.buffer.dropped(),
            "notification stream closed"
        );
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::Message;
    use crate::stream::directory::{InMemoryDirectory, OpenDirectory};
    use std::time::Duration;

    async fn next(session: &mut StreamSession) -> Option<Arc<NotificationEvent>> {
        tokio::time::timeout(Duration::from_millis(100), session.next_event())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_direct_messages_only_reach_recipient() {
        let bus = Arc::new(EventBus::default());
        let mut u2 = StreamSession::open(&bus, Arc::new(OpenDirectory), "u2", 8).unwrap();
        let mut u3 = StreamSession::open(&bus, Arc::new(OpenDirectory), "u3", 8).unwrap();

        bus.publish(NotificationEvent::new_message(Message::direct("u1", "u2", "hi")));

        let got = next(&mut u2).await.unwrap();
        assert_eq!(got.message().direct_recipient_id.as_deref(), Some("u2"));
        assert_eq!(u2.state(), SessionState::Streaming);
        assert!(next(&mut u3).await.is_none());
    }

    #[tokio::test]
    async fn test_membership_rechecked_at_delivery() {
        let bus = Arc::new(EventBus::default());
        let directory = Arc::new(InMemoryDirectory::new());
        directory.join("c1", "u2");

        let mut session = StreamSession::open(&bus, directory.clone(), "u2", 8).unwrap();
        bus.publish(NotificationEvent::new_message(Message::broadcast("u1", "c1", "first")));
        assert_eq!(next(&mut session).await.unwrap().message().body, "first");

        // Buffered while still a member, removed before delivery
        bus.publish(NotificationEvent::new_message(Message::broadcast("u1", "c1", "second")));
        directory.leave("c1", "u2");
        assert!(next(&mut session).await.is_none());

        bus.publish(NotificationEvent::new_message(Message::broadcast("u1", "c1", "third")));
        assert!(next(&mut session).await.is_none());
    }

    #[tokio::test]
    async fn test_foreign_broadcasts_do_not_evict_direct_messages() {
        let bus = Arc::new(EventBus::default());
        let directory = Arc::new(InMemoryDirectory::new());
        let mut session = StreamSession::open(&bus, directory, "u2", 4).unwrap();

        bus.publish(NotificationEvent::new_message(Message::direct("u1", "u2", "gas leak, 3C")));
        for i in 0..4 {
            bus.publish(NotificationEvent::new_message(Message::broadcast(
                "u1",
                "not-my-channel",
                format!("roster update {}", i),
            )));
        }

        let got = next(&mut session).await.unwrap();
        assert_eq!(got.message().body, "gas leak, 3C");
        assert!(next(&mut session).await.is_none());
    }

    #[tokio::test]
    async fn test_drop_releases_subscription() {
        let bus = Arc::new(EventBus::default());
        let session = StreamSession::open(&bus, Arc::new(OpenDirectory), "u1", 8).unwrap();
        assert_eq!(bus.listener_count(), 1);
        drop(session);
        assert_eq!(bus.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_close_is_terminal() {
        let bus = Arc::new(EventBus::default());
        let mut session = StreamSession::open(&bus, Arc::new(OpenDirectory), "u1", 8).unwrap();
        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(bus.listener_count(), 0);

        bus.publish(NotificationEvent::new_message(Message::broadcast("u2", "c1", "late")));
        assert!(session.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_open_rejected_at_capacity() {
        let bus = Arc::new(EventBus::new(1));
        let _first = StreamSession::open(&bus, Arc::new(OpenDirectory), "u1", 8).unwrap();
        let second = StreamSession::open(&bus, Arc::new(OpenDirectory), "u2", 8);
        assert!(matches!(second, Err(BusError::CapacityExceeded { limit: 1 })));
    }
}
