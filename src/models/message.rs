use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("message must target exactly one of channelId or directRecipientId")]
    AmbiguousTarget,

    #[error("message body is empty")]
    EmptyBody,
}

/// Who a message is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience<'a> {
    /// Broadcast to every member of a channel.
    Channel(&'a str),
    /// Direct message to exactly one user.
    Direct(&'a str),
}

/// A chat message as seen by the notification pipeline.
///
/// Messages are append-only: once published they travel through the bus
/// behind an `Arc` and are never mutated. Exactly one of `channel_id` and
/// `direct_recipient_id` is set; the constructors and the deserializer both
/// enforce it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawMessage")]
pub struct Message {
    pub id: Uuid,
    pub author_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_recipient_id: Option<String>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn broadcast(
        author_id: impl Into<String>,
        channel_id: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            author_id: author_id.into(),
            channel_id: Some(channel_id.into()),
            direct_recipient_id: None,
            body: body.into(),
            created_at: Utc::now(),
        }
    }

    pub fn direct(
        author_id: impl Into<String>,
        recipient_id: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            author_id: author_id.into(),
            channel_id: None,
            direct_recipient_id: Some(recipient_id.into()),
            body: body.into(),
            created_at: Utc::now(),
        }
    }

    /// Build a message from a client-submitted draft, authored by `author_id`.
    pub fn from_draft(author_id: &str, draft: MessageDraft) -> Result<Self, MessageError> {
        if draft.body.trim().is_empty() {
            return Err(MessageError::EmptyBody);
        }
        match (draft.channel_id, draft.direct_recipient_id) {
            (Some(channel), None) => Ok(Self::broadcast(author_id, channel, draft.body)),
            (None, Some(recipient)) => Ok(Self::direct(author_id, recipient, draft.body)),
            _ => Err(MessageError::AmbiguousTarget),
        }
    }

    pub fn audience(&self) -> Audience<'_> {
        match (&self.channel_id, &self.direct_recipient_id) {
            (Some(channel), _) => Audience::Channel(channel),
            (None, Some(recipient)) => Audience::Direct(recipient),
            // unreachable through the public constructors or the deserializer
            (None, None) => Audience::Direct(""),
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.channel_id.is_some()
    }

    /// Whether `user_id` is an eligible recipient: any broadcast, or a
    /// direct message addressed to them.
    pub fn is_visible_to(&self, user_id: &str) -> bool {
        match self.audience() {
            Audience::Channel(_) => true,
            Audience::Direct(recipient) => recipient == user_id,
        }
    }
}

/// Request body for publishing a message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    pub channel_id: Option<String>,
    pub direct_recipient_id: Option<String>,
    pub body: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    id: Uuid,
    author_id: String,
    channel_id: Option<String>,
    direct_recipient_id: Option<String>,
    body: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<RawMessage> for Message {
    type Error = MessageError;

    fn try_from(raw: RawMessage) -> Result<Self, Self::Error> {
        if raw.channel_id.is_some() == raw.direct_recipient_id.is_some() {
            return Err(MessageError::AmbiguousTarget);
        }
        Ok(Self {
            id: raw.id,
            author_id: raw.author_id,
            channel_id: raw.channel_id,
            direct_recipient_id: raw.direct_recipient_id,
            body: raw.body,
            created_at: raw.created_at,
        })
    }
}
