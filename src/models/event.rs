use serde::{Deserialize, Serialize};

use super::message::Message;

/// An event fanned out by the bus and pushed to notification streams.
///
/// Serialized with an internal `type` tag, e.g.
/// `{"type":"newMessage","message":{...}}`. New variants are additive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NotificationEvent {
    NewMessage { message: Message },
}

impl NotificationEvent {
    pub fn new_message(message: Message) -> Self {
        Self::NewMessage { message }
    }

    /// Event type identifier as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NewMessage { .. } => "newMessage",
        }
    }

    pub fn message(&self) -> &Message {
        match self {
            Self::NewMessage { message } => message,
        }
    }
}
