//! Wire protocol between clients and the relay.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.
//! Events without a payload omit `data`. Client frames decode into
//! [`ClientIntent`]; the relay emits [`ServerEvent`].

use serde::{Deserialize, Serialize};

use crate::chat::ChatMessage;

/// Client-originated request to the broadcast engine.
///
/// Connection close is not a wire frame; the transport reports it to the
/// engine directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientIntent {
    /// Ask for the most recent messages, delivered as a `history` event.
    RequestHistory,
    /// Post a chat message to everyone.
    Send { author: String, body: String },
    /// The author started typing.
    TypingStart { author: String },
    /// The author stopped typing.
    TypingStop { author: String },
    /// Keep-alive. Answered with `pong`.
    Ping,
}

impl ClientIntent {
    /// Wire name of the intent, used as a log field.
    pub fn name(&self) -> &'static str {
        match self {
            ClientIntent::RequestHistory => "requestHistory",
            ClientIntent::Send { .. } => "send",
            ClientIntent::TypingStart { .. } => "typingStart",
            ClientIntent::TypingStop { .. } => "typingStop",
            ClientIntent::Ping => "ping",
        }
    }
}

/// Server-originated notification delivered to one or more connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Recent messages, chronological, to the requester only.
    History { messages: Vec<ChatMessage> },
    /// A persisted message, to every session including the sender.
    NewMessage(ChatMessage),
    /// Someone else started typing.
    UserTyping { author: String },
    /// Someone else stopped typing.
    UserStopTyping { author: String },
    /// Reply to `ping`.
    Pong,
    /// An intent from this connection was rejected or failed.
    Error { code: String, message: String },
}

impl ServerEvent {
    /// Wire name of the event, used as a log field.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::History { .. } => "history",
            ServerEvent::NewMessage(_) => "newMessage",
            ServerEvent::UserTyping { .. } => "userTyping",
            ServerEvent::UserStopTyping { .. } => "userStopTyping",
            ServerEvent::Pong => "pong",
            ServerEvent::Error { .. } => "error",
        }
    }
}
