//! Host runtime domain types
//!
//! These mirror what the chatbot runtime passes to its event hooks. Only the
//! attributes analytics cares about are modelled; everything is optional or
//! defaulted so partial payloads still deserialize.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A conversation participant as known to the host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Subscriber {
    /// Internal subscriber id
    pub id: String,
    /// Id assigned by the messaging channel
    pub foreign_id: String,
    pub first_name: String,
    pub last_name: String,
    /// Stored ISO language code
    pub language: Option<String>,
    /// Channel the subscriber talks through
    pub channel: Option<String>,
    /// When the subscriber was assigned to a human agent
    pub assigned_at: Option<DateTime<Utc>>,
}

impl Subscriber {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = first.into();
        self.last_name = last.into();
        self
    }

    pub fn with_foreign_id(mut self, foreign_id: impl Into<String>) -> Self {
        self.foreign_id = foreign_id.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_assigned_at(mut self, at: DateTime<Utc>) -> Self {
        self.assigned_at = Some(at);
        self
    }
}

/// An entity detected by the NLP engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NlpEntity {
    pub entity: String,
    pub value: String,
}

impl NlpEntity {
    pub fn new(entity: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            value: value.into(),
        }
    }
}

/// Postback payload attached to an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Text(String),
    Structured(serde_json::Value),
}

impl Payload {
    /// Textual form: text verbatim, structured payloads as compact JSON
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(value) => value.to_string(),
        }
    }
}

/// A message event flowing through a channel handler
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelEvent {
    /// Name of the channel handler that produced the event
    pub channel: Option<String>,
    /// Sender (incoming) or recipient (outgoing)
    pub subscriber: Subscriber,
    pub payload: Option<Payload>,
    pub nlp: Vec<NlpEntity>,
}

impl ChannelEvent {
    pub fn new(subscriber: Subscriber) -> Self {
        Self {
            subscriber,
            ..Default::default()
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_entity(mut self, entity: NlpEntity) -> Self {
        self.nlp.push(entity);
        self
    }
}

/// A conversation block (one step of a flow)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Block {
    pub name: String,
    /// Whether triggering this block opens a new conversation
    pub starts_conversation: bool,
}

impl Block {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn starting(mut self) -> Self {
        self.starts_conversation = true;
        self
    }
}

/// State of the conversation a block runs in
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationContext {
    /// Retry counter of the current block
    pub attempt: i64,
    pub channel: Option<String>,
    pub user: Option<Subscriber>,
}

/// Kinds of aggregate statistics the host records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    AllMessages,
    Incoming,
    Outgoing,
    NewUsers,
    ReturningUsers,
    Retention,
    NewConversations,
    Popular,
    Echo,
}

impl StatKind {
    /// Only user-acquisition stats are turned into points
    pub fn is_tracked(&self) -> bool {
        matches!(self, Self::NewUsers | Self::ReturningUsers)
    }
}

impl std::fmt::Display for StatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllMessages => write!(f, "all_messages"),
            Self::Incoming => write!(f, "incoming"),
            Self::Outgoing => write!(f, "outgoing"),
            Self::NewUsers => write!(f, "new_users"),
            Self::ReturningUsers => write!(f, "returning_users"),
            Self::Retention => write!(f, "retention"),
            Self::NewConversations => write!(f, "new_conversations"),
            Self::Popular => write!(f, "popular"),
            Self::Echo => write!(f, "echo"),
        }
    }
}
