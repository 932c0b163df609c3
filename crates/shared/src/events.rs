//! Realtime event payloads pushed by the server and actions sent by the client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Inbound event tags, exactly as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewMessage,
    TypingStart,
    TypingEnd,
    UserOnline,
    UserOffline,
    MessageDelivered,
    MessageRead,
    NewBooking,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::NewMessage,
        EventKind::TypingStart,
        EventKind::TypingEnd,
        EventKind::UserOnline,
        EventKind::UserOffline,
        EventKind::MessageDelivered,
        EventKind::MessageRead,
        EventKind::NewBooking,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NewMessage => "new_message",
            EventKind::TypingStart => "typing_start",
            EventKind::TypingEnd => "typing_end",
            EventKind::UserOnline => "user_online",
            EventKind::UserOffline => "user_offline",
            EventKind::MessageDelivered => "message_delivered",
            EventKind::MessageRead => "message_read",
            EventKind::NewBooking => "newBooking",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reads an id that may arrive bare (`"u1"`) or populated
/// (`{"_id": "u1", "fullName": ..}`).
pub fn id_of(value: &Value) -> Option<&str> {
    match value {
        Value::String(id) => Some(id.as_str()),
        Value::Object(fields) => ["_id", "id", "userId"]
            .into_iter()
            .find_map(|key| fields.get(key).and_then(Value::as_str)),
        _ => None,
    }
}

fn str_field<'a>(raw: &'a Value, key: &str) -> Option<&'a str> {
    raw.get(key).and_then(Value::as_str)
}

fn time_field(raw: &Value, key: &str) -> Option<DateTime<Utc>> {
    let text = str_field(raw, key)?;
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// A direct message between two users.
///
/// Holds the payload exactly as the server sent it; the accessors read the
/// fields this client cares about without ever rejecting the message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ChatMessage {
    raw: Value,
}

impl ChatMessage {
    pub fn from_raw(raw: Value) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn into_raw(self) -> Value {
        self.raw
    }

    pub fn id(&self) -> Option<&str> {
        str_field(&self.raw, "_id")
    }

    /// Sender id, whether the server sent it bare or populated.
    pub fn sender_id(&self) -> Option<&str> {
        self.raw.get("senderId").and_then(id_of)
    }

    pub fn receiver_id(&self) -> Option<&str> {
        self.raw.get("receiverId").and_then(id_of)
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.raw.get("conversationId").and_then(id_of)
    }

    pub fn content(&self) -> Option<&str> {
        str_field(&self.raw, "content")
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        time_field(&self.raw, "createdAt")
    }
}

/// A viewing request made by a client against one of an agent's listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct BookingNotice {
    raw: Value,
}

impl BookingNotice {
    pub fn from_raw(raw: Value) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn id(&self) -> Option<&str> {
        self.raw.get("_id").and_then(id_of)
    }

    pub fn agent_id(&self) -> Option<&str> {
        self.raw.get("agentId").and_then(id_of)
    }

    pub fn client_name(&self) -> &str {
        str_field(&self.raw, "clientName").unwrap_or_default()
    }

    pub fn property_title(&self) -> &str {
        str_field(&self.raw, "propertyTitle").unwrap_or_default()
    }

    pub fn viewing_date(&self) -> Option<DateTime<Utc>> {
        time_field(&self.raw, "viewingDate")
    }
}

/// A server-pushed event. Every variant carries the payload unmodified.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    NewMessage(ChatMessage),
    TypingStart(Value),
    TypingEnd(Value),
    UserOnline(Value),
    UserOffline(Value),
    MessageDelivered(Value),
    MessageRead(Value),
    NewBooking(BookingNotice),
}

impl RealtimeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            RealtimeEvent::NewMessage(_) => EventKind::NewMessage,
            RealtimeEvent::TypingStart(_) => EventKind::TypingStart,
            RealtimeEvent::TypingEnd(_) => EventKind::TypingEnd,
            RealtimeEvent::UserOnline(_) => EventKind::UserOnline,
            RealtimeEvent::UserOffline(_) => EventKind::UserOffline,
            RealtimeEvent::MessageDelivered(_) => EventKind::MessageDelivered,
            RealtimeEvent::MessageRead(_) => EventKind::MessageRead,
            RealtimeEvent::NewBooking(_) => EventKind::NewBooking,
        }
    }

    /// Wrap a named event. Returns `None` for event names this client does
    /// not handle; any payload shape is accepted.
    pub fn from_wire(name: &str, data: Value) -> Option<Self> {
        let event = match EventKind::from_wire(name)? {
            EventKind::NewMessage => RealtimeEvent::NewMessage(ChatMessage::from_raw(data)),
            EventKind::TypingStart => RealtimeEvent::TypingStart(data),
            EventKind::TypingEnd => RealtimeEvent::TypingEnd(data),
            EventKind::UserOnline => RealtimeEvent::UserOnline(data),
            EventKind::UserOffline => RealtimeEvent::UserOffline(data),
            EventKind::MessageDelivered => RealtimeEvent::MessageDelivered(data),
            EventKind::MessageRead => RealtimeEvent::MessageRead(data),
            EventKind::NewBooking => RealtimeEvent::NewBooking(BookingNotice::from_raw(data)),
        };
        Some(event)
    }

    /// The payload as received.
    pub fn payload(&self) -> &Value {
        match self {
            RealtimeEvent::NewMessage(message) => message.raw(),
            RealtimeEvent::NewBooking(booking) => booking.raw(),
            RealtimeEvent::TypingStart(data)
            | RealtimeEvent::TypingEnd(data)
            | RealtimeEvent::UserOnline(data)
            | RealtimeEvent::UserOffline(data)
            | RealtimeEvent::MessageDelivered(data)
            | RealtimeEvent::MessageRead(data) => data,
        }
    }
}

/// Outbound actions the client can emit on the realtime connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientAction {
    SendMessage { receiver_id: String, message: Value },
    MarkRead { conversation_id: String, message_id: String },
    TypingStart { receiver_id: String },
    TypingEnd { receiver_id: String },
}

impl ClientAction {
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientAction::SendMessage { .. } => "send_message",
            ClientAction::MarkRead { .. } => "message_read",
            ClientAction::TypingStart { .. } => "typing_start",
            ClientAction::TypingEnd { .. } => "typing_end",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            ClientAction::SendMessage {
                receiver_id,
                message,
            } => json!({ "receiverId": receiver_id, "message": message }),
            ClientAction::MarkRead {
                conversation_id,
                message_id,
            } => json!({ "conversationId": conversation_id, "messageId": message_id }),
            ClientAction::TypingStart { receiver_id } | ClientAction::TypingEnd { receiver_id } => {
                Value::String(receiver_id.clone())
            }
        }
    }
}
