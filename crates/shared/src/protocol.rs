//! Realtime wire framing.
//!
//! The backend speaks Socket.IO v4 over the Engine.IO v4 WebSocket transport.
//! Only the default namespace and the packet types this client needs are
//! modelled:
//!
//! ```text
//! 0{"sid":..,"pingInterval":..}   engine open (server -> client)
//! 1 / 2 / 3 / 6                    close / ping / pong / noop
//! 40{"token":".."}                 namespace connect with auth (client)
//! 40{"sid":".."}                   connect accepted (server)
//! 41                               namespace disconnect
//! 42["event",payload]              event
//! 44{"message":".."}               connect rejected
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::FrameError;

/// Path of the Socket.IO endpoint relative to the API origin.
pub const SOCKET_IO_PATH: &str = "/socket.io/";
/// Query string selecting Engine.IO v4 over WebSocket only.
pub const SOCKET_IO_QUERY: &str = "EIO=4&transport=websocket";

/// Engine.IO open packet payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
    #[serde(default)]
    pub upgrades: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    /// Namespace connect. Carries the auth object from the client or the
    /// session info from the server.
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, data: Value },
    ConnectError(String),
    /// Packet types this client does not act on (noop, upgrade, acks, binary).
    Ignored,
}

impl Frame {
    pub fn connect_with_token(token: &str) -> Self {
        Frame::Connect(Some(json!({ "token": token })))
    }

    pub fn event(name: impl Into<String>, data: Value) -> Self {
        Frame::Event {
            name: name.into(),
            data,
        }
    }

    /// Decode a text frame.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let engine = text.chars().next().ok_or(FrameError::Empty)?;
        let rest = &text[engine.len_utf8()..];
        match engine {
            '0' => serde_json::from_str(rest)
                .map(Frame::Open)
                .map_err(|e| FrameError::Payload(e.to_string())),
            '1' => Ok(Frame::Close),
            '2' => Ok(Frame::Ping),
            '3' => Ok(Frame::Pong),
            '4' => parse_socket_packet(rest),
            '5' | '6' => Ok(Frame::Ignored),
            other => Err(FrameError::UnknownEngineType(other)),
        }
    }

    /// Encode as a text frame.
    pub fn encode(&self) -> String {
        match self {
            Frame::Open(handshake) => {
                format!("0{}", serde_json::to_string(handshake).unwrap_or_default())
            }
            Frame::Close => "1".to_string(),
            Frame::Ping => "2".to_string(),
            Frame::Pong => "3".to_string(),
            Frame::Connect(None) => "40".to_string(),
            Frame::Connect(Some(auth)) => format!("40{}", auth),
            Frame::Disconnect => "41".to_string(),
            Frame::Event { name, data } => format!("42{}", json!([name, data])),
            Frame::ConnectError(message) => format!("44{}", json!({ "message": message })),
            Frame::Ignored => "6".to_string(),
        }
    }
}

fn parse_socket_packet(rest: &str) -> Result<Frame, FrameError> {
    let kind = rest.chars().next().ok_or(FrameError::Empty)?;
    let mut body = &rest[kind.len_utf8()..];

    // Non-default namespace prefix: "/admin,..."
    if body.starts_with('/') {
        body = match body.find(',') {
            Some(idx) => &body[idx + 1..],
            None => "",
        };
    }

    // Optional ack id
    let ack_digits = body.bytes().take_while(u8::is_ascii_digit).count();
    body = &body[ack_digits..];

    match kind {
        '0' => {
            if body.is_empty() {
                Ok(Frame::Connect(None))
            } else {
                serde_json::from_str(body)
                    .map(|v| Frame::Connect(Some(v)))
                    .map_err(|e| FrameError::Payload(e.to_string()))
            }
        }
        '1' => Ok(Frame::Disconnect),
        '2' => {
            let args: Vec<Value> =
                serde_json::from_str(body).map_err(|e| FrameError::Payload(e.to_string()))?;
            let mut args = args.into_iter();
            let name = match args.next() {
                Some(Value::String(name)) => name,
                _ => return Err(FrameError::Payload("event without a name".to_string())),
            };
            Ok(Frame::Event {
                name,
                data: args.next().unwrap_or(Value::Null),
            })
        }
        '4' => {
            let message = match serde_json::from_str::<Value>(body) {
                Ok(Value::Object(obj)) => obj
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| body.to_string()),
                Ok(Value::String(s)) => s,
                _ => body.to_string(),
            };
            Ok(Frame::ConnectError(message))
        }
        '3' | '5' | '6' => Ok(Frame::Ignored),
        other => Err(FrameError::UnknownSocketType(other)),
    }
}
