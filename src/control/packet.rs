//! Engine.IO v4 / Socket.IO v5 text packet codec.
//!
//! Only the default namespace and text packets are used by the service. A
//! Socket.IO packet travels inside an Engine.IO `message` packet, so an event
//! looks like `42["processed_chunk",{"data":"..."}]`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Result, StreamError};

/// Payload of the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

/// One decoded packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Engine.IO handshake (`0{...}`)
    Open(OpenInfo),
    /// Engine.IO close (`1`)
    Close,
    /// Engine.IO heartbeat from the server (`2`)
    Ping,
    /// Heartbeat reply (`3`)
    Pong,
    /// Engine.IO no-op (`6`)
    Noop,
    /// Socket.IO namespace connect (`40`), with the server's auth payload on reply
    Connect(Option<Value>),
    /// Socket.IO namespace disconnect (`41`)
    Disconnect,
    /// Socket.IO event (`42["name",data]`)
    Event { name: String, data: Value },
    /// Socket.IO acknowledgement (`43`); contents are not used
    Ack,
    /// Socket.IO namespace refusal (`44{...}`)
    ConnectError(Value),
}

impl Packet {
    pub fn event(name: impl Into<String>, data: Value) -> Self {
        Packet::Event { name: name.into(), data }
    }

    /// Decode one WebSocket text frame.
    pub fn parse(text: &str) -> Result<Packet> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or_else(|| StreamError::protocol("empty packet"))?;
        let rest = chars.as_str();

        match kind {
            '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping),
            '3' => Ok(Packet::Pong),
            '4' => Self::parse_socket(rest),
            '6' => Ok(Packet::Noop),
            '5' => Err(StreamError::protocol("transport upgrade is not supported")),
            other => Err(StreamError::protocol(format!("unknown packet type '{}'", other))),
        }
    }

    fn parse_socket(text: &str) -> Result<Packet> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or_else(|| StreamError::protocol("empty message packet"))?;
        let mut rest = chars.as_str();

        // "/namespace," prefix; only the default namespace is joined
        if rest.starts_with('/') {
            rest = rest.split_once(',').map(|(_, tail)| tail).unwrap_or("");
        }
        // acknowledgement id
        rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());

        match kind {
            '0' if rest.is_empty() => Ok(Packet::Connect(None)),
            '0' => Ok(Packet::Connect(Some(serde_json::from_str(rest)?))),
            '1' => Ok(Packet::Disconnect),
            '2' => {
                let mut args: Vec<Value> = serde_json::from_str(rest)?;
                if args.is_empty() {
                    return Err(StreamError::protocol("event without a name"));
                }
                let name = match args.remove(0) {
                    Value::String(name) => name,
                    other => {
                        return Err(StreamError::protocol(format!("event name is not a string: {}", other)));
                    }
                };
                let data = if args.is_empty() { Value::Null } else { args.remove(0) };
                Ok(Packet::Event { name, data })
            }
            '3' => Ok(Packet::Ack),
            '4' if rest.is_empty() => Ok(Packet::ConnectError(Value::Null)),
            '4' => Ok(Packet::ConnectError(serde_json::from_str(rest)?)),
            '5' | '6' => Err(StreamError::protocol("binary packets are not supported")),
            other => Err(StreamError::protocol(format!("unknown message type '{}'", other))),
        }
    }

    /// Encode as a WebSocket text frame.
    pub fn encode(&self) -> String {
        match self {
            Packet::Open(info) => format!("0{}", serde_json::to_string(info).unwrap_or_default()),
            Packet::Close => "1".to_string(),
            Packet::Ping => "2".to_string(),
            Packet::Pong => "3".to_string(),
            Packet::Noop => "6".to_string(),
            Packet::Connect(None) => "40".to_string(),
            Packet::Connect(Some(data)) => format!("40{}", data),
            Packet::Disconnect => "41".to_string(),
            Packet::Event { name, data } => {
                let args = if data.is_null() {
                    Value::Array(vec![Value::String(name.clone())])
                } else {
                    Value::Array(vec![Value::String(name.clone()), data.clone()])
                };
                format!("42{}", args)
            }
            Packet::Ack => "43[]".to_string(),
            Packet::ConnectError(data) => format!("44{}", data),
        }
    }
}
