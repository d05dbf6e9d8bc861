//! Text framing for Socket.IO v5 carried over the Engine.IO v4 websocket transport.
//!
//! Every websocket text frame is one Engine.IO packet: a single type digit followed by
//! its data. Engine.IO `message` packets (`4`) wrap one Socket.IO packet, which is again a
//! type digit, an optional `/namespace,` prefix, an optional ack id, then a JSON payload.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use snafu::{OptionExt, ResultExt, ensure};

use super::error::{
    ChannelResult, EmptyPacketSnafu, MalformedPayloadSnafu, UnknownPacketTypeSnafu,
    UnsupportedBinaryPacketSnafu,
};

pub const ENGINE_IO_PROTOCOL: u8 = 4;
pub const DEFAULT_NAMESPACE: &str = "/";

const DEFAULT_PING_INTERVAL_MS: u64 = 25_000;
const DEFAULT_PING_TIMEOUT_MS: u64 = 20_000;

/// Payload of the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

impl OpenHandshake {
    /// Longest silence tolerated before the relay counts as gone.
    pub fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        payload: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        ack_id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        ack_id: Option<u64>,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        message: String,
    },
}

impl EnginePacket {
    pub fn parse(frame: &str) -> ChannelResult<Self> {
        let mut chars = frame.chars();
        let kind = chars.next().context(EmptyPacketSnafu {
            stage: "parse-engine-packet",
        })?;
        let data = chars.as_str();

        let packet = match kind {
            '0' => Self::Open(serde_json::from_str(data).context(MalformedPayloadSnafu {
                stage: "parse-engine-open",
            })?),
            '1' => Self::Close,
            '2' => Self::Ping(data.to_string()),
            '3' => Self::Pong(data.to_string()),
            '4' => Self::Message(SocketPacket::parse(data)?),
            '5' => Self::Upgrade,
            '6' => Self::Noop,
            _ => {
                return UnknownPacketTypeSnafu {
                    stage: "parse-engine-packet",
                    layer: "engine.io",
                    raw: frame.to_string(),
                }
                .fail();
            }
        };

        Ok(packet)
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Open(_) => "0".to_string(),
            Self::Close => "1".to_string(),
            Self::Ping(data) => format!("2{data}"),
            Self::Pong(data) => format!("3{data}"),
            Self::Message(packet) => format!("4{}", packet.encode()),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }
}

impl SocketPacket {
    pub fn connect() -> Self {
        Self::Connect {
            namespace: DEFAULT_NAMESPACE.to_string(),
            payload: None,
        }
    }

    pub fn disconnect() -> Self {
        Self::Disconnect {
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    pub fn event(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self::Event {
            namespace: DEFAULT_NAMESPACE.to_string(),
            ack_id: None,
            name: name.into(),
            args,
        }
    }

    pub fn parse(data: &str) -> ChannelResult<Self> {
        let mut chars = data.chars();
        let kind = chars.next().context(EmptyPacketSnafu {
            stage: "parse-socket-packet",
        })?;
        ensure!(
            kind != '5' && kind != '6',
            UnsupportedBinaryPacketSnafu {
                stage: "parse-socket-packet",
                raw: data.to_string(),
            }
        );

        let (namespace, rest) = split_namespace(chars.as_str());
        let (ack_id, payload) = split_ack_id(rest);
        let payload = if payload.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str::<Value>(payload).context(MalformedPayloadSnafu {
                    stage: "parse-socket-payload",
                })?,
            )
        };

        let packet = match kind {
            '0' => Self::Connect { namespace, payload },
            '1' => Self::Disconnect { namespace },
            '2' => {
                let mut args = match payload {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                };
                let name = match args.first() {
                    Some(Value::String(name)) => name.clone(),
                    _ => {
                        return UnknownPacketTypeSnafu {
                            stage: "parse-socket-event-name",
                            layer: "socket.io event",
                            raw: data.to_string(),
                        }
                        .fail();
                    }
                };
                args.remove(0);
                Self::Event {
                    namespace,
                    ack_id,
                    name,
                    args,
                }
            }
            '3' => Self::Ack {
                namespace,
                ack_id,
                args: match payload {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                },
            },
            '4' => Self::ConnectError {
                namespace,
                message: payload
                    .as_ref()
                    .and_then(|value| value.get("message"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| payload.as_ref().and_then(Value::as_str).map(str::to_string))
                    .unwrap_or_default(),
            },
            _ => {
                return UnknownPacketTypeSnafu {
                    stage: "parse-socket-packet",
                    layer: "socket.io",
                    raw: data.to_string(),
                }
                .fail();
            }
        };

        Ok(packet)
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Connect { namespace, payload } => {
                let body = payload.as_ref().map(Value::to_string).unwrap_or_default();
                format!("0{}{body}", namespace_prefix(namespace))
            }
            Self::Disconnect { namespace } => format!("1{}", namespace_prefix(namespace)),
            Self::Event {
                namespace,
                ack_id,
                name,
                args,
            } => {
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                format!(
                    "2{}{}{}",
                    namespace_prefix(namespace),
                    ack_id.map(|id| id.to_string()).unwrap_or_default(),
                    Value::Array(items)
                )
            }
            Self::Ack {
                namespace,
                ack_id,
                args,
            } => format!(
                "3{}{}{}",
                namespace_prefix(namespace),
                ack_id.map(|id| id.to_string()).unwrap_or_default(),
                Value::Array(args.clone())
            ),
            Self::ConnectError { namespace, message } => format!(
                "4{}{}",
                namespace_prefix(namespace),
                serde_json::json!({ "message": message })
            ),
        }
    }
}

fn split_namespace(rest: &str) -> (String, &str) {
    if !rest.starts_with('/') {
        return (DEFAULT_NAMESPACE.to_string(), rest);
    }

    match rest.find(',') {
        Some(index) => (rest[..index].to_string(), &rest[index + 1..]),
        None => (rest.to_string(), ""),
    }
}

fn split_ack_id(rest: &str) -> (Option<u64>, &str) {
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return (None, rest);
    }

    match rest[..digits].parse::<u64>() {
        Ok(id) => (Some(id), &rest[digits..]),
        Err(_) => (None, rest),
    }
}

// The default namespace is written without a prefix; others need the trailing comma.
fn namespace_prefix(namespace: &str) -> String {
    if namespace == DEFAULT_NAMESPACE || namespace.is_empty() {
        String::new()
    } else {
        format!("{namespace},")
    }
}

fn default_ping_interval() -> u64 {
    DEFAULT_PING_INTERVAL_MS
}

fn default_ping_timeout() -> u64 {
    DEFAULT_PING_TIMEOUT_MS
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ChannelError;

    #[test]
    fn open_packet_carries_heartbeat_settings() {
        let packet = EnginePacket::parse(
            r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":[],"pingInterval":25000,"pingTimeout":5000,"maxPayload":1000000}"#,
        )
        .unwrap();

        let EnginePacket::Open(handshake) = packet else {
            panic!("expected open packet, got {packet:?}");
        };
        assert_eq!(handshake.sid, "lv_VI97HAXpY6yYWAAAC");
        assert_eq!(handshake.liveness_window(), Duration::from_millis(30_000));
    }

    #[test]
    fn ping_is_answered_with_matching_pong() {
        let EnginePacket::Ping(data) = EnginePacket::parse("2").unwrap() else {
            panic!("expected ping");
        };
        assert_eq!(EnginePacket::Pong(data).encode(), "3");
        assert_eq!(EnginePacket::Pong("heartbeat".into()).encode(), "3heartbeat");
    }

    #[test]
    fn event_frames_split_name_from_arguments() {
        let packet = EnginePacket::parse(r#"42["msg-recieve","hey there"]"#).unwrap();

        assert_eq!(
            packet,
            EnginePacket::Message(SocketPacket::Event {
                namespace: "/".to_string(),
                ack_id: None,
                name: "msg-recieve".to_string(),
                args: vec![json!("hey there")],
            })
        );
    }

    #[test]
    fn namespaced_event_with_ack_id() {
        let packet = SocketPacket::parse(r#"2/chat,17["send-msg",{"to":"b"}]"#).unwrap();

        assert_eq!(
            packet,
            SocketPacket::Event {
                namespace: "/chat".to_string(),
                ack_id: Some(17),
                name: "send-msg".to_string(),
                args: vec![json!({ "to": "b" })],
            }
        );
    }

    #[test]
    fn outbound_frames_use_default_namespace_shorthand() {
        assert_eq!(EnginePacket::Message(SocketPacket::connect()).encode(), "40");
        assert_eq!(EnginePacket::Message(SocketPacket::disconnect()).encode(), "41");
        assert_eq!(
            EnginePacket::Message(SocketPacket::event("add-user", vec![json!("u-1")])).encode(),
            r#"42["add-user","u-1"]"#
        );
    }

    #[test]
    fn connect_ack_and_connect_error_are_distinguished() {
        assert!(matches!(
            EnginePacket::parse(r#"40{"sid":"abc"}"#).unwrap(),
            EnginePacket::Message(SocketPacket::Connect { payload: Some(_), .. })
        ));
        assert_eq!(
            SocketPacket::parse(r#"4{"message":"Not authorized"}"#).unwrap(),
            SocketPacket::ConnectError {
                namespace: "/".to_string(),
                message: "Not authorized".to_string(),
            }
        );
    }

    #[test]
    fn malformed_frames_are_rejected() {
        assert!(matches!(
            EnginePacket::parse(""),
            Err(ChannelError::EmptyPacket { .. })
        ));
        assert!(matches!(
            EnginePacket::parse("9"),
            Err(ChannelError::UnknownPacketType { .. })
        ));
        assert!(matches!(
            EnginePacket::parse("42[not json"),
            Err(ChannelError::MalformedPayload { .. })
        ));
        assert!(matches!(
            EnginePacket::parse(r#"451-["upload",{"_placeholder":true,"num":0}]"#),
            Err(ChannelError::UnsupportedBinaryPacket { .. })
        ));
        assert!(matches!(
            SocketPacket::parse("2[42]"),
            Err(ChannelError::UnknownPacketType { .. })
        ));
    }
}
