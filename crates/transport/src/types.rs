use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use smartchat_storage::UserId;
use uuid::Uuid;

pub const ADD_USER_EVENT: &str = "add-user";
pub const SEND_MESSAGE_EVENT: &str = "send-msg";
/// Inbound event name as the relay spells it.
pub const RECEIVE_MESSAGE_EVENT: &str = "msg-recieve";

/// A contact as listed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub username: String,
    #[serde(rename = "avatarImage", default)]
    pub avatar_image: String,
}

/// One stored message as returned by the history route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "fromSelf")]
    pub from_self: bool,
    pub message: String,
}

impl HistoryEntry {
    pub fn new(from_self: bool, message: impl Into<String>) -> Self {
        Self {
            from_self,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryQuery {
    pub from: UserId,
    pub to: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistRequest {
    pub from: UserId,
    pub to: UserId,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// A locally authored message handed to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub to: UserId,
    pub from: UserId,
    pub text: String,
    pub correlation_id: Uuid,
}

impl OutboundMessage {
    pub fn new(to: UserId, from: UserId, text: impl Into<String>) -> Self {
        Self {
            to,
            from,
            text: text.into(),
            correlation_id: Uuid::new_v4(),
        }
    }

    /// The `send-msg` argument. `id` rides along so an echo can be matched to the send.
    pub fn to_payload(&self) -> Value {
        json!({
            "to": self.to.as_str(),
            "from": self.from.as_str(),
            "msg": self.text,
            "id": self.correlation_id.to_string(),
        })
    }
}

/// A `msg-recieve` delivery.
///
/// Relays that only forward the text produce a bare string; relays that forward the whole
/// `send-msg` payload also name the sender and the correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub from: Option<UserId>,
    pub text: String,
    pub correlation_id: Option<Uuid>,
}

impl InboundMessage {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            from: None,
            text: text.into(),
            correlation_id: None,
        }
    }

    /// Reads the first event argument; returns `None` for shapes that carry no text.
    pub fn from_event_args(args: &[Value]) -> Option<Self> {
        match args.first()? {
            Value::String(text) => Some(Self::text_only(text.clone())),
            Value::Object(fields) => {
                let text = fields
                    .get("msg")
                    .or_else(|| fields.get("message"))
                    .and_then(Value::as_str)?
                    .to_string();
                let from = fields
                    .get("from")
                    .and_then(Value::as_str)
                    .and_then(|raw| UserId::parse(raw).ok());
                let correlation_id = fields
                    .get("id")
                    .and_then(Value::as_str)
                    .and_then(|raw| Uuid::parse_str(raw).ok());
                Some(Self {
                    from,
                    text,
                    correlation_id,
                })
            }
            _ => None,
        }
    }
}
