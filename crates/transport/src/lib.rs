mod backend;
mod channel;
pub mod error;
pub mod socketio;
pub mod types;

pub use backend::{
    BoxFuture, CONTACTS_ROUTE, ChatBackend, HISTORY_ROUTE, HttpBackend, LOGIN_ROUTE, LoginOutcome,
    PERSIST_ROUTE,
};
pub use channel::{DEFAULT_CONNECT_TIMEOUT, InboundSubscription, MessageChannel, socket_url};
pub use error::{BackendError, BackendResult, ChannelError, ChannelResult};
pub use types::{
    ADD_USER_EVENT, Contact, HistoryEntry, InboundMessage, OutboundMessage,
    RECEIVE_MESSAGE_EVENT, SEND_MESSAGE_EVENT,
};
