use smartchat_transport::{
    BackendResult, ChannelError, Contact, HistoryEntry, InboundSubscription, LoginOutcome,
    MessageChannel,
};

use crate::chat::ai_panel::AiRequestId;
use crate::chat::message::HistoryTicket;
use crate::session::SessionGeneration;

/// Results reported back to the shell loop by spawned network tasks.
///
/// Session-scoped results carry the generation they were started under.
#[derive(Debug)]
pub enum AppEvent {
    LoginFinished {
        session: SessionGeneration,
        result: BackendResult<LoginOutcome>,
    },
    ContactsLoaded {
        session: SessionGeneration,
        result: BackendResult<Vec<Contact>>,
    },
    HistoryLoaded {
        ticket: HistoryTicket,
        result: BackendResult<Vec<HistoryEntry>>,
    },
    RealtimeReady {
        session: SessionGeneration,
        channel: MessageChannel,
        inbound: InboundSubscription,
    },
    RealtimeFailed {
        session: SessionGeneration,
        error: ChannelError,
    },
    AiFinished {
        request: AiRequestId,
        output: String,
    },
}

impl AppEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoginFinished { .. } => "login-finished",
            Self::ContactsLoaded { .. } => "contacts-loaded",
            Self::HistoryLoaded { .. } => "history-loaded",
            Self::RealtimeReady { .. } => "realtime-ready",
            Self::RealtimeFailed { .. } => "realtime-failed",
            Self::AiFinished { .. } => "ai-finished",
        }
    }

    /// Generation of the login this result belongs to, if it is session-scoped.
    pub fn session(&self) -> Option<SessionGeneration> {
        match self {
            Self::LoginFinished { session, .. }
            | Self::ContactsLoaded { session, .. }
            | Self::RealtimeReady { session, .. }
            | Self::RealtimeFailed { session, .. } => Some(*session),
            Self::HistoryLoaded { .. } | Self::AiFinished { .. } => None,
        }
    }
}
