use smartchat_storage::UserId;
use smartchat_transport::HistoryEntry;
use uuid::Uuid;

/// Generation number of one history fetch.
///
/// A new ticket is issued on every selection so results of an earlier fetch can be
/// recognized and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HistoryTicket(pub u64);

impl HistoryTicket {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// One entry of the open conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub from_self: bool,
    pub text: String,
    /// Set for messages sent from this client and for relayed messages that carried one.
    pub correlation_id: Option<Uuid>,
}

impl ChatMessage {
    pub fn local(text: impl Into<String>, correlation_id: Uuid) -> Self {
        Self {
            from_self: true,
            text: text.into(),
            correlation_id: Some(correlation_id),
        }
    }

    pub fn remote(text: impl Into<String>, correlation_id: Option<Uuid>) -> Self {
        Self {
            from_self: false,
            text: text.into(),
            correlation_id,
        }
    }
}

impl From<HistoryEntry> for ChatMessage {
    fn from(entry: HistoryEntry) -> Self {
        Self {
            from_self: entry.from_self,
            text: entry.message,
            correlation_id: None,
        }
    }
}

/// Lifecycle of the conversation pane.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConversationPhase {
    #[default]
    Empty,
    Loading {
        peer_id: UserId,
        ticket: HistoryTicket,
    },
    Ready {
        peer_id: UserId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseTransition {
    Select {
        peer_id: UserId,
        ticket: HistoryTicket,
    },
    /// History fetch resolved, successfully or not.
    Settle(HistoryTicket),
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseTransitionRejection {
    NoPendingFetch,
    StaleTicket {
        active: HistoryTicket,
        attempted: HistoryTicket,
    },
}

pub type PhaseTransitionResult = Result<ConversationPhase, PhaseTransitionRejection>;

impl ConversationPhase {
    pub fn peer_id(&self) -> Option<&UserId> {
        match self {
            Self::Empty => None,
            Self::Loading { peer_id, .. } | Self::Ready { peer_id } => Some(peer_id),
        }
    }

    pub fn pending_ticket(&self) -> Option<HistoryTicket> {
        match self {
            Self::Loading { ticket, .. } => Some(*ticket),
            Self::Empty | Self::Ready { .. } => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }

    /// Selecting is legal from every phase; settling must name the pending ticket.
    pub fn apply(&self, transition: PhaseTransition) -> PhaseTransitionResult {
        match transition {
            PhaseTransition::Select { peer_id, ticket } => Ok(Self::Loading { peer_id, ticket }),
            PhaseTransition::Settle(ticket) => self.apply_settle(ticket),
            PhaseTransition::Clear => Ok(Self::Empty),
        }
    }

    fn apply_settle(&self, ticket: HistoryTicket) -> PhaseTransitionResult {
        match self {
            Self::Loading {
                peer_id,
                ticket: active,
            } if *active == ticket => Ok(Self::Ready {
                peer_id: peer_id.clone(),
            }),
            Self::Loading { ticket: active, .. } => Err(PhaseTransitionRejection::StaleTicket {
                active: *active,
                attempted: ticket,
            }),
            Self::Empty | Self::Ready { .. } => Err(PhaseTransitionRejection::NoPendingFetch),
        }
    }
}
