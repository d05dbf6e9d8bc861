/// AI scratch panel: actions, request ordering and verdict rendering.
pub mod ai_panel;
/// Message list of the open conversation.
pub mod controller;
/// Task results fed back into the shell loop.
pub mod events;
pub mod mailbox;
/// Conversation entities and the phase state machine.
pub mod message;
pub mod scroll_manager;
pub mod selector;

pub use ai_panel::{AiAction, AiJob, AiPanel, AiRequestId, AiTask, SAFE_VERDICT, TOXIC_VERDICT};
pub use controller::{ConversationController, OutboundDispatch, SendRejection};
pub use events::AppEvent;
pub use mailbox::Mailbox;
pub use message::{
    ChatMessage, ConversationPhase, HistoryTicket, PhaseTransition, PhaseTransitionRejection,
    PhaseTransitionResult,
};
pub use scroll_manager::ScrollManager;
pub use selector::{ContactSelector, InboundRoute, SelectionRejection};
