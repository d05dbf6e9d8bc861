use smartchat_storage::UserId;
use smartchat_transport::{Contact, HistoryEntry, OutboundMessage};
use uuid::Uuid;

use super::message::{
    ChatMessage, ConversationPhase, HistoryTicket, PhaseTransition, PhaseTransitionRejection,
};
use super::scroll_manager::ScrollManager;

/// Side effects of an optimistic send: relay publish and backend persistence.
pub trait OutboundDispatch {
    fn dispatch(&self, message: &OutboundMessage);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendRejection {
    BlankMessage,
    NoActiveConversation,
}

/// Message list of the open conversation.
///
/// Built fresh for every selection; nothing carries over from the previous peer.
/// Messages arriving while history is in flight are kept and placed after the history,
/// unless the history already ends with them.
#[derive(Debug, Clone, Default)]
pub struct ConversationController {
    peer: Option<Contact>,
    phase: ConversationPhase,
    messages: Vec<ChatMessage>,
    revision: u64,
    scroll: ScrollManager,
}

impl ConversationController {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Starts a conversation with `peer` whose history fetch carries `ticket`.
    pub fn loading(peer: Contact, ticket: HistoryTicket) -> Self {
        let phase = ConversationPhase::Empty
            .apply(PhaseTransition::Select {
                peer_id: peer.id.clone(),
                ticket,
            })
            .unwrap_or_default();
        let mut controller = Self {
            peer: Some(peer),
            phase,
            ..Self::default()
        };
        controller.scroll.reset();
        controller.bump();
        controller
    }

    pub fn peer(&self) -> Option<&Contact> {
        self.peer.as_ref()
    }

    pub fn peer_id(&self) -> Option<&UserId> {
        self.phase.peer_id()
    }

    pub fn phase(&self) -> &ConversationPhase {
        &self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase.is_loading()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Increases on every list mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn visible_messages(&self) -> &[ChatMessage] {
        &self.messages[self.scroll.visible_range()]
    }

    pub fn scroll(&self) -> &ScrollManager {
        &self.scroll
    }

    pub fn scroll_up(&mut self, rows: usize) {
        self.scroll.scroll_up(rows);
    }

    pub fn scroll_down(&mut self, rows: usize) {
        self.scroll.scroll_down(rows);
    }

    /// Settles the fetch identified by `ticket`.
    ///
    /// `None` means the fetch failed; the pane still becomes ready with whatever arrived
    /// live in the meantime. A ticket other than the pending one changes nothing.
    pub fn apply_history(
        &mut self,
        ticket: HistoryTicket,
        history: Option<Vec<HistoryEntry>>,
    ) -> Result<(), PhaseTransitionRejection> {
        self.phase = self.phase.apply(PhaseTransition::Settle(ticket))?;

        let live_tail = std::mem::take(&mut self.messages);
        let mut messages: Vec<ChatMessage> = history
            .unwrap_or_default()
            .into_iter()
            .map(ChatMessage::from)
            .collect();
        merge_live_tail(&mut messages, live_tail);
        self.messages = messages;
        self.bump();
        Ok(())
    }

    /// Appends a self-authored message, then hands it to `dispatch`.
    pub fn send_local(
        &mut self,
        self_id: &UserId,
        text: &str,
        dispatch: &dyn OutboundDispatch,
    ) -> Result<Uuid, SendRejection> {
        if text.trim().is_empty() {
            return Err(SendRejection::BlankMessage);
        }
        let peer_id = self
            .peer_id()
            .cloned()
            .ok_or(SendRejection::NoActiveConversation)?;

        let outbound = OutboundMessage::new(peer_id, self_id.clone(), text);
        self.messages
            .push(ChatMessage::local(text, outbound.correlation_id));
        self.bump();
        dispatch.dispatch(&outbound);
        Ok(outbound.correlation_id)
    }

    /// Appends a peer-authored message. Returns `false` for an echo of a message
    /// already in the list.
    pub fn on_remote_arrival(&mut self, text: &str, correlation_id: Option<Uuid>) -> bool {
        if let Some(id) = correlation_id {
            if self
                .messages
                .iter()
                .any(|message| message.correlation_id == Some(id))
            {
                tracing::debug!(correlation_id = %id, "dropping echoed message");
                return false;
            }
        }

        self.messages.push(ChatMessage::remote(text, correlation_id));
        self.bump();
        true
    }

    fn bump(&mut self) {
        self.revision += 1;
        self.scroll.set_total_rows(self.messages.len());
        self.scroll.request_scroll_to_bottom_if_following();
        self.scroll.apply_pending_scroll();
    }
}

/// Appends `live_tail` to `history`, skipping entries the backend already stored.
///
/// Only the last `live_tail.len()` history entries can hold such copies, and each one
/// absorbs at most one live entry.
fn merge_live_tail(history: &mut Vec<ChatMessage>, live_tail: Vec<ChatMessage>) {
    let window_end = history.len();
    let window_start = window_end.saturating_sub(live_tail.len());
    let mut absorbed = vec![false; window_end - window_start];

    for message in live_tail {
        let stored = (window_start..window_end).find(|&index| {
            !absorbed[index - window_start]
                && history[index].from_self == message.from_self
                && history[index].text == message.text
        });
        match stored {
            Some(index) => {
                absorbed[index - window_start] = true;
                // Keep the id so a later relay echo is still recognised.
                if history[index].correlation_id.is_none() {
                    history[index].correlation_id = message.correlation_id;
                }
                tracing::debug!(from_self = message.from_self, "live message already in history");
            }
            None => history.push(message),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use smartchat_transport::OutboundMessage;

    use super::OutboundDispatch;

    #[derive(Default)]
    pub(crate) struct RecordingDispatch {
        pub(crate) sent: Mutex<Vec<OutboundMessage>>,
    }

    impl OutboundDispatch for RecordingDispatch {
        fn dispatch(&self, message: &OutboundMessage) {
            self.sent.lock().unwrap().push(message.clone());
        }
    }
}
