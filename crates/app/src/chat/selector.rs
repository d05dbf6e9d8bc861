use smartchat_storage::{StorageResult, UserId};
use smartchat_transport::{Contact, HistoryEntry, InboundMessage};

use super::controller::ConversationController;
use super::mailbox::Mailbox;
use super::message::HistoryTicket;
use crate::session::SessionContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionRejection {
    UnknownContact(UserId),
}

/// Where an inbound message ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundRoute {
    Active,
    Duplicate,
    Mailbox { peer_id: UserId, unread: usize },
    /// No sender and no open conversation, or a sender outside the contact set.
    Dropped,
}

/// Owns the contact set, the active conversation and the mailbox for everyone else.
///
/// The selection always names a member of the current contact set.
#[derive(Debug, Default)]
pub struct ContactSelector {
    contacts: Vec<Contact>,
    controller: ConversationController,
    mailbox: Mailbox,
    next_ticket: u64,
}

impl ContactSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn contact(&self, peer_id: &UserId) -> Option<&Contact> {
        self.contacts.iter().find(|contact| &contact.id == peer_id)
    }

    /// Replaces the contact set; a selection or unread count for a peer that is no
    /// longer listed is cleared.
    pub fn set_contacts(&mut self, contacts: Vec<Contact>) {
        self.contacts = contacts;
        let listed = &self.contacts;
        self.mailbox
            .retain(|peer_id| listed.iter().any(|contact| &contact.id == peer_id));
        let vanished = self
            .controller
            .peer_id()
            .is_some_and(|peer_id| self.contact(peer_id).is_none());
        if vanished {
            tracing::info!("selected contact is gone from the refreshed list");
            self.clear();
        }
    }

    pub fn controller(&self) -> &ConversationController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut ConversationController {
        &mut self.controller
    }

    pub fn active_peer(&self) -> Option<&Contact> {
        self.controller.peer()
    }

    pub fn unread(&self, peer_id: &UserId) -> usize {
        self.mailbox.unread(peer_id)
    }

    pub fn total_unread(&self) -> usize {
        self.mailbox.total_unread()
    }

    /// Opens the conversation with `peer_id`, dropping the previous one.
    ///
    /// The returned ticket must accompany the history fetch result.
    pub fn select(&mut self, peer_id: &UserId) -> Result<HistoryTicket, SelectionRejection> {
        let contact = self
            .contact(peer_id)
            .cloned()
            .ok_or_else(|| SelectionRejection::UnknownContact(peer_id.clone()))?;

        self.next_ticket += 1;
        let ticket = HistoryTicket::new(self.next_ticket);
        // Buffered messages are stored server-side and come back with the history.
        let buffered = self.mailbox.take(peer_id);
        tracing::info!(
            peer_id = %peer_id,
            ticket = ticket.0,
            buffered,
            "conversation selected"
        );
        self.controller = ConversationController::loading(contact, ticket);
        Ok(ticket)
    }

    pub fn clear(&mut self) {
        self.controller = ConversationController::empty();
    }

    /// Drops all session-scoped state and erases the persisted session.
    pub fn logout(&mut self, session: &mut SessionContext) -> StorageResult<()> {
        self.contacts.clear();
        self.mailbox.clear();
        self.clear();
        session.clear()
    }

    /// Hands a history result to the active conversation. Returns `false` when the
    /// result belongs to an earlier selection.
    pub fn apply_history(
        &mut self,
        ticket: HistoryTicket,
        history: Option<Vec<HistoryEntry>>,
    ) -> bool {
        match self.controller.apply_history(ticket, history) {
            Ok(()) => true,
            Err(rejection) => {
                tracing::debug!(ticket = ticket.0, ?rejection, "discarding history result");
                false
            }
        }
    }

    pub fn route_inbound(&mut self, message: InboundMessage) -> InboundRoute {
        let for_active = match (&message.from, self.controller.peer_id()) {
            (Some(from), Some(active)) => from == active,
            (None, Some(_)) => true,
            (_, None) => false,
        };

        if for_active {
            return if self
                .controller
                .on_remote_arrival(&message.text, message.correlation_id)
            {
                InboundRoute::Active
            } else {
                InboundRoute::Duplicate
            };
        }

        match message.from {
            Some(peer_id) if self.contact(&peer_id).is_some() => {
                let unread = self.mailbox.note(peer_id.clone());
                InboundRoute::Mailbox { peer_id, unread }
            }
            Some(peer_id) => {
                tracing::debug!(peer_id = %peer_id, "inbound message from unlisted sender");
                InboundRoute::Dropped
            }
            None => {
                tracing::warn!("inbound message without sender and no open conversation");
                InboundRoute::Dropped
            }
        }
    }
}
