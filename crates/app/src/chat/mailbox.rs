use std::collections::HashMap;

use smartchat_storage::UserId;

/// Unread counts for peers other than the open one.
///
/// Only counts are kept: opening a conversation reloads its history from the backend,
/// which already holds the buffered messages.
#[derive(Debug, Clone, Default)]
pub struct Mailbox {
    unread: HashMap<UserId, usize>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one more message from `peer_id` and returns its unread total.
    pub fn note(&mut self, peer_id: UserId) -> usize {
        let count = self.unread.entry(peer_id).or_default();
        *count += 1;
        *count
    }

    pub fn unread(&self, peer_id: &UserId) -> usize {
        self.unread.get(peer_id).copied().unwrap_or_default()
    }

    pub fn total_unread(&self) -> usize {
        self.unread.values().sum()
    }

    /// Marks `peer_id` read and returns how many messages were pending.
    pub fn take(&mut self, peer_id: &UserId) -> usize {
        self.unread.remove(peer_id).unwrap_or_default()
    }

    /// Forgets peers for which `keep` is false.
    pub fn retain(&mut self, mut keep: impl FnMut(&UserId) -> bool) {
        self.unread.retain(|peer_id, _| keep(peer_id));
    }

    pub fn clear(&mut self) {
        self.unread.clear();
    }
}
