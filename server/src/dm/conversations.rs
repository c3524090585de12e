//! Private two-party conversations.
//!
//! A conversation is identified by its unordered participant pair, so both
//! participants address the same thread.
//! The store keeps a bounded history per pair regardless of whether either
//! participant is online. It performs no access control.

use chrono::Utc;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::fmt;

use crate::models::{new_message_id, MessageTag, PrivateMessage, UserId};

/// Default bound on retained messages per conversation.
pub const DEFAULT_MAX_CONVERSATION_HISTORY: usize = 50;

/// Symmetric key for a pair of users, held as the sorted id pair.
///
/// The `low_high` string from `Display` is only a label: ids may contain
/// `_`, so distinct pairs can share it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationKey {
    low: UserId,
    high: UserId,
}

impl ConversationKey {
    pub fn new(a: &str, b: &str) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self {
            low: low.to_string(),
            high: high.to_string(),
        }
    }

    pub fn participants(&self) -> (&str, &str) {
        (&self.low, &self.high)
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.low, self.high)
    }
}

pub struct ConversationStore {
    conversations: DashMap<ConversationKey, VecDeque<PrivateMessage>>,
    max_history: usize,
}

impl ConversationStore {
    pub fn new(max_history: usize) -> Self {
        Self {
            conversations: DashMap::new(),
            max_history: max_history.max(1),
        }
    }

    /// Append a message to the pair's thread, creating it on first use.
    pub fn append(
        &self,
        from_user_id: &str,
        to_user_id: &str,
        content: &str,
        tag: MessageTag,
    ) -> PrivateMessage {
        self.append_with(from_user_id, to_user_id, content, tag, |_| {})
    }

    /// Like [`append`](Self::append), running `deliver` while the thread is
    /// still locked so concurrent senders are delivered in history order.
    /// `deliver` must not touch this store.
    pub fn append_with<F>(
        &self,
        from_user_id: &str,
        to_user_id: &str,
        content: &str,
        tag: MessageTag,
        deliver: F,
    ) -> PrivateMessage
    where
        F: FnOnce(&PrivateMessage),
    {
        let key = ConversationKey::new(from_user_id, to_user_id);
        let message = PrivateMessage {
            id: new_message_id(),
            conversation_key: key.to_string(),
            from_user_id: from_user_id.to_string(),
            to_user_id: to_user_id.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
            tag,
        };

        let mut history = self.conversations.entry(key).or_default();
        history.push_back(message.clone());
        while history.len() > self.max_history {
            history.pop_front();
        }
        deliver(&message);

        message
    }

    /// The full retained thread for a pair, oldest first.
    pub fn history(&self, user_a: &str, user_b: &str) -> Vec<PrivateMessage> {
        self.conversations
            .get(&ConversationKey::new(user_a, user_b))
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_symmetric() {
        for (a, b) in [("1", "2"), ("alice", "bob"), ("zed", "amy"), ("same", "same")] {
            assert_eq!(ConversationKey::new(a, b), ConversationKey::new(b, a));
        }
        assert_eq!(ConversationKey::new("b", "a").to_string(), "a_b");
        assert_eq!(ConversationKey::new("b", "a").participants(), ("a", "b"));
    }

    #[test]
    fn distinct_pairs_get_distinct_keys() {
        assert_ne!(ConversationKey::new("1", "2"), ConversationKey::new("1", "3"));
    }

    #[test]
    fn underscored_ids_do_not_collide() {
        let left = ConversationKey::new("a_b", "c");
        let right = ConversationKey::new("a", "b_c");
        assert_eq!(left.to_string(), right.to_string());
        assert_ne!(left, right);
    }

    #[test]
    fn underscored_pairs_keep_separate_threads() {
        let store = ConversationStore::new(DEFAULT_MAX_CONVERSATION_HISTORY);
        store.append("a_b", "c", "for c only", MessageTag::Normal);

        assert!(store.history("a", "b_c").is_empty());
        assert_eq!(store.history("c", "a_b").len(), 1);
        assert_eq!(store.conversation_count(), 1);
    }
}
