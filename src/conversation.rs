//! Session-scoped conversation transcript.
//!
//! Append-only except for [`ConversationStore::reset`]. Alternation of user
//! and assistant turns is the caller's concern and is not enforced here.

use crate::models::ConversationTurn;

/// Seeded assistant turn of a fresh or reset conversation.
pub const GREETING: &str = "Ask a question about the repository.";

#[derive(Debug, Clone)]
pub struct ConversationStore {
    turns: Vec<ConversationTurn>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self {
            turns: vec![ConversationTurn::assistant(GREETING)],
        }
    }

    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn all(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Drop the history and start over with the greeting.
    pub fn reset(&mut self) {
        self.turns = vec![ConversationTurn::assistant(GREETING)];
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}
