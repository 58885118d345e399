//! Conversation session: the caller-owned, append-only turn history.
//!
//! Insertion order is chronological order and is preserved verbatim on
//! replay. The only mutation is appending.

use serde::{Deserialize, Serialize};

use crate::models::ConversationTurn;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationSession {
    turns: Vec<ConversationTurn>,
}

impl ConversationSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn extend<I>(&mut self, turns: I)
    where
        I: IntoIterator<Item = ConversationTurn>,
    {
        self.turns.extend(turns);
    }

    /// Value in, value out: the session with `turn` appended.
    pub fn with_turn(mut self, turn: ConversationTurn) -> Self {
        self.append(turn);
        self
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Turns to send to the completion service: the most recent `window`
    /// turns in insertion order. A window of `0` replays everything.
    pub fn replay(&self, window: usize) -> Vec<ConversationTurn> {
        if window == 0 || self.turns.len() <= window {
            return self.turns.clone();
        }
        let dropped = self.turns.len() - window;
        tracing::warn!(
            total = self.turns.len(),
            dropped,
            window,
            "conversation history exceeds window; replaying most recent turns"
        );
        self.turns[dropped..].to_vec()
    }
}

impl From<Vec<ConversationTurn>> for ConversationSession {
    fn from(turns: Vec<ConversationTurn>) -> Self {
        Self { turns }
    }
}
