//! Token-budgeted conversation history
//!
//! Holds the durable user/assistant/tool exchange that is sent to the model
//! on every step. The system prompt is never stored here; callers prepend it
//! per request with [`ConversationHistory::with_system`].

use std::fmt;
use std::sync::Arc;

use llm_core::ChatMessage;
use tracing::debug;

/// Counts tokens in a piece of text
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Ordered conversation turns with front eviction.
///
/// After every append, while the total token count exceeds the budget and
/// more than one turn remains, the turn at index 1 is removed. Index 0 is
/// never evicted.
///
/// Eviction works turn by turn and does not know about tool pairing: removing
/// an assistant turn that carries tool calls can leave its tool turn at
/// index 1 with no call before it.
pub struct ConversationHistory {
    turns: Vec<ChatMessage>,
    /// Maximum total tokens; 0 disables eviction
    max_tokens: usize,
    /// Turn restored by `clear`, if any
    anchor: Option<ChatMessage>,
    counter: Arc<dyn TokenCounter>,
}

impl ConversationHistory {
    pub fn new(max_tokens: usize, counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            turns: Vec::new(),
            max_tokens,
            anchor: None,
            counter,
        }
    }

    /// Keep `anchor` as the first turn, including after `clear`
    pub fn with_anchor(mut self, anchor: ChatMessage) -> Self {
        self.turns.insert(0, anchor.clone());
        self.anchor = Some(anchor);
        self
    }

    /// Append a turn, then evict until back under budget
    pub fn append(&mut self, turn: ChatMessage) {
        self.turns.push(turn);
        self.evict();
    }

    /// Current turns, oldest first
    pub fn read(&self) -> &[ChatMessage] {
        &self.turns
    }

    /// Reset to empty, or to the anchor turn when one is configured
    pub fn clear(&mut self) {
        self.turns.clear();
        if let Some(ref anchor) = self.anchor {
            self.turns.push(anchor.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Total tokens over all turns
    pub fn token_count(&self) -> usize {
        self.turns.iter().map(|t| self.turn_tokens(t)).sum()
    }

    /// Request messages: a fresh system turn followed by the history
    pub fn with_system(&self, system_prompt: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.turns.len() + 1);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend(self.turns.iter().cloned());
        messages
    }

    fn turn_tokens(&self, turn: &ChatMessage) -> usize {
        self.counter.count(&turn.token_text())
    }

    /// Remove turns at index 1 until under budget. May orphan a tool turn.
    fn evict(&mut self) {
        if self.max_tokens == 0 {
            return;
        }

        let mut total = self.token_count();
        let mut evicted = 0;
        while total > self.max_tokens && self.turns.len() > 1 {
            let removed = self.turns.remove(1);
            total = total.saturating_sub(self.turn_tokens(&removed));
            evicted += 1;
        }

        if evicted > 0 {
            debug!(evicted, remaining = self.turns.len(), tokens = total, "Evicted history turns");
        }
    }
}

impl fmt::Debug for ConversationHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationHistory")
            .field("turns", &self.turns.len())
            .field("max_tokens", &self.max_tokens)
            .field("anchored", &self.anchor.is_some())
            .finish()
    }
}
