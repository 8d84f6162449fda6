//! Per-conversation dialogue state.
//!
//! In-memory only — intentionally resets on restart. Absence from the map is
//! the idle state; entries exist only while a generation dialogue is open.

use std::collections::HashMap;
use std::sync::Mutex;

pub type ChatId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingAmount,
    AwaitingTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationState {
    pub phase: Phase,
    /// Canonical amount captured by the first step, present in `AwaitingTime`.
    pub amount: Option<String>,
}

impl ConversationState {
    pub fn awaiting_amount() -> Self {
        Self {
            phase: Phase::AwaitingAmount,
            amount: None,
        }
    }

    pub fn awaiting_time(amount: String) -> Self {
        Self {
            phase: Phase::AwaitingTime,
            amount: Some(amount),
        }
    }
}

pub struct SessionStore {
    states: Mutex<HashMap<ChatId, ConversationState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, chat: ChatId) -> Option<ConversationState> {
        let states = self
            .states
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        states.get(&chat).cloned()
    }

    pub fn set(&self, chat: ChatId, state: ConversationState) {
        let mut states = self
            .states
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        states.insert(chat, state);
    }

    /// Back to idle. Clearing an idle conversation is a no-op.
    pub fn clear(&self, chat: ChatId) {
        let mut states = self
            .states
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        states.remove(&chat);
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").finish_non_exhaustive()
    }
}
