//! Session-local table of pending timer callbacks.
//!
//! The token carried in `RegisterEvent`/`TriggerEvent` is a key into this
//! table, never an address. Tokens start at 1 and are never reused within a
//! session, so a stale or forged `TriggerEvent` cannot reach a newer
//! callback.

use std::collections::HashMap;
use std::fmt;

use buslink_core::protocol::messages::CallbackToken;

use crate::application::peripheral::TimerCallback;

pub struct TimerTable {
    next_token: u64,
    pending: HashMap<CallbackToken, TimerCallback>,
}

impl TimerTable {
    pub fn new() -> Self {
        Self {
            next_token: 1,
            pending: HashMap::new(),
        }
    }

    /// Stores `callback` under a fresh token.
    pub fn insert(&mut self, callback: TimerCallback) -> CallbackToken {
        let token = CallbackToken(self.next_token);
        self.next_token += 1;
        self.pending.insert(token, callback);
        token
    }

    /// Removes and returns the callback for `token`.
    pub fn take(&mut self, token: CallbackToken) -> Option<TimerCallback> {
        self.pending.remove(&token)
    }

    /// Drops a pending callback. Returns `false` if the token was unknown.
    pub fn cancel(&mut self, token: CallbackToken) -> bool {
        self.pending.remove(&token).is_some()
    }

    pub fn contains(&self, token: CallbackToken) -> bool {
        self.pending.contains_key(&token)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for TimerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TimerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerTable")
            .field("next_token", &self.next_token)
            .field("pending", &self.pending.len())
            .finish()
    }
}
