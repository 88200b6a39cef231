use std::fmt;

use crate::ids::{CallId, DialogKey};

/// Maximum number of dialogs a single call may own at once.
pub const MAX_DIALOGS_PER_CALL: usize = 16;

/// High-level call state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallState {
    Idle,
    Incoming,
    Ringing,
    Established,
    Failed,
    Terminating,
    Terminated,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallState::Idle => "Idle",
            CallState::Incoming => "Incoming",
            CallState::Ringing => "Ringing",
            CallState::Established => "Established",
            CallState::Failed => "Failed",
            CallState::Terminating => "Terminating",
            CallState::Terminated => "Terminated",
        };
        f.write_str(s)
    }
}

/// The high-level call record, keyed by Call-ID. Owns a bounded set
/// of dialogs.
#[derive(Debug, Clone)]
pub struct Call {
    pub call_id: CallId,
    pub state: CallState,
    pub dialogs: Vec<DialogKey>,
}

impl Call {
    pub fn new(call_id: CallId) -> Self {
        Call {
            call_id,
            state: CallState::Idle,
            dialogs: Vec::new(),
        }
    }

    pub fn set_state(&mut self, state: CallState) {
        self.state = state;
    }

    pub fn own_dialog(&mut self, key: DialogKey) -> bool {
        if self.dialogs.len() >= MAX_DIALOGS_PER_CALL {
            return false;
        }
        if !self.dialogs.contains(&key) {
            self.dialogs.push(key);
        }
        true
    }

    pub fn disown_dialog(&mut self, key: &DialogKey) {
        self.dialogs.retain(|d| d != key);
    }
}
