use std::fmt;

use crate::ids::{Branch, CallId, DialogKey};

/// Maximum number of transactions a single dialog may own at once.
pub const MAX_TRANSACTIONS_PER_DIALOG: usize = 32;

/// SIP dialog state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialogState {
    Idle,
    Early,
    Confirmed,
    Terminated,
}

impl fmt::Display for DialogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DialogState::Idle => "Idle",
            DialogState::Early => "Early",
            DialogState::Confirmed => "Confirmed",
            DialogState::Terminated => "Terminated",
        };
        f.write_str(s)
    }
}

impl DialogState {
    pub fn is_active(&self) -> bool {
        matches!(self, DialogState::Early | DialogState::Confirmed)
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, DialogState::Terminated)
    }
}

/// A SIP dialog, keyed by (From-tag, To-tag) and owned by exactly one
/// call. Owns a bounded set of transaction branches.
#[derive(Debug, Clone)]
pub struct Dialog {
    pub key: DialogKey,
    pub state: DialogState,
    pub call_id: CallId,
    pub transactions: Vec<Branch>,
}

impl Dialog {
    pub fn new(key: DialogKey, call_id: CallId) -> Self {
        Dialog {
            key,
            state: DialogState::Idle,
            call_id,
            transactions: Vec::new(),
        }
    }

    pub fn set_state(&mut self, state: DialogState) {
        self.state = state;
    }

    /// Link a transaction branch into this dialog's owned set, up to
    /// the bounded fan-out allowed.
    pub fn own_transaction(&mut self, branch: Branch) -> bool {
        if self.transactions.len() >= MAX_TRANSACTIONS_PER_DIALOG {
            return false;
        }
        if !self.transactions.contains(&branch) {
            self.transactions.push(branch);
        }
        true
    }

    pub fn disown_transaction(&mut self, branch: &Branch) {
        self.transactions.retain(|b| b != branch);
    }
}

/// Generate an 8-decimal-digit To-tag from the process-wide RNG.
/// `rand::thread_rng` is seeded from the OS on first use per thread,
/// so no hand-rolled seeding is needed.
pub fn generate_to_tag() -> String {
    use rand::Rng;
    let n: u32 = rand::thread_rng().gen_range(0..100_000_000);
    format!("{n:08}")
}
