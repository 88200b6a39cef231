use std::fmt;
use std::sync::Arc;

use sipd_transport::TimerHandle;
use sipd_wire::message::FirstLine;
use sipd_wire::{parser, Message, Method};

use crate::ids::{Branch, DialogKey};

/// RFC 3261 server transaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    Idle,
    Proceeding,
    Completed,
    Terminated,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionState::Idle => "Idle",
            TransactionState::Proceeding => "Proceeding",
            TransactionState::Completed => "Completed",
            TransactionState::Terminated => "Terminated",
        };
        f.write_str(s)
    }
}

impl TransactionState {
    pub fn is_terminated(&self) -> bool {
        matches!(self, TransactionState::Terminated)
    }
}

/// A server transaction, keyed by Via branch. Owns the request that
/// created it for its entire lifetime; gains an ACK message once one
/// matches it.
#[derive(Clone)]
pub struct Transaction {
    pub branch: Branch,
    pub state: TransactionState,
    pub request: Arc<Message>,
    pub method: Method,
    pub ack: Option<Arc<Message>>,
    pub dialog: Option<DialogKey>,
    pub final_response_code: Option<u16>,
    pub last_response: Option<Vec<u8>>,
    /// The ACK-wait timer armed when this transaction parked in
    /// COMPLETED after a send failure, if any. Cancelled once the ACK
    /// it's waiting for actually arrives, so it never fires uselessly.
    pub ack_wait_timer: Option<TimerHandle>,
}

impl Transaction {
    pub fn new(branch: Branch, request: Arc<Message>) -> Self {
        let method = match parser::parse_first_line(&request) {
            Ok(FirstLine::Request { method, .. }) => method,
            _ => Method::Unknown,
        };
        Transaction {
            branch,
            state: TransactionState::Idle,
            request,
            method,
            ack: None,
            dialog: None,
            final_response_code: None,
            last_response: None,
            ack_wait_timer: None,
        }
    }

    pub fn set_state(&mut self, state: TransactionState) {
        self.state = state;
    }

    pub fn record_sent_response(&mut self, status_code: u16, datagram: Vec<u8>) {
        self.final_response_code = Some(status_code);
        self.last_response = Some(datagram);
    }

    /// Cancel and clear any armed ACK-wait timer, if one was set.
    pub fn cancel_ack_wait_timer(&mut self) {
        if let Some(handle) = self.ack_wait_timer.take() {
            handle.cancel();
        }
    }
}
