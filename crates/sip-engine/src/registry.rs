//! The per-worker registry: three parallel keyed maps standing in for
//! pointer-linked lists. Every operation here runs on exactly one
//! worker's task, so no internal locking is needed — the dispatcher's
//! Call-ID sharding guarantees that.

use std::collections::HashMap;
use std::sync::Arc;

use sipd_wire::Message;

use crate::call::Call;
use crate::dialog::{generate_to_tag, Dialog};
use crate::ids::{Branch, CallId, DialogKey};
use crate::transaction::Transaction;

/// Outcome of matching an incoming request against the transaction
/// table.
pub enum Correlation {
    /// No transaction exists yet for this branch.
    New,
    /// Same branch, same CSeq, same peer: a retransmission. The
    /// stored final response (if any) should be resent verbatim.
    Retransmission,
    /// Same branch, different CSeq/peer, and the new message is an
    /// ACK to a stored INVITE: record it as the transaction's ACK.
    AckForInvite,
    /// Same branch but none of the above: a branch collision, the new
    /// message is rejected.
    Collision,
}

#[derive(Default)]
pub struct Registry {
    pub calls: HashMap<CallId, Call>,
    pub dialogs: HashMap<DialogKey, Dialog>,
    pub transactions: HashMap<Branch, Transaction>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    // ---- Transactions ----------------------------------------------------

    pub fn find_transaction(&self, branch: &Branch) -> Option<&Transaction> {
        self.transactions.get(branch)
    }

    pub fn find_transaction_mut(&mut self, branch: &Branch) -> Option<&mut Transaction> {
        self.transactions.get_mut(branch)
    }

    /// Classify an incoming request against any existing transaction
    /// for its branch.
    pub fn correlate(
        &self,
        branch: &Branch,
        cseq: &str,
        peer: std::net::SocketAddr,
        is_ack: bool,
    ) -> Correlation {
        let Some(existing) = self.transactions.get(branch) else {
            return Correlation::New;
        };

        let same_cseq = header_value_eq(&existing.request, "CSeq", cseq);
        let same_peer = existing.request.peer == peer;

        if same_cseq && same_peer {
            return Correlation::Retransmission;
        }

        if is_ack && existing.method == sipd_wire::Method::Invite {
            return Correlation::AckForInvite;
        }

        Correlation::Collision
    }

    /// Create a fresh IDLE transaction for `branch`, owning `request`.
    /// Fails only if the branch is already present — branch ids must
    /// be unique within a worker's registry.
    pub fn create_transaction(
        &mut self,
        branch: Branch,
        request: Arc<Message>,
    ) -> Result<&mut Transaction, &'static str> {
        if self.transactions.contains_key(&branch) {
            return Err("branch already present");
        }
        let tx = Transaction::new(branch.clone(), request);
        self.transactions.insert(branch.clone(), tx);
        Ok(self.transactions.get_mut(&branch).unwrap())
    }

    /// Remove a transaction, detaching it from its dialog's owned set
    /// if it had one (cascades child->parent detach, never touches
    /// the dialog itself otherwise).
    pub fn delete_transaction(&mut self, branch: &Branch) {
        if let Some(tx) = self.transactions.remove(branch) {
            if let Some(dialog_key) = tx.dialog {
                if let Some(dialog) = self.dialogs.get_mut(&dialog_key) {
                    dialog.disown_transaction(branch);
                }
            }
        }
    }

    // ---- Dialogs -----------------------------------------------------

    pub fn find_dialog(&self, key: &DialogKey) -> Option<&Dialog> {
        self.dialogs.get(key)
    }

    pub fn find_dialog_mut(&mut self, key: &DialogKey) -> Option<&mut Dialog> {
        self.dialogs.get_mut(key)
    }

    pub fn create_dialog(&mut self, key: DialogKey, call_id: CallId) -> Result<&mut Dialog, &'static str> {
        if self.dialogs.contains_key(&key) {
            return Err("dialog key already present");
        }
        self.dialogs.insert(key.clone(), Dialog::new(key.clone(), call_id));
        Ok(self.dialogs.get_mut(&key).unwrap())
    }

    /// Terminate and remove a dialog: detaches it from its parent
    /// call's owned set and disowns (but does not delete) its
    /// transactions. Destruction cascades the owning set but never
    /// touches peers.
    pub fn delete_dialog(&mut self, key: &DialogKey) {
        if let Some(dialog) = self.dialogs.remove(key) {
            if let Some(call) = self.calls.get_mut(&dialog.call_id) {
                call.disown_dialog(key);
            }
            for branch in &dialog.transactions {
                if let Some(tx) = self.transactions.get_mut(branch) {
                    tx.dialog = None;
                }
            }
        }
    }

    pub fn new_to_tag(&self) -> String {
        generate_to_tag()
    }

    // ---- Calls -------------------------------------------------------

    pub fn find_call(&self, call_id: &CallId) -> Option<&Call> {
        self.calls.get(call_id)
    }

    pub fn find_call_mut(&mut self, call_id: &CallId) -> Option<&mut Call> {
        self.calls.get_mut(call_id)
    }

    pub fn create_call(&mut self, call_id: CallId) -> Result<&mut Call, &'static str> {
        if self.calls.contains_key(&call_id) {
            return Err("call-id already present");
        }
        self.calls.insert(call_id.clone(), Call::new(call_id.clone()));
        Ok(self.calls.get_mut(&call_id).unwrap())
    }

    pub fn delete_call(&mut self, call_id: &CallId) {
        if let Some(call) = self.calls.remove(call_id) {
            for dialog_key in &call.dialogs {
                self.dialogs.remove(dialog_key);
            }
        }
    }

    /// Roll back a partially created transaction/dialog/call triple on
    /// a send failure: allocation and internal-failure handlers must
    /// undo any entities they had already registered before the send
    /// broke.
    pub fn rollback_new_invite(&mut self, branch: &Branch, dialog_key: Option<&DialogKey>, call_id: Option<&CallId>) {
        self.delete_transaction(branch);
        if let Some(key) = dialog_key {
            self.delete_dialog(key);
        }
        if let Some(id) = call_id {
            self.delete_call(id);
        }
    }

    /// Find the dialog carrying the pair of tags in either order: a
    /// request can be sent by whichever side of the dialog speaks
    /// next, so its own From-tag may be the dialog's key's From-tag
    /// (it's still the original caller) or its To-tag (it's the
    /// original callee replying back). Returns the dialog and its
    /// canonical key.
    pub fn find_dialog_by_tags(&self, from_tag: &str, to_tag: &str) -> Option<(&Dialog, DialogKey)> {
        let direct = DialogKey {
            from_tag: from_tag.to_string(),
            to_tag: to_tag.to_string(),
        };
        if let Some(dialog) = self.dialogs.get(&direct) {
            return Some((dialog, direct));
        }
        let reversed = DialogKey {
            from_tag: to_tag.to_string(),
            to_tag: from_tag.to_string(),
        };
        self.dialogs.get(&reversed).map(|dialog| (dialog, reversed))
    }
}

fn header_value_eq(msg: &Message, header: &str, expected: &str) -> bool {
    sipd_wire::parser::get_header_value(msg, header)
        .map(|r| msg.str_at(&r) == expected)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn req(call_id: &str) -> Arc<Message> {
        let text = format!(
            "INVITE sip:bob@a SIP/2.0\r\nVia: SIP/2.0/UDP c;branch=z9hG4bK-1\r\nFrom: <sip:a>;tag=A\r\nTo: <sip:b>\r\nCall-ID: {call_id}\r\nCSeq: 1 INVITE\r\nMax-Forwards: 70\r\nContent-Length: 0\r\n\r\n"
        );
        Arc::new(Message::new(Bytes::from(text), "127.0.0.1:5060".parse().unwrap()))
    }

    fn bye_req(call_id: &str) -> Arc<Message> {
        let text = format!(
            "BYE sip:bob@a SIP/2.0\r\nVia: SIP/2.0/UDP c;branch=z9hG4bK-1\r\nFrom: <sip:a>;tag=A\r\nTo: <sip:b>;tag=B\r\nCall-ID: {call_id}\r\nCSeq: 1 BYE\r\nMax-Forwards: 70\r\nContent-Length: 0\r\n\r\n"
        );
        Arc::new(Message::new(Bytes::from(text), "127.0.0.1:5060".parse().unwrap()))
    }

    #[test]
    fn branch_ids_are_unique_per_worker() {
        let mut reg = Registry::new();
        let branch = Branch("b1".into());
        reg.create_transaction(branch.clone(), req("C1")).unwrap();
        assert!(reg.create_transaction(branch, req("C1")).is_err());
    }

    #[test]
    fn deleting_dialog_detaches_but_does_not_delete_transactions() {
        let mut reg = Registry::new();
        let branch = Branch("b1".into());
        reg.create_transaction(branch.clone(), req("C1")).unwrap();
        reg.create_call(CallId("C1".into())).unwrap();
        let key = DialogKey {
            from_tag: "A".into(),
            to_tag: "B".into(),
        };
        reg.create_dialog(key.clone(), CallId("C1".into())).unwrap();
        reg.find_dialog_mut(&key).unwrap().own_transaction(branch.clone());
        reg.find_transaction_mut(&branch).unwrap().dialog = Some(key.clone());

        reg.delete_dialog(&key);

        assert!(reg.find_dialog(&key).is_none());
        assert!(reg.find_transaction(&branch).is_some());
        assert!(reg.find_transaction(&branch).unwrap().dialog.is_none());
    }

    #[test]
    fn correlate_detects_retransmission() {
        let mut reg = Registry::new();
        let branch = Branch("b1".into());
        let request = req("C1");
        let peer = request.peer;
        reg.create_transaction(branch.clone(), request).unwrap();

        match reg.correlate(&branch, "1 INVITE", peer, false) {
            Correlation::Retransmission => {}
            _ => panic!("expected retransmission"),
        }
    }

    #[test]
    fn correlate_detects_collision() {
        let mut reg = Registry::new();
        let branch = Branch("b1".into());
        let request = req("C1");
        let other_peer = "10.0.0.9:5060".parse().unwrap();
        reg.create_transaction(branch.clone(), request).unwrap();

        match reg.correlate(&branch, "2 INVITE", other_peer, false) {
            Correlation::Collision => {}
            _ => panic!("expected collision"),
        }
    }

    #[test]
    fn ack_colliding_with_a_non_invite_branch_is_a_collision() {
        let mut reg = Registry::new();
        let branch = Branch("b1".into());
        let request = bye_req("C1");
        let other_peer = "10.0.0.9:5060".parse().unwrap();
        reg.create_transaction(branch.clone(), request).unwrap();

        match reg.correlate(&branch, "1 ACK", other_peer, true) {
            Correlation::Collision => {}
            _ => panic!("expected collision, not AckForInvite, against a BYE transaction"),
        }
    }
}
