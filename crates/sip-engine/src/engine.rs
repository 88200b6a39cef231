//! The request state machines: INVITE, ACK, BYE, the generic
//! "unsupported method" path, and a classifier stub for inbound
//! responses.

use std::sync::Arc;

use sipd_wire::message::FirstLine;
use sipd_wire::response::{build, ResponseTemplate};
use sipd_wire::status::{code, StatusClass};
use sipd_wire::{parser, Message, Method};
use sipd_transport::{TimerService, TimerType};
use tracing::{debug, info, warn};

use crate::call::CallState;
use crate::dialog::DialogState;
use crate::error::EngineError;
use crate::ids::{Branch, CallId, DialogKey};
use crate::registry::{Correlation, Registry};
use crate::responder::Responder;
use crate::transaction::TransactionState;

fn transaction_key(branch: &Branch) -> String {
    format!("txn:{branch}")
}

fn dialog_key_string(key: &DialogKey) -> String {
    format!("dlg:{key}")
}

fn call_key(call_id: &CallId) -> String {
    format!("call:{call_id}")
}

/// Resolve a cleanup/ack-wait timer key back into the registry entity
/// it names. Shared with the worker loop, which owns the timer event
/// channel and applies the resulting mutation.
pub enum TimerTarget {
    Transaction(Branch),
    Dialog(DialogKey),
    Call(CallId),
    Unrecognized,
}

pub fn resolve_timer_key(key: &str) -> TimerTarget {
    if let Some(rest) = key.strip_prefix("txn:") {
        return TimerTarget::Transaction(Branch(rest.to_string()));
    }
    if let Some(rest) = key.strip_prefix("dlg:") {
        if let Some((from_tag, to_tag)) = rest.split_once(':') {
            return TimerTarget::Dialog(DialogKey {
                from_tag: from_tag.to_string(),
                to_tag: to_tag.to_string(),
            });
        }
    }
    if let Some(rest) = key.strip_prefix("call:") {
        return TimerTarget::Call(CallId(rest.to_string()));
    }
    TimerTarget::Unrecognized
}

/// Drives one parsed message through the registry and emits whatever
/// responses the state machines below call for. Owns no state of its
/// own beyond a reference to the outbound sink and the timer service
/// used to arm ACK-wait and cleanup timers.
pub struct RequestEngine<'r> {
    responder: &'r dyn Responder,
    timers: &'r TimerService,
}

impl<'r> RequestEngine<'r> {
    pub fn new(responder: &'r dyn Responder, timers: &'r TimerService) -> Self {
        RequestEngine { responder, timers }
    }

    /// Entry point: parse `msg` fully and route it. Parse failures are
    /// handled before any registry mutation happens: a message that
    /// can't be trusted never touches the call/dialog/transaction
    /// tables.
    pub async fn process(&self, registry: &mut Registry, msg: Arc<Message>) {
        if let Err(err) = parser::parse_message(&msg) {
            let engine_err = EngineError::from(err);
            match &engine_err {
                // Headers are already valid at this point (method
                // resolution is the last check the parser runs), so
                // the generic unsupported-method path still applies.
                EngineError::UnknownMethod => {}
                EngineError::MissingMandatoryHeader(_) | EngineError::MissingMandatoryParameter { .. } => {
                    debug!(error = %engine_err, "rejecting request, replying 400");
                    self.send_bad_request(&msg).await;
                    return;
                }
                _ => {
                    debug!(error = %engine_err, "dropping message");
                    return;
                }
            }
        }

        let is_request = match msg.is_request() {
            Some(v) => v,
            None => return,
        };
        if !is_request {
            self.process_response(registry, &msg);
            return;
        }

        self.process_request(registry, msg.clone()).await;
    }

    async fn send_bad_request(&self, msg: &Arc<Message>) {
        let template = ResponseTemplate {
            request: msg,
            status_code: code::BAD_REQUEST,
            to_tag: None,
        };
        self.responder.send(msg.peer, build(&template)).await;
    }

    async fn process_request(&self, registry: &mut Registry, msg: Arc<Message>) {
        let branch = Branch(required_str(&msg, parser::get_via_branch(&msg)));
        let from_tag = required_str(&msg, parser::get_from_tag(&msg));
        let to_tag = parser::get_to_tag(&msg)
            .ok()
            .flatten()
            .map(|r| msg.str_at(&r).to_string());
        let call_id = CallId(header_str(&msg, "Call-ID"));
        let cseq = header_str(&msg, "CSeq");
        let method = match parser::parse_first_line(&msg) {
            Ok(FirstLine::Request { method, .. }) => method,
            _ => Method::Unknown,
        };

        let correlation = registry.correlate(&branch, &cseq, msg.peer, method == Method::Ack);

        match correlation {
            Correlation::Retransmission => {
                self.resend_stored_response(registry, &branch, &msg).await
            }
            Correlation::Collision => {
                let err = EngineError::TransactionCollision { branch: branch.0.clone() };
                warn!(error = %err, "dropping request");
            }
            Correlation::AckForInvite => self.handle_ack_for_invite(registry, &branch, msg),
            Correlation::New => match method {
                Method::Invite => {
                    self.handle_invite(registry, msg, branch, from_tag, to_tag, call_id)
                        .await
                }
                Method::Ack => self.handle_fresh_ack(registry, msg, branch, from_tag, to_tag),
                Method::Bye => {
                    self.handle_bye(registry, msg, branch, from_tag, to_tag)
                        .await
                }
                _ => self.handle_unsupported(registry, msg, branch).await,
            },
        }
    }

    async fn resend_stored_response(&self, registry: &Registry, branch: &Branch, msg: &Arc<Message>) {
        if let Some(response) = registry
            .find_transaction(branch)
            .and_then(|tx| tx.last_response.clone())
        {
            // A failed resend does not roll back state that was
            // already committed on first delivery.
            self.responder.send(msg.peer, response).await;
        }
    }

    fn handle_ack_for_invite(&self, registry: &mut Registry, branch: &Branch, msg: Arc<Message>) {
        let Some(tx) = registry.find_transaction_mut(branch) else {
            return;
        };
        if tx.state == TransactionState::Completed {
            debug!(%branch, "ACK received for failed INVITE");
            tx.cancel_ack_wait_timer();
        } else {
            warn!(%branch, state = %tx.state, "unexpected ACK for INVITE transaction");
        }
        tx.ack = Some(msg);
        tx.set_state(TransactionState::Terminated);
        self.timers.schedule(transaction_key(branch), TimerType::Cleanup);
    }

    fn handle_fresh_ack(
        &self,
        registry: &mut Registry,
        msg: Arc<Message>,
        branch: Branch,
        from_tag: String,
        to_tag: Option<String>,
    ) {
        if registry.create_transaction(branch.clone(), msg).is_err() {
            return;
        }
        let confirmed = to_tag.as_deref().is_some_and(|to| {
            registry
                .find_dialog_by_tags(&from_tag, to)
                .is_some_and(|(d, _)| d.state == DialogState::Confirmed)
        });
        if confirmed {
            debug!(%branch, "ACK for successfully established dialog");
        } else {
            warn!(%branch, "unexpected ACK: no confirmed dialog matches");
        }
        if let Some(tx) = registry.find_transaction_mut(&branch) {
            tx.set_state(TransactionState::Terminated);
        }
        self.timers.schedule(transaction_key(&branch), TimerType::Cleanup);
    }

    async fn handle_invite(
        &self,
        registry: &mut Registry,
        msg: Arc<Message>,
        branch: Branch,
        from_tag: String,
        to_tag: Option<String>,
        call_id: CallId,
    ) {
        if registry.create_transaction(branch.clone(), msg.clone()).is_err() {
            return;
        }

        let existing_dialog = to_tag
            .as_deref()
            .and_then(|to| registry.find_dialog_by_tags(&from_tag, to));
        if existing_dialog.is_some() {
            // Re-INVITE against an established dialog: not supported,
            // reply 501 and leave the existing dialog/call untouched.
            info!(%branch, "re-INVITE received, replying 501 (not implemented)");
            self.send_response(registry, &branch, &msg, code::NOT_IMPLEMENTED, None)
                .await;
            self.terminate_transaction(registry, &branch);
            return;
        }

        if !self
            .send_response(registry, &branch, &msg, code::TRYING, None)
            .await
        {
            self.send_response(registry, &branch, &msg, code::INTERNAL_SERVER_ERROR, None)
                .await;
            registry.delete_transaction(&branch);
            return;
        }
        if let Some(tx) = registry.find_transaction_mut(&branch) {
            tx.set_state(TransactionState::Proceeding);
        }

        let to_tag_value = registry.new_to_tag();
        let dialog_key = DialogKey {
            from_tag,
            to_tag: to_tag_value.clone(),
        };
        if registry.create_dialog(dialog_key.clone(), call_id.clone()).is_err()
            || registry.create_call(call_id.clone()).is_err()
        {
            self.send_response(registry, &branch, &msg, code::INTERNAL_SERVER_ERROR, None)
                .await;
            registry.rollback_new_invite(&branch, Some(&dialog_key), Some(&call_id));
            return;
        }
        registry.find_call_mut(&call_id).unwrap().set_state(CallState::Incoming);
        registry.find_call_mut(&call_id).unwrap().own_dialog(dialog_key.clone());
        registry
            .find_dialog_mut(&dialog_key)
            .unwrap()
            .own_transaction(branch.clone());
        if let Some(tx) = registry.find_transaction_mut(&branch) {
            tx.dialog = Some(dialog_key.clone());
        }

        if !self
            .send_response(
                registry,
                &branch,
                &msg,
                code::RINGING,
                Some(to_tag_value.clone()),
            )
            .await
        {
            self.fail_invite(registry, &branch, &msg, &dialog_key, &call_id)
                .await;
            return;
        }
        registry.find_call_mut(&call_id).unwrap().set_state(CallState::Ringing);

        if !self
            .send_response(registry, &branch, &msg, code::OK, Some(to_tag_value))
            .await
        {
            self.fail_invite(registry, &branch, &msg, &dialog_key, &call_id)
                .await;
            return;
        }

        self.terminate_transaction(registry, &branch);
        registry
            .find_dialog_mut(&dialog_key)
            .unwrap()
            .set_state(DialogState::Confirmed);
        registry
            .find_call_mut(&call_id)
            .unwrap()
            .set_state(CallState::Established);
    }

    /// On a mid-sequence send failure the INVITE transaction parks in
    /// COMPLETED awaiting an ACK that may never come; arm the ACK-wait
    /// timer so it doesn't linger forever if the caller gives up.
    async fn fail_invite(
        &self,
        registry: &mut Registry,
        branch: &Branch,
        msg: &Arc<Message>,
        dialog_key: &DialogKey,
        call_id: &CallId,
    ) {
        self.send_response(registry, branch, msg, code::INTERNAL_SERVER_ERROR, None)
            .await;
        let err = EngineError::InternalFailure("response send failed mid-sequence");
        warn!(%branch, error = %err, "INVITE sequence aborted");
        let ack_wait_timer = self.timers.schedule(transaction_key(branch), TimerType::AckWait);
        if let Some(tx) = registry.find_transaction_mut(branch) {
            tx.set_state(TransactionState::Completed);
            tx.ack_wait_timer = Some(ack_wait_timer);
        }
        if let Some(dialog) = registry.find_dialog_mut(dialog_key) {
            dialog.set_state(DialogState::Terminated);
        }
        self.timers
            .schedule(dialog_key_string(dialog_key), TimerType::Cleanup);
        if let Some(call) = registry.find_call_mut(call_id) {
            call.set_state(CallState::Failed);
        }
        self.timers.schedule(call_key(call_id), TimerType::Cleanup);
    }

    async fn handle_bye(
        &self,
        registry: &mut Registry,
        msg: Arc<Message>,
        branch: Branch,
        from_tag: String,
        to_tag: Option<String>,
    ) {
        if registry.create_transaction(branch.clone(), msg.clone()).is_err() {
            return;
        }
        // A BYE with no To-tag can never match an established dialog
        // (every dialog is keyed by a generated To-tag), so it always
        // falls into the "no dialog" / 404 branch below. The BYE may
        // come from either side of the dialog, so its own From-tag
        // can land in either slot of the dialog's key.
        let found = to_tag.as_deref().and_then(|to| registry.find_dialog_by_tags(&from_tag, to));
        let dialog_key = found.as_ref().map(|(_, key)| key.clone());
        let dialog_state = found.map(|(d, _)| d.state);

        match dialog_state {
            Some(DialogState::Confirmed) => {
                let dialog_key = dialog_key.expect("dialog_state is Some only when dialog_key is Some");
                let call_id = registry.find_dialog(&dialog_key).unwrap().call_id.clone();
                if let Some(call) = registry.find_call_mut(&call_id) {
                    call.set_state(CallState::Terminating);
                }
                self.send_response(registry, &branch, &msg, code::OK, None).await;
                if let Some(call) = registry.find_call_mut(&call_id) {
                    call.set_state(CallState::Terminated);
                }
                self.timers.schedule(call_key(&call_id), TimerType::Cleanup);
                if let Some(dialog) = registry.find_dialog_mut(&dialog_key) {
                    dialog.set_state(DialogState::Terminated);
                }
                self.timers
                    .schedule(dialog_key_string(&dialog_key), TimerType::Cleanup);
            }
            Some(_non_confirmed) => {
                self.send_response(registry, &branch, &msg, code::FORBIDDEN, None)
                    .await;
            }
            None => {
                self.send_response(registry, &branch, &msg, code::NOT_FOUND, None)
                    .await;
            }
        }

        self.terminate_transaction(registry, &branch);
    }

    async fn handle_unsupported(&self, registry: &mut Registry, msg: Arc<Message>, branch: Branch) {
        if registry.create_transaction(branch.clone(), msg.clone()).is_err() {
            return;
        }
        self.send_response(registry, &branch, &msg, code::NOT_IMPLEMENTED, None)
            .await;
        self.terminate_transaction(registry, &branch);
    }

    fn terminate_transaction(&self, registry: &mut Registry, branch: &Branch) {
        if let Some(tx) = registry.find_transaction_mut(branch) {
            tx.set_state(TransactionState::Terminated);
        }
        self.timers.schedule(transaction_key(branch), TimerType::Cleanup);
    }

    /// Inbound responses: classify by status-code range and dispatch
    /// to the corresponding (stub) handler. The full client-side
    /// transaction semantics are out of scope; branch lookup alone
    /// decides drop-vs-log.
    fn process_response(&self, registry: &Registry, msg: &Message) {
        let Ok(FirstLine::Response { status_code, .. }) = parser::parse_first_line(msg) else {
            return;
        };
        let Some(branch_range) = parser::get_via_branch(msg).ok().flatten() else {
            return;
        };
        let branch = Branch(msg.str_at(&branch_range).to_string());
        if registry.find_transaction(&branch).is_none() {
            debug!(%branch, status_code, "dropping response: no matching transaction");
            return;
        }
        match StatusClass::of(status_code) {
            Some(StatusClass::Provisional) => debug!(%branch, status_code, "provisional response (stub)"),
            Some(StatusClass::Success) => debug!(%branch, status_code, "success response (stub)"),
            Some(StatusClass::Redirection) => debug!(%branch, status_code, "redirection response (stub)"),
            Some(StatusClass::ClientError) => debug!(%branch, status_code, "client error response (stub)"),
            Some(StatusClass::ServerError) => debug!(%branch, status_code, "server error response (stub)"),
            Some(StatusClass::GlobalFailure) => debug!(%branch, status_code, "global failure response (stub)"),
            None => debug!(%branch, status_code, "response with out-of-range status code"),
        }
    }

    async fn send_response(
        &self,
        registry: &mut Registry,
        branch: &Branch,
        request: &Arc<Message>,
        status_code: u16,
        to_tag: Option<String>,
    ) -> bool {
        let template = ResponseTemplate {
            request,
            status_code,
            to_tag,
        };
        let datagram = build(&template);
        let ok = self.responder.send(request.peer, datagram.clone()).await;
        if ok {
            if let Some(tx) = registry.find_transaction_mut(branch) {
                tx.record_sent_response(status_code, datagram);
            }
        }
        ok
    }
}

fn header_str(msg: &Message, name: &str) -> String {
    parser::get_header_value(msg, name)
        .map(|r| msg.str_at(&r).to_string())
        .unwrap_or_default()
}

fn required_str(msg: &Message, value: sipd_wire::error::ParseResult<Option<std::ops::Range<usize>>>) -> String {
    value
        .ok()
        .flatten()
        .map(|r| msg.str_at(&r).to_string())
        .unwrap_or_default()
}
