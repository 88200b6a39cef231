//! A single worker task: owns one registry and drains both its share
//! of the dispatcher's queue and its timer events. No locking is
//! needed here because Call-ID sharding guarantees every message for
//! a given call lands on exactly one worker.

use std::sync::Arc;

use sipd_transport::{MessageQueueReceiver, TimerEvent, TimerService, TimerType};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::engine::{resolve_timer_key, RequestEngine, TimerTarget};
use crate::registry::Registry;
use crate::responder::Responder;
use crate::transaction::TransactionState;

pub struct Worker {
    pub id: usize,
    pub queue: MessageQueueReceiver,
    pub timer_rx: mpsc::Receiver<TimerEvent>,
    pub responder: Arc<dyn Responder>,
    pub timers: TimerService,
}

impl Worker {
    pub async fn run(self) {
        let Worker {
            id,
            mut queue,
            mut timer_rx,
            responder,
            timers,
        } = self;
        let mut registry = Registry::new();
        let engine = RequestEngine::new(responder.as_ref(), &timers);

        info!(worker = id, "worker started");
        loop {
            tokio::select! {
                biased;
                event = timer_rx.recv() => {
                    match event {
                        Some(event) => handle_timer_event(&mut registry, &timers, event),
                        None => {
                            info!(worker = id, "timer channel closed, shutting down");
                            break;
                        }
                    }
                }
                msg = queue.dequeue() => {
                    match msg {
                        Some(msg) => engine.process(&mut registry, msg).await,
                        None => {
                            info!(worker = id, "message queue closed, shutting down");
                            break;
                        }
                    }
                }
            }
        }
    }
}

fn handle_timer_event(registry: &mut Registry, timers: &TimerService, event: TimerEvent) {
    match (resolve_timer_key(&event.key), event.kind) {
        (TimerTarget::Transaction(branch), TimerType::AckWait) => {
            if let Some(tx) = registry.find_transaction_mut(&branch) {
                if tx.state == TransactionState::Completed {
                    warn!(%branch, "ACK wait timer fired with no ACK, terminating transaction");
                    tx.set_state(TransactionState::Terminated);
                    timers.schedule(format!("txn:{branch}"), TimerType::Cleanup);
                }
            }
        }
        (TimerTarget::Transaction(branch), TimerType::Cleanup) => {
            registry.delete_transaction(&branch);
        }
        (TimerTarget::Dialog(key), TimerType::Cleanup) => {
            registry.delete_dialog(&key);
        }
        (TimerTarget::Dialog(_), TimerType::AckWait) => {}
        (TimerTarget::Call(call_id), TimerType::Cleanup) => {
            registry.delete_call(&call_id);
        }
        (TimerTarget::Call(_), TimerType::AckWait) => {}
        (TimerTarget::Unrecognized, _) => {
            warn!(key = %event.key, "timer fired for an unrecognized key");
        }
    }
}
