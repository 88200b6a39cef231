use std::sync::Arc;

use sipd_wire::Message;
use thiserror::Error;
use tokio::sync::mpsc;

/// Default queue capacity when a worker isn't configured otherwise.
pub const DEFAULT_CAPACITY: usize = 10;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is full")]
    Full,
    #[error("queue is closed")]
    Closed,
}

/// A bounded, single-producer/single-consumer-per-worker FIFO of
/// messages awaiting processing by one worker.
///
/// Modeled on a command-channel split used to hand work into an
/// event loop: `enqueue` is the non-blocking producer side (the
/// dispatcher, which must never stall on a slow worker), `dequeue` is
/// the blocking consumer side (the worker's own loop). A full queue
/// is dropped by the producer, never awaited.
pub struct MessageQueue {
    tx: mpsc::Sender<Arc<Message>>,
}

pub struct MessageQueueReceiver {
    rx: mpsc::Receiver<Arc<Message>>,
}

impl MessageQueue {
    pub fn bounded(capacity: usize) -> (MessageQueue, MessageQueueReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (MessageQueue { tx }, MessageQueueReceiver { rx })
    }

    /// Attempt to enqueue without blocking. Returns `Err(QueueError::Full)`
    /// immediately if the queue is at capacity — the producer drops
    /// the message rather than waiting for room.
    pub fn try_enqueue(&self, msg: Arc<Message>) -> Result<(), QueueError> {
        self.tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }
}

impl Clone for MessageQueue {
    fn clone(&self) -> Self {
        MessageQueue { tx: self.tx.clone() }
    }
}

impl MessageQueueReceiver {
    /// Block (asynchronously) until a message is available, or return
    /// `None` once every producer handle has been dropped.
    pub async fn dequeue(&mut self) -> Option<Arc<Message>> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn fake_message() -> Arc<Message> {
        Arc::new(Message::new(
            Bytes::from_static(b"OPTIONS sip:x SIP/2.0\r\n\r\n"),
            "127.0.0.1:5060".parse().unwrap(),
        ))
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let (q, mut rx) = MessageQueue::bounded(1);
        q.try_enqueue(fake_message()).unwrap();
        assert_eq!(q.try_enqueue(fake_message()), Err(QueueError::Full));
        assert!(rx.dequeue().await.is_some());
    }

    #[tokio::test]
    async fn dequeue_returns_items_in_fifo_order() {
        let (q, mut rx) = MessageQueue::bounded(4);
        for _ in 0..3 {
            q.try_enqueue(fake_message()).unwrap();
        }
        for _ in 0..3 {
            assert!(rx.dequeue().await.is_some());
        }
    }
}
