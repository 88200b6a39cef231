use std::sync::Arc;

use bytes::Bytes;
use sipd_wire::message::MAX_DATAGRAM;
use sipd_wire::{parser, Message};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::queue::MessageQueue;

/// Hash a Call-ID to a worker index by summing its bytes modulo the
/// worker count.
///
/// Deliberately simple: the only guarantee is that every datagram for
/// one Call-ID lands on the same worker, never that the distribution
/// across workers is uniform.
pub fn sharding_key(call_id: &[u8], worker_count: usize) -> usize {
    debug_assert!(worker_count > 0);
    let sum: u64 = call_id.iter().map(|&b| b as u64).sum();
    (sum % worker_count as u64) as usize
}

/// The sole receiver on the UDP socket. Reads one datagram at a time,
/// extracts the Call-ID, and enqueues onto the worker it hashes to.
pub struct Dispatcher {
    socket: Arc<UdpSocket>,
    worker_queues: Vec<MessageQueue>,
    shutdown: watch::Receiver<bool>,
}

impl Dispatcher {
    pub fn new(
        socket: Arc<UdpSocket>,
        worker_queues: Vec<MessageQueue>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Dispatcher {
            socket,
            worker_queues,
            shutdown,
        }
    }

    /// Run the receive loop until the shutdown signal fires.
    pub async fn run(mut self) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => {
                    debug!("dispatcher shutting down");
                    return;
                }
                recv = self.socket.recv_from(&mut buf) => {
                    match recv {
                        Ok((len, peer)) => self.handle_datagram(&buf[..len], peer),
                        Err(err) => {
                            warn!(error = %err, "UDP recv_from failed");
                        }
                    }
                }
            }
        }
    }

    fn handle_datagram(&self, datagram: &[u8], peer: std::net::SocketAddr) {
        let msg = Message::new(Bytes::copy_from_slice(datagram), peer);
        let call_id = match parser::get_header_value(&msg, "Call-ID") {
            Some(range) => msg.slice(&range).to_vec(),
            None => {
                debug!(%peer, "dropping datagram with no Call-ID");
                return;
            }
        };

        let worker = sharding_key(&call_id, self.worker_queues.len());
        trace!(%peer, worker, "dispatching datagram");

        if let Err(err) = self.worker_queues[worker].try_enqueue(Arc::new(msg)) {
            debug!(%peer, worker, error = %err, "dropping datagram, worker queue full or closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn test_dispatcher(worker_queues: Vec<MessageQueue>) -> Dispatcher {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        Dispatcher::new(Arc::new(socket), worker_queues, shutdown_rx)
    }

    #[tokio::test]
    async fn datagram_with_no_call_id_is_dropped_without_reaching_a_worker() {
        let (queue, mut rx) = MessageQueue::bounded(4);
        let dispatcher = test_dispatcher(vec![queue]).await;
        let peer = "127.0.0.1:6000".parse().unwrap();

        dispatcher.handle_datagram(b"OPTIONS sip:x SIP/2.0\r\n\r\n", peer);

        let received = tokio::time::timeout(Duration::from_millis(50), rx.dequeue()).await;
        assert!(received.is_err(), "no datagram should ever reach the worker queue");
    }

    #[test]
    fn sharding_is_a_pure_function_of_call_id() {
        let a = sharding_key(b"C1", 5);
        let b = sharding_key(b"C1", 5);
        assert_eq!(a, b);
    }

    #[test]
    fn different_call_ids_may_land_on_different_workers() {
        let a = sharding_key(b"C1", 5);
        let b = sharding_key(b"C2", 5);
        // Not asserting inequality (collisions are fine) — only that
        // the function is well-defined and in range.
        assert!(a < 5);
        assert!(b < 5);
    }

    proptest::proptest! {
        #[test]
        fn sharding_is_deterministic(id in "[a-zA-Z0-9]{1,32}", workers in 1usize..16) {
            let a = sharding_key(id.as_bytes(), workers);
            let b = sharding_key(id.as_bytes(), workers);
            assert_eq!(a, b);
            assert!(a < workers);
        }
    }
}
