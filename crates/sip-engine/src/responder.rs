use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::warn;

/// Sink for outbound response datagrams. Abstracted behind a trait so
/// the engine's state machines can be exercised against an in-memory
/// fake in tests instead of a live socket, the same separation drawn
/// between a transport and its concrete socket implementation.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Send `datagram` to `peer`. Returns `false` if the send failed,
    /// which the engine's state machines treat as a hard failure (reply
    /// 500, roll back, terminate).
    async fn send(&self, peer: SocketAddr, datagram: Vec<u8>) -> bool;
}

/// Sends over the worker's shared UDP server socket: writes are
/// independent datagrams and the kernel serializes them, so no
/// additional locking is needed here.
pub struct UdpResponder {
    socket: Arc<UdpSocket>,
}

impl UdpResponder {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        UdpResponder { socket }
    }
}

#[async_trait]
impl Responder for UdpResponder {
    async fn send(&self, peer: SocketAddr, datagram: Vec<u8>) -> bool {
        match self.socket.send_to(&datagram, peer).await {
            Ok(_) => true,
            Err(err) => {
                warn!(%peer, error = %err, "failed to send SIP response");
                false
            }
        }
    }
}

/// Test double for [`Responder`]. Not behind `#[cfg(test)]` so that
/// both unit tests in this crate and the integration tests under
/// `tests/` can drive the engine without a live socket.
pub mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Records every datagram handed to it, optionally failing the
    /// next N sends — used to exercise the rollback paths without a
    /// real socket.
    #[derive(Default)]
    pub struct RecordingResponder {
        pub sent: Mutex<Vec<(SocketAddr, Vec<u8>)>>,
        pub fail_next: Mutex<usize>,
    }

    impl RecordingResponder {
        pub fn fail_next_n(&self, n: usize) {
            *self.fail_next.lock().unwrap() = n;
        }

        pub fn sent_status_codes(&self) -> Vec<u16> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter_map(|(_, d)| status_code_of(d))
                .collect()
        }
    }

    fn status_code_of(datagram: &[u8]) -> Option<u16> {
        let text = std::str::from_utf8(datagram).ok()?;
        let first_line = text.lines().next()?;
        first_line.split_whitespace().nth(1)?.parse().ok()
    }

    #[async_trait]
    impl Responder for RecordingResponder {
        async fn send(&self, peer: SocketAddr, datagram: Vec<u8>) -> bool {
            let mut fail_next = self.fail_next.lock().unwrap();
            if *fail_next > 0 {
                *fail_next -= 1;
                return false;
            }
            drop(fail_next);
            self.sent.lock().unwrap().push((peer, datagram));
            true
        }
    }
}
