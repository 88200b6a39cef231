/// The core configuration surface: listening port, worker count, and
/// per-worker queue capacity. Nothing else is configurable at this
/// layer — the CLI surface lives in `sipd`, the binary crate, not
/// here.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub worker_count: usize,
    pub queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 5060,
            worker_count: 5,
            queue_capacity: sipd_transport::queue::DEFAULT_CAPACITY,
        }
    }
}
