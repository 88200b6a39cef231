use std::time::Duration;

/// What a fired timer is for. Carried on the event the timer service
/// sends back so the worker can dispatch without re-deriving context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerType {
    /// RFC 3261 Timer H: an INVITE server transaction waiting in
    /// COMPLETED for the ACK to its final response.
    AckWait,
    /// Cleanup of an entity (transaction/dialog/call) that reached a
    /// terminal state; gives log consumers a window to observe the
    /// terminal state before the registry drops it.
    Cleanup,
}

/// Default durations for the timers this crate wires up. `ack_wait`
/// mirrors RFC 3261's Timer H default (64 * T1, T1 = 500ms); `cleanup`
/// is this implementation's own choice, not an RFC timer.
#[derive(Debug, Clone, Copy)]
pub struct TimerSettings {
    pub ack_wait: Duration,
    pub cleanup: Duration,
}

impl Default for TimerSettings {
    fn default() -> Self {
        TimerSettings {
            ack_wait: Duration::from_millis(32_000),
            cleanup: Duration::from_millis(5_000),
        }
    }
}
