use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use super::types::{TimerSettings, TimerType};

/// Sent back to the owning worker when a scheduled timer fires.
#[derive(Debug, Clone)]
pub struct TimerEvent {
    pub key: String,
    pub kind: TimerType,
}

/// A handle to a scheduled, not-yet-fired timer. Dropping it does not
/// cancel the timer — call [`TimerHandle::cancel`] explicitly.
#[derive(Clone)]
pub struct TimerHandle {
    abort: AbortHandle,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.abort.abort();
    }
}

/// Schedules single-shot timers that report back on a channel.
///
/// Each call to [`TimerService::schedule`] spawns one `tokio` task
/// that sleeps for the timer's configured duration and then sends a
/// single [`TimerEvent`], mirroring
/// `examples/original_source/timer_manager.c`'s `timerfd` + `epoll`
/// one-shot-then-disarm behavior without needing its own thread and
/// epoll instance.
#[derive(Clone)]
pub struct TimerService {
    events_tx: mpsc::Sender<TimerEvent>,
    settings: TimerSettings,
}

impl TimerService {
    pub fn new(events_tx: mpsc::Sender<TimerEvent>) -> Self {
        TimerService {
            events_tx,
            settings: TimerSettings::default(),
        }
    }

    pub fn with_settings(events_tx: mpsc::Sender<TimerEvent>, settings: TimerSettings) -> Self {
        TimerService {
            events_tx,
            settings,
        }
    }

    /// Schedule `kind`'s configured duration from now, keyed by
    /// `key` (typically a branch id) so the receiver can match the
    /// fired event back to the transaction/dialog/call it guards.
    pub fn schedule(&self, key: impl Into<String>, kind: TimerType) -> TimerHandle {
        let duration = match kind {
            TimerType::AckWait => self.settings.ack_wait,
            TimerType::Cleanup => self.settings.cleanup,
        };
        let key = key.into();
        let tx = self.events_tx.clone();
        let join = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = tx.send(TimerEvent { key, kind }).await;
        });
        TimerHandle {
            abort: join.abort_handle(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn fires_once_after_its_duration() {
        let (tx, mut rx) = mpsc::channel(4);
        let settings = TimerSettings {
            ack_wait: Duration::from_millis(10),
            cleanup: Duration::from_millis(10),
        };
        let svc = TimerService::with_settings(tx, settings);
        let _handle = svc.schedule("branch-1", TimerType::AckWait);

        let event = rx.recv().await.expect("timer should fire");
        assert_eq!(event.key, "branch-1");
        assert_eq!(event.kind, TimerType::AckWait);
    }

    #[tokio::test]
    async fn cancel_prevents_the_event() {
        let (tx, mut rx) = mpsc::channel(4);
        let settings = TimerSettings {
            ack_wait: Duration::from_millis(50),
            cleanup: Duration::from_millis(50),
        };
        let svc = TimerService::with_settings(tx, settings);
        let handle = svc.schedule("branch-2", TimerType::AckWait);
        handle.cancel();

        let fired = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(fired.is_err(), "cancelled timer must not fire");
    }
}
