//! The dispatcher that reads UDP datagrams and shards them to
//! workers, the bounded queue each worker drains, and the single-shot
//! timer subsystem.

pub mod dispatcher;
pub mod queue;
pub mod timer;

pub use dispatcher::{sharding_key, Dispatcher};
pub use queue::{MessageQueue, MessageQueueReceiver, QueueError};
pub use timer::{TimerEvent, TimerHandle, TimerService, TimerSettings, TimerType};
