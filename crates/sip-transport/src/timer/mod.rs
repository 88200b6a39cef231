//! Single-shot timers on a monotonic clock: one timer fires exactly
//! once and disarms itself, nothing more. Split into `types`/`manager`
//! the way a fuller RFC 3261 timer letter set would be, but only two
//! concrete uses are wired up here: wait-for-ACK and terminated-entity
//! cleanup.

mod manager;
mod types;

pub use manager::{TimerEvent, TimerHandle, TimerService};
pub use types::{TimerSettings, TimerType};
