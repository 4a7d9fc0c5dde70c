//! Defines the events broadcast by the `Scheduler`.
//!
//! Subscribers receive these over a `tokio::sync::broadcast` channel. Sending
//! never fails the scheduler: events emitted while nobody listens are dropped.

use crate::common::{Receipt, TaskKey};

/// Capacity of the scheduler's event channel.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle events for scheduled requests and quantized tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// A request was accepted and queued.
    Scheduled { receipt: Receipt },
    /// A queued request was registered with the reactor.
    Materialized { receipt: Receipt },
    /// A pending or materialized request was cancelled.
    Cancelled { receipt: Receipt },
    /// A one-shot request fired and its receipt retired.
    Fired { receipt: Receipt },
    /// The run loop finished a cycle.
    RunLoopCycle { materialized: usize },
    /// A quantized task began executing.
    TaskStarted { key: TaskKey },
    /// A quantized task reported that its work is done.
    TaskCompleted { key: TaskKey },
}
