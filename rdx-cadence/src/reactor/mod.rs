//! The event-loop capability the scheduler is built on.
//!
//! A `Reactor` fires timers and runs next-tick callbacks on a single thread.
//! The scheduler never fires anything itself; it only registers work here.
//! Two implementations ship with the crate:
//!
//! - [`TokioReactor`] drives a tokio current-thread runtime and `LocalSet`.
//! - [`VirtualReactor`] runs on a virtual clock, for tests and simulations.

mod simulated;
mod tokio_reactor;

pub use simulated::VirtualReactor;
pub use tokio_reactor::TokioReactor;

use crate::common::TimerHandle;
use crate::error::ReactorError;
use std::time::Duration;

/// A callback fired at most once.
pub type OnceCallback = Box<dyn FnOnce() + 'static>;

/// A callback fired repeatedly until its timer is cancelled.
pub type RepeatingCallback = Box<dyn FnMut() + 'static>;

/// A single-threaded event loop providing timers and tick scheduling.
///
/// Implementations must not hold internal borrows while invoking callbacks:
/// callbacks routinely re-enter the reactor to add or cancel timers.
pub trait Reactor: 'static {
    /// Fires `callback` once after `delay`.
    fn add_timer(&self, delay: Duration, callback: OnceCallback)
        -> Result<TimerHandle, ReactorError>;

    /// Fires `callback` every `interval` until the timer is cancelled.
    fn add_periodic_timer(
        &self,
        interval: Duration,
        callback: RepeatingCallback,
    ) -> Result<TimerHandle, ReactorError>;

    /// Stops a registered timer. Unknown or already finished handles are ignored.
    fn cancel_timer(&self, handle: TimerHandle);

    /// Runs `callback` on the next loop iteration.
    fn next_tick(&self, callback: OnceCallback);

    /// Runs the loop, invoking `block` from inside it, until `stop` is called.
    fn run(&self, block: OnceCallback) -> Result<(), ReactorError>;

    /// Whether the loop is currently running.
    fn is_running(&self) -> bool;

    /// Terminates the loop, and with it every consumer sharing it.
    fn stop(&self);
}
