//! # Cadence
//!
//! A cooperative, receipt-based task scheduler layered over a single event
//! reactor.
//!
//! Cadence lets a monitoring or control process register many concurrent timed
//! activities without spawning threads, while making sure no single
//! long-running task monopolizes the loop.
//!
//! ## Core Concepts
//!
//! - **Reactor**: the event loop that actually fires timers. Cadence ships a
//!   tokio-backed `TokioReactor` and a deterministic `VirtualReactor`.
//! - **Receipts**: every request submitted with `schedule`, `every` or `after`
//!   returns a strictly increasing `Receipt` that can later cancel it.
//! - **Run Loop**: requests are queued first and registered with the reactor in
//!   batches, once per `run_loop_interval`.
//! - **Quantized Tasks**: long-running work is written as a step function and
//!   executed at most `ITERATIONS_PER_QUANTUM` steps per reactor tick.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cadence::prelude::*;
//! use std::rc::Rc;
//! use std::time::Duration;
//!
//! fn main() -> anyhow::Result<()> {
//!     let reactor = Rc::new(TokioReactor::new());
//!     let scheduler = Scheduler::new(reactor, SchedulerConfig::default())?;
//!
//!     scheduler.every(Duration::from_secs(5), || println!("5 seconds have passed!"))?;
//!
//!     let mut remaining = 1_000;
//!     scheduler.start_task("countdown", move || {
//!         remaining -= 1;
//!         remaining > 0
//!     });
//!
//!     let handle = scheduler.clone();
//!     scheduler.after(Duration::from_secs(30), move || handle.stop());
//!
//!     // Runs the reactor until `stop` is called.
//!     scheduler.start()?;
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Cadence Scheduler";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Declare all the modules in the crate.
pub mod common;
pub mod components;
pub mod config;
pub mod error;
pub mod events;
pub mod reactor;
pub mod scheduler;

/// A prelude module for easy importing of the most common Cadence types.
pub mod prelude {
    pub use crate::common::{Receipt, TaskKey, TimerHandle};
    pub use crate::components::quantum::{Step, ITERATIONS_PER_QUANTUM};
    pub use crate::components::queue::{DispatchKind, ScheduleSpec};
    pub use crate::components::registry::ReceiptState;
    pub use crate::config::SchedulerConfig;
    pub use crate::error::{ReactorError, SchedulerError};
    pub use crate::events::SchedulerEvent;
    pub use crate::reactor::{Reactor, TokioReactor, VirtualReactor};
    pub use crate::scheduler::Scheduler;
}
