//! Contains the building blocks the `Scheduler` is assembled from.
//!
//! The queue and registry track scheduling requests from submission to
//! materialization; the tracker and quantum runner drive long-running tasks.
//! The `Scheduler` owns one of each and wires them to a `Reactor`.

pub mod quantum;
pub mod queue;
pub mod registry;
pub mod tracker;
