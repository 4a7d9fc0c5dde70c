//! Contains common, primitive types shared across the scheduler.
//!
//! This module defines the identifiers handed out by the scheduler and the
//! reactors. Using distinct types keeps receipts, task keys and reactor timer
//! handles from being mixed up.

use slotmap::new_key_type;
use std::borrow::{Borrow, Cow};
use std::fmt;

new_key_type! {
    /// Identifies a live timer registered with a `Reactor`.
    ///
    /// Handles are generational: once a timer is cancelled or has fired, its
    /// handle never refers to a different timer, so cancelling a stale handle
    /// is always harmless.
    pub struct TimerHandle;
}

/// Identifies exactly one scheduling request, from `schedule` until it is
/// cancelled or completes.
///
/// Receipts start at 1 and are strictly increasing for the lifetime of a
/// `Scheduler`, regardless of the dispatch kind of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Receipt(pub u64);

impl fmt::Display for Receipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Names a long-running quantized task.
///
/// At most one task per key runs at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey(Cow<'static, str>);

impl TaskKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for TaskKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for TaskKey {
    fn from(key: &'static str) -> Self {
        Self(Cow::Borrowed(key))
    }
}

impl From<String> for TaskKey {
    fn from(key: String) -> Self {
        Self(Cow::Owned(key))
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
