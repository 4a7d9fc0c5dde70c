//! Cooperative slicing of long-running tasks.
//!
//! A task is a step function that is called repeatedly until it reports
//! `Step::Done`. The scheduler never calls it more than
//! [`ITERATIONS_PER_QUANTUM`] times per reactor tick; the remaining work is
//! resumed on a later tick, so other timers and tasks get to run in between.

use crate::common::TaskKey;
use std::collections::VecDeque;

/// Maximum number of step calls a task may make per reactor tick.
pub const ITERATIONS_PER_QUANTUM: usize = 20;

/// What a step function reports after doing one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// More work remains.
    Continue,
    /// The task is complete and must not be called again.
    Done,
}

impl From<bool> for Step {
    fn from(more_work: bool) -> Self {
        if more_work {
            Step::Continue
        } else {
            Step::Done
        }
    }
}

/// A resumable unit of work.
pub type StepFn = Box<dyn FnMut() -> Step + 'static>;

/// Calls `step` until it reports `Done` or `limit` calls have been made.
///
/// Returns the last outcome together with the number of calls made.
pub fn run_quantum<F>(step: &mut F, limit: usize) -> (Step, usize)
where
    F: FnMut() -> Step + ?Sized,
{
    for iteration in 1..=limit {
        if step() == Step::Done {
            return (Step::Done, iteration);
        }
    }
    (Step::Continue, limit)
}

/// FIFO of tasks waiting for their next quantum.
#[derive(Debug, Default)]
pub struct RunQueue {
    tasks: VecDeque<TaskKey>,
    /// Whether a pump pass is already queued on the reactor.
    armed: bool,
}

impl RunQueue {
    /// Queues `key` unless it is already waiting.
    pub fn push(&mut self, key: TaskKey) {
        if !self.tasks.contains(&key) {
            self.tasks.push_back(key);
        }
    }

    pub fn pop(&mut self) -> Option<TaskKey> {
        self.tasks.pop_front()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Marks a pump pass as queued. Returns `false` if one already was.
    pub fn arm(&mut self) -> bool {
        !std::mem::replace(&mut self.armed, true)
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn countdown(mut remaining: usize) -> impl FnMut() -> Step {
        move || {
            if remaining == 0 {
                Step::Done
            } else {
                remaining -= 1;
                Step::Continue
            }
        }
    }

    #[test]
    fn test_quantum_stops_at_limit() {
        let mut step = countdown(100);
        assert_eq!(run_quantum(&mut step, 20), (Step::Continue, 20));
    }

    #[test]
    fn test_quantum_stops_when_done() {
        let mut step = countdown(3);
        assert_eq!(run_quantum(&mut step, 20), (Step::Done, 4));
    }

    #[test]
    fn test_bool_conversion() {
        assert_eq!(Step::from(true), Step::Continue);
        assert_eq!(Step::from(false), Step::Done);
    }

    #[test]
    fn test_run_queue_ignores_duplicates() {
        let mut queue = RunQueue::default();
        queue.push("a".into());
        queue.push("b".into());
        queue.push("a".into());
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(TaskKey::from("a")));
    }

    #[test]
    fn test_arm_is_idempotent_until_disarmed() {
        let mut queue = RunQueue::default();
        assert!(queue.arm());
        assert!(!queue.arm());
        queue.disarm();
        assert!(queue.arm());
    }
}
