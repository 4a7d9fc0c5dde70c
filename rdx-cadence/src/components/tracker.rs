//! Records which quantized tasks are active.

use super::quantum::StepFn;
use crate::common::TaskKey;
use crate::error::SchedulerError;
use std::collections::HashMap;

struct TaskEntry {
    generation: u64,
    /// `None` while a quantum executes.
    step: Option<StepFn>,
}

/// Active tasks keyed by name.
///
/// A key is present for exactly as long as its task is started. Every start
/// gets a fresh generation, so a quantum belonging to an earlier run of the
/// same key can neither resume nor retire a newer run. The step function is
/// checked out while a quantum executes, so a task can re-enter the scheduler
/// without the tracker being borrowed.
#[derive(Default)]
pub struct TaskTracker {
    last_generation: u64,
    tasks: HashMap<TaskKey, TaskEntry>,
}

impl TaskTracker {
    pub fn is_started(&self, key: &str) -> bool {
        self.tasks.contains_key(key)
    }

    /// Records `key` as started with its step checked out and returns the
    /// generation of this run. Returns `None` without touching anything if the
    /// key is already started.
    pub fn mark_started(&mut self, key: TaskKey) -> Option<u64> {
        if self.tasks.contains_key(&key) {
            return None;
        }
        self.last_generation += 1;
        let generation = self.last_generation;
        self.tasks.insert(
            key,
            TaskEntry {
                generation,
                step: None,
            },
        );
        Some(generation)
    }

    /// Forgets a started task, handing back its step function if it was not
    /// checked out.
    pub fn mark_stopped(&mut self, key: &str) -> Result<Option<StepFn>, SchedulerError> {
        self.tasks
            .remove(key)
            .map(|entry| entry.step)
            .ok_or_else(|| SchedulerError::InvalidState(format!("task {key} not started")))
    }

    /// Forgets the task only if it is still the run identified by `generation`.
    /// Returns `true` if it was removed.
    pub fn retire(&mut self, key: &str, generation: u64) -> bool {
        match self.tasks.get(key) {
            Some(entry) if entry.generation == generation => {
                self.tasks.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Checks out the step function of a started task, with its generation.
    pub fn take_step(&mut self, key: &str) -> Option<(u64, StepFn)> {
        let entry = self.tasks.get_mut(key)?;
        entry.step.take().map(|step| (entry.generation, step))
    }

    /// Returns a checked-out step function. If the run identified by
    /// `generation` was stopped in the meantime the step is handed back to the
    /// caller instead.
    pub fn restore_step(&mut self, key: &str, generation: u64, step: StepFn) -> Result<(), StepFn> {
        match self.tasks.get_mut(key) {
            Some(entry) if entry.generation == generation && entry.step.is_none() => {
                entry.step = Some(step);
                Ok(())
            }
            _ => Err(step),
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::quantum::Step;

    #[test]
    fn test_start_is_idempotent() {
        let mut tracker = TaskTracker::default();
        assert_eq!(tracker.mark_started("analysis".into()), Some(1));
        assert_eq!(tracker.mark_started("analysis".into()), None);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_stopping_an_unstarted_task_is_invalid_state() {
        let mut tracker = TaskTracker::default();
        assert!(matches!(
            tracker.mark_stopped("analysis"),
            Err(SchedulerError::InvalidState(_))
        ));

        tracker.mark_started("analysis".into());
        assert!(tracker.mark_stopped("analysis").is_ok());
        assert!(!tracker.is_started("analysis"));
        assert!(tracker.mark_stopped("analysis").is_err());
    }

    #[test]
    fn test_step_checkout() {
        let mut tracker = TaskTracker::default();
        let generation = tracker.mark_started("analysis".into()).unwrap();
        assert!(tracker.take_step("analysis").is_none());

        assert!(tracker
            .restore_step("analysis", generation, Box::new(|| Step::Done))
            .is_ok());
        let (taken, step) = tracker.take_step("analysis").unwrap();
        assert_eq!(taken, generation);

        assert!(matches!(tracker.mark_stopped("analysis"), Ok(None)));
        assert!(tracker.restore_step("analysis", generation, step).is_err());
    }

    #[test]
    fn test_earlier_generation_cannot_touch_a_restarted_task() {
        let mut tracker = TaskTracker::default();
        let first = tracker.mark_started("analysis".into()).unwrap();
        tracker.mark_stopped("analysis").unwrap();
        let second = tracker.mark_started("analysis".into()).unwrap();
        assert_ne!(first, second);

        assert!(tracker
            .restore_step("analysis", first, Box::new(|| Step::Done))
            .is_err());
        assert!(!tracker.retire("analysis", first));
        assert!(tracker.is_started("analysis"));

        assert!(tracker.retire("analysis", second));
        assert!(!tracker.is_started("analysis"));
    }
}
