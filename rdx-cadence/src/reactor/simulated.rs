//! A deterministic reactor driven by a virtual clock.
//!
//! Nothing here sleeps. Time only moves when the owner calls `advance`, or
//! when `run` finds the loop idle and jumps straight to the next deadline.
//! Timers fire in `(deadline, registration order)` order.

use super::{OnceCallback, Reactor, RepeatingCallback};
use crate::common::TimerHandle;
use crate::error::ReactorError;
use slotmap::SlotMap;
use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::time::Duration;
use tracing::trace;

enum TimerCallback {
    Once(OnceCallback),
    Repeating(RepeatingCallback),
}

struct TimerEntry {
    deadline: Duration,
    period: Option<Duration>,
    /// Sequence number of the heap entry that currently represents this timer.
    seq: u64,
    /// `None` while a repeating callback is executing.
    callback: Option<TimerCallback>,
}

/// A single-threaded reactor with a virtual clock.
#[derive(Default)]
pub struct VirtualReactor {
    now: Cell<Duration>,
    next_seq: Cell<u64>,
    running: Cell<bool>,
    stop_requested: Cell<bool>,
    timers: RefCell<SlotMap<TimerHandle, TimerEntry>>,
    deadlines: RefCell<BinaryHeap<Reverse<(Duration, u64, TimerHandle)>>>,
    next_ticks: RefCell<VecDeque<OnceCallback>>,
}

impl VirtualReactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since the reactor was created.
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    /// Number of live (not yet fired or cancelled) timers.
    pub fn timer_count(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Whether next-tick work is waiting for the next loop iteration.
    pub fn has_pending_ticks(&self) -> bool {
        !self.next_ticks.borrow().is_empty()
    }

    /// Executes one loop iteration without moving the clock.
    ///
    /// Runs the next-tick callbacks queued before the call, then every timer
    /// due at the current time. Callbacks queued during the iteration wait for
    /// the next one. Returns `true` if anything ran.
    pub fn turn(&self) -> bool {
        let batch: Vec<OnceCallback> = self.next_ticks.borrow_mut().drain(..).collect();
        let mut did_work = !batch.is_empty();
        for callback in batch {
            callback();
        }
        did_work |= self.fire_due();
        did_work
    }

    /// Moves the clock forward by `by`, firing every timer that falls due on
    /// the way and draining next-tick work at each step.
    pub fn advance(&self, by: Duration) {
        let target = self.now.get() + by;
        loop {
            self.turn();
            if self.has_pending_ticks() {
                continue;
            }
            match self.next_deadline() {
                Some(deadline) if deadline <= target => {
                    self.now.set(deadline.max(self.now.get()));
                }
                _ => break,
            }
        }
        self.now.set(target);
    }

    fn allocate_seq(&self) -> u64 {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        seq
    }

    fn insert(
        &self,
        deadline: Duration,
        period: Option<Duration>,
        callback: TimerCallback,
    ) -> TimerHandle {
        let seq = self.allocate_seq();
        let handle = self.timers.borrow_mut().insert(TimerEntry {
            deadline,
            period,
            seq,
            callback: Some(callback),
        });
        self.deadlines
            .borrow_mut()
            .push(Reverse((deadline, seq, handle)));
        handle
    }

    /// Earliest live deadline, discarding stale heap entries on the way.
    fn next_deadline(&self) -> Option<Duration> {
        self.next_entry().map(|(deadline, _)| deadline)
    }

    /// Deadline and sequence number of the earliest live heap entry.
    fn next_entry(&self) -> Option<(Duration, u64)> {
        let timers = self.timers.borrow();
        let mut deadlines = self.deadlines.borrow_mut();
        while let Some(Reverse((deadline, seq, handle))) = deadlines.peek().copied() {
            match timers.get(handle) {
                Some(entry) if entry.seq == seq => return Some((deadline, seq)),
                _ => {
                    deadlines.pop();
                }
            }
        }
        None
    }

    /// Fires every timer due at the current time.
    ///
    /// Timers registered or re-armed while this pass runs wait for the next
    /// one, even when they are already due.
    fn fire_due(&self) -> bool {
        let horizon = self.next_seq.get();
        let mut fired = false;
        while let Some((deadline, seq)) = self.next_entry() {
            if deadline > self.now.get() || seq >= horizon {
                break;
            }
            let Some(Reverse((_, _, handle))) = self.deadlines.borrow_mut().pop() else {
                break;
            };
            fired = true;

            let callback = {
                let mut timers = self.timers.borrow_mut();
                match timers.get(handle).map(|entry| entry.period) {
                    Some(None) => timers.remove(handle).and_then(|entry| entry.callback),
                    Some(Some(_)) => timers.get_mut(handle).and_then(|entry| entry.callback.take()),
                    None => None,
                }
            };
            trace!(?handle, now = ?self.now.get(), "firing virtual timer");

            match callback {
                Some(TimerCallback::Once(callback)) => callback(),
                Some(TimerCallback::Repeating(mut callback)) => {
                    callback();
                    self.rearm(handle, callback);
                }
                None => {}
            }
        }
        fired
    }

    /// Puts a repeating callback back unless the timer was cancelled while it ran.
    fn rearm(&self, handle: TimerHandle, callback: RepeatingCallback) {
        let seq = self.allocate_seq();
        let mut timers = self.timers.borrow_mut();
        if let Some(entry) = timers.get_mut(handle) {
            let period = entry.period.unwrap_or_default();
            entry.deadline += period;
            entry.seq = seq;
            entry.callback = Some(TimerCallback::Repeating(callback));
            self.deadlines
                .borrow_mut()
                .push(Reverse((entry.deadline, seq, handle)));
        }
    }
}

impl Reactor for VirtualReactor {
    fn add_timer(
        &self,
        delay: Duration,
        callback: OnceCallback,
    ) -> Result<TimerHandle, ReactorError> {
        Ok(self.insert(self.now.get() + delay, None, TimerCallback::Once(callback)))
    }

    fn add_periodic_timer(
        &self,
        interval: Duration,
        callback: RepeatingCallback,
    ) -> Result<TimerHandle, ReactorError> {
        if interval.is_zero() {
            return Err(ReactorError::ZeroInterval);
        }
        Ok(self.insert(
            self.now.get() + interval,
            Some(interval),
            TimerCallback::Repeating(callback),
        ))
    }

    fn cancel_timer(&self, handle: TimerHandle) {
        self.timers.borrow_mut().remove(handle);
    }

    fn next_tick(&self, callback: OnceCallback) {
        self.next_ticks.borrow_mut().push_back(callback);
    }

    fn run(&self, block: OnceCallback) -> Result<(), ReactorError> {
        if self.running.get() {
            return Err(ReactorError::AlreadyRunning);
        }
        self.running.set(true);
        self.stop_requested.set(false);

        block();
        while !self.stop_requested.get() {
            if self.has_pending_ticks() {
                self.turn();
                continue;
            }
            match self.next_deadline() {
                Some(deadline) => {
                    self.now.set(deadline.max(self.now.get()));
                    self.turn();
                }
                None => break,
            }
        }

        self.running.set(false);
        self.stop_requested.set(false);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.get()
    }

    fn stop(&self) {
        if self.running.get() {
            self.stop_requested.set(true);
        }
    }
}
