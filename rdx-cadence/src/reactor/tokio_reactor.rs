//! A reactor backed by a tokio current-thread runtime.
//!
//! The runtime and its `LocalSet` only exist for the duration of `run`. Every
//! timer is a local task, so callbacks never leave the thread that called
//! `run` and need not be `Send`.

use super::{OnceCallback, Reactor, RepeatingCallback};
use crate::common::TimerHandle;
use crate::error::ReactorError;
use slotmap::SlotMap;
use std::cell::{Cell, RefCell};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::{JoinHandle, LocalSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// A `Reactor` that owns a tokio runtime while it runs.
///
/// `run` builds its own runtime, so it must not be called from inside another
/// tokio runtime.
#[derive(Default)]
pub struct TokioReactor {
    running: Cell<bool>,
    stop_requested: Cell<bool>,
    shutdown: Notify,
    timers: RefCell<SlotMap<TimerHandle, JoinHandle<()>>>,
    /// Next-tick callbacks submitted before the loop started.
    deferred: RefCell<Vec<OnceCallback>>,
}

impl TokioReactor {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_running(&self) -> Result<(), ReactorError> {
        if self.running.get() {
            Ok(())
        } else {
            Err(ReactorError::NotRunning)
        }
    }

    fn track(&self, task: JoinHandle<()>) -> TimerHandle {
        let mut timers = self.timers.borrow_mut();
        timers.retain(|_, task| !task.is_finished());
        timers.insert(task)
    }
}

impl Reactor for TokioReactor {
    fn add_timer(
        &self,
        delay: Duration,
        callback: OnceCallback,
    ) -> Result<TimerHandle, ReactorError> {
        self.ensure_running()?;
        let task = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        Ok(self.track(task))
    }

    fn add_periodic_timer(
        &self,
        interval: Duration,
        mut callback: RepeatingCallback,
    ) -> Result<TimerHandle, ReactorError> {
        self.ensure_running()?;
        if interval.is_zero() {
            return Err(ReactorError::ZeroInterval);
        }
        let task = tokio::task::spawn_local(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                callback();
            }
        });
        Ok(self.track(task))
    }

    fn cancel_timer(&self, handle: TimerHandle) {
        if let Some(task) = self.timers.borrow_mut().remove(handle) {
            task.abort();
        }
    }

    fn next_tick(&self, callback: OnceCallback) {
        if self.running.get() {
            tokio::task::spawn_local(async move { callback() });
        } else {
            self.deferred.borrow_mut().push(callback);
        }
    }

    fn run(&self, block: OnceCallback) -> Result<(), ReactorError> {
        if self.running.get() {
            return Err(ReactorError::AlreadyRunning);
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let local = LocalSet::new();

        self.running.set(true);
        self.stop_requested.set(false);
        info!("Reactor starting up...");

        local.block_on(&runtime, async {
            for callback in self.deferred.take() {
                tokio::task::spawn_local(async move { callback() });
            }
            block();
            self.shutdown.notified().await;
        });

        self.running.set(false);
        let abandoned = self.timers.borrow().len();
        for (_, task) in self.timers.borrow_mut().drain() {
            task.abort();
        }
        debug!(abandoned, "aborted outstanding timers");
        info!("Reactor has shut down.");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.get()
    }

    fn stop(&self) {
        if self.running.get() && !self.stop_requested.replace(true) {
            self.shutdown.notify_one();
        }
    }
}
