//! The scheduler that multiplexes deferred work onto a single reactor.

use crate::common::{Receipt, TaskKey, TimerHandle};
use crate::components::quantum::{run_quantum, RunQueue, Step, StepFn, ITERATIONS_PER_QUANTUM};
use crate::components::queue::{DispatchKind, ScheduleQueue, ScheduleSpec, ScheduledRequest};
use crate::components::registry::{ReceiptRegistry, ReceiptState};
use crate::components::tracker::TaskTracker;
use crate::config::SchedulerConfig;
use crate::error::{ReactorError, SchedulerError};
use crate::events::{SchedulerEvent, EVENT_CHANNEL_CAPACITY};
use crate::reactor::{Reactor, RepeatingCallback};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace};

#[derive(Default)]
struct SchedulerState {
    queue: ScheduleQueue,
    registry: ReceiptRegistry,
    tracker: TaskTracker,
    run_queue: RunQueue,
    /// The armed run-loop timer, if any.
    heartbeat: Option<TimerHandle>,
    /// The error that ended the run loop, until `start` or `take_failure`
    /// collects it.
    failure: Option<SchedulerError>,
}

struct Inner<R> {
    reactor: Rc<R>,
    config: SchedulerConfig,
    state: RefCell<SchedulerState>,
    event_sender: broadcast::Sender<SchedulerEvent>,
}

/// A cooperative scheduler for timers, periodic jobs and quantized tasks.
///
/// Requests are queued with a receipt and registered with the reactor by the
/// run loop, which wakes up every `run_loop_interval`. Everything happens on
/// the reactor's thread: the handle is cheap to clone but is not `Send`.
///
/// No internal borrow is held while user code runs, so callbacks and step
/// functions may schedule, cancel, start tasks or stop the reactor.
pub struct Scheduler<R: Reactor> {
    inner: Rc<Inner<R>>,
}

impl<R: Reactor> Clone for Scheduler<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

// Core implementation block for internal logic.
impl<R: Reactor> Scheduler<R> {
    /// Creates a scheduler that registers its work with `reactor`.
    ///
    /// # Errors
    /// `InvalidArgument` if `config` does not validate, e.g. a zero
    /// `run_loop_interval`.
    pub fn new(reactor: Rc<R>, config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate()?;
        let (event_sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            inner: Rc::new(Inner {
                reactor,
                config,
                state: RefCell::new(SchedulerState::default()),
                event_sender,
            }),
        })
    }

    fn downgrade(&self) -> Weak<Inner<R>> {
        Rc::downgrade(&self.inner)
    }

    fn upgrade(weak: &Weak<Inner<R>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn emit(&self, event: SchedulerEvent) {
        self.inner.event_sender.send(event).ok();
    }

    fn enqueue(&self, kind: DispatchKind, callback: RepeatingCallback) -> Receipt {
        let receipt = {
            let mut state = self.inner.state.borrow_mut();
            let receipt = state.registry.issue();
            state.queue.push(ScheduledRequest {
                receipt,
                kind,
                callback,
            });
            receipt
        };
        debug!(%receipt, ?kind, "request queued");
        self.emit(SchedulerEvent::Scheduled { receipt });
        receipt
    }

    fn materialize(&self, request: ScheduledRequest) -> Result<TimerHandle, ReactorError> {
        let ScheduledRequest {
            receipt,
            kind,
            mut callback,
        } = request;
        match kind {
            DispatchKind::Periodic(interval) => {
                self.inner.reactor.add_periodic_timer(interval, callback)
            }
            DispatchKind::OneShot(delay) => {
                let weak = self.downgrade();
                self.inner.reactor.add_timer(
                    delay,
                    Box::new(move || {
                        if let Some(scheduler) = Self::upgrade(&weak) {
                            scheduler.retire(receipt);
                        }
                        callback();
                    }),
                )
            }
        }
    }

    /// Forgets a one-shot request that has fired.
    fn retire(&self, receipt: Receipt) {
        if self.inner.state.borrow_mut().registry.remove(receipt).is_some() {
            trace!(%receipt, "one-shot request fired");
            self.emit(SchedulerEvent::Fired { receipt });
        }
    }

    /// Arms the next run-loop cycle, replacing any cycle already armed.
    fn rearm(&self) -> Result<(), ReactorError> {
        let weak = self.downgrade();
        let handle = self.inner.reactor.add_timer(
            self.inner.config.run_loop_interval,
            Box::new(move || {
                let Some(scheduler) = Self::upgrade(&weak) else {
                    return;
                };
                scheduler.inner.state.borrow_mut().heartbeat = None;
                if let Err(error) = scheduler.run() {
                    scheduler.fail(error);
                }
            }),
        )?;
        let previous = self.inner.state.borrow_mut().heartbeat.replace(handle);
        if let Some(previous) = previous {
            self.inner.reactor.cancel_timer(previous);
        }
        Ok(())
    }

    /// Records a fatal run-loop error and stops the reactor, so that a
    /// blocking `start` returns it instead of running without a heartbeat.
    fn fail(&self, error: SchedulerError) {
        error!(%error, "Run loop cycle failed; stopping the reactor.");
        self.inner.state.borrow_mut().failure = Some(error);
        self.stop();
    }

    /// Runs one quantum of `step`, then either retires the task or queues it
    /// for the next tick. `generation` identifies the run of `key` the step
    /// belongs to.
    fn quantize(&self, key: TaskKey, generation: u64, mut step: StepFn) {
        let (outcome, iterations) = run_quantum(&mut *step, ITERATIONS_PER_QUANTUM);
        trace!(task = %key, generation, iterations, ?outcome, "quantum finished");
        match outcome {
            Step::Done => {
                drop(step);
                let retired = self
                    .inner
                    .state
                    .borrow_mut()
                    .tracker
                    .retire(key.as_str(), generation);
                if retired {
                    info!(task = %key, "task completed");
                    self.emit(SchedulerEvent::TaskCompleted { key });
                } else {
                    debug!(task = %key, generation, "task finished after being stopped");
                }
            }
            Step::Continue => {
                let restored = {
                    let mut state = self.inner.state.borrow_mut();
                    let restored = state.tracker.restore_step(key.as_str(), generation, step);
                    if restored.is_ok() {
                        state.run_queue.push(key.clone());
                    }
                    restored
                };
                match restored {
                    Ok(()) => self.arm_pump(),
                    Err(_) => debug!(task = %key, "task was stopped during its quantum"),
                }
            }
        }
    }

    /// Queues a pump pass on the next tick unless one is already queued.
    fn arm_pump(&self) {
        if !self.inner.state.borrow_mut().run_queue.arm() {
            return;
        }
        let weak = self.downgrade();
        self.inner.reactor.next_tick(Box::new(move || {
            if let Some(scheduler) = Self::upgrade(&weak) {
                scheduler.pump();
            }
        }));
    }

    /// Gives every task queued before this pass one quantum.
    fn pump(&self) {
        let batch = {
            let mut state = self.inner.state.borrow_mut();
            state.run_queue.disarm();
            state.run_queue.len()
        };
        for _ in 0..batch {
            let next = {
                let mut state = self.inner.state.borrow_mut();
                state.run_queue.pop().map(|key| {
                    let step = state.tracker.take_step(key.as_str());
                    (key, step)
                })
            };
            match next {
                Some((key, Some((generation, step)))) => self.quantize(key, generation, step),
                Some((key, None)) => debug!(task = %key, "dropping stopped task from run queue"),
                None => break,
            }
        }
    }
}

// Public API implementation block.
impl<R: Reactor> Scheduler<R> {
    /// The reactor this scheduler registers its work with.
    pub fn reactor(&self) -> &Rc<R> {
        &self.inner.reactor
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Queues a request described by `spec` and returns its receipt.
    ///
    /// `spec` must hold exactly one of the `periodic` or `timer` keywords.
    /// The request is registered with the reactor on the next run-loop cycle.
    ///
    /// # Errors
    /// `InvalidArgument` if the spec is malformed or `callback` is missing.
    pub fn schedule(
        &self,
        spec: &ScheduleSpec,
        callback: Option<RepeatingCallback>,
    ) -> Result<Receipt, SchedulerError> {
        let kind = DispatchKind::try_from(spec)?;
        let callback = callback
            .ok_or_else(|| SchedulerError::InvalidArgument("callback required".to_string()))?;
        Ok(self.enqueue(kind, callback))
    }

    /// Runs `callback` every `interval` until cancelled.
    ///
    /// # Errors
    /// `InvalidArgument` if `interval` is zero. No receipt is consumed.
    pub fn every(
        &self,
        interval: Duration,
        callback: impl FnMut() + 'static,
    ) -> Result<Receipt, SchedulerError> {
        self.schedule(&ScheduleSpec::periodic(interval), Some(Box::new(callback)))
    }

    /// Runs `callback` once, `delay` after the request is materialized.
    pub fn after(&self, delay: Duration, callback: impl FnOnce() + 'static) -> Receipt {
        let mut callback = Some(callback);
        self.enqueue(
            DispatchKind::OneShot(delay),
            Box::new(move || {
                if let Some(callback) = callback.take() {
                    callback();
                }
            }),
        )
    }

    /// Like [`after`](Self::after), with the delay taken from the named
    /// interval in the configuration.
    pub fn after_interval(
        &self,
        name: &str,
        callback: impl FnOnce() + 'static,
    ) -> Result<Receipt, SchedulerError> {
        Ok(self.after(self.inner.config.interval(name)?, callback))
    }

    /// Like [`every`](Self::every), with the interval taken from the named
    /// interval in the configuration.
    pub fn at_interval(
        &self,
        name: &str,
        callback: impl FnMut() + 'static,
    ) -> Result<Receipt, SchedulerError> {
        self.every(self.inner.config.interval(name)?, callback)
    }

    /// Runs `callback` on the reactor's next tick.
    ///
    /// This bypasses the queue: there is no receipt and it cannot be cancelled.
    pub fn immediately(&self, callback: impl FnOnce() + 'static) {
        self.inner.reactor.next_tick(Box::new(callback));
    }

    /// Materializes every queued request, then arms the next cycle.
    ///
    /// Requests are registered in submission order. Once armed, the loop keeps
    /// re-arming itself every `run_loop_interval`, even with nothing queued.
    pub fn run(&self) -> Result<(), SchedulerError> {
        let mut materialized = 0;
        loop {
            let Some(request) = self.inner.state.borrow_mut().queue.pop() else {
                break;
            };
            let receipt = request.receipt;
            let handle = self.materialize(request)?;
            self.inner
                .state
                .borrow_mut()
                .registry
                .insert(receipt, handle);
            debug!(%receipt, ?handle, "request materialized");
            self.emit(SchedulerEvent::Materialized { receipt });
            materialized += 1;
        }
        self.rearm()?;
        trace!(materialized, "run loop cycle complete");
        self.emit(SchedulerEvent::RunLoopCycle { materialized });
        Ok(())
    }

    /// Cancels a request, whether it is still queued or already live.
    ///
    /// Cancelling an unknown, already cancelled or already fired receipt is a
    /// no-op. Returns `true` if something was cancelled.
    pub fn cancel(&self, receipt: Receipt) -> bool {
        let (handle, dequeued) = {
            let mut state = self.inner.state.borrow_mut();
            match state.registry.remove(receipt) {
                Some(handle) => (Some(handle), None),
                None => (None, state.queue.remove(receipt)),
            }
        };
        if let Some(handle) = handle {
            self.inner.reactor.cancel_timer(handle);
        }
        let cancelled = handle.is_some() || dequeued.is_some();
        if cancelled {
            debug!(%receipt, "request cancelled");
            self.emit(SchedulerEvent::Cancelled { receipt });
        }
        cancelled
    }

    pub fn receipt_state(&self, receipt: Receipt) -> ReceiptState {
        let state = self.inner.state.borrow();
        if let Some(handle) = state.registry.handle(receipt) {
            ReceiptState::Materialized(handle)
        } else if state.queue.contains(receipt) {
            ReceiptState::Pending
        } else {
            ReceiptState::Unknown
        }
    }

    /// Number of requests waiting for the next run-loop cycle.
    pub fn pending_count(&self) -> usize {
        self.inner.state.borrow().queue.len()
    }

    /// Number of requests registered with the reactor.
    pub fn materialized_count(&self) -> usize {
        self.inner.state.borrow().registry.len()
    }

    /// Starts a long-running task, executed in quanta of at most
    /// [`ITERATIONS_PER_QUANTUM`] calls to `step` per reactor tick.
    ///
    /// `step` reports whether more work remains, as a [`Step`] or a `bool`.
    /// The first quantum runs immediately. If a task with the same key is
    /// already running this does nothing and returns `false`.
    pub fn start_task<K, F, S>(&self, key: K, mut step: F) -> bool
    where
        K: Into<TaskKey>,
        F: FnMut() -> S + 'static,
        S: Into<Step>,
    {
        let key = key.into();
        let started = self.inner.state.borrow_mut().tracker.mark_started(key.clone());
        let Some(generation) = started else {
            debug!(task = %key, "task already running");
            return false;
        };
        info!(task = %key, generation, "task started");
        self.emit(SchedulerEvent::TaskStarted { key: key.clone() });
        self.quantize(key, generation, Box::new(move || step().into()));
        true
    }

    pub fn task_running(&self, key: &str) -> bool {
        self.inner.state.borrow().tracker.is_started(key)
    }

    /// Records that a task is no longer running. A queued continuation of the
    /// task is dropped on its next tick.
    ///
    /// # Errors
    /// `InvalidState` if the task is not running.
    pub fn mark_task_stopped(&self, key: &str) -> Result<(), SchedulerError> {
        let step = self.inner.state.borrow_mut().tracker.mark_stopped(key)?;
        drop(step);
        info!(task = %key, "task completed");
        self.emit(SchedulerEvent::TaskCompleted {
            key: TaskKey::from(key.to_string()),
        });
        Ok(())
    }

    /// Starts the run loop.
    ///
    /// If the reactor is already running, the first cycle runs inline and the
    /// call returns. Otherwise the scheduler runs the reactor itself and only
    /// returns once it has been stopped.
    ///
    /// # Errors
    /// A reactor failure in any run-loop cycle stops the reactor. When `start`
    /// drives the reactor itself the failure is returned here; otherwise it
    /// can be collected with [`take_failure`](Self::take_failure).
    pub fn start(&self) -> Result<(), SchedulerError> {
        if self.inner.reactor.is_running() {
            return self.run();
        }
        info!("Scheduler starting the reactor...");
        let scheduler = self.clone();
        self.inner.reactor.run(Box::new(move || {
            if let Err(error) = scheduler.run() {
                scheduler.fail(error);
            }
        }))?;
        info!("Scheduler has shut down.");
        match self.take_failure() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Takes the error that ended the run loop, if a cycle failed.
    pub fn take_failure(&self) -> Option<SchedulerError> {
        self.inner.state.borrow_mut().failure.take()
    }

    /// Stops the reactor if it is running.
    ///
    /// The reactor is shared: this terminates the entire loop and every other
    /// consumer of it, not just this scheduler's timers.
    pub fn stop(&self) {
        if self.inner.reactor.is_running() {
            info!("Stopping the shared reactor.");
            self.inner.reactor.stop();
        }
    }

    /// Subscribes to the scheduler's event stream.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.inner.event_sender.subscribe()
    }
}
