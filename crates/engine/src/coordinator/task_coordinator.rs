//! Caller-facing coordinator handle

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use super::backlog::Backlog;
use super::control::{ControlLoop, DispatchGate, ResultHook, Shared};
use super::event::{EngineEvent, EngineStats, StatsCounters};
use crate::config::CoordinatorConfig;
use crate::error::{EngineError, Result};
use crate::function::TaskFunction;

/// Task coordinator
///
/// Owns a backlog of pending tasks, a pool of worker threads and the
/// channels between them. A dedicated control thread feeds the backlog to
/// the workers and turns every drained result into a `Result` and a
/// `Progress` event. All methods take `&self` and are safe to call from
/// any thread; only [`wait_until_idle`], [`wait_for_finish`] and
/// [`set_function`] block, each bounded by a timeout.
///
/// Tasks are dispatched in submission order. With more than one worker
/// the completion order is unspecified.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use taskgrid_engine::{CoordinatorConfig, EngineEvent, TaskCoordinator, TaskFunction};
///
/// let coordinator = TaskCoordinator::with_function(
///     CoordinatorConfig::default().with_workers(2),
///     TaskFunction::new("double", |x: &u32| Ok(x * 2)),
/// )?;
/// let events = coordinator.events();
///
/// coordinator.submit_many(0..10)?;
/// coordinator.start()?;
///
/// let mut results = 0;
/// while results < 10 {
///     if let EngineEvent::Result { .. } = events.recv_timeout(Duration::from_secs(5)).unwrap() {
///         results += 1;
///     }
/// }
///
/// coordinator.stop();
/// assert!(coordinator.wait_for_finish(Duration::from_secs(5)));
/// # Ok::<(), taskgrid_engine::EngineError>(())
/// ```
///
/// [`wait_until_idle`]: TaskCoordinator::wait_until_idle
/// [`wait_for_finish`]: TaskCoordinator::wait_for_finish
/// [`set_function`]: TaskCoordinator::set_function
pub struct TaskCoordinator<T, R> {
    shared: Arc<Shared<T, R>>,
    config: CoordinatorConfig,
    events: Receiver<EngineEvent<T, R>>,
    control: Mutex<Option<JoinHandle<()>>>,
}

impl<T, R> TaskCoordinator<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    /// Create an idle coordinator without a task function
    ///
    /// The control thread starts immediately and waits for `start()`.
    pub fn new(config: CoordinatorConfig) -> Result<Self> {
        Self::build(config, None, None)
    }

    /// Create an idle coordinator with a task function
    pub fn with_function(config: CoordinatorConfig, function: TaskFunction<T, R>) -> Result<Self> {
        Self::build(config, Some(function), None)
    }

    pub(crate) fn build(
        config: CoordinatorConfig,
        function: Option<TaskFunction<T, R>>,
        result_hook: Option<ResultHook<T, R>>,
    ) -> Result<Self> {
        config.validate()?;

        let (wake_tx, wake_rx) = crossbeam_channel::unbounded();
        let (events_tx, events_rx) = crossbeam_channel::unbounded();

        let shared = Arc::new(Shared {
            name: config.name.clone(),
            backlog: Backlog::new(),
            function: RwLock::new(function),
            gate: RwLock::new(None),
            n_workers: AtomicUsize::new(config.n_workers),
            running: AtomicBool::new(false),
            active: AtomicBool::new(false),
            alive: AtomicBool::new(true),
            finished: AtomicBool::new(false),
            stats: StatsCounters::default(),
            wake: wake_tx,
        });

        let control = ControlLoop::new(
            Arc::clone(&shared),
            config.poll_interval,
            wake_rx,
            events_tx,
            result_hook,
        );
        let handle = thread::Builder::new()
            .name(format!("{}-control", config.name))
            .spawn(move || control.run())?;

        info!(
            coordinator = %config.name,
            n_workers = config.n_workers,
            "Coordinator created"
        );

        Ok(Self {
            shared,
            config,
            events: events_rx,
            control: Mutex::new(Some(handle)),
        })
    }

    /// Coordinator name
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Configuration this coordinator was built with
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Handle to the event stream
    ///
    /// Handles are cheap to clone; each event goes to exactly one of them.
    /// Events accumulate until read.
    pub fn events(&self) -> Receiver<EngineEvent<T, R>> {
        self.events.clone()
    }

    /// Append one task to the backlog
    ///
    /// Fails with [`EngineError::Stopped`] after `stop()`; the task is dropped.
    pub fn submit(&self, task: T) -> Result<()> {
        self.ensure_alive()?;
        self.shared.backlog.push(task);
        StatsCounters::add(&self.shared.stats.submitted, 1);
        self.shared.wake();
        Ok(())
    }

    /// Append many tasks to the backlog, preserving their order
    ///
    /// Returns the number of tasks added.
    pub fn submit_many<I>(&self, tasks: I) -> Result<usize>
    where
        I: IntoIterator<Item = T>,
    {
        self.ensure_alive()?;
        let added = self.shared.backlog.extend(tasks);
        StatsCounters::add(&self.shared.stats.submitted, added);
        self.shared.wake();
        debug!(coordinator = %self.shared.name, added, "Submitted tasks");
        Ok(added)
    }

    /// Replace the task function
    ///
    /// Suspends dispatch, waits up to `drain_timeout` for the active pool
    /// to finish its in-flight tasks and join, clears the backlog and the
    /// counters, stores the new function, and resumes if the coordinator
    /// was running. On timeout nothing is replaced and the previous
    /// running state is restored.
    ///
    /// Calls must be serialized by the caller.
    #[instrument(skip_all, fields(coordinator = %self.shared.name, function = function.name()))]
    pub fn set_function(&self, function: TaskFunction<T, R>) -> Result<()> {
        self.ensure_alive()?;

        let was_running = self.shared.running.swap(false, Ordering::SeqCst);
        self.shared.wake();

        let timeout = self.config.drain_timeout;
        let deadline = Instant::now() + timeout;
        let dropped = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !self.wait_until_idle(remaining) {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Pool did not drain, keeping previous function"
                );
                if was_running {
                    self.shared.running.store(true, Ordering::SeqCst);
                    self.shared.wake();
                }
                return Err(EngineError::DrainTimeout(timeout));
            }

            // A pool spawn holds the read lock until it has marked itself active
            let mut function_slot = self.shared.function.write();
            if self.shared.active.load(Ordering::SeqCst) {
                continue;
            }
            let dropped = self.shared.backlog.clear();
            *function_slot = Some(function);
            break dropped;
        };
        StatsCounters::add(&self.shared.stats.dropped, dropped);

        if was_running {
            self.shared.running.store(true, Ordering::SeqCst);
            self.shared.wake();
        }

        info!(dropped, resumed = was_running, "Task function replaced");
        Ok(())
    }

    /// Swap the function while idle, keeping the backlog
    ///
    /// `commit` runs under the function write lock, so no `start()` can slip
    /// in between the idle check and the swap. It must not call back into
    /// the coordinator.
    pub(crate) fn replace_function_idle<O>(
        &self,
        commit: impl FnOnce() -> Result<(O, TaskFunction<T, R>)>,
    ) -> Result<O> {
        if self.is_running() {
            return Err(EngineError::InProgress);
        }
        // `start()` holds the read side across its running check
        let mut function_slot = self.shared.function.write();
        if self.is_running() || self.is_active() {
            return Err(EngineError::InProgress);
        }
        let (output, function) = commit()?;
        *function_slot = Some(function);
        Ok(output)
    }

    /// Allow dispatch; spawns a pool on the next control-loop tick
    ///
    /// No effect if already running.
    #[instrument(skip_all, fields(coordinator = %self.shared.name))]
    pub fn start(&self) -> Result<()> {
        self.ensure_alive()?;
        let function = self.shared.function.read();
        if function.is_none() {
            return Err(EngineError::NoFunction);
        }

        if self.shared.running.swap(true, Ordering::SeqCst) {
            debug!("Already running");
        } else {
            info!(pending = self.pending(), "Starting dispatch");
            self.shared.wake();
        }
        drop(function);
        Ok(())
    }

    /// Stop dispatching new tasks
    ///
    /// Already-dispatched tasks finish; the pool is then joined. Pending
    /// tasks stay in the backlog until the next `start()`.
    #[instrument(skip_all, fields(coordinator = %self.shared.name))]
    pub fn suspend(&self) {
        if self.shared.running.swap(false, Ordering::SeqCst) {
            info!(pending = self.pending(), "Suspending dispatch");
        }
        self.shared.wake();
    }

    /// Suspend and shut the control loop down permanently
    ///
    /// `Finished` is emitted once after the last worker joined. Idempotent.
    #[instrument(skip_all, fields(coordinator = %self.shared.name))]
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if self.shared.alive.swap(false, Ordering::SeqCst) {
            info!(pending = self.pending(), "Stopping coordinator");
        }
        self.shared.wake();
    }

    /// Wait until no worker pool is active
    ///
    /// Returns `false` if the deadline passes first; nothing is changed in
    /// that case, so the caller may retry or escalate.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        self.wait_for(timeout, || !self.shared.active.load(Ordering::SeqCst))
    }

    /// Wait until the control thread has exited after `stop()`, then join it
    pub fn wait_for_finish(&self, timeout: Duration) -> bool {
        if !self.wait_for(timeout, || self.shared.finished.load(Ordering::SeqCst)) {
            return false;
        }
        if let Some(handle) = self.control.lock().take() {
            if handle.join().is_err() {
                warn!(coordinator = %self.shared.name, "Control thread panicked");
            }
        }
        true
    }

    /// Drop every undispatched task and zero the progress counters
    ///
    /// Returns the number of tasks dropped. Not permitted while a pool is active.
    pub fn reset_backlog(&self) -> Result<usize> {
        if self.is_active() || self.is_running() {
            return Err(EngineError::InProgress);
        }
        let dropped = self.shared.backlog.clear();
        StatsCounters::add(&self.shared.stats.dropped, dropped);
        debug!(coordinator = %self.shared.name, dropped, "Backlog reset");
        Ok(dropped)
    }

    /// Change the number of workers used by the next pool
    pub fn set_worker_count(&self, n_workers: usize) -> Result<()> {
        if n_workers == 0 {
            return Err(EngineError::InvalidConfig(
                "n_workers must be at least 1".into(),
            ));
        }
        if self.is_active() || self.is_running() {
            return Err(EngineError::InProgress);
        }
        self.shared.n_workers.store(n_workers, Ordering::SeqCst);
        Ok(())
    }

    /// Install a predicate that must accept the front task before it is dispatched
    ///
    /// While the predicate returns `false` that task and everything behind
    /// it stay in the backlog; the check is repeated every control-loop tick.
    /// The predicate runs on the control thread with no engine lock held. A
    /// panic counts as a rejection and is logged.
    pub fn set_dispatch_gate<F>(&self, gate: F)
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let gate: DispatchGate<T> = Arc::new(gate);
        *self.shared.gate.write() = Some(gate);
        self.shared.wake();
    }

    /// Remove the dispatch predicate
    pub fn clear_dispatch_gate(&self) {
        *self.shared.gate.write() = None;
        self.shared.wake();
    }

    /// Whether dispatch is currently requested
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Whether a worker pool currently exists
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Whether the control loop is still meant to run (false after `stop()`)
    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst)
    }

    /// Whether the control loop has exited
    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::SeqCst)
    }

    /// Number of tasks not yet dispatched
    pub fn pending(&self) -> usize {
        self.shared.backlog.len()
    }

    /// `(completed, target)` for the current pool
    pub fn progress(&self) -> (usize, usize) {
        self.shared.backlog.progress()
    }

    /// Lifetime totals
    pub fn stats(&self) -> EngineStats {
        self.shared.stats.snapshot()
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_alive() {
            Ok(())
        } else {
            debug!(coordinator = %self.shared.name, "Rejecting call on stopped coordinator");
            Err(EngineError::Stopped)
        }
    }

    fn wait_for(&self, timeout: Duration, done: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if done() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(self.config.poll_interval);
        }
    }
}

impl<T, R> Drop for TaskCoordinator<T, R> {
    fn drop(&mut self) {
        // Let the control thread wind down on its own; never block here
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.alive.store(false, Ordering::SeqCst);
        self.shared.wake();
    }
}
