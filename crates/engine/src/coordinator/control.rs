//! Control loop
//!
//! Runs on the coordinator's dedicated thread. Lifecycle per iteration:
//!
//! ```text
//!   idle ──running──► spawn pool ──► dispatch / wait / drain ──┐
//!    ▲                                      ▲                  │
//!    │                                      └──── running ─────┤
//!    │                                                         │ !running
//!    └──────────── join pool (sentinels, join, drain) ◄────────┘
//!
//!   !alive: join any pool, emit Finished, return
//! ```
//!
//! Waiting is event driven: the loop selects on the output channel and a
//! wake channel fed by every caller-side lifecycle call, with the poll
//! interval as an upper bound.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{select, Receiver, Sender};
use parking_lot::RwLock;
use tracing::{debug, error, info, trace, warn};

use super::backlog::{fraction, Backlog};
use super::event::{EngineEvent, StatsCounters};
use crate::error::TaskOutcome;
use crate::function::TaskFunction;
use crate::worker::{Completion, WorkerMessage, WorkerPool};

/// Predicate deciding whether the front backlog task may be dispatched
pub type DispatchGate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Callback run on the control thread for every drained outcome
pub(crate) type ResultHook<T, R> = Box<dyn FnMut(&T, &TaskOutcome<R>) + Send>;

/// State shared between the caller-facing handle and the control thread
///
/// `running` and `alive` are requests written by the caller; `active` and
/// `finished` are written only by the control thread.
pub(crate) struct Shared<T, R> {
    pub name: String,
    pub backlog: Backlog<T>,
    pub function: RwLock<Option<TaskFunction<T, R>>>,
    pub gate: RwLock<Option<DispatchGate<T>>>,
    pub n_workers: AtomicUsize,
    pub running: AtomicBool,
    pub active: AtomicBool,
    pub alive: AtomicBool,
    pub finished: AtomicBool,
    pub stats: StatsCounters,
    pub wake: Sender<()>,
}

impl<T, R> Shared<T, R> {
    pub fn wake(&self) {
        // The control thread may already be gone
        let _ = self.wake.send(());
    }
}

pub(crate) struct ControlLoop<T, R> {
    shared: Arc<Shared<T, R>>,
    poll_interval: Duration,
    input: (Sender<WorkerMessage<T>>, Receiver<WorkerMessage<T>>),
    output_tx: Sender<Completion<T, R>>,
    output_rx: Receiver<Completion<T, R>>,
    wake_rx: Receiver<()>,
    events: Sender<EngineEvent<T, R>>,
    result_hook: Option<ResultHook<T, R>>,
    pool: Option<WorkerPool<T>>,
    last_progress: f64,
}

impl<T, R> ControlLoop<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    pub fn new(
        shared: Arc<Shared<T, R>>,
        poll_interval: Duration,
        wake_rx: Receiver<()>,
        events: Sender<EngineEvent<T, R>>,
        result_hook: Option<ResultHook<T, R>>,
    ) -> Self {
        let input = crossbeam_channel::unbounded();
        let (output_tx, output_rx) = crossbeam_channel::unbounded();
        Self {
            shared,
            poll_interval,
            input,
            output_tx,
            output_rx,
            wake_rx,
            events,
            result_hook,
            pool: None,
            last_progress: 0.0,
        }
    }

    pub fn run(mut self) {
        info!(coordinator = %self.shared.name, "Control loop started");

        while self.shared.alive.load(Ordering::SeqCst) {
            let running = self.shared.running.load(Ordering::SeqCst);

            if running && self.pool.is_none() {
                self.spawn_pool();
            }

            if self.pool.is_none() {
                self.idle_wait();
                continue;
            }

            if self.shared.running.load(Ordering::SeqCst) {
                self.dispatch_backlog();
                self.wait_for_activity();
                self.drain_output();
            } else {
                self.join_pool();
            }
        }

        self.join_pool();
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.finished.store(true, Ordering::SeqCst);
        self.emit(EngineEvent::Finished);
        info!(coordinator = %self.shared.name, "Control loop finished");
    }

    /// Spawn a pool for the current function
    ///
    /// The function slot stays read-locked until `active` is set, so a
    /// concurrent `set_function` either sees the new pool or prevents it.
    fn spawn_pool(&mut self) {
        let function_slot = self.shared.function.read();
        if !self.shared.running.load(Ordering::SeqCst) {
            return;
        }
        let Some(function) = function_slot.as_ref() else {
            warn!(coordinator = %self.shared.name, "No task function configured, suspending");
            self.shared.running.store(false, Ordering::SeqCst);
            return;
        };
        let n_workers = self.shared.n_workers.load(Ordering::SeqCst);

        let pending = self.shared.backlog.begin_pool();
        self.last_progress = 0.0;

        match WorkerPool::spawn(
            &self.shared.name,
            n_workers,
            self.input.clone(),
            self.output_tx.clone(),
            function,
        ) {
            Ok(pool) => {
                self.pool = Some(pool);
                self.shared.active.store(true, Ordering::SeqCst);
                StatsCounters::add(&self.shared.stats.pools_spawned, 1);
                debug!(pending, function = function.name(), "Pool active");
            }
            Err(e) => {
                error!(coordinator = %self.shared.name, "Failed to start worker pool: {}", e);
                self.shared.running.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Send every dispatchable backlog task to the input channel, one pop at a time
    fn dispatch_backlog(&mut self) {
        let Some(pool) = self.pool.as_ref() else {
            return;
        };
        let gate = self.shared.gate.read().clone();
        let mut sent = 0usize;

        while self.shared.running.load(Ordering::SeqCst) {
            let Some(task) = self.shared.backlog.pop_front() else {
                break;
            };
            // The gate is caller code: never run it under the backlog lock
            if let Some(gate) = gate.as_deref() {
                if !self.gate_allows(gate, &task) {
                    self.shared.backlog.requeue_front(task);
                    break;
                }
            }
            if let Err(task) = pool.dispatch(task) {
                warn!("Input channel closed, keeping task in backlog");
                self.shared.backlog.requeue_front(task);
                break;
            }
            self.shared.backlog.mark_dispatched();
            sent += 1;
        }

        if sent > 0 {
            StatsCounters::add(&self.shared.stats.dispatched, sent);
            debug!(sent, "Dispatched tasks");
        }
    }

    /// Evaluate the dispatch gate; a panicking gate holds the task
    fn gate_allows(&self, gate: &(dyn Fn(&T) -> bool + Send + Sync), task: &T) -> bool {
        match panic::catch_unwind(AssertUnwindSafe(|| gate(task))) {
            Ok(true) => true,
            Ok(false) => {
                trace!("Dispatch gate is holding the front task");
                false
            }
            Err(_) => {
                error!(coordinator = %self.shared.name, "Dispatch gate panicked, holding the front task");
                false
            }
        }
    }

    /// Block until a result arrives, a caller pokes us, or the interval passes
    fn wait_for_activity(&mut self) {
        let completion = select! {
            recv(self.output_rx) -> completion => completion.ok(),
            recv(self.wake_rx) -> _ => {
                self.drain_wakes();
                None
            }
            default(self.poll_interval) => None,
        };
        if let Some(completion) = completion {
            self.handle_completion(completion);
        }
    }

    fn idle_wait(&mut self) {
        if self.wake_rx.recv_timeout(self.poll_interval).is_ok() {
            self.drain_wakes();
        }
    }

    fn drain_wakes(&self) {
        while self.wake_rx.try_recv().is_ok() {}
    }

    fn drain_output(&mut self) {
        while let Ok(completion) = self.output_rx.try_recv() {
            self.handle_completion(completion);
        }
    }

    /// Sentinels, join, drain what the workers left behind, mark inactive
    fn join_pool(&mut self) {
        let Some(mut pool) = self.pool.take() else {
            return;
        };

        let summary = pool.shutdown();
        if summary.crashed > 0 {
            error!(crashed = summary.crashed, "Workers terminated abnormally");
        }
        self.drain_output();
        self.shared.active.store(false, Ordering::SeqCst);
    }

    fn handle_completion(&mut self, completion: Completion<T, R>) {
        let Completion {
            task,
            outcome,
            worker_index,
        } = completion;

        let (completed, target) = self.shared.backlog.record_completion();
        StatsCounters::add(&self.shared.stats.completed, 1);

        if let Err(e) = &outcome {
            StatsCounters::add(&self.shared.stats.failed, 1);
            if e.is_panic() {
                error!(worker = worker_index, error = %e, "Task function panicked");
            } else {
                warn!(worker = worker_index, error = %e, "Task failed");
            }
        }

        if let Some(hook) = self.result_hook.as_mut() {
            let stored = panic::catch_unwind(AssertUnwindSafe(|| hook(&task, &outcome)));
            if stored.is_err() {
                error!(coordinator = %self.shared.name, "Result hook panicked");
            }
        }

        // Late submissions raise the target; hold the previous maximum, even 1.0
        self.last_progress = self.last_progress.max(fraction(completed, target));
        trace!(completed, target, progress = self.last_progress, "Drained result");

        self.emit(EngineEvent::Result { task, outcome });
        self.emit(EngineEvent::Progress(self.last_progress));
    }

    fn emit(&self, event: EngineEvent<T, R>) {
        // The handle keeps a receiver alive, so this only fails after it is dropped
        let _ = self.events.send(event);
    }
}
