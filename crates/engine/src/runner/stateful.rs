//! Stateful task runner

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use super::application::Application;
use crate::config::CoordinatorConfig;
use crate::coordinator::{EngineEvent, EngineStats, ResultHook, TaskCoordinator};
use crate::error::{EngineError, Result, TaskOutcome};
use crate::function::TaskFunction;

type Event<A> = EngineEvent<<A as Application>::Task, <A as Application>::Output>;

/// Runs a [`TaskCoordinator`] on behalf of a single stateful application
///
/// The runner owns its copy of the application. Workers call
/// [`Application::task_function`] on a snapshot clone; results are handed
/// back to the runner's copy through [`Application::store_result`] on the
/// control thread, so accumulation needs no extra synchronization.
///
/// ```text
///   caller ── prepare() ──► app.prepare()           (not running)
///   caller ── start() ───► coordinator.start()
///   control ─ result ────► app.store_result(task, outcome)
///   caller ── stop() ────► ... Finished
///   caller ── finalize() ► app.finalize()           (once)
/// ```
pub struct StatefulTaskRunner<A: Application> {
    coordinator: TaskCoordinator<A::Task, A::Output>,
    app: Arc<Mutex<A>>,
    prepared: AtomicBool,
    finalized: AtomicBool,
}

impl<A: Application> StatefulTaskRunner<A> {
    /// Take ownership of `app` and build an idle coordinator around it
    pub fn new(app: A, config: CoordinatorConfig) -> Result<Self> {
        let function = bind(&app);
        let app = Arc::new(Mutex::new(app));

        let sink = Arc::clone(&app);
        let hook: ResultHook<A::Task, A::Output> =
            Box::new(move |task: &A::Task, outcome: &TaskOutcome<A::Output>| {
                sink.lock().store_result(task, outcome);
            });

        let coordinator = TaskCoordinator::build(config, Some(function), Some(hook))?;
        debug!(coordinator = coordinator.name(), "Stateful runner created");

        Ok(Self {
            coordinator,
            app,
            prepared: AtomicBool::new(false),
            finalized: AtomicBool::new(false),
        })
    }

    /// The underlying coordinator
    pub fn coordinator(&self) -> &TaskCoordinator<A::Task, A::Output> {
        &self.coordinator
    }

    /// Run the application's pre-run hook and rebind the worker snapshot
    ///
    /// Fails with [`EngineError::InProgress`] while dispatch is running.
    #[instrument(skip_all, fields(coordinator = self.coordinator.name()))]
    pub fn prepare(&self) -> Result<()> {
        self.with_application_mut(|app| app.prepare())?;
        self.prepared.store(true, Ordering::SeqCst);
        info!("Application prepared");
        Ok(())
    }

    /// Start dispatch, preparing the application first if that has not happened
    pub fn start(&self) -> Result<()> {
        if !self.prepared.load(Ordering::SeqCst) {
            self.prepare()?;
        }
        self.coordinator.start()
    }

    /// Run the application's post-run hook after the coordinator finished
    ///
    /// Waits up to `drain_timeout` for the terminal `Finished`. Calling it
    /// before `stop()` yields [`EngineError::InProgress`]; later calls are
    /// no-ops.
    #[instrument(skip_all, fields(coordinator = self.coordinator.name()))]
    pub fn finalize(&self) -> Result<()> {
        if self.finalized.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.coordinator.is_alive() {
            return Err(EngineError::InProgress);
        }

        let timeout = self.coordinator.config().drain_timeout;
        if !self.coordinator.wait_for_finish(timeout) {
            return Err(EngineError::DrainTimeout(timeout));
        }

        if !self.finalized.swap(true, Ordering::SeqCst) {
            self.app.lock().finalize();
            info!("Application finalized");
        }
        Ok(())
    }

    /// Read access to the runner's copy of the application
    pub fn with_application<F, O>(&self, f: F) -> O
    where
        F: FnOnce(&A) -> O,
    {
        f(&self.app.lock())
    }

    /// Call into the application mutably; refused while dispatch is running
    ///
    /// `f` runs on a staged copy with no lock held. The copy replaces the
    /// runner's application, and workers are rebound to it, only if the
    /// coordinator stayed idle throughout; otherwise the call fails with
    /// [`EngineError::InProgress`] and the application is unchanged.
    /// Concurrent calls are not merged: the last commit wins.
    pub fn with_application_mut<F, O>(&self, f: F) -> Result<O>
    where
        F: FnOnce(&mut A) -> O,
    {
        if self.coordinator.is_running() || self.coordinator.is_active() {
            return Err(EngineError::InProgress);
        }
        let pools_before = self.coordinator.stats().pools_spawned;

        let mut staged = self.app.lock().clone();
        let output = f(&mut staged);

        self.coordinator.replace_function_idle(|| {
            if self.coordinator.stats().pools_spawned != pools_before {
                return Err(EngineError::InProgress);
            }
            let function = bind(&staged);
            *self.app.lock() = staged;
            Ok((output, function))
        })
    }

    /// Clone of the application's current state
    pub fn application_state(&self) -> A {
        self.app.lock().clone()
    }

    pub fn submit(&self, task: A::Task) -> Result<()> {
        self.coordinator.submit(task)
    }

    pub fn submit_many<I>(&self, tasks: I) -> Result<usize>
    where
        I: IntoIterator<Item = A::Task>,
    {
        self.coordinator.submit_many(tasks)
    }

    pub fn suspend(&self) {
        self.coordinator.suspend();
    }

    pub fn stop(&self) {
        self.coordinator.stop();
    }

    pub fn events(&self) -> Receiver<Event<A>> {
        self.coordinator.events()
    }

    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        self.coordinator.wait_until_idle(timeout)
    }

    pub fn wait_for_finish(&self, timeout: Duration) -> bool {
        self.coordinator.wait_for_finish(timeout)
    }

    pub fn is_running(&self) -> bool {
        self.coordinator.is_running()
    }

    pub fn stats(&self) -> EngineStats {
        self.coordinator.stats()
    }
}

/// Task function over a snapshot of the application as it is right now
fn bind<A: Application>(app: &A) -> TaskFunction<A::Task, A::Output> {
    let snapshot = Arc::new(app.clone());
    let name = format!("{}::task_function", snapshot.name());
    TaskFunction::new(name, move |task: &A::Task| snapshot.task_function(task))
}
