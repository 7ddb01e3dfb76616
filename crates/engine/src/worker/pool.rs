//! Worker pool
//!
//! A fixed set of worker threads bound to one pair of channels and one
//! task function. Created when the coordinator starts running and torn
//! down with one sentinel per worker followed by a blocking join.

use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info, instrument};

use super::worker_loop::{Completion, WorkerExit, WorkerLoop, WorkerMessage};
use crate::error::EngineError;
use crate::function::TaskFunction;

/// Worker pool status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPoolStatus {
    /// Workers are alive and consuming the input channel
    Running,
    /// Sentinels sent, waiting for workers to finish in-flight tasks
    Draining,
    /// All workers joined
    Stopped,
}

/// Summary of a pool teardown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolShutdown {
    /// Workers that exited on the sentinel
    pub joined: usize,

    /// Workers whose thread terminated abnormally
    pub crashed: usize,

    /// Tasks processed across all workers
    pub processed: usize,
}

/// Handles to a running set of worker threads
pub struct WorkerPool<T> {
    name: String,
    input: Sender<WorkerMessage<T>>,
    handles: Vec<JoinHandle<(WorkerExit, usize)>>,
    status: WorkerPoolStatus,
}

impl<T> WorkerPool<T>
where
    T: Send + 'static,
{
    /// Spawn `n_workers` threads running [`WorkerLoop`]
    ///
    /// If a thread cannot be spawned the workers started so far are shut
    /// down again before the error is returned.
    #[instrument(skip_all, fields(pool = %name, n_workers = n_workers, function = function.name()))]
    pub fn spawn<R>(
        name: &str,
        n_workers: usize,
        input: (Sender<WorkerMessage<T>>, Receiver<WorkerMessage<T>>),
        output: Sender<Completion<T, R>>,
        function: &TaskFunction<T, R>,
    ) -> Result<Self, EngineError>
    where
        R: Send + 'static,
    {
        let (input_tx, input_rx) = input;
        let mut pool = Self {
            name: name.to_string(),
            input: input_tx,
            handles: Vec::with_capacity(n_workers),
            status: WorkerPoolStatus::Running,
        };

        for index in 0..n_workers {
            let worker = WorkerLoop::new(index, input_rx.clone(), output.clone(), function.clone());
            let spawned = thread::Builder::new()
                .name(format!("{}-worker-{}", name, index))
                .spawn(move || worker.run());

            match spawned {
                Ok(handle) => pool.handles.push(handle),
                Err(e) => {
                    error!(worker = index, "Failed to spawn worker thread: {}", e);
                    pool.shutdown();
                    return Err(EngineError::Spawn(e));
                }
            }
        }

        info!(pool = %pool.name, n_workers, "Worker pool started");
        Ok(pool)
    }

    /// Put a task on the input channel
    ///
    /// Returns the task back if every worker is gone.
    pub fn dispatch(&self, task: T) -> Result<(), T> {
        self.input
            .send(WorkerMessage::Task(task))
            .map_err(|e| match e.into_inner() {
                WorkerMessage::Task(task) => task,
                WorkerMessage::Shutdown => unreachable!("only tasks are dispatched"),
            })
    }

    /// Number of workers in the pool
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Current status
    pub fn status(&self) -> WorkerPoolStatus {
        self.status
    }

    /// Send one sentinel per worker and join every thread
    ///
    /// Workers finish everything dispatched before the sentinels, so this
    /// blocks until all in-flight tasks have produced a completion.
    pub fn shutdown(&mut self) -> PoolShutdown {
        if self.status == WorkerPoolStatus::Stopped {
            return PoolShutdown::default();
        }

        self.status = WorkerPoolStatus::Draining;
        let started = Instant::now();
        for _ in 0..self.handles.len() {
            // A closed channel means the workers are already gone
            let _ = self.input.send(WorkerMessage::Shutdown);
        }

        let mut summary = PoolShutdown::default();
        for (index, handle) in self.handles.drain(..).enumerate() {
            match handle.join() {
                Ok((exit, processed)) => {
                    debug!(worker = index, ?exit, processed, "Worker joined");
                    summary.joined += 1;
                    summary.processed += processed;
                }
                Err(_) => {
                    error!(worker = index, "Worker thread terminated abnormally");
                    summary.crashed += 1;
                }
            }
        }

        self.status = WorkerPoolStatus::Stopped;
        info!(
            pool = %self.name,
            joined = summary.joined,
            processed = summary.processed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Worker pool stopped"
        );
        summary
    }
}

impl<T> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        // Best effort: never leave workers blocked on a channel nobody feeds
        if self.status != WorkerPoolStatus::Stopped {
            for _ in 0..self.handles.len() {
                let _ = self.input.send(WorkerMessage::Shutdown);
            }
        }
    }
}
