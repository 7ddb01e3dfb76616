//! Per-worker receive/execute/send loop

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, trace, warn};

use crate::error::TaskOutcome;
use crate::function::TaskFunction;

/// Message on the input channel
#[derive(Debug)]
pub enum WorkerMessage<T> {
    /// A task to run
    Task(T),

    /// Sentinel: the receiving worker exits after this message
    Shutdown,
}

/// A task paired with its outcome, sent back on the output channel
#[derive(Debug)]
pub struct Completion<T, R> {
    /// The task as submitted
    pub task: T,

    /// Result of the task function (error-tagged on failure)
    pub outcome: TaskOutcome<R>,

    /// Index of the worker that ran the task
    pub worker_index: usize,
}

/// Why a worker loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Received the shutdown sentinel
    Sentinel,

    /// Every input sender was dropped
    InputClosed,

    /// Nobody is listening on the output channel anymore
    OutputClosed,
}

/// Worker loop
///
/// Blocks on the input channel, runs the task function on each task and
/// pushes `(task, outcome)` to the output channel until it receives the
/// sentinel. Holds no state across tasks.
pub struct WorkerLoop<T, R> {
    index: usize,
    input: Receiver<WorkerMessage<T>>,
    output: Sender<Completion<T, R>>,
    function: TaskFunction<T, R>,
}

impl<T, R> WorkerLoop<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    /// Create a worker loop bound to the given channels and function
    pub fn new(
        index: usize,
        input: Receiver<WorkerMessage<T>>,
        output: Sender<Completion<T, R>>,
        function: TaskFunction<T, R>,
    ) -> Self {
        Self {
            index,
            input,
            output,
            function,
        }
    }

    /// Run until the sentinel arrives or a channel closes
    ///
    /// Returns the exit reason and the number of tasks processed.
    pub fn run(self) -> (WorkerExit, usize) {
        let mut processed = 0usize;

        let exit = loop {
            let task = match self.input.recv() {
                Ok(WorkerMessage::Task(task)) => task,
                Ok(WorkerMessage::Shutdown) => break WorkerExit::Sentinel,
                Err(_) => break WorkerExit::InputClosed,
            };

            trace!(worker = self.index, function = self.function.name(), "Running task");
            let outcome = self.function.call(&task);
            processed += 1;

            let completion = Completion {
                task,
                outcome,
                worker_index: self.index,
            };
            if self.output.send(completion).is_err() {
                warn!(worker = self.index, "Output channel closed, dropping result");
                break WorkerExit::OutputClosed;
            }
        };

        debug!(worker = self.index, ?exit, processed, "Worker loop exited");
        (exit, processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_runs_until_sentinel() {
        let (in_tx, in_rx) = unbounded();
        let (out_tx, out_rx) = unbounded();
        let function = TaskFunction::with_args("add", 100, |x: &i32, n: &i32| Ok(x + n));

        for i in 0..3 {
            in_tx.send(WorkerMessage::Task(i)).unwrap();
        }
        in_tx.send(WorkerMessage::Shutdown).unwrap();
        // Tasks after the sentinel are left for other workers
        in_tx.send(WorkerMessage::Task(99)).unwrap();

        let (exit, processed) = WorkerLoop::new(0, in_rx.clone(), out_tx, function).run();
        assert_eq!(exit, WorkerExit::Sentinel);
        assert_eq!(processed, 3);

        let results: Vec<_> = out_rx.try_iter().map(|c| (c.task, c.outcome)).collect();
        assert_eq!(results, vec![(0, Ok(100)), (1, Ok(101)), (2, Ok(102))]);
        assert!(matches!(in_rx.try_recv(), Ok(WorkerMessage::Task(99))));
    }

    #[test]
    fn test_exits_when_input_closes() {
        let (in_tx, in_rx) = unbounded::<WorkerMessage<u8>>();
        let (out_tx, _out_rx) = unbounded();
        drop(in_tx);

        let function = TaskFunction::new("noop", |x: &u8| Ok(*x));
        let (exit, processed) = WorkerLoop::new(1, in_rx, out_tx, function).run();
        assert_eq!(exit, WorkerExit::InputClosed);
        assert_eq!(processed, 0);
    }

    #[test]
    fn test_exits_when_output_closes() {
        let (in_tx, in_rx) = unbounded();
        let (out_tx, out_rx) = unbounded::<Completion<u8, u8>>();
        drop(out_rx);
        in_tx.send(WorkerMessage::Task(1)).unwrap();

        let function = TaskFunction::new("noop", |x: &u8| Ok(*x));
        let (exit, processed) = WorkerLoop::new(2, in_rx, out_tx, function).run();
        assert_eq!(exit, WorkerExit::OutputClosed);
        assert_eq!(processed, 1);
    }

    #[test]
    fn test_failures_are_forwarded() {
        let (in_tx, in_rx) = unbounded();
        let (out_tx, out_rx) = unbounded();
        let function = TaskFunction::new("odd_only", |x: &u32| {
            if x % 2 == 0 {
                Err(TaskError::failed("even"))
            } else {
                Ok(*x)
            }
        });

        in_tx.send(WorkerMessage::Task(1)).unwrap();
        in_tx.send(WorkerMessage::Task(2)).unwrap();
        in_tx.send(WorkerMessage::Shutdown).unwrap();
        WorkerLoop::new(0, in_rx, out_tx, function).run();

        let outcomes: Vec<_> = out_rx.try_iter().map(|c| c.outcome).collect();
        assert_eq!(outcomes, vec![Ok(1), Err(TaskError::failed("even"))]);
    }
}
