//! Application trait definition

use crate::error::TaskOutcome;

/// A long-lived stateful object that defines the work and accumulates results
///
/// Workers run [`task_function`] against a snapshot clone of the
/// application, so it must not rely on state mutated during the run.
/// [`store_result`] runs on the coordinator's control thread against the
/// runner's own copy, which is where results should be accumulated.
///
/// # Example
///
/// ```
/// use taskgrid_engine::{Application, TaskOutcome};
///
/// #[derive(Clone, Default)]
/// struct Histogram {
///     bins: Vec<u64>,
/// }
///
/// impl Application for Histogram {
///     type Task = u64;
///     type Output = usize;
///
///     fn prepare(&mut self) {
///         self.bins = vec![0; 10];
///     }
///
///     fn task_function(&self, task: &u64) -> TaskOutcome<usize> {
///         Ok((*task % 10) as usize)
///     }
///
///     fn store_result(&mut self, _task: &u64, outcome: &TaskOutcome<usize>) {
///         if let Ok(bin) = outcome {
///             self.bins[*bin] += 1;
///         }
///     }
/// }
/// ```
///
/// [`task_function`]: Application::task_function
/// [`store_result`]: Application::store_result
pub trait Application: Clone + Send + Sync + 'static {
    /// Task type submitted to the runner
    type Task: Send + 'static;

    /// Result type produced by the task function
    type Output: Send + 'static;

    /// Name used in logs and thread names
    fn name(&self) -> &str {
        "application"
    }

    /// Pre-run hook, called once before the first dispatch
    fn prepare(&mut self) {}

    /// The work executed by workers for each task
    fn task_function(&self, task: &Self::Task) -> TaskOutcome<Self::Output>;

    /// Accumulate one result; runs on the control thread
    fn store_result(&mut self, task: &Self::Task, outcome: &TaskOutcome<Self::Output>);

    /// Post-run hook, called once after the coordinator finished
    fn finalize(&mut self) {}
}
