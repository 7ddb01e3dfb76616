//! Task function descriptor
//!
//! What every worker executes for every task: a callable plus the fixed
//! arguments bound to it. The descriptor is immutable once handed to a
//! pool; swapping it goes through [`TaskCoordinator::set_function`].
//!
//! [`TaskCoordinator::set_function`]: crate::TaskCoordinator::set_function

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{TaskError, TaskOutcome};

type BoxedTaskFn<T, R> = Arc<dyn Fn(&T) -> TaskOutcome<R> + Send + Sync>;

/// Callable executed by workers against each task
///
/// # Example
///
/// ```
/// use taskgrid_engine::TaskFunction;
///
/// let scale = TaskFunction::with_args("scale", 3u64, |task: &u64, factor: &u64| {
///     Ok(task * factor)
/// });
/// assert_eq!(scale.call(&7), Ok(21));
/// ```
pub struct TaskFunction<T, R> {
    name: Arc<str>,
    func: BoxedTaskFn<T, R>,
}

impl<T, R> TaskFunction<T, R> {
    /// Wrap a callable taking only the task
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&T) -> TaskOutcome<R> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            func: Arc::new(func),
        }
    }

    /// Wrap a callable and bind fixed arguments passed on every call
    pub fn with_args<A, F>(name: impl Into<String>, args: A, func: F) -> Self
    where
        A: Send + Sync + 'static,
        F: Fn(&T, &A) -> TaskOutcome<R> + Send + Sync + 'static,
    {
        Self::new(name, move |task: &T| func(task, &args))
    }

    /// Descriptor name, used in logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the callable on one task
    ///
    /// A panic inside the callable is caught and returned as a
    /// [`TaskError`] of kind `Panicked`.
    pub fn call(&self, task: &T) -> TaskOutcome<R> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.func)(task))) {
            Ok(outcome) => outcome,
            Err(payload) => Err(TaskError::panicked(panic_message(payload.as_ref()))),
        }
    }
}

impl<T, R> Clone for TaskFunction<T, R> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            func: Arc::clone(&self.func),
        }
    }
}

impl<T, R> fmt::Debug for TaskFunction<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFunction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "task function panicked".to_string()
    }
}
