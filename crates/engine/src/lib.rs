//! # Task Distribution Engine
//!
//! A single-host engine that fans tasks out to a fixed-size pool of worker
//! threads and collects their results on a dedicated control thread.
//!
//! ## Features
//!
//! - **Growable backlog**: Tasks can be submitted from any thread, before or during a run
//! - **Lifecycle control**: Start, suspend, resume and stop from an asynchronous caller
//! - **Progress and result events**: Emitted as items drain, progress never decreases
//! - **Failure isolation**: Task errors and panics become error-tagged results
//! - **Stateful applications**: Pre-run, store-result and post-run hooks around a run
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   StatefulTaskRunner                         │
//! │  (owns the application, forwards prepare/store/finalize)    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TaskCoordinator                           │
//! │  (backlog, lifecycle flags, control thread, event stream)   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkerPool                              │
//! │  (N threads running WorkerLoop over shared channels)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use taskgrid_engine::prelude::*;
//!
//! let coordinator = TaskCoordinator::with_function(
//!     CoordinatorConfig::default().with_workers(4),
//!     TaskFunction::new("square", |x: &u64| Ok(x * x)),
//! )?;
//! let events = coordinator.events();
//!
//! coordinator.submit_many(1..=100)?;
//! coordinator.start()?;
//!
//! let mut sum = 0;
//! let mut seen = 0;
//! while seen < 100 {
//!     if let EngineEvent::Result { outcome: Ok(value), .. } =
//!         events.recv_timeout(Duration::from_secs(5)).unwrap()
//!     {
//!         sum += value;
//!         seen += 1;
//!     }
//! }
//! assert_eq!(sum, 338_350);
//!
//! coordinator.stop();
//! coordinator.wait_for_finish(Duration::from_secs(5));
//! # Ok::<(), EngineError>(())
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod function;
pub mod runner;
pub mod telemetry;
pub mod worker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::CoordinatorConfig;
    pub use crate::coordinator::{EngineEvent, EngineStats, TaskCoordinator};
    pub use crate::error::{EngineError, TaskError, TaskErrorKind, TaskOutcome};
    pub use crate::function::TaskFunction;
    pub use crate::runner::{Application, StatefulTaskRunner};
}

// Re-export key types at crate root
pub use config::CoordinatorConfig;
pub use coordinator::{DispatchGate, EngineEvent, EngineStats, TaskCoordinator};
pub use error::{EngineError, Result, TaskError, TaskErrorKind, TaskOutcome};
pub use function::TaskFunction;
pub use runner::{Application, StatefulTaskRunner};
pub use telemetry::{init_tracing, TelemetryConfig};
pub use worker::{WorkerLoop, WorkerPool};
