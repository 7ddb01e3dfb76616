//! Task coordinator
//!
//! This module provides:
//! - [`TaskCoordinator`] - Backlog, worker pool lifecycle and control thread
//! - [`EngineEvent`] - Progress, result and finished notifications
//! - [`EngineStats`] - Lifetime totals for introspection
//!
//! # Lifecycle
//!
//! ```text
//! ┌──────┐  start()   ┌─────────┐  pool spawned  ┌────────┐
//! │ idle │ ─────────► │ running │ ─────────────► │ active │
//! └──────┘            └─────────┘                └────────┘
//!    ▲                                               │
//!    │            pool joined           suspend()    │
//!    └──────────────────────────── ◄─────────────────┘
//!
//!  stop(): suspend, join, emit Finished, control thread exits
//! ```

mod backlog;
mod control;
mod event;
mod task_coordinator;

pub use control::DispatchGate;
pub(crate) use control::ResultHook;
pub use event::{EngineEvent, EngineStats};
pub use task_coordinator::TaskCoordinator;
