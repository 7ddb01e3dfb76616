//! Worker threads
//!
//! This module provides:
//! - [`WorkerLoop`] - The per-worker receive/execute/send routine
//! - [`WorkerPool`] - A fixed set of worker threads sharing one input channel
//!
//! # Architecture
//!
//! ```text
//!                 input (tasks + sentinels)
//!   coordinator ─────────────┬──────────────┬──────────────┐
//!                            ▼              ▼              ▼
//!                      ┌──────────┐   ┌──────────┐   ┌──────────┐
//!                      │ worker 0 │   │ worker 1 │   │ worker N │
//!                      └────┬─────┘   └────┬─────┘   └────┬─────┘
//!                           │              │              │
//!   coordinator ◄───────────┴──────────────┴──────────────┘
//!                 output ((task, outcome) pairs)
//! ```
//!
//! The two channels are the only memory shared between the coordinator
//! and its workers.

mod pool;
mod worker_loop;

pub use pool::{PoolShutdown, WorkerPool, WorkerPoolStatus};
pub use worker_loop::{Completion, WorkerExit, WorkerLoop, WorkerMessage};
