//! Stateful runner
//!
//! This module provides:
//! - [`Application`] - Trait for a stateful object that defines the work
//! - [`StatefulTaskRunner`] - Coordinator bound to one application, with
//!   pre-run, store-result and post-run hooks

mod application;
mod stateful;

pub use application::Application;
pub use stateful::StatefulTaskRunner;
