//! Pending task backlog and progress counters
//!
//! Appended to by `submit` from any thread, popped from the front only by
//! the control thread. `target` is updated under the same lock as the
//! queue so a pool spawn never double-counts a concurrent submission.
//!
//! A popped task stays counted as pending until it is dispatched or put
//! back, so `len()` does not dip while the control thread inspects it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

#[derive(Debug)]
pub(crate) struct Backlog<T> {
    tasks: Mutex<VecDeque<T>>,
    in_hand: AtomicUsize,
    target: AtomicUsize,
    completed: AtomicUsize,
}

impl<T> Backlog<T> {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(VecDeque::new()),
            in_hand: AtomicUsize::new(0),
            target: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, task: T) {
        let mut tasks = self.tasks.lock();
        tasks.push_back(task);
        self.target.fetch_add(1, Ordering::SeqCst);
    }

    /// Append a batch; the caller's iterator is drained before locking
    pub fn extend<I>(&self, batch: I) -> usize
    where
        I: IntoIterator<Item = T>,
    {
        let mut batch: VecDeque<T> = batch.into_iter().collect();
        let added = batch.len();
        if added == 0 {
            return 0;
        }

        let mut tasks = self.tasks.lock();
        tasks.append(&mut batch);
        self.target.fetch_add(added, Ordering::SeqCst);
        added
    }

    /// Take the front task; it counts as pending until `mark_dispatched`
    /// or `requeue_front`
    pub fn pop_front(&self) -> Option<T> {
        let mut tasks = self.tasks.lock();
        let task = tasks.pop_front()?;
        self.in_hand.fetch_add(1, Ordering::SeqCst);
        Some(task)
    }

    /// Put back a task that was popped but not dispatched; counters unchanged
    pub fn requeue_front(&self, task: T) {
        let mut tasks = self.tasks.lock();
        tasks.push_front(task);
        self.in_hand.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn mark_dispatched(&self) {
        self.in_hand.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        let tasks = self.tasks.lock();
        tasks.len() + self.in_hand.load(Ordering::SeqCst)
    }

    /// Drop every pending task and zero the counters
    pub fn clear(&self) -> usize {
        let mut tasks = self.tasks.lock();
        let dropped = tasks.len();
        tasks.clear();
        self.target.store(0, Ordering::SeqCst);
        self.completed.store(0, Ordering::SeqCst);
        dropped
    }

    /// Reset counters for a new pool: its target is whatever is pending now
    pub fn begin_pool(&self) -> usize {
        let tasks = self.tasks.lock();
        let pending = tasks.len();
        self.target.store(pending, Ordering::SeqCst);
        self.completed.store(0, Ordering::SeqCst);
        pending
    }

    /// Count one drained result; returns `(completed, target)`
    pub fn record_completion(&self) -> (usize, usize) {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        (completed, self.target.load(Ordering::SeqCst))
    }

    pub fn progress(&self) -> (usize, usize) {
        (
            self.completed.load(Ordering::SeqCst),
            self.target.load(Ordering::SeqCst),
        )
    }
}

/// Completed fraction; a zero target counts as done
pub(crate) fn fraction(completed: usize, target: usize) -> f64 {
    if target == 0 {
        return 1.0;
    }
    (completed as f64 / target as f64).min(1.0)
}
