//! Shared FIFO of pending tasks.
//!
//! One mutex guards the storage and the same mutex backs the condition
//! variable consumers wait on, so an enqueue can never slip between a
//! consumer's emptiness check and its wait.

use super::task::BoxedTask;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use tracing::trace;

// Everything behind the queue's single lock.
struct State {
    tasks: VecDeque<BoxedTask>,
    // consumers parked in `dequeue_blocking`
    waiting: usize,
}

/// Unbounded, thread-safe FIFO shared by producers and workers.
pub struct TaskQueue {
    state: Mutex<State>,
    available: Condvar,
}

impl TaskQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                tasks: VecDeque::new(),
                waiting: 0,
            }),
            available: Condvar::new(),
        }
    }

    /// Append a task at the tail and wake one waiting consumer.
    ///
    /// Never blocks beyond acquiring the lock and never rejects.
    pub fn enqueue(&self, task: BoxedTask) {
        let mut state = self.lock();
        state.tasks.push_back(task);
        trace!(pending = state.tasks.len(), waiting = state.waiting, "Task enqueued");
        self.available.notify_one();
    }

    /// Remove and return the head, blocking while the queue is empty.
    pub fn dequeue_blocking(&self) -> BoxedTask {
        let mut state = self.lock();

        // Spurious wakeups land back here and wait again.
        while state.tasks.is_empty() {
            state.waiting += 1;
            state = match self.available.wait(state) {
                Ok(guard) => guard,
                Err(_) => poisoned(),
            };
            state.waiting -= 1;
        }

        match state.tasks.pop_front() {
            Some(task) => task,
            None => unreachable!("task queue empty after non-empty predicate held"),
        }
    }

    /// Number of tasks waiting to be picked up.
    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    /// Check if no task is waiting.
    pub fn is_empty(&self) -> bool {
        self.lock().tasks.is_empty()
    }

    /// Number of consumers blocked on an empty queue.
    pub fn waiting(&self) -> usize {
        self.lock().waiting
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => poisoned(),
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// The lock is never held while user code runs, so a poisoned queue means
/// the queue's own bookkeeping panicked mid-update.
fn poisoned() -> ! {
    panic!("task queue lock poisoned; queue state can no longer be trusted")
}
