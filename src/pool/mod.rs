//! Fixed-size worker pool.
//!
//! Producers hand tasks to a [`WorkerPool`], which appends them to a shared
//! [`TaskQueue`]. Each of the pool's workers loops forever: take the head of
//! the queue (blocking while it is empty), run it to completion, repeat.
//!
//! Since a worker runs its task synchronously, a long task (such as a client
//! session) holds that worker for its whole lifetime, and the pool size is a
//! hard cap on how many tasks run at once.

mod queue;
mod task;
mod worker;

pub use queue::TaskQueue;
pub use task::{BoxedTask, Task};
pub use worker::{WorkerId, WorkerPool, WorkerState};
