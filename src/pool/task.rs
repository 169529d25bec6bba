//! Unit of work executed by the pool.

/// A unit of work run to completion by exactly one worker.
///
/// `execute` consumes the task: once it returns the task is dropped. It may
/// block for as long as it likes (a streaming session occupies its worker for
/// the whole session). A panic inside `execute` is contained by the worker
/// that runs it.
pub trait Task: Send + 'static {
    /// Run the task on the calling worker thread.
    fn execute(self: Box<Self>);
}

impl<F> Task for F
where
    F: FnOnce() + Send + 'static,
{
    fn execute(self: Box<Self>) {
        (*self)()
    }
}

/// Boxed task as stored in the queue.
pub type BoxedTask = Box<dyn Task>;
