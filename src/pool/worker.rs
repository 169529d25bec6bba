//! Fixed-size pool of persistent worker threads.

use super::queue::TaskQueue;
use super::task::{BoxedTask, Task};
use std::any::Any;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use tracing::{debug, error, info, trace};

pub type WorkerId = usize;

/// What a worker is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Waiting on the queue.
    Idle,
    /// Running a task.
    Busy,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Idle,
            _ => WorkerState::Busy,
        }
    }
}

// counters shared between the pool handle and its workers
struct PoolStats {
    busy: AtomicUsize,
    completed: AtomicU64,
    panicked: AtomicU64,
}

type ThreadBody = Box<dyn FnOnce() + Send + 'static>;

// Seam for thread creation so spawn failures can be exercised.
type Spawner<'a> =
    &'a dyn Fn(WorkerId, thread::Builder, ThreadBody) -> io::Result<thread::JoinHandle<()>>;

fn spawn_thread(
    _id: WorkerId,
    builder: thread::Builder,
    body: ThreadBody,
) -> io::Result<thread::JoinHandle<()>> {
    builder.spawn(body)
}

struct Worker {
    id: WorkerId,
    state: Arc<AtomicU8>,
    // never joined, workers live as long as the process
    _thread: thread::JoinHandle<()>,
}

impl Worker {
    /// Spawn a worker thread that holds off until `start` fires.
    ///
    /// If the sender is dropped instead, the thread exits without ever
    /// touching the queue.
    fn spawn(
        id: WorkerId,
        queue: Arc<TaskQueue>,
        stats: Arc<PoolStats>,
        spawner: Spawner<'_>,
    ) -> io::Result<(Self, mpsc::Sender<()>)> {
        let state = Arc::new(AtomicU8::new(WorkerState::Idle as u8));
        let worker_state = Arc::clone(&state);
        let (start_tx, start_rx) = mpsc::channel::<()>();

        let body: ThreadBody = Box::new(move || {
            if start_rx.recv().is_err() {
                trace!(worker = id, "Pool construction aborted");
                return;
            }
            run(id, &queue, &worker_state, &stats)
        });
        let thread = spawner(id, thread::Builder::new().name(format!("worker-{id}")), body)?;

        Ok((
            Self {
                id,
                state,
                _thread: thread,
            },
            start_tx,
        ))
    }

    fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }
}

/// Worker main loop. Returns only when the process exits.
fn run(id: WorkerId, queue: &TaskQueue, state: &AtomicU8, stats: &PoolStats) {
    debug!(worker = id, "Worker started");

    loop {
        let task = queue.dequeue_blocking();

        state.store(WorkerState::Busy as u8, Ordering::Release);
        stats.busy.fetch_add(1, Ordering::AcqRel);
        trace!(worker = id, "Worker busy");

        match catch_unwind(AssertUnwindSafe(|| task.execute())) {
            Ok(()) => {
                stats.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(payload) => {
                stats.panicked.fetch_add(1, Ordering::Relaxed);
                error!(
                    worker = id,
                    panic = %panic_message(payload.as_ref()),
                    "Task panicked, worker continues"
                );
            }
        }

        stats.busy.fetch_sub(1, Ordering::AcqRel);
        state.store(WorkerState::Idle as u8, Ordering::Release);
        trace!(worker = id, "Worker idle");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Fixed set of worker threads draining one shared [`TaskQueue`].
///
/// At most `size` tasks run at once; everything else waits in the queue in
/// submission order. The pool cannot be resized or shut down: its workers
/// keep running for the lifetime of the process, even after the pool handle
/// is dropped.
pub struct WorkerPool {
    workers: Vec<Worker>,
    queue: Arc<TaskQueue>,
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    /// Create a pool of `size` workers with its own queue.
    pub fn new(size: usize) -> io::Result<Self> {
        Self::with_queue(size, Arc::new(TaskQueue::new()))
    }

    /// Create a pool of `size` workers draining an existing queue.
    ///
    /// Workers only start taking tasks once all of them have been spawned.
    /// If any spawn fails, the error is returned and the threads already
    /// created exit without dequeuing anything.
    pub fn with_queue(size: usize, queue: Arc<TaskQueue>) -> io::Result<Self> {
        Self::start(size, queue, &spawn_thread)
    }

    fn start(size: usize, queue: Arc<TaskQueue>, spawner: Spawner<'_>) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "worker pool needs at least one worker",
            ));
        }

        let stats = Arc::new(PoolStats {
            busy: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
        });

        let mut workers = Vec::with_capacity(size);
        let mut gates = Vec::with_capacity(size);
        for id in 0..size {
            let (worker, gate) =
                Worker::spawn(id, Arc::clone(&queue), Arc::clone(&stats), spawner)?;
            workers.push(worker);
            gates.push(gate);
        }

        for gate in gates {
            // A worker that cannot receive has already died; nothing to undo.
            let _ = gate.send(());
        }

        info!(workers = size, "Worker pool started");

        Ok(Self {
            workers,
            queue,
            stats,
        })
    }

    /// Hand a task to the pool. Returns immediately and never fails.
    pub fn submit<T: Task>(&self, task: T) {
        self.submit_boxed(Box::new(task));
    }

    /// Hand an already boxed task to the pool.
    pub fn submit_boxed(&self, task: BoxedTask) {
        self.queue.enqueue(task);
    }

    /// Number of workers.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Number of workers currently running a task.
    pub fn busy(&self) -> usize {
        self.stats.busy.load(Ordering::Acquire)
    }

    /// Number of submitted tasks not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Snapshot of every worker's state, indexed by worker id.
    pub fn worker_states(&self) -> Vec<(WorkerId, WorkerState)> {
        self.workers.iter().map(|w| (w.id, w.state())).collect()
    }

    /// Tasks that returned normally.
    pub fn completed(&self) -> u64 {
        self.stats.completed.load(Ordering::Relaxed)
    }

    /// Tasks whose panic was caught by a worker.
    pub fn panicked(&self) -> u64 {
        self.stats.panicked.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Barrier, Mutex};
    use std::time::{Duration, Instant};

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = WorkerPool::new(0).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_pool_starts_idle() {
        let pool = WorkerPool::new(3).unwrap();
        assert_eq!(pool.size(), 3);
        assert_eq!(pool.busy(), 0);
        assert_eq!(pool.queued(), 0);
        assert!(pool
            .worker_states()
            .iter()
            .all(|(_, state)| *state == WorkerState::Idle));
    }

    #[test]
    fn test_single_worker_preserves_fifo() {
        let pool = WorkerPool::new(1).unwrap();
        let (tx, rx) = mpsc::channel();

        for i in 0..500 {
            let tx = tx.clone();
            pool.submit(move || tx.send(i).unwrap());
        }

        let order: Vec<i32> = (0..500)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(order, (0..500).collect::<Vec<_>>());
    }

    #[test]
    fn test_blocking_tasks_cap_concurrency() {
        let pool = WorkerPool::new(3).unwrap();
        let (started_tx, started_rx) = mpsc::channel();
        let mut releases = Vec::new();

        for i in 0..5 {
            let (release_tx, release_rx) = mpsc::channel::<()>();
            releases.push(release_tx);
            let started_tx = started_tx.clone();
            pool.submit(move || {
                started_tx.send(i).unwrap();
                let _ = release_rx.recv();
            });
        }

        let mut running: Vec<i32> = (0..3)
            .map(|_| started_rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        running.sort_unstable();
        assert_eq!(running, vec![0, 1, 2]);
        assert!(wait_until(Duration::from_secs(5), || pool.busy() == 3));
        assert_eq!(pool.queued(), 2);
        assert!(started_rx.recv_timeout(Duration::from_millis(100)).is_err());

        // Releasing one running task lets exactly one queued task start.
        releases[0].send(()).unwrap();
        assert_eq!(started_rx.recv_timeout(Duration::from_secs(5)), Ok(3));
        assert!(started_rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(pool.queued(), 1);
        assert!(wait_until(Duration::from_secs(5), || pool.busy() == 3));

        for release in &releases[1..] {
            let _ = release.send(());
        }
        assert_eq!(started_rx.recv_timeout(Duration::from_secs(5)), Ok(4));
        assert!(wait_until(Duration::from_secs(5), || pool.busy() == 0));
        assert!(wait_until(Duration::from_secs(5), || pool.completed() == 5));
    }

    #[test]
    fn test_concurrency_never_exceeds_pool_size() {
        let pool = WorkerPool::new(4).unwrap();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (done_tx, done_rx) = mpsc::channel();

        for _ in 0..200 {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            let done_tx = done_tx.clone();
            pool.submit(move || {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_micros(200));
                active.fetch_sub(1, Ordering::SeqCst);
                done_tx.send(()).unwrap();
            });
        }

        for _ in 0..200 {
            done_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 4);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_panic_does_not_shrink_pool() {
        let pool = WorkerPool::new(1).unwrap();
        let (tx, rx) = mpsc::channel();

        pool.submit(|| panic!("task failure"));
        pool.submit(move || tx.send("after panic").unwrap());

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok("after panic"));
        assert!(wait_until(Duration::from_secs(5), || pool.panicked() == 1));
        assert!(wait_until(Duration::from_secs(5), || pool.busy() == 0));
        assert_eq!(pool.worker_states(), vec![(0, WorkerState::Idle)]);
    }

    #[test]
    fn test_shared_queue() {
        let queue = Arc::new(TaskQueue::new());
        let (tx, rx) = mpsc::channel();
        queue.enqueue(Box::new(move || tx.send(42).unwrap()));

        let _pool = WorkerPool::with_queue(2, Arc::clone(&queue)).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(42));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_stress_many_producers() {
        const PRODUCERS: usize = 8;
        const TOTAL: usize = 10_000;
        const PER_PRODUCER: usize = TOTAL / PRODUCERS;

        let pool = Arc::new(WorkerPool::new(4).unwrap());
        let hits: Arc<Vec<AtomicUsize>> =
            Arc::new((0..TOTAL).map(|_| AtomicUsize::new(0)).collect());
        let (done_tx, done_rx) = mpsc::channel();
        let barrier = Arc::new(Barrier::new(PRODUCERS));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let pool = Arc::clone(&pool);
                let hits = Arc::clone(&hits);
                let done_tx = done_tx.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for n in 0..PER_PRODUCER {
                        let idx = p * PER_PRODUCER + n;
                        let hits = Arc::clone(&hits);
                        let done_tx = done_tx.clone();
                        pool.submit(move || {
                            hits[idx].fetch_add(1, Ordering::SeqCst);
                            done_tx.send(()).unwrap();
                        });
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }

        for _ in 0..TOTAL {
            done_rx.recv_timeout(Duration::from_secs(30)).unwrap();
        }
        assert!(hits.iter().all(|h| h.load(Ordering::SeqCst) == 1));
        assert!(wait_until(Duration::from_secs(5), || pool.completed() == TOTAL as u64));
        assert_eq!(pool.queued(), 0);
    }

    #[test]
    fn test_per_producer_order_with_single_worker() {
        let pool = Arc::new(WorkerPool::new(1).unwrap());
        let log = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = mpsc::channel();

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let pool = Arc::clone(&pool);
                let log = Arc::clone(&log);
                let done_tx = done_tx.clone();
                thread::spawn(move || {
                    for n in 0..100 {
                        let log = Arc::clone(&log);
                        let done_tx = done_tx.clone();
                        pool.submit(move || {
                            log.lock().unwrap().push((p, n));
                            done_tx.send(()).unwrap();
                        });
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }
        for _ in 0..400 {
            done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }

        let log = log.lock().unwrap();
        for p in 0..4 {
            let seq: Vec<i32> = log.iter().filter(|(q, _)| *q == p).map(|(_, n)| *n).collect();
            assert_eq!(seq, (0..100).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_failed_spawn_leaves_queue_untouched() {
        let queue = Arc::new(TaskQueue::new());
        let (ran_tx, ran_rx) = mpsc::channel();
        queue.enqueue(Box::new(move || ran_tx.send(()).unwrap()));

        let (exit_tx, exit_rx) = mpsc::channel();
        let spawner = move |id: WorkerId, builder: thread::Builder, body: ThreadBody| {
            if id == 2 {
                return Err(io::Error::new(io::ErrorKind::Other, "out of threads"));
            }
            let exit_tx = exit_tx.clone();
            builder.spawn(move || {
                body();
                exit_tx.send(id).unwrap();
            })
        };

        let err = WorkerPool::start(4, Arc::clone(&queue), &spawner).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::Other);

        // Both threads that did start give up without draining the queue.
        let mut exited: Vec<WorkerId> = (0..2)
            .map(|_| exit_rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        exited.sort_unstable();
        assert_eq!(exited, vec![0, 1]);
        assert!(ran_rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(queue.len(), 1);

        // The queue is still usable by a pool that does start.
        let _pool = WorkerPool::with_queue(1, Arc::clone(&queue)).unwrap();
        assert_eq!(ran_rx.recv_timeout(Duration::from_secs(5)), Ok(()));
    }
}
