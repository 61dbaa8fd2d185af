use std::cmp::Ordering;
use std::collections::BinaryHeap;

use parking_lot::Mutex;
use rayon::ThreadPool;
use tokio::runtime::Runtime;

use crate::TaskId;

pub(crate) enum BlockingPool {
    Rayon(ThreadPool),
    Inline,
}

impl BlockingPool {
    pub(crate) fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self {
            BlockingPool::Rayon(pool) => pool.spawn(job),
            BlockingPool::Inline => job(),
        }
    }
}

/// Thread creation can fail under tight process limits; shrink the pool and as
/// a last resort run jobs on the enqueuing thread.
pub(crate) fn build_rayon_pool(prefix: String, threads: usize) -> BlockingPool {
    let mut threads = threads.max(1);
    loop {
        let name = prefix.clone();
        match rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(move |idx| format!("{name}-{idx}"))
            .build()
        {
            Ok(pool) => return BlockingPool::Rayon(pool),
            Err(_) if threads > 1 => {
                threads = (threads / 2).max(1);
            }
            Err(err) => {
                tracing::warn!(
                    target = "verifier.tasks",
                    pool = %prefix,
                    error = %err,
                    "failed to start worker threads; running tasks inline"
                );
                return BlockingPool::Inline;
            }
        }
    }
}

/// Single-threaded runtime driving deadline timers.
pub(crate) fn build_timer_runtime() -> Option<Runtime> {
    match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_time()
        .thread_name("verifier-timer")
        .build()
    {
        Ok(runtime) => Some(runtime),
        Err(err) => {
            tracing::warn!(
                target = "verifier.tasks",
                error = %err,
                "failed to start timer runtime; task deadlines are disabled"
            );
            None
        }
    }
}

pub(crate) type Job = Box<dyn FnOnce() + Send>;

pub(crate) struct QueuedJob {
    pub(crate) id: TaskId,
    priority: i32,
    seq: u64,
    pub(crate) run: Job,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    /// Max-heap order: higher priority first, then earlier enqueue.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Ready queue of one task type, drained by its worker pool.
pub(crate) struct TypePool {
    pub(crate) workers: BlockingPool,
    queue: Mutex<BinaryHeap<QueuedJob>>,
}

impl TypePool {
    pub(crate) fn new(workers: BlockingPool) -> Self {
        Self {
            workers,
            queue: Mutex::new(BinaryHeap::new()),
        }
    }

    pub(crate) fn push(&self, id: TaskId, priority: i32, seq: u64, run: Job) {
        self.queue.lock().push(QueuedJob { id, priority, seq, run });
    }

    pub(crate) fn pop(&self) -> Option<QueuedJob> {
        self.queue.lock().pop()
    }

    /// Removes the queued job of `id`, if a worker has not taken it yet.
    pub(crate) fn take(&self, id: TaskId) -> Option<QueuedJob> {
        let mut queue = self.queue.lock();
        let mut jobs = std::mem::take(&mut *queue).into_vec();
        let taken = jobs.iter().position(|job| job.id == id).map(|idx| jobs.swap_remove(idx));
        *queue = BinaryHeap::from(jobs);
        taken
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.lock().len()
    }
}
