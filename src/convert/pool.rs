use crossbeam_deque::{Injector, Steal};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of worker threads
///
/// The pool is an explicitly owned resource: it lives as long as its owner, can be reused across
/// many batches of work, and gets drained when dropped.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<thread::JoinHandle<()>>,
}

/// State shared between the pool handle and its workers
struct Shared {
    /// Global queue all workers take jobs from
    queue: Injector<Job>,

    /// Set once the pool stops accepting work; idle workers sleep on `available`
    closed: Mutex<bool>,
    available: Condvar,

    /// Set when queued work should be dropped instead of run
    discard: AtomicBool,
}

/// Work could not be run on the pool
#[derive(Debug)]
pub enum PoolError {
    /// Pool was shut down (possibly while the work was still queued)
    ShutDown,

    /// Worker thread could not be started
    Spawn(io::Error),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::ShutDown => f.write_str("pool is shut down"),
            PoolError::Spawn(err) => write!(f, "cannot start worker: {}", err),
        }
    }
}

impl std::error::Error for PoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PoolError::ShutDown => None,
            PoolError::Spawn(err) => Some(err),
        }
    }
}

impl WorkerPool {
    /// Number of workers to use on this machine: one less than the available parallelism, but
    /// never fewer than two
    pub fn default_size() -> usize {
        thread::available_parallelism()
            .map(|parallelism| parallelism.get())
            .unwrap_or(1)
            .saturating_sub(1)
            .max(2)
    }

    pub fn with_default_size() -> Result<WorkerPool, PoolError> {
        WorkerPool::new(WorkerPool::default_size())
    }

    /// Start a pool with `size` workers (at least one)
    pub fn new(size: usize) -> Result<WorkerPool, PoolError> {
        let mut pool = WorkerPool {
            shared: Arc::new(Shared {
                queue: Injector::new(),
                closed: Mutex::new(false),
                available: Condvar::new(),
                discard: AtomicBool::new(false),
            }),
            workers: vec![],
        };
        for idx in 0..size.max(1) {
            let shared = pool.shared.clone();
            let worker = thread::Builder::new()
                .name(format!("dex-translator-worker-{}", idx))
                .spawn(move || worker_loop(&shared))
                .map_err(PoolError::Spawn)?;
            pool.workers.push(worker);
        }
        log::debug!("started worker pool with {} threads", pool.workers.len());
        Ok(pool)
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shared.closed.lock()
    }

    /// Queue up some work
    pub fn execute<F: FnOnce() + Send + 'static>(&self, job: F) -> Result<(), PoolError> {
        let closed = self.shared.closed.lock();
        if *closed {
            return Err(PoolError::ShutDown);
        }
        self.shared.queue.push(Box::new(job));
        self.shared.available.notify_one();
        Ok(())
    }

    /// Apply `f` to every item on the pool, collecting results in the order of the items
    ///
    /// On the first error, items whose processing has not started yet are skipped and that error
    /// is returned.
    pub fn try_map<T, U, E, F>(&self, items: Vec<T>, f: F) -> Result<Vec<U>, E>
    where
        T: Send + 'static,
        U: Send + 'static,
        E: From<PoolError> + Send + 'static,
        F: Fn(T) -> Result<U, E> + Send + Sync + 'static,
    {
        let count = items.len();
        let f = Arc::new(f);
        let cancelled = Arc::new(AtomicBool::new(false));
        let (result_sender, result_receiver) = mpsc::channel::<(usize, Result<U, E>)>();

        for (idx, item) in items.into_iter().enumerate() {
            let f = f.clone();
            let cancelled = cancelled.clone();
            let result_sender = result_sender.clone();
            self.execute(move || {
                if cancelled.load(Ordering::SeqCst) {
                    return;
                }
                let result = f(item);
                if result.is_err() {
                    cancelled.store(true, Ordering::SeqCst);
                }
                let _ = result_sender.send((idx, result));
            })?;
        }
        drop(result_sender);

        let mut results: Vec<Option<U>> = (0..count).map(|_| None).collect();
        let mut first_error = None;
        for (idx, result) in result_receiver {
            match result {
                Ok(value) => results[idx] = Some(value),
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        // Missing results mean the work was discarded by a shutdown (or a worker died)
        results
            .into_iter()
            .map(|result| result.ok_or_else(|| E::from(PoolError::ShutDown)))
            .collect()
    }

    /// Stop accepting work, finish everything already queued, and wait for the workers
    pub fn shutdown(&mut self) {
        *self.shared.closed.lock() = true;
        self.shared.available.notify_all();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("worker thread panicked");
            }
        }
    }

    /// Stop accepting work, drop everything still queued, and wait for in-flight work to finish
    ///
    /// Threads can't be interrupted, so a job that has already started runs to completion. This
    /// is as close to interrupting in-flight work as the pool gets.
    pub fn shutdown_now(&mut self) {
        self.shared.discard.store(true, Ordering::SeqCst);
        self.shutdown();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        match shared.queue.steal() {
            Steal::Success(job) => {
                if !shared.discard.load(Ordering::SeqCst) {
                    job();
                }
            }
            Steal::Retry => continue,
            Steal::Empty => {
                let mut closed = shared.closed.lock();
                if !shared.queue.is_empty() {
                    continue;
                }
                if *closed {
                    return;
                }
                shared.available.wait(&mut closed);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn default_size_has_a_floor() {
        assert!(WorkerPool::default_size() >= 2);
    }

    #[test]
    fn results_keep_input_order() {
        let pool = WorkerPool::new(3).unwrap();
        let squares: Result<Vec<u64>, PoolError> =
            pool.try_map((0..50u64).collect(), |n| Ok(n * n));
        assert_eq!(squares.unwrap(), (0..50u64).map(|n| n * n).collect::<Vec<_>>());

        // Reusable across batches
        let again: Result<Vec<u64>, PoolError> = pool.try_map(vec![7], |n| Ok(n + 1));
        assert_eq!(again.unwrap(), vec![8]);
    }

    #[derive(Debug)]
    enum TestError {
        Bad(u32),
        Pool,
    }

    impl From<PoolError> for TestError {
        fn from(_: PoolError) -> TestError {
            TestError::Pool
        }
    }

    #[test]
    fn first_error_cancels_the_rest() {
        let pool = WorkerPool::new(1).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        let result: Result<Vec<u32>, TestError> = pool.try_map((0..100).collect(), move |n| {
            counter.fetch_add(1, Ordering::SeqCst);
            if n == 3 {
                Err(TestError::Bad(n))
            } else {
                Ok(n)
            }
        });
        assert!(matches!(result, Err(TestError::Bad(3))));

        // Single worker, so nothing after the failing item got to run
        assert_eq!(ran.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn shut_down_pool_rejects_work() {
        let mut pool = WorkerPool::new(2).unwrap();
        pool.shutdown_now();
        assert!(pool.is_shut_down());
        assert!(matches!(pool.execute(|| ()), Err(PoolError::ShutDown)));
        let result: Result<Vec<u32>, TestError> = pool.try_map(vec![1], Ok);
        assert!(matches!(result, Err(TestError::Pool)));
    }

    #[test]
    fn immediate_shutdown_drops_queued_work() {
        let mut pool = WorkerPool::new(1).unwrap();
        let (release, blocked) = mpsc::channel::<()>();
        let started = Arc::new(AtomicUsize::new(0));
        let flag = started.clone();
        pool.execute(move || {
            flag.fetch_add(1, Ordering::SeqCst);
            let _ = blocked.recv_timeout(std::time::Duration::from_millis(500));
        })
        .unwrap();

        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let done = done.clone();
            pool.execute(move || {
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.shutdown_now();
        drop(release);

        assert!(started.load(Ordering::SeqCst) <= 1);
        assert_eq!(done.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn graceful_shutdown_finishes_queued_work() {
        let mut pool = WorkerPool::new(2).unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..20 {
            let done = done.clone();
            pool.execute(move || {
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.shutdown();
        assert_eq!(done.load(Ordering::SeqCst), 20);
    }
}
