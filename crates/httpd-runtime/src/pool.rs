//! `ThreadPool` — bounded work queue drained by a fixed set of workers.
//!
//! Spawns N OS threads at creation. The reactor appends jobs to a
//! lock-free bounded queue and posts a semaphore permit; each worker
//! blocks on the semaphore, pops one job and runs the handler on it.
//!
//! No dynamic scaling. `append` never blocks: once the queue holds
//! `max_requests` jobs further appends are rejected and the job is
//! handed back to the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_queue::ArrayQueue;
use tracing::{debug, info};

use crate::error::PoolError;
use crate::semaphore::Semaphore;

/// Shared state between the reactor and the workers.
struct PoolInner<T> {
    /// Pending jobs: reactor → workers.
    queue: ArrayQueue<T>,
    /// One permit per queued job, plus one per worker at shutdown.
    available: Semaphore,
    /// Shutdown flag.
    shutdown: AtomicBool,
}

pub struct ThreadPool<T: Send + 'static> {
    inner: Arc<PoolInner<T>>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl<T: Send + 'static> ThreadPool<T> {
    /// Start `num_workers` threads, each running `handler` on the jobs
    /// it dequeues.
    ///
    /// `max_requests`: pending jobs held before `append` rejects.
    pub fn new<F>(num_workers: usize, max_requests: usize, handler: F) -> Result<Self, PoolError>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        if num_workers == 0 {
            return Err(PoolError::NoWorkers);
        }
        if max_requests == 0 {
            return Err(PoolError::ZeroCapacity);
        }

        let inner = Arc::new(PoolInner {
            queue: ArrayQueue::new(max_requests),
            available: Semaphore::new(0),
            shutdown: AtomicBool::new(false),
        });
        let handler = Arc::new(handler);

        let mut pool = ThreadPool {
            inner,
            handles: Vec::with_capacity(num_workers),
        };
        for worker_id in 0..num_workers {
            let inner = Arc::clone(&pool.inner);
            let handler = Arc::clone(&handler);
            let spawned = thread::Builder::new()
                .name(format!("httpd-worker-{}", worker_id))
                .spawn(move || worker_loop(inner, handler, worker_id));
            match spawned {
                Ok(handle) => {
                    debug!(worker = worker_id, "created worker thread");
                    pool.handles.push(handle);
                }
                Err(source) => {
                    pool.shutdown();
                    return Err(PoolError::Spawn { index: worker_id, source });
                }
            }
        }

        info!(workers = num_workers, capacity = max_requests, "thread pool started");
        Ok(pool)
    }

    /// Queue a job. Never blocks; a full or stopped pool returns the job.
    pub fn append(&self, job: T) -> Result<(), T> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(job);
        }
        self.inner.queue.push(job)?;
        self.inner.available.post();
        Ok(())
    }

    /// Jobs queued but not yet picked up.
    pub fn pending(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.queue.capacity()
    }

    pub fn num_workers(&self) -> usize {
        self.handles.len()
    }

    /// Stop accepting work, wake every worker and join them.
    ///
    /// Jobs still queued are dropped with the pool.
    pub fn shutdown(&mut self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.available.post_many(self.handles.len());
        for handle in self.handles.drain(..) {
            let name = handle.thread().name().map(str::to_owned);
            if handle.join().is_err() {
                tracing::error!(worker = ?name, "worker thread panicked");
            }
        }
    }
}

impl<T: Send + 'static> Drop for ThreadPool<T> {
    fn drop(&mut self) {
        // Signal only. Owners that need the workers gone call shutdown().
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.available.post_many(self.handles.len());
    }
}

/// Worker thread main loop.
fn worker_loop<T, F>(inner: Arc<PoolInner<T>>, handler: Arc<F>, worker_id: usize)
where
    F: Fn(T),
{
    loop {
        inner.available.wait();
        if inner.shutdown.load(Ordering::Acquire) {
            break;
        }
        // A permit without a job is a spurious wakeup.
        if let Some(job) = inner.queue.pop() {
            (*handler)(job);
        }
    }
    debug!(worker = worker_id, "worker exiting");
}
