//! The session ticker: a dynamically-resized pool of workers executing
//! per-session tick jobs.
//!
//! Workers are tokio tasks, each draining its own unbounded job channel.
//! Jobs are distributed round-robin and are fire-and-forget: submission
//! never waits for completion. Growing the pool spawns workers; shrinking
//! drops their senders, letting each worker finish its queued jobs and
//! exit. The pool is owned by the session manager and shut down with it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use log::{debug, error, warn};
use tokio::sync::mpsc;

pub type TickJob = Box<dyn FnOnce() + Send + 'static>;

struct Worker {
    jobs: mpsc::UnboundedSender<TickJob>,
}

impl Worker {
    fn spawn(id: usize) -> Self {
        let (jobs, mut rx) = mpsc::unbounded_channel::<TickJob>();
        tokio::spawn(async move {
            debug!("session ticker #{} started", id);
            while let Some(job) = rx.recv().await {
                job();
            }
            debug!("session ticker #{} stopped", id);
        });
        Self { jobs }
    }
}

pub struct TickPool {
    workers: Mutex<Vec<Worker>>,
    next: AtomicUsize,
}

impl TickPool {
    /// Creates the pool with a single worker. Must be called from within a
    /// tokio runtime.
    pub fn new() -> Self {
        Self {
            workers: Mutex::new(vec![Worker::spawn(0)]),
            next: AtomicUsize::new(0),
        }
    }

    pub fn size(&self) -> usize {
        self.workers.lock().expect("tick pool lock poisoned").len()
    }

    /// Adjusts the worker count to `target` (at least one). No-op when the
    /// pool is already at the target size.
    pub fn resize(&self, target: usize) {
        let target = target.max(1);
        let mut workers = self.workers.lock().expect("tick pool lock poisoned");
        if workers.len() == target {
            return;
        }

        debug!(
            "resizing session ticker pool from {} to {}",
            workers.len(),
            target
        );
        while workers.len() < target {
            let index = workers.len();
            workers.push(Worker::spawn(index));
        }
        // Dropped senders let the surplus workers drain and exit.
        workers.truncate(target);
    }

    /// Submits one fire-and-forget job, distributing round-robin.
    pub fn submit(&self, job: TickJob) {
        let workers = self.workers.lock().expect("tick pool lock poisoned");
        if workers.is_empty() {
            warn!("session ticker pool is shut down, dropping job");
            return;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % workers.len();
        if workers[index].jobs.send(job).is_err() {
            error!("session ticker #{} is gone, dropping job", index);
        }
    }

    /// Stops all workers once their queued jobs are drained.
    pub fn shutdown(&self) {
        self.workers
            .lock()
            .expect("tick pool lock poisoned")
            .clear();
    }
}
