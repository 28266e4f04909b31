//! Worker thread pool and dispatcher.
//!
//! The pool runs a dedicated service thread (entered through
//! [`ThreadPool::run`]) that owns the workers and, when autonomics are
//! enabled, periodically retunes the worker count between the configured
//! minimum and maximum. Work is submitted through the cloneable
//! [`Dispatcher`] handle.
//!
//! Draining is cooperative: the service thread first lets every job queued
//! before the drain finish, then retires the workers and exits its loop so
//! the coordinator's join cannot hang.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// Platform ceiling on the worker maximum.
pub const MAX_POOL_WORKERS: usize = 64;

/// Interval between autonomics monitor samples.
const MONITOR_TICK: Duration = Duration::from_millis(20);

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Task {
    Run(Job),
    Retire,
}

enum Control {
    Drain,
}

#[derive(Default)]
struct Backlog {
    queued: usize,
    running: usize,
}

struct PoolShared {
    backlog: Mutex<Backlog>,
    idle: Condvar,
    submitted: AtomicU64,
    completed: AtomicU64,
    workers: AtomicUsize,
    draining: AtomicBool,
}

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PoolStats {
    pub submitted: u64,
    pub completed: u64,
    pub queued: usize,
    pub running: usize,
    pub workers: usize,
}

/// Cloneable submission handle onto the pool.
#[derive(Clone)]
pub struct Dispatcher {
    job_tx: Sender<Task>,
    control_tx: Sender<Control>,
    shared: Arc<PoolShared>,
}

impl Dispatcher {
    /// Queue a job. Returns false once the pool is draining; jobs are never
    /// accepted past the drain boundary.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.shared.draining.load(Ordering::Acquire) {
            return false;
        }
        self.shared.backlog.lock().queued += 1;
        self.shared.submitted.fetch_add(1, Ordering::Relaxed);
        if self.job_tx.send(Task::Run(Box::new(job))).is_err() {
            // Service already gone; roll the accounting back.
            self.shared.backlog.lock().queued -= 1;
            self.shared.submitted.fetch_sub(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    /// Block until every queued and running job has completed.
    pub fn wait_until_empty(&self) {
        let mut backlog = self.shared.backlog.lock();
        while backlog.queued + backlog.running > 0 {
            self.shared.idle.wait(&mut backlog);
        }
    }

    pub fn stats(&self) -> PoolStats {
        let backlog = self.shared.backlog.lock();
        PoolStats {
            submitted: self.shared.submitted.load(Ordering::Relaxed),
            completed: self.shared.completed.load(Ordering::Relaxed),
            queued: backlog.queued,
            running: backlog.running,
            workers: self.shared.workers.load(Ordering::Relaxed),
        }
    }

    /// Signal the service thread to drain and exit. Queued work still runs.
    pub(crate) fn drain(&self) {
        self.shared.draining.store(true, Ordering::Release);
        let _ = self.control_tx.send(Control::Drain);
    }
}

/// The pool service object; consumed by the service thread.
pub struct ThreadPool {
    job_tx: Sender<Task>,
    job_rx: Receiver<Task>,
    control_tx: Sender<Control>,
    control_rx: Receiver<Control>,
    shared: Arc<PoolShared>,
    min_workers: usize,
    max_workers: usize,
    autonomics_enabled: bool,
    monitor_cycles: u32,
    action_cycles: u32,
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadPool {
    pub fn new() -> Self {
        let (job_tx, job_rx) = unbounded();
        let (control_tx, control_rx) = unbounded();
        Self {
            job_tx,
            job_rx,
            control_tx,
            control_rx,
            shared: Arc::new(PoolShared {
                backlog: Mutex::new(Backlog::default()),
                idle: Condvar::new(),
                submitted: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                workers: AtomicUsize::new(0),
                draining: AtomicBool::new(false),
            }),
            min_workers: 1,
            max_workers: 1,
            autonomics_enabled: true,
            monitor_cycles: 20,
            action_cycles: 10,
        }
    }

    pub fn set_workers(&mut self, min: usize, max: usize) {
        self.min_workers = min.clamp(1, MAX_POOL_WORKERS);
        self.max_workers = max.clamp(self.min_workers, MAX_POOL_WORKERS);
    }

    pub fn set_autonomics(&mut self, enabled: bool, monitor_cycles: u32, action_cycles: u32) {
        self.autonomics_enabled = enabled;
        self.monitor_cycles = monitor_cycles.max(1);
        self.action_cycles = action_cycles.max(1);
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher {
            job_tx: self.job_tx.clone(),
            control_tx: self.control_tx.clone(),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Service-thread entry point. Returns once drained.
    pub fn run(self) {
        let mut workers: Vec<JoinHandle<()>> = Vec::new();
        for _ in 0..self.min_workers {
            workers.push(self.spawn_worker(workers.len()));
        }
        tracing::debug!(workers = workers.len(), "thread pool service started");

        let mut samples = 0u32;
        let mut depth_sum = 0usize;
        let mut verdicts = 0u32;
        let mut grow_votes = 0i32;

        loop {
            match self.control_rx.recv_timeout(MONITOR_TICK) {
                Ok(Control::Drain) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    if !self.autonomics_enabled {
                        continue;
                    }
                    samples += 1;
                    depth_sum += self.shared.backlog.lock().queued;
                    if samples < self.monitor_cycles {
                        continue;
                    }
                    let active = self.shared.workers.load(Ordering::Relaxed);
                    let average_depth = depth_sum / samples as usize;
                    samples = 0;
                    depth_sum = 0;
                    if average_depth > active {
                        grow_votes += 1;
                    } else if average_depth == 0 && active > self.min_workers {
                        grow_votes -= 1;
                    }
                    verdicts += 1;
                    if verdicts < self.action_cycles {
                        continue;
                    }
                    let active = self.shared.workers.load(Ordering::Relaxed);
                    if grow_votes > 0 && active < self.max_workers {
                        workers.push(self.spawn_worker(workers.len()));
                        tracing::debug!(workers = active + 1, "autonomics grew the pool");
                    } else if grow_votes < 0 && active > self.min_workers {
                        let _ = self.job_tx.send(Task::Retire);
                        tracing::debug!(workers = active - 1, "autonomics shrank the pool");
                    }
                    verdicts = 0;
                    grow_votes = 0;
                }
            }
        }

        // Drain: let queued work finish before retiring anybody.
        self.wait_until_empty_inner();
        for _ in 0..workers.len() {
            let _ = self.job_tx.send(Task::Retire);
        }
        for worker in workers {
            let _ = worker.join();
        }
        tracing::debug!("thread pool service drained");
    }

    fn wait_until_empty_inner(&self) {
        let mut backlog = self.shared.backlog.lock();
        while backlog.queued + backlog.running > 0 {
            self.shared.idle.wait(&mut backlog);
        }
    }

    fn spawn_worker(&self, index: usize) -> JoinHandle<()> {
        let rx = self.job_rx.clone();
        let shared = Arc::clone(&self.shared);
        shared.workers.fetch_add(1, Ordering::Relaxed);
        std::thread::Builder::new()
            .name(format!("pool-worker-{index}"))
            .spawn(move || worker_loop(&rx, &shared))
            .expect("spawning a pool worker thread")
    }
}

fn worker_loop(rx: &Receiver<Task>, shared: &PoolShared) {
    while let Ok(task) = rx.recv() {
        match task {
            Task::Run(job) => {
                {
                    let mut backlog = shared.backlog.lock();
                    backlog.queued -= 1;
                    backlog.running += 1;
                }
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    tracing::error!("a pool job panicked; the worker continues");
                }
                shared.completed.fetch_add(1, Ordering::Relaxed);
                let mut backlog = shared.backlog.lock();
                backlog.running -= 1;
                if backlog.queued + backlog.running == 0 {
                    shared.idle.notify_all();
                }
            }
            Task::Retire => break,
        }
    }
    shared.workers.fetch_sub(1, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn started(min: usize, max: usize) -> (Dispatcher, JoinHandle<()>) {
        let mut pool = ThreadPool::new();
        pool.set_workers(min, max);
        pool.set_autonomics(true, 2, 2);
        let dispatcher = pool.dispatcher();
        let service = std::thread::Builder::new()
            .name("pool-dispatcher".into())
            .spawn(move || pool.run())
            .unwrap();
        (dispatcher, service)
    }

    #[test]
    fn submitted_jobs_all_run() {
        let (dispatcher, service) = started(2, 4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            assert!(dispatcher.submit(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            }));
        }
        dispatcher.wait_until_empty();
        assert_eq!(counter.load(Ordering::Relaxed), 100);
        let stats = dispatcher.stats();
        assert_eq!(stats.completed, 100);
        assert_eq!(stats.queued, 0);
        dispatcher.drain();
        service.join().unwrap();
    }

    #[test]
    fn drain_finishes_queued_work() {
        let (dispatcher, service) = started(1, 1);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..20 {
            let counter = Arc::clone(&counter);
            dispatcher.submit(move || {
                std::thread::sleep(Duration::from_millis(2));
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        // Drain immediately: everything queued before it must still run.
        dispatcher.drain();
        service.join().unwrap();
        assert_eq!(counter.load(Ordering::Relaxed), 20);
    }

    #[test]
    fn submissions_are_refused_past_the_drain_boundary() {
        let (dispatcher, service) = started(1, 2);
        dispatcher.drain();
        service.join().unwrap();
        assert!(!dispatcher.submit(|| {}));
        assert_eq!(dispatcher.stats().submitted, 0);
    }

    #[test]
    fn a_panicking_job_does_not_take_the_pool_down() {
        let (dispatcher, service) = started(1, 1);
        dispatcher.submit(|| panic!("job failure"));
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let counter = Arc::clone(&counter);
            dispatcher.submit(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        dispatcher.wait_until_empty();
        assert_eq!(counter.load(Ordering::Relaxed), 1);
        dispatcher.drain();
        service.join().unwrap();
    }
}
