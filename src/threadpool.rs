//! Single-consumer background task queue used to flush locked buffers
//! without blocking the receive threads.
//!
//! The reference pool is `threadpool_create(1)`: one worker thread that
//! drains a FIFO of jobs. Each job (`thread_write_buffer`) internally
//! spawns its own short-lived pool of writer threads — the write
//! pool here is purely a queue plus one dispatcher thread, not a
//! work-stealing pool.

use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct ThreadPool {
    sender: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl ThreadPool {
    /// Spawns the background worker thread.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel::<Job>();
        let worker = thread::Builder::new()
            .name("write-pool".to_string())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
            })
            .expect("failed to spawn write-pool thread");

        Self {
            sender: Some(sender),
            worker: Some(worker),
        }
    }

    /// Enqueues a job. Panics if the worker thread has already exited,
    /// which only happens if it panicked — a bug, not an operating
    /// condition this crate tries to recover from.
    pub fn enqueue<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender
            .as_ref()
            .expect("enqueue after shutdown")
            .send(Box::new(job))
            .expect("write-pool worker thread exited unexpectedly");
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Dropping the sender unblocks the worker's `recv()` loop.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn jobs_run_in_order_on_the_worker() {
        let pool = ThreadPool::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        for i in 0..5 {
            let counter = counter.clone();
            let seen = seen.clone();
            pool.enqueue(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                seen.lock().unwrap().push(i);
            });
        }
        drop(pool);
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn drop_joins_the_worker() {
        let pool = ThreadPool::new();
        let done = Arc::new(AtomicUsize::new(0));
        let done2 = done.clone();
        pool.enqueue(move || {
            thread::sleep(Duration::from_millis(10));
            done2.store(1, Ordering::SeqCst);
        });
        drop(pool);
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
