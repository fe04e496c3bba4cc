//! Worker/task bookkeeping for the render pool.
//!
//! Pure data structure: no threads, no channels. The pool owns one behind a
//! mutex and asks it where each task goes.

use std::collections::{BTreeSet, VecDeque};

/// Worker identifier, `0..workers`.
pub type WorkerId = usize;

/// FIFO queue plus an idle set; tasks go to the lowest-numbered idle worker.
#[derive(Debug)]
pub struct Scheduler<T> {
    workers: usize,
    idle: BTreeSet<WorkerId>,
    queue: VecDeque<T>,
}

impl<T> Scheduler<T> {
    /// All workers start idle.
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            idle: (0..workers).collect(),
            queue: VecDeque::new(),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Dispatch to an idle worker, or enqueue and return `None`.
    pub fn submit(&mut self, task: T) -> Option<(WorkerId, T)> {
        match self.idle.pop_first() {
            Some(worker) => Some((worker, task)),
            None => {
                self.queue.push_back(task);
                None
            }
        }
    }

    /// A worker finished its task. Returns the next task for that worker, or
    /// marks it idle.
    pub fn complete(&mut self, worker: WorkerId) -> Option<T> {
        match self.queue.pop_front() {
            Some(task) => Some(task),
            None => {
                self.idle.insert(worker);
                None
            }
        }
    }

    /// Remove every queued task, oldest first.
    pub fn drain(&mut self) -> Vec<T> {
        self.queue.drain(..).collect()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn idle_workers(&self) -> usize {
        self.idle.len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.idle.len() == self.workers
    }
}
