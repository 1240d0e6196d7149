//! # Cooperative Task Scheduler
//!
//! Every probe is a chain of continuations. Invoking a [`Task`] performs one
//! non-blocking step and either finishes or hands back the next step, which
//! goes to the back of the active queue. A single thread thereby multiplexes
//! thousands of probes without ever waiting on one of them.
//!
//! At most `batch` tasks are active at once; the rest wait in the pending
//! queue and are promoted one by one as active tasks finish.

use std::collections::VecDeque;

use tracing::debug;

/// One step of a probe. Consumed when invoked, so it runs at most once.
pub type Task<'a> = Box<dyn FnOnce() -> Step<'a> + 'a>;

pub enum Step<'a> {
    Done,
    Continue(Task<'a>),
}

impl<'a> Step<'a> {
    pub fn next(task: impl FnOnce() -> Step<'a> + 'a) -> Self {
        Step::Continue(Box::new(task))
    }
}

pub struct TaskQueueRunner<'a> {
    pending: VecDeque<Task<'a>>,
    active: VecDeque<Task<'a>>,
    batch: usize,
    peak_active: usize,
}

impl<'a> TaskQueueRunner<'a> {
    /// `capacity` pre-sizes the pending queue; `batch` bounds the active set
    /// and is raised to one if zero.
    pub fn new(capacity: usize, batch: usize) -> Self {
        let batch = batch.max(1);
        Self {
            pending: VecDeque::with_capacity(capacity),
            active: VecDeque::with_capacity(batch.min(capacity)),
            batch,
            peak_active: 0,
        }
    }

    pub fn enqueue(&mut self, task: Task<'a>) {
        self.pending.push_back(task);
    }

    pub fn spawn(&mut self, task: impl FnOnce() -> Step<'a> + 'a) {
        self.enqueue(Box::new(task));
    }

    pub fn len(&self) -> usize {
        self.pending.len() + self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Largest number of simultaneously active tasks seen so far.
    pub fn peak_active(&self) -> usize {
        self.peak_active
    }

    /// Drives every queued task to completion.
    pub fn run(&mut self) {
        debug!("Running {} task(s), batch of {}", self.len(), self.batch);
        while self.active.len() < self.batch && self.promote() {}

        let mut finished = 0usize;
        while let Some(task) = self.active.pop_front() {
            match task() {
                Step::Done => {
                    finished += 1;
                    self.promote();
                }
                Step::Continue(next) => self.active.push_back(next),
            }
        }
        debug!("All {finished} task(s) finished");
    }

    fn promote(&mut self) -> bool {
        let Some(task) = self.pending.pop_front() else {
            return false;
        };
        self.active.push_back(task);
        self.peak_active = self.peak_active.max(self.active.len());
        true
    }
}

/// Builds one task per item and runs them all with at most `batch` active.
pub fn quick_scan<'a, I, F>(items: I, batch: usize, make_task: F)
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Task<'a>,
{
    let items = items.into_iter();
    let mut runner = TaskQueueRunner::new(items.size_hint().0, batch);
    for task in items.map(make_task) {
        runner.enqueue(task);
    }
    runner.run();
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
