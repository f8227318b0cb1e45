//! Execution contexts name *where* a continuation runs. The promise core never
//! touches threads itself; it hands every callable to a [`Scheduler`] together
//! with the [`Queue`] the caller asked for.
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// A unit of work handed to a scheduler.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// The closed set of destinations a job may be submitted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Queue {
    /// Run on whichever thread submits the job.
    ///
    /// Settling a promise runs its immediate observers on the settling
    /// thread, and each of those may settle the next promise in a chain, so
    /// a long `then`/`recover`/`adopt` chain on this queue settles
    /// recursively, one group of stack frames per link. Very deep chains
    /// (a retry loop built from thousands of `recover` steps) can overflow
    /// the stack; use [`Queue::Background`] for those.
    Immediate,
    /// A worker pool; jobs may run in parallel and may block.
    Background,
    /// A single serial thread, in submission order.
    Main,
}

/// A scheduler refused a job because it has shut down. The job is handed
/// back unrun.
#[derive(Error)]
#[error("scheduler has shut down")]
pub struct Closed {
    job: Job,
}

impl Closed {
    pub fn new(job: Job) -> Self {
        Self { job }
    }

    pub fn into_job(self) -> Job {
        self.job
    }
}

impl fmt::Debug for Closed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closed").finish_non_exhaustive()
    }
}

/// The interface the promise core needs from an execution substrate.
pub trait Scheduler: Send + Sync + 'static {
    fn submit(&self, queue: Queue, job: Job) -> Result<(), Closed>;

    /// Run `job` on `queue` once `delay` has elapsed, unless the returned
    /// handle is cancelled first.
    fn schedule_after(
        &self,
        delay: Duration,
        queue: Queue,
        job: Job,
    ) -> Result<TimerHandle, Closed>;
}

/// A handle to a job scheduled with [`Scheduler::schedule_after`].
///
/// Dropping the handle leaves the timer armed; only [`TimerHandle::cancel`]
/// disarms it.
#[must_use = "dropping a TimerHandle does not cancel the timer"]
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl TimerHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A handle for a timer that cannot be cancelled.
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel()
        }
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

/// A queue on a particular scheduler. Cheap to clone; every operator takes
/// one to decide where its callback runs.
#[derive(Clone)]
pub struct ExecutionContext {
    queue: Queue,
    scheduler: Arc<dyn Scheduler>,
}

impl ExecutionContext {
    pub fn new(queue: Queue, scheduler: Arc<dyn Scheduler>) -> Self {
        Self { queue, scheduler }
    }

    pub fn queue(&self) -> Queue {
        self.queue
    }

    /// The same scheduler, targeting a different queue.
    pub fn with_queue(&self, queue: Queue) -> Self {
        Self {
            queue,
            scheduler: self.scheduler.clone(),
        }
    }

    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> Result<(), Closed> {
        self.scheduler.submit(self.queue, Box::new(job))
    }

    pub fn schedule_after(
        &self,
        delay: Duration,
        job: impl FnOnce() + Send + 'static,
    ) -> Result<TimerHandle, Closed> {
        self.scheduler.schedule_after(delay, self.queue, Box::new(job))
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}
