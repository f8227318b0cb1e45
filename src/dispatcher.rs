//! A [`Scheduler`] backed by a tokio runtime.
//!
//! Background jobs go to tokio's blocking pool so that continuations are free
//! to block (including on [`Promise::wait`](crate::Promise::wait)). The main
//! queue is a single dedicated thread fed by a channel, giving the serial
//! ordering of a UI thread.
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};

use crate::context::{Closed, ExecutionContext, Job, Queue, Scheduler, TimerHandle};
use crate::error::panic_message;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Async worker threads driving timers.
    pub worker_threads: usize,
    /// Upper bound on threads running background jobs.
    pub max_blocking_threads: usize,
    pub thread_name: String,
    pub main_thread_name: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_threads: thread::available_parallelism().map_or(4, |n| n.get()),
            max_blocking_threads: 64,
            thread_name: "promise-flow".to_owned(),
            main_thread_name: "promise-flow-main".to_owned(),
        }
    }
}

impl DispatcherConfig {
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.worker_threads = count.max(1);
        self
    }

    pub fn max_blocking_threads(mut self, count: usize) -> Self {
        self.max_blocking_threads = count.max(1);
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn main_thread_name(mut self, name: impl Into<String>) -> Self {
        self.main_thread_name = name.into();
        self
    }
}

/// Owns the runtime behind every context it hands out.
///
/// Contexts only hold a [`DispatchHandle`]. Once the dispatcher is dropped,
/// the background and main queues refuse new jobs and timers with
/// [`Closed`], which promises report as [`Error::Shutdown`](crate::Error).
/// Jobs already queued on the main queue still run; the main queue thread
/// exits when the last context referencing it is gone.
///
/// # Examples
///
/// ```
/// use promise_flow::{Dispatcher, Promise};
///
/// let dispatcher = Dispatcher::new().expect("runtime");
/// let promise = Promise::spawn(&dispatcher.background(), || Ok(21 * 2));
/// assert_eq!(promise.wait().unwrap(), 42);
/// ```
pub struct Dispatcher {
    runtime: Option<Runtime>,
    handle: Arc<DispatchHandle>,
}

impl Dispatcher {
    pub fn new() -> io::Result<Self> {
        Self::with_config(DispatcherConfig::default())
    }

    pub fn with_config(config: DispatcherConfig) -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .max_blocking_threads(config.max_blocking_threads.max(1))
            .thread_name(config.thread_name.clone())
            .enable_time()
            .build()?;
        let main = spawn_main_queue(config.main_thread_name.clone())?;
        tracing::debug!(
            worker_threads = config.worker_threads,
            max_blocking_threads = config.max_blocking_threads,
            "dispatcher started"
        );
        let handle = Arc::new(DispatchHandle {
            runtime: runtime.handle().clone(),
            main,
            closed: Arc::new(AtomicBool::new(false)),
        });
        Ok(Self {
            runtime: Some(runtime),
            handle,
        })
    }

    pub fn context(&self, queue: Queue) -> ExecutionContext {
        ExecutionContext::new(queue, self.handle.clone())
    }

    pub fn immediate(&self) -> ExecutionContext {
        self.context(Queue::Immediate)
    }

    pub fn background(&self) -> ExecutionContext {
        self.context(Queue::Background)
    }

    pub fn main(&self) -> ExecutionContext {
        self.context(Queue::Main)
    }

    pub fn handle(&self) -> Arc<DispatchHandle> {
        self.handle.clone()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.handle.closed.store(true, Ordering::SeqCst);
        if let Some(runtime) = self.runtime.take() {
            // Blocking jobs may be parked on promises that will never settle;
            // don't wait for them.
            runtime.shutdown_background();
            tracing::debug!("dispatcher shut down");
        }
    }
}

/// The cloneable scheduling half of a [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    runtime: Handle,
    main: Sender<Job>,
    // Set when the owning dispatcher drops.
    closed: Arc<AtomicBool>,
}

impl DispatchHandle {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Scheduler for DispatchHandle {
    fn submit(&self, queue: Queue, job: Job) -> Result<(), Closed> {
        if queue == Queue::Immediate {
            job();
            return Ok(());
        }
        if self.is_closed() {
            tracing::warn!(?queue, "dispatcher has shut down, refusing job");
            return Err(Closed::new(job));
        }
        match queue {
            Queue::Main => self.main.send(job).map_err(|err| {
                tracing::warn!("main queue has stopped, refusing job");
                Closed::new(err.0)
            }),
            _ => {
                self.runtime.spawn_blocking(job);
                Ok(())
            }
        }
    }

    fn schedule_after(
        &self,
        delay: Duration,
        queue: Queue,
        job: Job,
    ) -> Result<TimerHandle, Closed> {
        if self.is_closed() {
            tracing::warn!(?queue, "dispatcher has shut down, refusing timer");
            return Err(Closed::new(job));
        }
        let scheduler = self.clone();
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if scheduler.submit(queue, job).is_err() {
                tracing::debug!(?queue, "timer fired after shutdown");
            }
        });
        Ok(TimerHandle::new(move || task.abort()))
    }
}

fn spawn_main_queue(name: String) -> io::Result<Sender<Job>> {
    let (tx, rx) = channel::<Job>();
    thread::Builder::new().name(name).spawn(move || {
        for job in rx {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
                tracing::error!(
                    panic = %panic_message(payload.as_ref()),
                    "job panicked on the main queue"
                );
            }
        }
        tracing::trace!("main queue drained");
    })?;
    Ok(tx)
}
