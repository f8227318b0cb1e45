use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use crate::context::{ExecutionContext, Queue};
use crate::error::{guarded, panic_message, Error, Result};

/// The observable state of a [`Promise`].
#[derive(Debug, Clone, PartialEq)]
pub enum State<T, E = Error> {
    Pending,
    Fulfilled(T),
    Rejected(E),
}

impl<T> State<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, State::Pending)
    }

    /// The settled outcome, or `None` while pending.
    pub fn into_result(self) -> Option<Result<T>> {
        match self {
            State::Pending => None,
            State::Fulfilled(value) => Some(Ok(value)),
            State::Rejected(err) => Some(Err(err)),
        }
    }
}

/// A value that will be produced at most once, or fail.
///
/// `Promise` is a shared handle: clones observe and may settle the same
/// underlying state. The first call to [`resolve`](Promise::resolve),
/// [`reject`](Promise::reject) or [`settle`](Promise::settle) wins and every
/// later call is ignored.
///
/// Continuations never run on the settling thread while a lock is held; each
/// one is handed to the [`ExecutionContext`] it was registered with.
///
/// # Examples
///
/// ```
/// use promise_flow::{Dispatcher, Promise};
/// use std::thread;
///
/// let dispatcher = Dispatcher::new().expect("runtime");
/// let promise = Promise::<String>::pending();
/// let producer = promise.clone();
/// let task = thread::spawn(move || producer.resolve("🍓".into()));
/// let shouted = promise.then(&dispatcher.background(), |s| Ok(s.repeat(2)));
/// assert_eq!(shouted.wait().unwrap(), "🍓🍓");
/// task.join().expect("The producer thread has panicked");
/// ```
pub struct Promise<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

struct Inner<T> {
    state: State<T>,
    observers: Vec<Observer<T>>,
    // Tasks polling the promise as a future.
    wakers: Vec<Waker>,
}

type Callback<T> = Box<dyn FnOnce(Result<T>) + Send + 'static>;

struct Observer<T> {
    context: ExecutionContext,
    callback: Callback<T>,
}

/// Hand `outcome` to one observer on its context.
///
/// A panicking callback is logged and swallowed so the remaining observers
/// and wakers are still notified. If the context has shut down the callback
/// runs on the calling thread instead, so chains built before shutdown still
/// drain.
fn dispatch<T: Send + 'static>(
    context: &ExecutionContext,
    callback: Callback<T>,
    outcome: Result<T>,
) {
    let job = move || {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(move || callback(outcome))) {
            tracing::error!(
                panic = %panic_message(payload.as_ref()),
                "promise observer panicked"
            );
        }
    };
    if let Err(closed) = context.submit(job) {
        tracing::warn!(
            queue = ?context.queue(),
            "context has shut down, delivering outcome inline"
        );
        closed.into_job()();
    }
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Promise<T> {
    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // User code never runs under this lock, so a poisoned guard still
        // holds consistent state.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_pending(&self) -> bool {
        self.lock().state.is_pending()
    }

    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    /// Whether both handles refer to the same promise.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// An unsettled promise, settled later through any of its handles.
    pub fn pending() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: State::Pending,
                observers: Vec::new(),
                wakers: Vec::new(),
            })),
        }
    }

    pub fn fulfilled(value: T) -> Self {
        Self::from_result(Ok(value))
    }

    pub fn rejected(err: Error) -> Self {
        Self::from_result(Err(err))
    }

    pub fn from_result(result: Result<T>) -> Self {
        let promise = Self::pending();
        promise.settle(result);
        promise
    }

    /// Run `body` on `context`, handing it a handle to the new promise.
    ///
    /// If `body` returns an error or panics before settling, the promise is
    /// rejected with that failure. A body may also return `Ok(())` and settle
    /// later from another thread. If `context` has shut down, `body` never
    /// runs and the promise is rejected with [`Error::Shutdown`].
    pub fn new<F>(context: &ExecutionContext, body: F) -> Self
    where
        F: FnOnce(Promise<T>) -> Result<()> + Send + 'static,
    {
        let promise = Self::pending();
        let handle = promise.clone();
        let submitted = context.submit(move || {
            let settler = handle.clone();
            if let Err(err) = guarded(move || body(settler)) {
                handle.reject(err);
            }
        });
        if let Err(closed) = submitted {
            tracing::warn!(queue = ?context.queue(), "refusing promise body after shutdown");
            promise.reject(closed.into());
        }
        promise
    }

    /// Run `f` on `context` and settle with whatever it returns.
    pub fn spawn<F>(context: &ExecutionContext, f: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        Self::new(context, move |promise| {
            promise.settle(f());
            Ok(())
        })
    }

    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    pub fn reject(&self, err: Error) -> bool {
        self.settle(Err(err))
    }

    /// Move the promise to its terminal state. Returns `false` and does
    /// nothing if it was already settled.
    pub fn settle(&self, result: Result<T>) -> bool {
        let (observers, wakers) = {
            let mut inner = self.lock();
            if !inner.state.is_pending() {
                tracing::debug!(
                    fulfilled = result.is_ok(),
                    "ignoring settlement of an already settled promise"
                );
                return false;
            }
            inner.state = match &result {
                Ok(value) => State::Fulfilled(value.clone()),
                Err(err) => State::Rejected(err.clone()),
            };
            (
                std::mem::take(&mut inner.observers),
                std::mem::take(&mut inner.wakers),
            )
        };
        tracing::trace!(
            fulfilled = result.is_ok(),
            observers = observers.len(),
            "promise settled"
        );
        for observer in observers {
            dispatch(&observer.context, observer.callback, result.clone());
        }
        for waker in wakers {
            waker.wake()
        }
        true
    }

    /// Register a pair of callbacks, one of which runs on `context` once the
    /// promise settles. If it already has, the matching callback is scheduled
    /// right away.
    pub fn subscribe<F, R>(&self, context: &ExecutionContext, on_fulfilled: F, on_rejected: R)
    where
        F: FnOnce(T) + Send + 'static,
        R: FnOnce(Error) + Send + 'static,
    {
        self.on_settled(context, move |outcome| match outcome {
            Ok(value) => on_fulfilled(value),
            Err(err) => on_rejected(err),
        })
    }

    /// Like [`subscribe`](Promise::subscribe), with a single callback taking
    /// the outcome.
    pub fn on_settled<F>(&self, context: &ExecutionContext, callback: F)
    where
        F: FnOnce(Result<T>) + Send + 'static,
    {
        let settled = {
            let mut inner = self.lock();
            match inner.state.clone().into_result() {
                Some(outcome) => outcome,
                None => {
                    inner.observers.push(Observer {
                        context: context.clone(),
                        callback: Box::new(callback),
                    });
                    return;
                }
            }
        };
        dispatch(context, Box::new(callback), settled);
    }

    /// Settle this promise with `source`'s eventual outcome.
    ///
    /// Only `context`'s scheduler is used; its queue is ignored. The
    /// forwarding hop always runs on [`Queue::Immediate`], on whichever
    /// thread settles `source`, since it only moves an already produced
    /// outcome and runs no user code.
    pub fn adopt(&self, context: &ExecutionContext, source: &Promise<T>) {
        let target = self.clone();
        source.on_settled(&context.with_queue(Queue::Immediate), move |outcome| {
            target.settle(outcome);
        });
    }

    /// A snapshot of the current state.
    pub fn state(&self) -> State<T> {
        self.lock().state.clone()
    }
}

impl<T: fmt::Debug> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Promise")
            .field("state", &inner.state)
            .field("observers", &inner.observers.len())
            .finish()
    }
}

impl<T: Clone> Future for Promise<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.lock();
        if let Some(outcome) = inner.state.clone().into_result() {
            return Poll::Ready(outcome);
        }
        if !inner.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            inner.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}
