//! Continuation operators. Each one subscribes to the source promise and
//! returns a new promise settled by the callback's result. A rejection flows
//! through every operator untouched until `catch` or `recover` handles it.
use crate::context::ExecutionContext;
use crate::error::{guarded, Error, Result};
use crate::promise::Promise;

impl<T: Clone + Send + 'static> Promise<T> {
    /// Transform the fulfilled value on `context`.
    ///
    /// An `Err` returned by `f`, or a panic inside it, rejects the new
    /// promise. `f` is skipped when the source rejects.
    pub fn then<U, F>(&self, context: &ExecutionContext, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        let next = Promise::pending();
        let target = next.clone();
        self.on_settled(context, move |outcome| {
            target.settle(outcome.and_then(|value| guarded(move || f(value))));
        });
        next
    }

    /// Like [`then`](Promise::then), but `f` starts another asynchronous step
    /// whose eventual outcome the new promise adopts.
    pub fn and_then<U, F>(&self, context: &ExecutionContext, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<Promise<U>> + Send + 'static,
    {
        let next = Promise::pending();
        let target = next.clone();
        let adopt_on = context.clone();
        self.on_settled(context, move |outcome| {
            match outcome.and_then(|value| guarded(move || f(value))) {
                Ok(inner) => target.adopt(&adopt_on, &inner),
                Err(err) => {
                    target.reject(err);
                }
            }
        });
        next
    }

    /// Handle a rejection on `context`, either recovering with a value or
    /// failing again. A fulfilled value passes through.
    pub fn catch<F>(&self, context: &ExecutionContext, f: F) -> Promise<T>
    where
        F: FnOnce(Error) -> Result<T> + Send + 'static,
    {
        let next = Promise::pending();
        let target = next.clone();
        self.on_settled(context, move |outcome| {
            target.settle(outcome.or_else(|err| guarded(move || f(err))));
        });
        next
    }

    /// Replace a rejection with the promise returned by `f`, e.g. a retry or
    /// a fallback source.
    pub fn recover<F>(&self, context: &ExecutionContext, f: F) -> Promise<T>
    where
        F: FnOnce(Error) -> Promise<T> + Send + 'static,
    {
        let next = Promise::pending();
        let target = next.clone();
        let adopt_on = context.clone();
        self.on_settled(context, move |outcome| match outcome {
            Ok(value) => {
                target.resolve(value);
            }
            Err(err) => match guarded(move || Ok(f(err))) {
                Ok(fallback) => target.adopt(&adopt_on, &fallback),
                Err(panicked) => {
                    target.reject(panicked);
                }
            },
        });
        next
    }

    /// Run `f` whatever the outcome, then settle with the original outcome.
    ///
    /// If `f` fails, its error replaces the original outcome, including an
    /// original rejection.
    pub fn always<F>(&self, context: &ExecutionContext, f: F) -> Promise<T>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let next = Promise::pending();
        let target = next.clone();
        self.on_settled(context, move |outcome| {
            target.settle(guarded(f).and(outcome));
        });
        next
    }

    /// Reject with [`Error::Validation`] unless `predicate` accepts the value.
    pub fn ensure<F>(&self, context: &ExecutionContext, predicate: F) -> Promise<T>
    where
        F: FnOnce(&T) -> bool + Send + 'static,
    {
        self.then(context, move |value| {
            if predicate(&value) {
                Ok(value)
            } else {
                Err(Error::Validation)
            }
        })
    }

    /// Run a side effect with the value, passing it on unchanged. A failing
    /// effect rejects the chain.
    pub fn forward<F>(&self, context: &ExecutionContext, f: F) -> Promise<T>
    where
        F: FnOnce(&T) -> Result<()> + Send + 'static,
    {
        self.then(context, move |value| {
            f(&value)?;
            Ok(value)
        })
    }
}
