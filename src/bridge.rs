//! Blocking access to promises from synchronous code.
//!
//! # Deadlock hazard
//!
//! Waiting parks the calling thread until some other thread settles the
//! promise. Waiting on the main queue for a promise whose work is itself
//! scheduled on the main queue can never finish, and neither can waiting
//! inside an [`Immediate`](crate::Queue::Immediate) callback for the promise
//! that callback is meant to settle. This is not detected.
use futures::executor::block_on;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::promise::Promise;

impl<T: Clone + Send + 'static> Promise<T> {
    /// Block until the promise settles and return its outcome.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_flow::{Error, Promise};
    ///
    /// assert_eq!(Promise::fulfilled(5).wait().unwrap(), 5);
    /// let err = Promise::<u8>::rejected(Error::msg("boom")).wait().unwrap_err();
    /// assert_eq!(err.to_string(), "boom");
    /// ```
    pub fn wait(&self) -> Result<T> {
        block_on(self.clone())
    }
}

/// Build a promise with `body` on `context` and block until it settles.
pub fn wait_for<T, F>(context: &ExecutionContext, body: F) -> Result<T>
where
    T: Clone + Send + 'static,
    F: FnOnce(Promise<T>) -> Result<()> + Send + 'static,
{
    Promise::new(context, body).wait()
}
