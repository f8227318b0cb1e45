use std::time::Duration;

use crate::context::ExecutionContext;
use crate::error::Error;
use crate::promise::Promise;

/// Owned by a delay's timer job. Rejects the delay with [`Error::Shutdown`]
/// if the job is dropped without running.
struct Unfired(Promise<()>);

impl Unfired {
    fn fire(self) {
        self.0.resolve(());
    }
}

impl Drop for Unfired {
    fn drop(&mut self) {
        if self.0.is_pending() && self.0.reject(Error::Shutdown) {
            tracing::warn!("delay timer dropped before firing");
        }
    }
}

/// A promise fulfilled with `()` once `interval` has elapsed.
///
/// Rejects with [`Error::Shutdown`] if `context` refuses the timer or drops
/// it unfired.
pub fn delay(context: &ExecutionContext, interval: Duration) -> Promise<()> {
    let promise = Promise::pending();
    let unfired = Unfired(promise.clone());
    match context.schedule_after(interval, move || unfired.fire()) {
        // Nothing can supersede a plain delay, so the timer is never cancelled.
        Ok(_timer) => {}
        Err(_closed) => tracing::warn!(?interval, "delay requested after shutdown"),
    }
    promise
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Pass the fulfilled value on after an extra pause of `interval`.
    pub fn delayed(&self, context: &ExecutionContext, interval: Duration) -> Promise<T> {
        let pause_on = context.clone();
        self.and_then(context, move |value| {
            Ok(delay(&pause_on, interval).then(&pause_on, move |()| Ok(value)))
        })
    }

    /// Reject with [`Error::Timeout`] unless this promise settles within
    /// `interval`.
    pub fn timeout(&self, context: &ExecutionContext, interval: Duration) -> Promise<T> {
        self.timeout_with(context, interval, Error::Timeout(interval))
    }

    /// Like [`timeout`](Promise::timeout) with a caller-supplied error.
    ///
    /// Whichever comes first wins: the source's outcome cancels the timer,
    /// and a fired timer makes the source's late outcome a no-op. If
    /// `context` refuses the timer, the returned promise rejects with
    /// [`Error::Shutdown`] and the source is left alone.
    pub fn timeout_with(
        &self,
        context: &ExecutionContext,
        interval: Duration,
        error: Error,
    ) -> Promise<T> {
        let wrapper = Promise::pending();
        let expired = wrapper.clone();
        let scheduled = context.schedule_after(interval, move || {
            if expired.reject(error) {
                tracing::debug!(?interval, "promise timed out");
            }
        });
        let timer = match scheduled {
            Ok(timer) => timer,
            Err(closed) => {
                tracing::warn!(?interval, "timeout requested after shutdown");
                wrapper.reject(closed.into());
                return wrapper;
            }
        };
        let target = wrapper.clone();
        self.on_settled(context, move |outcome| {
            target.settle(outcome);
            timer.cancel();
        });
        wrapper
    }
}
