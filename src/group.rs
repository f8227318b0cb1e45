//! Combinators that fan in several promises.
//!
//! Each group keeps its bookkeeping behind its own mutex; the aggregate
//! promise's first-wins settlement makes late member callbacks harmless.
use std::sync::{Arc, Mutex, PoisonError};

use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::promise::Promise;

struct Slots<T> {
    values: Vec<Option<T>>,
    remaining: usize,
}

impl<T> Slots<T> {
    fn new(len: usize) -> Self {
        Self {
            values: std::iter::repeat_with(|| None).take(len).collect(),
            remaining: len,
        }
    }

    /// Record `value` at `index`; returns every value in index order once the
    /// last slot is filled.
    fn fill(&mut self, index: usize, value: T) -> Option<Vec<T>> {
        if self.values[index].replace(value).is_none() {
            self.remaining -= 1;
        }
        if self.remaining > 0 {
            return None;
        }
        Some(self.values.iter_mut().filter_map(Option::take).collect())
    }
}

/// Wait for every promise, yielding the values in input order.
///
/// The first rejection rejects the result immediately, without waiting for
/// the remaining members. An empty input fulfills with an empty vector.
pub fn all<T, I>(context: &ExecutionContext, promises: I) -> Promise<Vec<T>>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    let promises: Vec<_> = promises.into_iter().collect();
    if promises.is_empty() {
        return Promise::fulfilled(Vec::new());
    }
    let aggregate = Promise::pending();
    let slots = Arc::new(Mutex::new(Slots::new(promises.len())));
    for (index, promise) in promises.into_iter().enumerate() {
        let aggregate = aggregate.clone();
        let slots = slots.clone();
        promise.on_settled(context, move |outcome| match outcome {
            Ok(value) => {
                let done = slots
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .fill(index, value);
                if let Some(values) = done {
                    aggregate.resolve(values);
                }
            }
            Err(err) => {
                if aggregate.reject(err) {
                    tracing::trace!(index, "group member rejected");
                }
            }
        });
    }
    aggregate
}

/// Wait for every promise to settle, successfully or not. Never rejects.
pub fn all_settled<T, I>(context: &ExecutionContext, promises: I) -> Promise<Vec<Result<T>>>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    let members = promises.into_iter().map(|promise| {
        let settled = Promise::pending();
        let target = settled.clone();
        promise.on_settled(context, move |outcome| {
            target.resolve(outcome);
        });
        settled
    });
    all(context, members.collect::<Vec<_>>())
}

/// Settle with whichever promise settles first, fulfilled or rejected.
///
/// Rejects with [`Error::EmptyGroup`] when given no promises, since nothing
/// could ever settle it.
#[doc(alias = "race")]
pub fn any<T, I>(context: &ExecutionContext, promises: I) -> Promise<T>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    let mut promises = promises.into_iter().peekable();
    if promises.peek().is_none() {
        return Promise::rejected(Error::EmptyGroup);
    }
    let winner = Promise::pending();
    for promise in promises {
        let winner = winner.clone();
        promise.on_settled(context, move |outcome| {
            winner.settle(outcome);
        });
    }
    winner
}

/// The two halves of a [`zip`], filled in whichever order they arrive.
struct Pair<A, B> {
    left: Option<A>,
    right: Option<B>,
}

impl<A, B> Pair<A, B> {
    fn take_both(&mut self) -> Option<(A, B)> {
        if self.left.is_none() || self.right.is_none() {
            return None;
        }
        Some((self.left.take()?, self.right.take()?))
    }
}

/// Pair two promises of different types. The first rejection wins.
pub fn zip<A, B>(
    context: &ExecutionContext,
    left: &Promise<A>,
    right: &Promise<B>,
) -> Promise<(A, B)>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
{
    let zipped = Promise::pending();
    let pair = Arc::new(Mutex::new(Pair {
        left: None,
        right: None,
    }));

    let (target, shared) = (zipped.clone(), pair.clone());
    left.on_settled(context, move |outcome| match outcome {
        Ok(value) => {
            let both = {
                let mut pair = shared.lock().unwrap_or_else(PoisonError::into_inner);
                pair.left = Some(value);
                pair.take_both()
            };
            if let Some(both) = both {
                target.resolve(both);
            }
        }
        Err(err) => {
            target.reject(err);
        }
    });

    let target = zipped.clone();
    right.on_settled(context, move |outcome| match outcome {
        Ok(value) => {
            let both = {
                let mut pair = pair.lock().unwrap_or_else(PoisonError::into_inner);
                pair.right = Some(value);
                pair.take_both()
            };
            if let Some(both) = both {
                target.resolve(both);
            }
        }
        Err(err) => {
            target.reject(err);
        }
    });
    zipped
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// See [`all`].
    pub fn all<I>(context: &ExecutionContext, promises: I) -> Promise<Vec<T>>
    where
        I: IntoIterator<Item = Promise<T>>,
    {
        all(context, promises)
    }

    /// See [`any`].
    #[doc(alias = "race")]
    pub fn any<I>(context: &ExecutionContext, promises: I) -> Promise<T>
    where
        I: IntoIterator<Item = Promise<T>>,
    {
        any(context, promises)
    }

    /// See [`zip`].
    pub fn zip<U>(&self, context: &ExecutionContext, other: &Promise<U>) -> Promise<(T, U)>
    where
        U: Clone + Send + 'static,
    {
        zip(context, self, other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Dispatcher;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_slots_fill_in_index_order() {
        let mut slots = Slots::new(3);
        assert_eq!(slots.fill(2, 'c'), None);
        assert_eq!(slots.fill(0, 'a'), None);
        assert_eq!(slots.fill(1, 'b'), Some(vec!['a', 'b', 'c']));
    }

    #[test]
    fn test_all_empty_fulfills() {
        let dispatcher = Dispatcher::new().expect("dispatcher");
        let p = all::<u8, _>(&dispatcher.background(), Vec::new());
        assert!(p.is_settled());
        assert_eq!(p.wait().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_all_keeps_input_order() {
        let dispatcher = Dispatcher::new().expect("dispatcher");
        let members: Vec<Promise<u32>> = (0..3).map(|_| Promise::pending()).collect();
        let aggregate = Promise::all(&dispatcher.background(), members.clone());
        members[1].resolve(2);
        members[0].resolve(1);
        assert!(aggregate.is_pending());
        members[2].resolve(3);
        assert_eq!(aggregate.wait().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_all_settled_collects_everything() {
        let dispatcher = Dispatcher::new().expect("dispatcher");
        let p = all_settled(
            &dispatcher.background(),
            vec![Promise::fulfilled(1), Promise::rejected(Error::msg("two"))],
        );
        let results = p.wait().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(*results[0].as_ref().unwrap(), 1);
        assert_eq!(results[1].as_ref().unwrap_err().to_string(), "two");
    }

    #[test]
    fn test_any_empty_rejects() {
        let dispatcher = Dispatcher::new().expect("dispatcher");
        let p = any::<u8, _>(&dispatcher.background(), Vec::new());
        assert!(p.wait().unwrap_err().is_empty_group());
    }

    #[test]
    fn test_any_takes_first_rejection_too() {
        let dispatcher = Dispatcher::new().expect("dispatcher");
        let slow = Promise::<u32>::pending();
        let p = Promise::any(
            &dispatcher.background(),
            vec![slow.clone(), Promise::rejected(Error::msg("first"))],
        );
        assert_eq!(p.wait().unwrap_err().to_string(), "first");
        slow.resolve(1);
        assert_eq!(p.wait().unwrap_err().to_string(), "first");
    }

    #[test]
    fn test_zip_pairs_values() {
        let dispatcher = Dispatcher::new().expect("dispatcher");
        let bg = dispatcher.background();
        let left = Promise::spawn(&bg, || {
            thread::sleep(Duration::from_millis(20));
            Ok("left".to_owned())
        });
        let right = Promise::fulfilled(2u8);
        assert_eq!(left.zip(&bg, &right).wait().unwrap(), ("left".to_owned(), 2));
    }

    #[test]
    fn test_zip_rejects_without_waiting() {
        let dispatcher = Dispatcher::new().expect("dispatcher");
        let never = Promise::<u8>::pending();
        let started = Instant::now();
        let p = zip(
            &dispatcher.background(),
            &never,
            &Promise::<u8>::rejected(Error::msg("right failed")),
        );
        assert_eq!(p.wait().unwrap_err().to_string(), "right failed");
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
