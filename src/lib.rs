//! Composable promises for rust.
//!
//! A [`Promise`] is a shared handle to a value that is produced at most once,
//! or to the [`Error`] that prevented it. Continuations (`then`, `catch`,
//! `always`, `ensure`, `forward`, `recover`) build new promises from old ones,
//! [`all`], [`any`] and [`zip`] fan several promises in, [`delay`] and
//! [`Promise::timeout`] add time limits, and [`Promise::wait`] blocks until
//! the outcome is known. Promises are also futures and can be `.await`ed.
//!
//! Every continuation runs on the [`ExecutionContext`] it was given. The
//! [`Dispatcher`] provides contexts backed by a tokio runtime.
//!
//! ```
//! use promise_flow::{all, Dispatcher, Promise};
//! use std::time::Duration;
//!
//! let dispatcher = Dispatcher::new().expect("runtime");
//! let bg = dispatcher.background();
//! let sizes = (1..=3u64).map(|n| Promise::spawn(&bg, move || Ok(n * 100)));
//! let total = all(&bg, sizes.collect::<Vec<_>>())
//!     .then(&bg, |sizes| Ok(sizes.iter().sum::<u64>()))
//!     .timeout(&bg, Duration::from_secs(5));
//! assert_eq!(total.wait().unwrap(), 600);
//! ```

mod bridge;
mod context;
mod dispatcher;
mod error;
mod group;
mod operators;
mod promise;
mod timing;

pub use bridge::wait_for;
pub use context::{Closed, ExecutionContext, Job, Queue, Scheduler, TimerHandle};
pub use dispatcher::{DispatchHandle, Dispatcher, DispatcherConfig};
pub use error::{Error, Result};
pub use group::{all, all_settled, any, zip};
pub use promise::{Promise, State};
pub use timing::delay;
