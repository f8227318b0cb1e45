use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::context::Closed;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The single failure channel shared by every promise.
///
/// Errors are cloned into each observer of a rejected promise, so producer
/// errors are stored behind an `Arc`.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Source(Arc<dyn std::error::Error + Send + Sync>),
    /// Raised by `ensure` when its predicate returns false.
    #[error("value rejected by ensure predicate")]
    Validation,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// Raised by `any` when it is handed no promises to race.
    #[error("promise group is empty")]
    EmptyGroup,
    #[error("callback panicked: {0}")]
    Panicked(String),
    /// The context a body or timer was handed to has shut down.
    #[error("execution context has shut down")]
    Shutdown,
}

impl From<Closed> for Error {
    fn from(_: Closed) -> Self {
        Error::Shutdown
    }
}

impl Error {
    pub fn msg(message: impl Into<String>) -> Self {
        Error::Message(message.into())
    }

    pub fn new<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Source(Arc::new(err))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation)
    }

    pub fn is_empty_group(&self) -> bool {
        matches!(self, Error::EmptyGroup)
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, Error::Panicked(_))
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, Error::Shutdown)
    }
}

/// Run a user callback, turning a panic into `Error::Panicked`.
pub(crate) fn guarded<R>(f: impl FnOnce() -> Result<R>) -> Result<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::warn!(panic = %message, "callback panicked, rejecting promise");
            Err(Error::Panicked(message))
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
