//! Deferred results of pipeline accessors

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::{CrashesError, Result};
use crate::worker::on_worker_thread;

#[derive(Debug)]
enum Inner<T> {
    Pending(oneshot::Receiver<Result<T>>),
    Ready(Option<Result<T>>),
}

/// Result of a request answered later by the pipeline worker
///
/// Await it from async code, or call [`Deferred::wait`] from a plain thread.
/// Resolves to [`CrashesError::WorkerStopped`] when the worker is gone
/// before answering.
///
/// Listener callbacks run on the worker thread. Read accessors called from
/// a callback are answered immediately; any other request made there can
/// only be answered after the callback returns, so waiting on it yields
/// [`CrashesError::WouldDeadlock`] instead of blocking.
#[derive(Debug)]
#[must_use = "a deferred result does nothing unless awaited or waited on"]
pub struct Deferred<T> {
    inner: Inner<T>,
}

// The value is moved out, never pinned in place
impl<T> Unpin for Deferred<T> {}

impl<T> Deferred<T> {
    pub(crate) fn new(rx: oneshot::Receiver<Result<T>>) -> Self {
        Self {
            inner: Inner::Pending(rx),
        }
    }

    /// A deferred that is already resolved
    pub(crate) fn ready(result: Result<T>) -> Self {
        Self {
            inner: Inner::Ready(Some(result)),
        }
    }

    /// Whether the result is available without waiting
    pub fn is_ready(&self) -> bool {
        matches!(self.inner, Inner::Ready(_))
    }

    /// Blocks the current thread until the result is available.
    ///
    /// Returns [`CrashesError::WouldDeadlock`] without blocking when called
    /// on the worker thread for a result the worker has yet to produce.
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context;
    /// `.await` the deferred there instead.
    pub fn wait(self) -> Result<T> {
        match self.inner {
            Inner::Ready(result) => result.unwrap_or(Err(CrashesError::WorkerStopped)),
            Inner::Pending(_) if on_worker_thread() => Err(CrashesError::WouldDeadlock),
            Inner::Pending(rx) => rx.blocking_recv().map_err(|_| CrashesError::WorkerStopped)?,
        }
    }
}

impl<T> Future for Deferred<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            Inner::Ready(result) => {
                Poll::Ready(result.take().unwrap_or(Err(CrashesError::WorkerStopped)))
            }
            Inner::Pending(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.map_err(|_| CrashesError::WorkerStopped)?),
        }
    }
}
