//! Write-once result handles.
//!
//! Streaming entry points return immediately and keep working in the
//! background. Values only known at the end (the final object, total
//! usage) are delivered through a [`Deferred`] that the background task
//! settles exactly once through its [`Resolver`].
//!
//! Settling consumes the resolver, so a second write does not compile. A
//! resolver dropped without settling fails the handle with
//! [`Error::StreamClosed`].

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::Error;

/// Creates a connected resolver/handle pair.
pub fn deferred<T>() -> (Resolver<T>, Deferred<T>) {
    let (tx, rx) = oneshot::channel();
    (Resolver { tx }, Deferred { rx })
}

/// The writing half. Consumed on use.
#[derive(Debug)]
pub struct Resolver<T> {
    tx: oneshot::Sender<Result<T, Error>>,
}

impl<T> Resolver<T> {
    /// Settles the handle with `result`.
    pub fn settle(self, result: Result<T, Error>) {
        // The handle may already be dropped; nobody is waiting then.
        let _ = self.tx.send(result);
    }

    /// Fulfils the handle with `value`.
    pub fn resolve(self, value: T) {
        self.settle(Ok(value));
    }

    /// Fails the handle with `error`.
    pub fn reject(self, error: Error) {
        self.settle(Err(error));
    }
}

/// A value that becomes available once, later.
///
/// Awaiting yields the value, the rejection error, or
/// [`Error::StreamClosed`] when the producer went away unresolved.
#[derive(Debug)]
#[must_use = "a deferred value does nothing unless awaited"]
pub struct Deferred<T> {
    rx: oneshot::Receiver<Result<T, Error>>,
}

impl<T> Future for Deferred<T> {
    type Output = Result<T, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::StreamClosed(
                "producer finished without a result".into(),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}
