//! The result stream and its aggregation helpers.
//!
//! A [`ResultStream`] is cold: nothing runs until it is first polled. Per-item
//! results arrive as `Ok` in completion order; a pipeline fault or
//! cancellation arrives as one final `Err`, after which the stream ends.

use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures_core::stream::FusedStream;
use futures_core::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::sync::DropGuard;

use crate::error::{Error, Result};
use crate::result::OperationResult;

/// The shared, multi-writer end of a result stream.
///
/// Pushes from different lanes are serialized by the channel.
pub struct ResultSink<T> {
    sender: mpsc::UnboundedSender<OperationResult<T>>,
}

impl<T> ResultSink<T> {
    /// Push one result. Returns `false` once the consumer has gone away.
    pub fn push(&self, result: OperationResult<T>) -> bool {
        self.sender.send(result).is_ok()
    }
}

impl<T> Clone for ResultSink<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

type Launch<T> = Box<dyn FnOnce(ResultSink<T>) -> JoinHandle<Result<()>> + Send>;

enum State<T> {
    Pending(Launch<T>),
    Running {
        receiver: mpsc::UnboundedReceiver<OperationResult<T>>,
        driver: JoinHandle<Result<()>>,
    },
    Draining(JoinHandle<Result<()>>),
    Done,
}

/// A cold stream of per-item results.
pub struct ResultStream<T> {
    state: State<T>,
    _guard: Option<DropGuard>,
}

impl<T: Send + 'static> ResultStream<T> {
    /// Build a stream that calls `launch` with its sink on first poll.
    ///
    /// `launch` must spawn the driver and return its handle. The driver's
    /// completion decides how the stream ends. `guard` is dropped with the
    /// stream, letting the driver notice an abandoned consumer.
    pub(crate) fn new<F>(launch: F, guard: Option<DropGuard>) -> Self
    where
        F: FnOnce(ResultSink<T>) -> JoinHandle<Result<()>> + Send + 'static,
    {
        Self {
            state: State::Pending(Box::new(launch)),
            _guard: guard,
        }
    }

    /// Whether any work has been started yet
    pub fn is_started(&self) -> bool {
        !matches!(self.state, State::Pending(_))
    }
}

impl<T> Unpin for ResultStream<T> {}

impl<T: Send + 'static> Stream for ResultStream<T> {
    type Item = Result<OperationResult<T>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                State::Pending(_) => {
                    let launch = match std::mem::replace(&mut this.state, State::Done) {
                        State::Pending(launch) => launch,
                        _ => return Poll::Ready(None),
                    };
                    let (sender, receiver) = mpsc::unbounded_channel();
                    let driver = launch(ResultSink { sender });
                    this.state = State::Running { receiver, driver };
                }
                State::Running { receiver, .. } => match ready!(receiver.poll_recv(cx)) {
                    Some(result) => return Poll::Ready(Some(Ok(result))),
                    None => {
                        let driver = match std::mem::replace(&mut this.state, State::Done) {
                            State::Running { driver, .. } => driver,
                            _ => return Poll::Ready(None),
                        };
                        this.state = State::Draining(driver);
                    }
                },
                State::Draining(driver) => {
                    let joined = ready!(Pin::new(driver).poll(cx));
                    this.state = State::Done;
                    return match joined {
                        Ok(Ok(())) => Poll::Ready(None),
                        Ok(Err(e)) => Poll::Ready(Some(Err(e))),
                        Err(e) => Poll::Ready(Some(Err(Error::from(e)))),
                    };
                }
                State::Done => return Poll::Ready(None),
            }
        }
    }
}

impl<T: Send + 'static> FusedStream for ResultStream<T> {
    fn is_terminated(&self) -> bool {
        matches!(self.state, State::Done)
    }
}

impl<T> std::fmt::Debug for ResultStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            State::Pending(_) => "pending",
            State::Running { .. } => "running",
            State::Draining(_) => "draining",
            State::Done => "done",
        };
        f.debug_struct("ResultStream").field("state", &state).finish()
    }
}

/// Aggregation helpers for any stream of per-item results.
pub trait ResultStreamExt<T>: Stream<Item = Result<OperationResult<T>>> + Sized {
    /// Drain the stream and fail if any item failed.
    ///
    /// Every failed item's store error is collected into one
    /// [`Error::Multiple`]. A fault of the stream itself (including
    /// cancellation) is returned as-is instead.
    fn ensure_successful(self) -> impl Future<Output = Result<()>> + Send
    where
        Self: Send,
        T: Send,
    {
        async move {
            let stream = self;
            tokio::pin!(stream);

            let mut failures = Vec::new();
            while let Some(item) = stream.next().await {
                if let Some(error) = item?.into_error() {
                    failures.push(Error::Store(error));
                }
            }

            if failures.is_empty() {
                Ok(())
            } else {
                tracing::debug!(failed = failures.len(), "bulk operation had failed items");
                Err(Error::Multiple(failures))
            }
        }
    }

    /// Drain the stream into a `Vec`, surfacing a fault of the stream itself.
    fn collect_results(self) -> impl Future<Output = Result<Vec<OperationResult<T>>>> + Send
    where
        Self: Send,
        T: Send,
    {
        async move {
            let stream = self;
            tokio::pin!(stream);

            let mut results = Vec::new();
            while let Some(item) = stream.next().await {
                results.push(item?);
            }
            Ok(results)
        }
    }
}

impl<S, T> ResultStreamExt<T> for S where S: Stream<Item = Result<OperationResult<T>>> + Sized {}
