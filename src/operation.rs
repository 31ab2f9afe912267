//! The per-item operation contract.
//!
//! An [`Operation`] is invoked once per work item against the remote store.
//! Operations are treated as idempotent and are never retried by the engine.
//! Every call receives the run's [`CancellationToken`] so in-flight remote
//! calls can give up early.

use async_trait::async_trait;
use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::error::{OperationError, Result, StoreError};
use crate::item::WorkItem;

/// An asynchronous operation executed once per work item.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use bulkweld::error::{OperationError, StoreError};
/// use bulkweld::operation::Operation;
/// use tokio_util::sync::CancellationToken;
///
/// struct Touch;
///
/// #[async_trait]
/// impl Operation for Touch {
///     type Item = String;
///     type Output = ();
///
///     async fn invoke(&self, key: String, token: &CancellationToken) -> Result<(), OperationError> {
///         if token.is_cancelled() || key.is_empty() {
///             return Err(StoreError::not_found(key).into());
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Operation: Send + Sync + 'static {
    /// The work item type this operation accepts
    type Item: WorkItem;
    /// The success payload; `()` when the operation has none
    type Output: Send + 'static;

    /// Run the operation for a single item.
    ///
    /// Return [`OperationError::Remote`] for failures classified by the store
    /// and [`OperationError::Local`] for anything that should fault the run.
    /// `token` is cancelled when the run is cancelled or its result stream is
    /// dropped.
    async fn invoke(
        &self,
        item: Self::Item,
        token: &CancellationToken,
    ) -> std::result::Result<Self::Output, OperationError>;
}

/// Helper function to create an operation from an async closure.
///
/// The closure does not see the cancellation token; use
/// [`cancellable_operation_fn`] when it should.
pub fn operation_fn<F, Fut, W, T>(f: F) -> FnOperation<F, W>
where
    F: Fn(W) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<T, OperationError>> + Send + 'static,
    W: WorkItem,
    T: Send + 'static,
{
    FnOperation {
        f,
        _phantom: std::marker::PhantomData,
    }
}

/// An operation created from a function
pub struct FnOperation<F, W> {
    f: F,
    _phantom: std::marker::PhantomData<fn(W)>,
}

#[async_trait]
impl<F, Fut, W, T> Operation for FnOperation<F, W>
where
    F: Fn(W) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<T, OperationError>> + Send + 'static,
    W: WorkItem,
    T: Send + 'static,
{
    type Item = W;
    type Output = T;

    async fn invoke(
        &self,
        item: W,
        _token: &CancellationToken,
    ) -> std::result::Result<T, OperationError> {
        (self.f)(item).await
    }
}

/// Helper function to create an operation from an async closure that also
/// receives the run's cancellation token
pub fn cancellable_operation_fn<F, Fut, W, T>(f: F) -> CancellableFnOperation<F, W>
where
    F: Fn(W, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<T, OperationError>> + Send + 'static,
    W: WorkItem,
    T: Send + 'static,
{
    CancellableFnOperation {
        f,
        _phantom: std::marker::PhantomData,
    }
}

/// An operation created from a function taking a cancellation token
pub struct CancellableFnOperation<F, W> {
    f: F,
    _phantom: std::marker::PhantomData<fn(W)>,
}

#[async_trait]
impl<F, Fut, W, T> Operation for CancellableFnOperation<F, W>
where
    F: Fn(W, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<T, OperationError>> + Send + 'static,
    W: WorkItem,
    T: Send + 'static,
{
    type Item = W;
    type Output = T;

    async fn invoke(
        &self,
        item: W,
        token: &CancellationToken,
    ) -> std::result::Result<T, OperationError> {
        (self.f)(item, token.clone()).await
    }
}

/// The classified outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Success(T),
    Failure(StoreError),
}

impl<T> Outcome<T> {
    /// Split an operation's return value into the recover and propagate paths.
    ///
    /// Remote failures become `Ok(Outcome::Failure)`; local failures are
    /// returned as `Err` untouched.
    pub fn classify(result: std::result::Result<T, OperationError>) -> Result<Self> {
        match result {
            Ok(value) => Ok(Outcome::Success(value)),
            Err(OperationError::Remote(error)) => Ok(Outcome::Failure(error)),
            Err(OperationError::Local(error)) => Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

/// Invoke `operation` and classify what it returned
pub async fn invoke_classified<O: Operation>(
    operation: &O,
    item: O::Item,
    token: &CancellationToken,
) -> Result<Outcome<O::Output>> {
    Outcome::classify(operation.invoke(item, token).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn closures_become_operations() {
        let op = operation_fn(|key: String| async move { Ok::<_, OperationError>(key.len()) });
        let token = CancellationToken::new();
        let outcome = invoke_classified(&op, "four".to_string(), &token).await.unwrap();
        assert_eq!(outcome, Outcome::Success(4));
    }

    #[tokio::test]
    async fn store_errors_are_recovered() {
        let op = operation_fn(|key: String| async move {
            Err::<(), _>(OperationError::from(StoreError::not_found(key)))
        });
        let token = CancellationToken::new();
        let outcome = invoke_classified(&op, "missing".to_string(), &token).await.unwrap();
        assert!(!outcome.is_success());
        match outcome {
            Outcome::Failure(e) => assert_eq!(e.key(), "missing"),
            Outcome::Success(_) => unreachable!(),
        }
    }

    #[tokio::test]
    async fn local_errors_propagate() {
        let op = operation_fn(|_key: String| async move {
            Err::<(), _>(OperationError::from(Error::custom("bad argument")))
        });
        let token = CancellationToken::new();
        let err = invoke_classified(&op, "k".to_string(), &token).await.unwrap_err();
        assert_eq!(err.to_string(), "bad argument");
    }

    #[tokio::test]
    async fn cancellable_closures_see_the_token() {
        let op = cancellable_operation_fn(|key: String, token: CancellationToken| async move {
            if token.is_cancelled() {
                return Err(OperationError::from(Error::Cancelled));
            }
            Ok(key)
        });

        let live = CancellationToken::new();
        let outcome = invoke_classified(&op, "a".to_string(), &live).await.unwrap();
        assert_eq!(outcome, Outcome::Success("a".to_string()));

        live.cancel();
        let err = invoke_classified(&op, "b".to_string(), &live).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
