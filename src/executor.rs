//! Bounded-parallelism execution of an operation over many work items.
//!
//! The executor splits the input with a [`Distributor`], spawns one worker per
//! lane and pushes each item's [`OperationResult`] onto a shared
//! [`ResultStream`] as soon as it is known.
//!
//! Completion policy: every lane runs to its own end. An unclassified failure
//! in one lane does not stop its siblings; it is reported once all lanes have
//! finished, ahead of cancellation.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::distributor::{Distributor, Lane};
use crate::error::{Error, Result};
use crate::item::WorkItem;
use crate::operation::{invoke_classified, Operation, Outcome};
use crate::options::BulkOptions;
use crate::result::OperationResult;
use crate::stream::{ResultSink, ResultStream, ResultStreamExt};

/// Run `operation` once per item with bounded parallelism.
///
/// Options are validated immediately; no item is touched until the returned
/// stream is polled. `None` options use [`BulkOptions::shared_default`].
pub fn execute<I, O>(
    items: I,
    operation: O,
    options: Option<BulkOptions>,
    token: CancellationToken,
) -> Result<ResultStream<O::Output>>
where
    I: IntoIterator<Item = O::Item>,
    I::IntoIter: Send + 'static,
    O: Operation,
{
    let mut executor = BulkExecutor::new(items, operation).cancellation(token);
    if let Some(options) = options {
        executor = executor.options(options);
    }
    executor.stream()
}

/// Builder for a bulk run.
///
/// ```rust,no_run
/// use bulkweld::prelude::*;
///
/// # async fn example() -> bulkweld::Result<()> {
/// let keys = (0..1000).map(|i| format!("user::{i}"));
/// let results = BulkExecutor::new(keys, operation_fn(|key: String| async move {
///     match key.strip_prefix("user::") {
///         Some(id) => Ok(format!("profile::{id}")),
///         None => Err(OperationError::Remote(StoreError::not_found(key))),
///     }
/// }))
/// .degree_of_parallelism(32)
/// .collect()
/// .await?;
/// assert_eq!(results.len(), 1000);
/// # Ok(())
/// # }
/// ```
pub struct BulkExecutor<I, O> {
    items: I,
    operation: Arc<O>,
    options: Option<BulkOptions>,
    degree_of_parallelism: Option<usize>,
    token: CancellationToken,
}

impl<I, O> BulkExecutor<I, O>
where
    I: IntoIterator<Item = O::Item>,
    I::IntoIter: Send + 'static,
    O: Operation,
{
    /// Create a new bulk run over `items`
    pub fn new(items: I, operation: O) -> Self {
        Self {
            items,
            operation: Arc::new(operation),
            options: None,
            degree_of_parallelism: None,
            token: CancellationToken::new(),
        }
    }

    /// Use explicit options instead of the shared default
    pub fn options(mut self, options: BulkOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Override the degree of parallelism (validated when the stream is built)
    pub fn degree_of_parallelism(mut self, degree_of_parallelism: usize) -> Self {
        self.degree_of_parallelism = Some(degree_of_parallelism);
        self
    }

    /// Observe `token` for cancellation
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    fn resolve_options(&self) -> Result<BulkOptions> {
        let options = self
            .options
            .clone()
            .unwrap_or_else(|| BulkOptions::shared_default().clone());
        options.validate()?;
        match self.degree_of_parallelism {
            Some(dop) => options.with_degree_of_parallelism(dop),
            None => Ok(options),
        }
    }

    /// Build the cold result stream.
    pub fn stream(self) -> Result<ResultStream<O::Output>> {
        let options = self.resolve_options()?;
        let token = self.token.child_token();
        let guard = token.clone().drop_guard();
        let items = self.items.into_iter();
        let operation = self.operation;

        Ok(ResultStream::new(
            move |sink| tokio::spawn(drive(items, operation, options, token, sink)),
            Some(guard),
        ))
    }

    /// Run to completion, failing if any item failed
    pub async fn run(self) -> Result<()> {
        self.stream()?.ensure_successful().await
    }

    /// Run to completion and return every per-item result
    pub async fn collect(self) -> Result<Vec<OperationResult<O::Output>>> {
        self.stream()?.collect_results().await
    }
}

async fn drive<I, O>(
    items: I,
    operation: Arc<O>,
    options: BulkOptions,
    token: CancellationToken,
    sink: ResultSink<O::Output>,
) -> Result<()>
where
    I: Iterator<Item = O::Item> + Send + 'static,
    O: Operation,
{
    let mut distributor = Distributor::new(items, &options);
    let lanes = distributor.get_batches()?;

    // Spawned in lane order; tokio services its injection queue FIFO.
    let mut workers = JoinSet::new();
    for (index, lane) in lanes.into_iter().enumerate() {
        workers.spawn(run_lane(
            index,
            lane,
            operation.clone(),
            sink.clone(),
            token.clone(),
        ));
    }
    drop(sink);

    let mut fault = None;
    while let Some(joined) = workers.join_next().await {
        if let Err(error) = joined.map_err(Error::from).and_then(|lane| lane) {
            fault.get_or_insert(error);
        }
    }
    distributor.dispose();

    match fault {
        Some(error) => Err(error),
        None if token.is_cancelled() => Err(Error::Cancelled),
        None => Ok(()),
    }
}

async fn run_lane<O: Operation>(
    lane_id: usize,
    mut lane: Lane<O::Item>,
    operation: Arc<O>,
    sink: ResultSink<O::Output>,
    token: CancellationToken,
) -> Result<()> {
    let mut completed = 0usize;

    loop {
        // Checked before `next()` so a cancelled lane pulls nothing more.
        if token.is_cancelled() {
            tracing::debug!(lane = lane_id, completed, "lane stopped by cancellation");
            return Ok(());
        }
        let Some(item) = lane.next() else {
            break;
        };

        let key = item.key().to_owned();
        let result = match invoke_classified(operation.as_ref(), item, &token).await {
            Ok(Outcome::Success(value)) => OperationResult::success(key, value),
            Ok(Outcome::Failure(error)) => OperationResult::failure(key, error),
            Err(error) => {
                tracing::warn!(
                    lane = lane_id,
                    key = %key,
                    error = %error,
                    "lane faulted, sibling lanes keep running"
                );
                return Err(error);
            }
        };

        tracing::trace!(
            lane = lane_id,
            key = result.key(),
            successful = result.is_successful(),
            "item completed"
        );
        record_item(result.is_successful());

        if !sink.push(result) {
            tracing::debug!(lane = lane_id, completed, "result consumer went away");
            return Ok(());
        }
        completed += 1;
    }

    Ok(())
}

#[cfg(feature = "metrics")]
fn record_item(successful: bool) {
    let outcome = if successful { "success" } else { "failure" };
    metrics::counter!("bulkweld_items_total", "outcome" => outcome).increment(1);
}

#[cfg(not(feature = "metrics"))]
fn record_item(_successful: bool) {}
