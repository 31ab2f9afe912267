//! # Bulk operations for key-value stores
//!
//! This crate runs one asynchronous operation per work item against a remote
//! key-value store, bounded to a configured degree of parallelism, and streams
//! each item's outcome back as soon as it completes.
//!
//! ## Core Concepts
//!
//! - **Distributor**: Splits a single-pass input into up to N lanes
//! - **Lane**: The items one worker pulls, in submission order
//! - **Operation**: The caller-supplied per-item call into the store
//! - **ResultStream**: Cold stream of per-item results, merged across lanes
//!
//! Failures the store classifies (not found, CAS mismatch, ...) become failed
//! results and never stop the run. Any other failure, and cancellation, ends
//! the stream with an `Err` once every lane has finished.
//!
//! ## Example
//!
//! ```rust
//! use bulkweld::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let keys = (0..100).map(|i| format!("doc::{i}"));
//!     let touch = operation_fn(|key: String| async move {
//!         if key.ends_with("::13") {
//!             return Err(OperationError::Remote(StoreError::not_found(key)));
//!         }
//!         Ok(())
//!     });
//!
//!     let results = BulkExecutor::new(keys, touch)
//!         .degree_of_parallelism(8)
//!         .collect()
//!         .await?;
//!
//!     assert_eq!(results.len(), 100);
//!     assert_eq!(results.iter().filter(|r| !r.is_successful()).count(), 1);
//!     Ok(())
//! }
//! ```

pub mod distributor;
pub mod error;
pub mod executor;
pub mod item;
pub mod operation;
pub mod options;
pub mod result;
pub mod stream;

// Re-export commonly used items
pub mod prelude {
    pub use crate::distributor::{Distributor, Lane};
    pub use crate::error::{Error, OperationError, Result, StoreError, StoreErrorKind};
    pub use crate::executor::{execute, BulkExecutor};
    pub use crate::item::{KeyValue, WorkItem};
    pub use crate::operation::{cancellable_operation_fn, operation_fn, Operation, Outcome};
    pub use crate::options::BulkOptions;
    pub use crate::result::{OperationResult, Versioned};
    pub use crate::stream::{ResultStream, ResultStreamExt};
    pub use tokio_util::sync::CancellationToken;
}

// Re-export main error type
pub use error::{Error, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
