//! Error types for the bulk operation engine.
//!
//! Two families flow through the engine. [`StoreError`] is the remote store's
//! own classified taxonomy: an item that fails with one becomes a failed
//! [`OperationResult`](crate::result::OperationResult) and the pipeline keeps
//! going. Everything else is an [`Error`] and ends the pipeline once every lane
//! has finished.

use std::fmt;
use std::sync::Arc;

use thiserror::Error as ThisError;

/// The main error type for the bulk engine.
#[derive(Debug, Clone, ThisError)]
pub enum Error {
    /// Options failed validation before any work started
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// An operation was called in a state that does not allow it
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The distributor was used after it had been disposed
    #[error("distributor has been disposed")]
    Disposed,

    /// The pipeline was cancelled before every item was started
    #[error("bulk operation was cancelled")]
    Cancelled,

    /// A single classified store failure
    #[error(transparent)]
    Store(StoreError),

    /// An unclassified failure raised by the supplied operation
    #[error("operation error: {0}")]
    Operation(Arc<dyn std::error::Error + Send + Sync>),

    /// A lane worker panicked
    #[error("lane worker panicked: {0}")]
    TaskPanicked(String),

    /// A custom error with a message
    #[error("{0}")]
    Custom(String),

    /// Multiple errors occurred (every failed item of a drained stream)
    #[error("{}", DisplayMultiple(.0))]
    Multiple(Vec<Error>),
}

struct DisplayMultiple<'a>(&'a [Error]);

impl fmt::Display for DisplayMultiple<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} operations failed: ", self.0.len())?;
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "[{}]", error)?;
        }
        Ok(())
    }
}

// Convenience constructors
impl Error {
    /// Wrap any error type as an unclassified operation failure
    pub fn operation<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Error::Operation(Arc::new(error))
    }

    /// Create an invalid-options error
    pub fn invalid_options<S: Into<String>>(message: S) -> Self {
        Error::InvalidOptions(message.into())
    }

    /// Create an invalid-operation error
    pub fn invalid_operation<S: Into<String>>(message: S) -> Self {
        Error::InvalidOperation(message.into())
    }

    /// Create a custom error with a message
    pub fn custom<S: Into<String>>(message: S) -> Self {
        Error::Custom(message.into())
    }

    /// Whether this error is a pipeline cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// The classified store errors carried by this error, if any.
    ///
    /// For [`Error::Multiple`] this flattens every nested store failure.
    pub fn store_errors(&self) -> Vec<&StoreError> {
        match self {
            Error::Store(e) => vec![e],
            Error::Multiple(errors) => errors.iter().flat_map(Error::store_errors).collect(),
            _ => Vec::new(),
        }
    }
}

// Common conversions
impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Error::Store(e)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        if e.is_cancelled() {
            Error::Cancelled
        } else {
            Error::TaskPanicked(e.to_string())
        }
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a remote store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum StoreErrorKind {
    /// The document does not exist
    NotFound,
    /// The document already exists (insert)
    AlreadyExists,
    /// The supplied CAS did not match the stored document
    CasMismatch,
    /// The document is locked by another holder
    Locked,
    /// The value exceeds the store's size limit
    ValueTooLarge,
    /// A transient failure the caller may retry
    TemporaryFailure,
    /// The store did not answer in time
    Timeout,
    /// Any other store-reported failure
    Other,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreErrorKind::NotFound => "document not found",
            StoreErrorKind::AlreadyExists => "document already exists",
            StoreErrorKind::CasMismatch => "cas mismatch",
            StoreErrorKind::Locked => "document locked",
            StoreErrorKind::ValueTooLarge => "value too large",
            StoreErrorKind::TemporaryFailure => "temporary failure",
            StoreErrorKind::Timeout => "timeout",
            StoreErrorKind::Other => "store error",
        };
        f.write_str(name)
    }
}

/// A failure reported by the remote store for a single key.
///
/// These are expected per-item outcomes and are captured into results rather
/// than aborting the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    kind: StoreErrorKind,
    key: String,
    message: Option<String>,
}

impl StoreError {
    /// Create a store error for `key`
    pub fn new(kind: StoreErrorKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
            message: None,
        }
    }

    /// Attach a store-supplied message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Shorthand for [`StoreErrorKind::NotFound`]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::NotFound, key)
    }

    /// Shorthand for [`StoreErrorKind::AlreadyExists`]
    pub fn already_exists(key: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::AlreadyExists, key)
    }

    /// Shorthand for [`StoreErrorKind::CasMismatch`]
    pub fn cas_mismatch(key: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::CasMismatch, key)
    }

    pub fn kind(&self) -> StoreErrorKind {
        self.kind
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} for key `{}`", self.kind, self.key)?;
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

impl std::error::Error for StoreError {}

/// The error returned by a caller-supplied per-item operation.
///
/// `Remote` failures are recovered into the result stream; `Local` failures
/// cross the engine unmodified and fault the pipeline.
#[derive(Debug, Clone, ThisError)]
pub enum OperationError {
    #[error(transparent)]
    Remote(StoreError),

    #[error(transparent)]
    Local(Error),
}

impl From<StoreError> for OperationError {
    fn from(e: StoreError) -> Self {
        OperationError::Remote(e)
    }
}

impl From<Error> for OperationError {
    fn from(e: Error) -> Self {
        OperationError::Local(e)
    }
}

/// Helper trait for lifting foreign errors into an [`OperationError`]
pub trait IntoOperationError<T> {
    /// Treat the failure as local: it will fault the pipeline
    fn into_local_error(self) -> std::result::Result<T, OperationError>;
}

impl<T, E> IntoOperationError<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn into_local_error(self) -> std::result::Result<T, OperationError> {
        self.map_err(|e| OperationError::Local(Error::operation(e)))
    }
}
