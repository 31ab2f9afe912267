//! Per-item outcome records.

use crate::error::StoreError;

/// A payload carrying the store's identity/version token.
pub trait Versioned {
    /// Compare-and-swap value of the document after the operation
    fn cas(&self) -> u64;
}

/// The outcome of running an operation against a single key.
///
/// Exactly one result is produced for every item whose operation was invoked.
/// `T` is the success payload; it is `()` for operations without one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult<T = ()> {
    key: String,
    outcome: std::result::Result<T, StoreError>,
}

impl<T> OperationResult<T> {
    /// A successful result with its payload
    pub fn success(key: impl Into<String>, value: T) -> Self {
        Self {
            key: key.into(),
            outcome: Ok(value),
        }
    }

    /// A failed result carrying the store's classified error
    pub fn failure(key: impl Into<String>, error: StoreError) -> Self {
        Self {
            key: key.into(),
            outcome: Err(error),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The classified error, if the operation failed
    pub fn error(&self) -> Option<&StoreError> {
        self.outcome.as_ref().err()
    }

    /// The payload, populated only when the operation succeeded
    pub fn value(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    pub fn is_successful(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Convert into a plain `Result`
    pub fn into_result(self) -> std::result::Result<T, StoreError> {
        self.outcome
    }

    pub fn into_error(self) -> Option<StoreError> {
        self.outcome.err()
    }
}

impl<T: Versioned> OperationResult<T> {
    /// The document's CAS after a successful operation
    pub fn cas(&self) -> Option<u64> {
        self.value().map(Versioned::cas)
    }
}
