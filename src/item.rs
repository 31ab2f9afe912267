//! Work items: the unit a per-item operation is invoked on.

use std::sync::Arc;

/// Something with a document key that can be handed to a lane worker.
pub trait WorkItem: Send + 'static {
    /// The document key identifying this item
    fn key(&self) -> &str;
}

impl WorkItem for String {
    fn key(&self) -> &str {
        self
    }
}

impl WorkItem for &'static str {
    fn key(&self) -> &str {
        self
    }
}

impl WorkItem for Arc<str> {
    fn key(&self) -> &str {
        self
    }
}

impl<V: Send + 'static> WorkItem for (String, V) {
    fn key(&self) -> &str {
        &self.0
    }
}

/// A key paired with the value to write for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue<V> {
    pub key: String,
    pub value: V,
}

impl<V> KeyValue<V> {
    pub fn new(key: impl Into<String>, value: V) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    pub fn into_parts(self) -> (String, V) {
        (self.key, self.value)
    }
}

impl<V: Send + 'static> WorkItem for KeyValue<V> {
    fn key(&self) -> &str {
        &self.key
    }
}

impl<K: Into<String>, V> From<(K, V)> for KeyValue<V> {
    fn from((key, value): (K, V)) -> Self {
        Self::new(key, value)
    }
}
