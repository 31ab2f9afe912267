//! Configuration for bulk execution.

use std::sync::OnceLock;

use crate::error::{Error, Result};

/// Options controlling how a bulk operation is executed.
///
/// Values are immutable once built: every setter consumes `self` and returns
/// a new, validated value.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RawBulkOptions"))]
pub struct BulkOptions {
    degree_of_parallelism: usize,
}

/// Wire form of [`BulkOptions`], validated on conversion.
#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawBulkOptions {
    degree_of_parallelism: usize,
}

#[cfg(feature = "serde")]
impl Default for RawBulkOptions {
    fn default() -> Self {
        Self {
            degree_of_parallelism: BulkOptions::shared_default().degree_of_parallelism(),
        }
    }
}

#[cfg(feature = "serde")]
impl TryFrom<RawBulkOptions> for BulkOptions {
    type Error = Error;

    fn try_from(raw: RawBulkOptions) -> Result<Self> {
        BulkOptions::new(raw.degree_of_parallelism)
    }
}

impl BulkOptions {
    /// Create options with an explicit degree of parallelism.
    ///
    /// Fails with [`Error::InvalidOptions`] if `degree_of_parallelism` is zero.
    pub fn new(degree_of_parallelism: usize) -> Result<Self> {
        let options = Self {
            degree_of_parallelism,
        };
        options.validate()?;
        Ok(options)
    }

    /// The process-wide default options (processor count × 4).
    pub fn shared_default() -> &'static BulkOptions {
        static DEFAULT: OnceLock<BulkOptions> = OnceLock::new();
        DEFAULT.get_or_init(BulkOptions::default)
    }

    /// Return a copy with a different degree of parallelism
    pub fn with_degree_of_parallelism(self, degree_of_parallelism: usize) -> Result<Self> {
        Self::new(degree_of_parallelism)
    }

    /// Maximum number of lanes executing concurrently
    pub fn degree_of_parallelism(&self) -> usize {
        self.degree_of_parallelism
    }

    /// Check the invariants.
    pub fn validate(&self) -> Result<()> {
        if self.degree_of_parallelism < 1 {
            return Err(Error::invalid_options(format!(
                "degree_of_parallelism must be at least 1, got {}",
                self.degree_of_parallelism
            )));
        }
        Ok(())
    }
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            degree_of_parallelism: num_cpus::get().max(1) * 4,
        }
    }
}

impl std::fmt::Debug for BulkOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkOptions")
            .field("degree_of_parallelism", &self.degree_of_parallelism)
            .finish()
    }
}
