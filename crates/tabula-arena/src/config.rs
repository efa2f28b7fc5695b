//! Table and context configuration parameters.

use crate::error::ArenaError;

/// Sizing for one table.
///
/// A table's page holds `initial_capacity` records of the type's nominal
/// size; every later page has the same byte size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TableConfig {
    /// Records per page.
    ///
    /// Default: 1024. Must be at least 1.
    pub initial_capacity: u32,
}

impl TableConfig {
    /// Default records per page.
    pub const DEFAULT_INITIAL_CAPACITY: u32 = 1024;

    /// A table config holding `initial_capacity` records per page.
    pub fn new(initial_capacity: u32) -> Self {
        Self { initial_capacity }
    }

    /// Page size in bytes for a record type of `nominal_size` bytes.
    pub fn page_bytes(&self, nominal_size: usize) -> usize {
        self.initial_capacity as usize * nominal_size
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ArenaError> {
        if self.initial_capacity == 0 {
            return Err(ArenaError::InvalidConfig {
                reason: "initial_capacity must be at least 1".into(),
            });
        }
        Ok(())
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INITIAL_CAPACITY)
    }
}

/// Context-wide defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContextConfig {
    /// Table sizing used for every type without an explicit override.
    pub table: TableConfig,
    /// First-block capacity for vectors created without an explicit one.
    ///
    /// Default: 4.
    pub vector_min_capacity: u32,
    /// Bucket count for maps created without an explicit one.
    ///
    /// Default: 64. Buckets are never resized; size for the expected load.
    pub map_bucket_count: u32,
}

impl ContextConfig {
    /// Default first-block capacity for vectors.
    pub const DEFAULT_VECTOR_MIN_CAPACITY: u32 = 4;

    /// Default bucket count for maps.
    pub const DEFAULT_MAP_BUCKET_COUNT: u32 = 64;

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ArenaError> {
        self.table.validate()?;
        if self.vector_min_capacity == 0 {
            return Err(ArenaError::InvalidConfig {
                reason: "vector_min_capacity must be at least 1".into(),
            });
        }
        if self.map_bucket_count == 0 || self.map_bucket_count > i32::MAX as u32 {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "map_bucket_count must be in 1..={}, got {}",
                    i32::MAX,
                    self.map_bucket_count
                ),
            });
        }
        Ok(())
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            table: TableConfig::default(),
            vector_min_capacity: Self::DEFAULT_VECTOR_MIN_CAPACITY,
            map_bucket_count: Self::DEFAULT_MAP_BUCKET_COUNT,
        }
    }
}
