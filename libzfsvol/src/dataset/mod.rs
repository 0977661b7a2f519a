//! Dataset backend seam.
//!
//! [`DatasetBackend`] is the narrow set of primitives the driver needs from
//! the storage layer. Each call is expected to be atomic on its own; callers
//! do not lock around sequences of calls.
//!
//! * [`zfs`] drives the host `zfs` command.
//! * [`memory`] keeps datasets in process, with the same naming and mountpoint
//!   rules, for tests and dry runs.

pub mod memory;
pub mod zfs;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatasetError;

pub use memory::MemoryBackend;
pub use zfs::ZfsCli;

/// Handle to an existing dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dataset {
    name: String,
}

impl Dataset {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Full `/`-delimited dataset path, e.g. `tank/docker/vol1`.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Dataset primitives provided by the storage layer.
#[async_trait]
pub trait DatasetBackend: Send + Sync {
    /// Whether a dataset exists at `path`.
    async fn exists(&self, path: &str) -> bool;

    /// Create `path`; its parent must already exist. `properties` are applied
    /// verbatim.
    async fn create(
        &self,
        path: &str,
        properties: &HashMap<String, String>,
    ) -> Result<Dataset, DatasetError>;

    /// Create `path` along with any missing ancestors. `properties` apply to
    /// `path` only.
    async fn create_recursive(
        &self,
        path: &str,
        properties: &HashMap<String, String>,
    ) -> Result<Dataset, DatasetError>;

    async fn get(&self, path: &str) -> Result<Dataset, DatasetError>;

    /// Destroy a dataset. Fails if it has dependents.
    async fn destroy(&self, dataset: &Dataset) -> Result<(), DatasetError>;

    /// Direct children of `dataset`.
    async fn list_children(&self, dataset: &Dataset) -> Result<Vec<Dataset>, DatasetError>;

    async fn mount_point(&self, dataset: &Dataset) -> Result<String, DatasetError>;

    async fn creation_time(&self, dataset: &Dataset) -> Result<DateTime<Utc>, DatasetError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_displays_full_path() {
        let dataset = Dataset::new("tank/docker/vol1");
        assert_eq!(dataset.to_string(), "tank/docker/vol1");
        assert_eq!(dataset.name(), "tank/docker/vol1");
    }
}
