//! In-process dataset backend.
//!
//! [`MemoryBackend`] models the parts of ZFS the driver relies on: a dataset
//! needs its parent, destroy refuses datasets with children, and the
//! mountpoint defaults to `/<dataset>` unless a `mountpoint` property was set
//! at creation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use super::{Dataset, DatasetBackend};
use crate::error::DatasetError;

const MOUNTPOINT_PROPERTY: &str = "mountpoint";

#[derive(Debug, Clone)]
struct Record {
    properties: HashMap<String, String>,
    created: Option<DateTime<Utc>>,
    mountpoint_readable: bool,
}

/// Dataset backend that keeps all state in a concurrent map.
///
/// # Thread safety
///
/// Individual operations are atomic per dataset ([`DashMap`] entry locking);
/// sequences of operations are not, matching the guarantees of the real
/// backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    datasets: DashMap<String, Record>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `path` is present.
    pub fn contains(&self, path: &str) -> bool {
        self.datasets.contains_key(path)
    }

    /// Properties `path` was created with.
    pub fn properties(&self, path: &str) -> Option<HashMap<String, String>> {
        self.datasets.get(path).map(|r| r.properties.clone())
    }

    /// Make mountpoint reads for `path` fail from now on.
    pub fn fail_mount_point(&self, path: &str) {
        if let Some(mut record) = self.datasets.get_mut(path) {
            record.mountpoint_readable = false;
        }
    }

    /// Forget the creation time of `path`, so reading it fails.
    pub fn drop_creation_time(&self, path: &str) {
        if let Some(mut record) = self.datasets.get_mut(path) {
            record.created = None;
        }
    }

    fn insert(
        &self,
        path: &str,
        properties: &HashMap<String, String>,
    ) -> Result<Dataset, DatasetError> {
        validate_name(path)?;
        match self.datasets.entry(path.to_owned()) {
            Entry::Occupied(_) => Err(DatasetError::AlreadyExists(path.to_owned())),
            Entry::Vacant(slot) => {
                slot.insert(Record {
                    properties: properties.clone(),
                    created: Some(Utc::now()),
                    mountpoint_readable: true,
                });
                debug!(dataset = path, "dataset created");
                Ok(Dataset::new(path))
            }
        }
    }

    fn record(&self, dataset: &Dataset) -> Result<Record, DatasetError> {
        self.datasets
            .get(dataset.name())
            .map(|r| r.value().clone())
            .ok_or_else(|| DatasetError::NotFound(dataset.name().to_owned()))
    }
}

fn validate_name(path: &str) -> Result<(), DatasetError> {
    if path.is_empty() || path.split('/').any(str::is_empty) {
        return Err(DatasetError::Failed {
            operation: "create",
            dataset: path.to_owned(),
            reason: "invalid dataset name".to_owned(),
        });
    }
    Ok(())
}

fn parent(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

#[async_trait]
impl DatasetBackend for MemoryBackend {
    async fn exists(&self, path: &str) -> bool {
        self.datasets.contains_key(path)
    }

    async fn create(
        &self,
        path: &str,
        properties: &HashMap<String, String>,
    ) -> Result<Dataset, DatasetError> {
        if let Some(parent) = parent(path)
            && !self.datasets.contains_key(parent)
        {
            return Err(DatasetError::Failed {
                operation: "create",
                dataset: path.to_owned(),
                reason: format!("parent {parent} does not exist"),
            });
        }
        self.insert(path, properties)
    }

    async fn create_recursive(
        &self,
        path: &str,
        properties: &HashMap<String, String>,
    ) -> Result<Dataset, DatasetError> {
        validate_name(path)?;
        let mut ancestor = String::new();
        let components: Vec<&str> = path.split('/').collect();
        if let Some((_, ancestors)) = components.split_last() {
            for component in ancestors {
                if !ancestor.is_empty() {
                    ancestor.push('/');
                }
                ancestor.push_str(component);
                if !self.datasets.contains_key(&ancestor) {
                    // Another creator may win the race; that is fine here.
                    match self.insert(&ancestor, &HashMap::new()) {
                        Ok(_) | Err(DatasetError::AlreadyExists(_)) => {}
                        Err(e) => return Err(e),
                    }
                }
            }
        }
        self.insert(path, properties)
    }

    async fn get(&self, path: &str) -> Result<Dataset, DatasetError> {
        if self.datasets.contains_key(path) {
            Ok(Dataset::new(path))
        } else {
            Err(DatasetError::NotFound(path.to_owned()))
        }
    }

    async fn destroy(&self, dataset: &Dataset) -> Result<(), DatasetError> {
        let prefix = format!("{}/", dataset.name());
        if self.datasets.iter().any(|e| e.key().starts_with(&prefix)) {
            return Err(DatasetError::Failed {
                operation: "destroy",
                dataset: dataset.name().to_owned(),
                reason: "filesystem has children".to_owned(),
            });
        }
        self.datasets
            .remove(dataset.name())
            .map(|_| debug!(%dataset, "dataset destroyed"))
            .ok_or_else(|| DatasetError::NotFound(dataset.name().to_owned()))
    }

    async fn list_children(&self, dataset: &Dataset) -> Result<Vec<Dataset>, DatasetError> {
        if !self.datasets.contains_key(dataset.name()) {
            return Err(DatasetError::NotFound(dataset.name().to_owned()));
        }
        let prefix = format!("{}/", dataset.name());
        let mut children: Vec<Dataset> = self
            .datasets
            .iter()
            .filter_map(|e| {
                let rest = e.key().strip_prefix(&prefix)?;
                (!rest.contains('/')).then(|| Dataset::new(e.key().as_str()))
            })
            .collect();
        children.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(children)
    }

    async fn mount_point(&self, dataset: &Dataset) -> Result<String, DatasetError> {
        let record = self.record(dataset)?;
        if !record.mountpoint_readable {
            return Err(DatasetError::Failed {
                operation: "get mountpoint",
                dataset: dataset.name().to_owned(),
                reason: "property unavailable".to_owned(),
            });
        }
        Ok(record
            .properties
            .get(MOUNTPOINT_PROPERTY)
            .cloned()
            .unwrap_or_else(|| format!("/{}", dataset.name())))
    }

    async fn creation_time(&self, dataset: &Dataset) -> Result<DateTime<Utc>, DatasetError> {
        self.record(dataset)?
            .created
            .ok_or_else(|| DatasetError::Failed {
                operation: "get creation",
                dataset: dataset.name().to_owned(),
                reason: "property unavailable".to_owned(),
            })
    }
}
