//! ZFS volume driver.
//!
//! [`ZfsDriver`] implements [`VolumeDriver`] on top of any
//! [`DatasetBackend`]. Volumes are datasets one level beneath a configured
//! root:
//!
//! ```text
//! <root 0>/            # also the target for legacy (bare) names
//!   <volume>           # one dataset per volume
//! <root 1>/
//!   <volume>
//! ```
//!
//! The driver keeps no per-volume state: every call re-reads the backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::SecondsFormat;
use tracing::{debug, info, instrument, warn};

use crate::dataset::{Dataset, DatasetBackend};
use crate::driver::VolumeDriver;
use crate::error::VolumeError;
use crate::resolver::NameResolver;
use crate::types::{Capabilities, CreateVolumeRequest, MountRequest, Volume};

/// Volume driver backed by ZFS datasets.
///
/// # Thread safety
///
/// Roots and the resolver are immutable after [`ZfsDriver::new`]; there is no
/// locking. Check-then-act sequences such as `create` rely on the backend
/// rejecting a duplicate dataset if two callers race.
pub struct ZfsDriver<B> {
    backend: Arc<B>,
    /// Root datasets, in configuration order.
    roots: Vec<Dataset>,
    resolver: NameResolver,
}

impl<B: DatasetBackend> ZfsDriver<B> {
    /// Open every root dataset, creating missing ones, and build the driver.
    ///
    /// Any failure here is fatal to startup.
    pub async fn new(
        backend: Arc<B>,
        root_names: &[String],
        legacy_names: bool,
    ) -> Result<Self, VolumeError> {
        let mut roots = Vec::with_capacity(root_names.len());
        for name in root_names {
            let root = if backend.exists(name).await {
                backend.get(name).await?
            } else {
                let root = backend.create_recursive(name, &HashMap::new()).await?;
                info!(root = %root, "created root dataset");
                root
            };
            debug!(root = %root, "root dataset ready");
            roots.push(root);
        }

        info!(roots = ?root_names, legacy_names, "zfs driver initialised");
        Ok(Self {
            backend,
            roots,
            resolver: NameResolver::new(root_names.to_vec(), legacy_names),
        })
    }

    pub fn roots(&self) -> &[Dataset] {
        &self.roots
    }

    /// Resolve `name` and fetch the dataset backing it.
    async fn dataset(&self, name: &str) -> Result<Dataset, VolumeError> {
        let path = self.resolver.resolve(name)?;
        Ok(self.backend.get(&path).await?)
    }

    async fn mount_point_of(&self, name: &str) -> Result<String, VolumeError> {
        let dataset = self.dataset(name).await?;
        Ok(self.backend.mount_point(&dataset).await?)
    }
}

#[async_trait]
impl<B: DatasetBackend + 'static> VolumeDriver for ZfsDriver<B> {
    #[instrument(skip(self, req), fields(name = %req.name))]
    async fn create(&self, req: CreateVolumeRequest) -> Result<(), VolumeError> {
        let path = self.resolver.resolve(&req.name)?;

        // Not atomic with the create below; a concurrent duplicate is
        // rejected by the backend instead.
        if self.backend.exists(&path).await {
            return Err(VolumeError::AlreadyExists(path));
        }

        let dataset = self.backend.create_recursive(&path, &req.options).await?;
        info!(dataset = %dataset, "volume created");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<Volume>, VolumeError> {
        let mut volumes = Vec::new();
        for root in &self.roots {
            for child in self.backend.list_children(root).await? {
                let mountpoint = match self.backend.mount_point(&child).await {
                    Ok(mp) => mp,
                    Err(e) => {
                        warn!(dataset = %child, error = %e, "failed to read mountpoint, skipping");
                        continue;
                    }
                };
                volumes.push(Volume::new(child.name(), mountpoint.clone()));
                if let Some(alias) = self.resolver.legacy_alias(child.name()) {
                    volumes.push(Volume::new(alias, mountpoint));
                }
            }
        }
        debug!(count = volumes.len(), "volumes listed");
        Ok(volumes)
    }

    #[instrument(skip(self))]
    async fn get(&self, name: &str) -> Result<Volume, VolumeError> {
        let dataset = self.dataset(name).await?;
        let mountpoint = self.backend.mount_point(&dataset).await?;

        let created_at = match self.backend.creation_time(&dataset).await {
            Ok(ts) => Some(ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
            Err(e) => {
                debug!(dataset = %dataset, error = %e, "creation time unavailable");
                None
            }
        };

        Ok(Volume {
            name: name.to_owned(),
            mountpoint,
            created_at,
        })
    }

    #[instrument(skip(self))]
    async fn remove(&self, name: &str) -> Result<(), VolumeError> {
        let dataset = self.dataset(name).await?;
        self.backend.destroy(&dataset).await?;
        info!(dataset = %dataset, "volume removed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn path(&self, name: &str) -> Result<String, VolumeError> {
        self.mount_point_of(name).await
    }

    /// ZFS mounts datasets itself; this only reports where.
    #[instrument(skip(self, req), fields(name = %req.name, id = %req.id))]
    async fn mount(&self, req: MountRequest) -> Result<String, VolumeError> {
        self.mount_point_of(&req.name).await
    }

    /// Never unmounts: the dataset's mount is owned by the host.
    async fn unmount(&self, req: MountRequest) -> Result<(), VolumeError> {
        debug!(name = %req.name, id = %req.id, "unmount requested, nothing to do");
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::LOCAL
    }
}
