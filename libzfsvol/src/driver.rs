//! Volume driver capability trait.
//!
//! This is the operation set a plugin server needs from a driver. Nothing is
//! inherited: implementors supply every method, and the transport layer only
//! depends on this contract.

use async_trait::async_trait;

use crate::error::VolumeError;
use crate::types::{Capabilities, CreateVolumeRequest, MountRequest, Volume};

/// Volume lifecycle operations exposed through the plugin protocol.
#[async_trait]
pub trait VolumeDriver: Send + Sync {
    /// Create the volume. Fails with [`VolumeError::AlreadyExists`] if the
    /// backing dataset is already present.
    async fn create(&self, req: CreateVolumeRequest) -> Result<(), VolumeError>;

    /// List every volume beneath every root.
    async fn list(&self) -> Result<Vec<Volume>, VolumeError>;

    /// Look up a single volume.
    async fn get(&self, name: &str) -> Result<Volume, VolumeError>;

    /// Destroy the backing dataset.
    async fn remove(&self, name: &str) -> Result<(), VolumeError>;

    /// Return the live mountpoint.
    async fn path(&self, name: &str) -> Result<String, VolumeError>;

    /// Make the volume available to a container and return its mountpoint.
    async fn mount(&self, req: MountRequest) -> Result<String, VolumeError>;

    /// Release a container's use of the volume.
    async fn unmount(&self, req: MountRequest) -> Result<(), VolumeError>;

    /// Advertise the driver's scope.
    fn capabilities(&self) -> Capabilities;
}
